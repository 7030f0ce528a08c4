//! The trait-impl index: a two-level map from trait code to type code.
//!
//! The index is populated before checking begins and read-only afterwards;
//! the unifier consults it to discharge constraints when instantiating a
//! bounded parameter. Both key levels are canonical codes, so lookup
//! equality is exactly α-equivalence.

use std::collections::BTreeMap;

use serin_ast::{Ast, EntityId, Node, NodeId};
use serin_diag::{Category, Diagnostic, DiagnosticError};
use serin_types::{Instr, TypeCode};

use crate::context::ScopeTree;

/// One registered implementation of a trait for a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplDef {
    pub trait_id: EntityId,
    pub target: NodeId,
}

/// `trait code -> type code -> impl`, at most one impl per pair.
#[derive(Debug, Default)]
pub struct ImplIndex {
    by_trait: BTreeMap<TypeCode, BTreeMap<TypeCode, ImplDef>>,
}

impl ImplIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical key for a trait: the code of a bare reference to it.
    pub fn trait_code(trait_id: EntityId) -> Result<TypeCode, DiagnosticError> {
        TypeCode::encode([Instr::Ref(trait_id.0)])
    }

    /// Register an impl of `trait_node` (a trait definition) for the type
    /// expression `target`. Both keys are canonicalized before insertion;
    /// a second impl for the same pair is an `OverlappingImpl`.
    pub fn define_impl(
        &mut self,
        ast: &Ast,
        scopes: &mut ScopeTree,
        trait_node: NodeId,
        target: NodeId,
    ) -> Result<(), DiagnosticError> {
        let Node::Trait(def) = ast.node(trait_node) else {
            return Err(Diagnostic::error(
                Category::InvariantViolated,
                "impl registered against a non-trait node",
            )
            .into());
        };
        let trait_id = def.id;
        let trait_name = def.name.clone();
        let trait_key = Self::trait_code(trait_id)?;
        let type_key = scopes.normalize(ast, target)?;

        let for_trait = self.by_trait.entry(trait_key).or_default();
        if for_trait.contains_key(&type_key) {
            return Err(Diagnostic::error(
                Category::OverlappingImpl,
                format!("overlapping impls of `{trait_name}` for type code `{type_key}`"),
            )
            .into());
        }
        for_trait.insert(type_key, ImplDef { trait_id, target });
        Ok(())
    }

    /// Whether an impl is registered for the given pair of codes.
    pub fn contains(&self, trait_key: &TypeCode, type_key: &TypeCode) -> bool {
        self.by_trait
            .get(trait_key)
            .is_some_and(|m| m.contains_key(type_key))
    }

    pub fn lookup(&self, trait_key: &TypeCode, type_key: &TypeCode) -> Option<&ImplDef> {
        self.by_trait.get(trait_key)?.get(type_key)
    }

    /// Number of registered impls across all traits.
    pub fn len(&self) -> usize {
        self.by_trait.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_trait.is_empty()
    }
}
