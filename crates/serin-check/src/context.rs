//! The scope tree: lexical contexts, name resolution, and the check gate.
//!
//! Contexts form a tree mirroring the binding structure of the AST. Each
//! context owns the entities defined in its scope, split into a value and a
//! type namespace, plus two write-once caches: variable resolution and
//! normalized type codes. Contexts live in a [`ScopeTree`] arena and refer
//! to each other by [`CtxId`], so the parent chain carries no reference
//! cycles.

use std::collections::BTreeMap;

use serin_ast::{Ast, EntityId, Node, NodeId};
use serin_diag::{Category, Diagnostic, DiagnosticError};
use serin_types::TypeCode;

use crate::compile;
use crate::kind;

/// Index of a context in the [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CtxId(pub u32);

impl CtxId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One lexical context.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<CtxId>,
    /// The scope node this context was created for; `None` for the root.
    owner: Option<NodeId>,
    /// De Bruijn anchor: parent depth plus one for parameter-binding scopes.
    depth: u32,
    entities: BTreeMap<EntityId, NodeId>,
    value_names: BTreeMap<String, EntityId>,
    type_names: BTreeMap<String, EntityId>,
    /// Write-once cache: name occurrence node -> resolved entity.
    var_cache: BTreeMap<NodeId, EntityId>,
    /// Lazily created child contexts, keyed by their scope node.
    children: BTreeMap<NodeId, CtxId>,
    /// Write-once cache: type node -> canonical code.
    normalize_memo: BTreeMap<NodeId, TypeCode>,
}

/// Arena of contexts. Construction starts from a single root context.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    /// Scope node -> context, for `find_context`.
    by_node: BTreeMap<NodeId, CtxId>,
}

impl ScopeTree {
    /// The root context: depth 0, no parent, no owner.
    pub const ROOT: CtxId = CtxId(0);

    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            by_node: BTreeMap::new(),
        }
    }

    fn scope(&self, ctx: CtxId) -> &Scope {
        &self.scopes[ctx.index()]
    }

    fn scope_mut(&mut self, ctx: CtxId) -> &mut Scope {
        &mut self.scopes[ctx.index()]
    }

    pub fn depth(&self, ctx: CtxId) -> u32 {
        self.scope(ctx).depth
    }

    pub fn parent(&self, ctx: CtxId) -> Option<CtxId> {
        self.scope(ctx).parent
    }

    pub fn owner(&self, ctx: CtxId) -> Option<NodeId> {
        self.scope(ctx).owner
    }

    // -- define -------------------------------------------------------------

    /// Define an entity in `ctx`.
    ///
    /// Aliases, datatypes, traits, and parameters land in the type
    /// namespace; data constructors and trait methods land in the value
    /// namespace of the same context. Defining a name twice in the same
    /// namespace of one context is a `Redeclaration`.
    pub fn define(&mut self, ast: &Ast, ctx: CtxId, node: NodeId) -> Result<(), DiagnosticError> {
        match ast.node(node) {
            Node::Alias(def) => self.define_type_name(ctx, &def.name, def.id, node),
            Node::Data(def) => {
                self.define_type_name(ctx, &def.name, def.id, node)?;
                for ctor in &def.ctors {
                    self.define_value_name(ctx, &ctor.name, ctor.id, node)?;
                }
                Ok(())
            }
            Node::Trait(def) => {
                self.define_type_name(ctx, &def.name, def.id, node)?;
                for method in &def.methods {
                    self.define_value_name(ctx, &method.name, method.id, node)?;
                }
                Ok(())
            }
            Node::Param(def) => self.define_type_name(ctx, &def.name, def.id, node),
            Node::Partial(def) => {
                self.scope_mut(ctx).entities.insert(def.id, node);
                Ok(())
            }
            Node::Hole(_)
            | Node::Forall(_)
            | Node::Apply(_)
            | Node::Tuple(_)
            | Node::Fun(_)
            | Node::Name(_) => Err(Diagnostic::error(
                Category::InvariantViolated,
                "only named entities and partials can be defined in a scope",
            )
            .into()),
        }
    }

    fn define_type_name(
        &mut self,
        ctx: CtxId,
        name: &str,
        id: EntityId,
        node: NodeId,
    ) -> Result<(), DiagnosticError> {
        let scope = self.scope_mut(ctx);
        if scope.type_names.contains_key(name) {
            return Err(Diagnostic::error(
                Category::Redeclaration,
                format!("type `{name}` is already defined in this scope"),
            )
            .into());
        }
        scope.type_names.insert(name.to_string(), id);
        scope.entities.insert(id, node);
        Ok(())
    }

    fn define_value_name(
        &mut self,
        ctx: CtxId,
        name: &str,
        id: EntityId,
        node: NodeId,
    ) -> Result<(), DiagnosticError> {
        let scope = self.scope_mut(ctx);
        if scope.value_names.contains_key(name) {
            return Err(Diagnostic::error(
                Category::Redeclaration,
                format!("value `{name}` is already defined in this scope"),
            )
            .into());
        }
        scope.value_names.insert(name.to_string(), id);
        scope.entities.insert(id, node);
        Ok(())
    }

    // -- enter --------------------------------------------------------------

    /// Enter the child context for a scope node, creating it on first call.
    ///
    /// Re-entering returns the same context (identity). Parameter-binding
    /// scopes increment the depth and pre-populate their parameters as
    /// entities; hole scopes inherit the depth.
    pub fn enter(&mut self, ast: &Ast, ctx: CtxId, node: NodeId) -> Result<CtxId, DiagnosticError> {
        if let Some(&child) = self.scope(ctx).children.get(&node) {
            return Ok(child);
        }
        let owner = ast.node(node);
        if !owner.is_scope() {
            return Err(Diagnostic::error(
                Category::InvariantViolated,
                "enter called on a node that opens no scope",
            )
            .into());
        }
        let depth = self.scope(ctx).depth + u32::from(owner.binds_params());
        let child = CtxId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(ctx),
            owner: Some(node),
            depth,
            ..Scope::default()
        });
        self.scope_mut(ctx).children.insert(node, child);
        self.by_node.insert(node, child);

        let params: Vec<NodeId> = match owner {
            Node::Trait(def) => def.params.iter().chain(def.assoc.iter()).copied().collect(),
            other => other.scope_params().to_vec(),
        };
        for param in params {
            self.define(ast, child, param)?;
        }
        if let Node::Partial(_) = ast.node(node) {
            self.define(ast, child, node)?;
        }
        Ok(child)
    }

    // -- resolution ---------------------------------------------------------

    /// Walk the parent chain for an entity id.
    pub fn resolve_id(&self, ctx: CtxId, id: EntityId) -> Option<(CtxId, NodeId)> {
        let mut cursor = Some(ctx);
        while let Some(current) = cursor {
            if let Some(&node) = self.scope(current).entities.get(&id) {
                return Some((current, node));
            }
            cursor = self.scope(current).parent;
        }
        None
    }

    /// Walk the parent chain for a value-namespace name.
    pub fn resolve_value_name(&self, ctx: CtxId, name: &str) -> Option<(CtxId, EntityId)> {
        let mut cursor = Some(ctx);
        while let Some(current) = cursor {
            if let Some(&id) = self.scope(current).value_names.get(name) {
                return Some((current, id));
            }
            cursor = self.scope(current).parent;
        }
        None
    }

    /// Walk the parent chain for a type-namespace name. Names never cross
    /// into the value namespace.
    pub fn resolve_type_name(&self, ctx: CtxId, name: &str) -> Option<(CtxId, EntityId)> {
        let mut cursor = Some(ctx);
        while let Some(current) = cursor {
            if let Some(&id) = self.scope(current).type_names.get(name) {
                return Some((current, id));
            }
            cursor = self.scope(current).parent;
        }
        None
    }

    /// Cache-assisted resolution of a textual type occurrence to its
    /// defining entity. The cache is write-once per occurrence node.
    pub fn resolve_var(
        &mut self,
        ast: &Ast,
        ctx: CtxId,
        var: NodeId,
    ) -> Result<EntityId, DiagnosticError> {
        if let Some(&id) = self.scope(ctx).var_cache.get(&var) {
            return Ok(id);
        }
        let Node::Name(name) = ast.node(var) else {
            return Err(Diagnostic::error(
                Category::InvariantViolated,
                "resolve_var called on a non-name node",
            )
            .into());
        };
        let Some((_, id)) = self.resolve_type_name(ctx, &name.text) else {
            return Err(Diagnostic::error(
                Category::NotFound,
                format!("type `{}` is not defined", name.text),
            )
            .into());
        };
        self.scope_mut(ctx).var_cache.insert(var, id);
        Ok(id)
    }

    /// The context of the smallest enclosing scope node that has been
    /// entered; the root context when there is none.
    pub fn find_context(&self, ast: &Ast, node: NodeId) -> CtxId {
        for ancestor in ast.ancestors(node) {
            if let Some(&ctx) = self.by_node.get(&ancestor) {
                return ctx;
            }
        }
        Self::ROOT
    }

    /// Entity lookup that also yields the depth of the defining scope,
    /// which anchors the De Bruijn computation.
    pub fn defining_depth(&self, ctx: CtxId, id: EntityId) -> Option<u32> {
        self.resolve_id(ctx, id).map(|(c, _)| self.depth(c))
    }

    // -- normalize ----------------------------------------------------------

    /// Canonical code of a type node, memoized per node in the context the
    /// node lives in.
    pub fn normalize(&mut self, ast: &Ast, node: NodeId) -> Result<TypeCode, DiagnosticError> {
        let ctx = self.find_context(ast, node);
        if let Some(code) = self.scope(ctx).normalize_memo.get(&node) {
            return Ok(code.clone());
        }
        let code = compile::compile(ast, self, ctx, node)?;
        self.scope_mut(ctx)
            .normalize_memo
            .insert(node, code.clone());
        Ok(code)
    }

    // -- check --------------------------------------------------------------

    /// Top-level gate: resolve names, enter sub-scopes, and kind-check the
    /// construct. The first error aborts the walk.
    pub fn check(&mut self, ast: &Ast, ctx: CtxId, node: NodeId) -> Result<(), DiagnosticError> {
        match ast.node(node) {
            Node::Alias(def) => {
                let body = def.body;
                let params = def.params.clone();
                let body_ctx = self.enter_if_scope(ast, ctx, node)?;
                for param in params {
                    self.check_param(ast, body_ctx, param)?;
                }
                self.check_type(ast, body_ctx, body)?;
                self.normalize(ast, body)?;
                Ok(())
            }
            Node::Data(def) => {
                let params = def.params.clone();
                let fields: Vec<NodeId> = def
                    .ctors
                    .iter()
                    .flat_map(|c| c.fields.iter().copied())
                    .collect();
                let body_ctx = self.enter_if_scope(ast, ctx, node)?;
                for param in params {
                    self.check_param(ast, body_ctx, param)?;
                }
                for field in fields {
                    let field_kind = self.check_type(ast, body_ctx, field)?;
                    if field_kind.is_arrow() {
                        return Err(Diagnostic::error(
                            Category::KindMismatch,
                            "constructor fields must have kind `*`",
                        )
                        .into());
                    }
                    self.normalize(ast, field)?;
                }
                Ok(())
            }
            Node::Trait(def) => {
                let id = def.id;
                let name = def.name.clone();
                let supertraits = def.supertraits.clone();
                let params = def.params.clone();
                let assoc = def.assoc.clone();
                let methods: Vec<NodeId> = def.methods.iter().map(|m| m.signature).collect();

                let mut seen = std::collections::BTreeSet::new();
                for super_id in supertraits {
                    if super_id == id {
                        return Err(Diagnostic::error(
                            Category::InvariantViolated,
                            format!("trait `{name}` cannot inherit from itself"),
                        )
                        .into());
                    }
                    if !seen.insert(super_id) {
                        return Err(Diagnostic::error(
                            Category::Redeclaration,
                            format!("duplicate supertrait in trait `{name}`"),
                        )
                        .into());
                    }
                    match self.resolve_id(ctx, super_id) {
                        Some((_, def_node)) if matches!(ast.node(def_node), Node::Trait(_)) => {}
                        _ => {
                            return Err(Diagnostic::error(
                                Category::NotFound,
                                format!("unknown supertrait in trait `{name}`"),
                            )
                            .into());
                        }
                    }
                }

                let body_ctx = self.enter(ast, ctx, node)?;
                for param in params.into_iter().chain(assoc) {
                    self.check_param(ast, body_ctx, param)?;
                }
                for signature in methods {
                    self.check_type(ast, body_ctx, signature)?;
                    self.normalize(ast, signature)?;
                }
                Ok(())
            }
            Node::Param(_) => self.check_param(ast, ctx, node),
            Node::Forall(_)
            | Node::Apply(_)
            | Node::Tuple(_)
            | Node::Fun(_)
            | Node::Partial(_)
            | Node::Hole(_)
            | Node::Name(_) => {
                self.check_type(ast, ctx, node)?;
                Ok(())
            }
        }
    }

    fn enter_if_scope(
        &mut self,
        ast: &Ast,
        ctx: CtxId,
        node: NodeId,
    ) -> Result<CtxId, DiagnosticError> {
        if ast.node(node).is_scope() {
            self.enter(ast, ctx, node)
        } else {
            Ok(ctx)
        }
    }

    /// Validate a parameter definition: every constraint must point at a
    /// defined trait, with matching argument arity.
    fn check_param(&mut self, ast: &Ast, ctx: CtxId, node: NodeId) -> Result<(), DiagnosticError> {
        let Node::Param(def) = ast.node(node) else {
            return Err(Diagnostic::error(
                Category::InvariantViolated,
                "check_param called on a non-parameter node",
            )
            .into());
        };
        let name = def.name.clone();
        let constraints = def.constraints.clone();
        for constraint in constraints {
            let trait_node = match self.resolve_id(ctx, constraint.trait_id) {
                Some((_, n)) if matches!(ast.node(n), Node::Trait(_)) => n,
                _ => {
                    return Err(Diagnostic::error(
                        Category::NotFound,
                        format!("constraint on `{name}` references an undefined trait"),
                    )
                    .into());
                }
            };
            let Node::Trait(trait_def) = ast.node(trait_node) else {
                unreachable!("resolved constraint target is a trait");
            };
            // The constrained parameter itself occupies the trait's first slot.
            let expected = trait_def.params.len();
            let actual = constraint.args.len() + 1;
            if expected != actual {
                return Err(Diagnostic::error(
                    Category::ArityMismatch,
                    format!(
                        "constraint `{}` on `{name}` takes {expected} parameter(s), found {actual}",
                        trait_def.name
                    ),
                )
                .into());
            }
            for arg in &constraint.args {
                self.check_type(ast, ctx, *arg)?;
            }
        }
        Ok(())
    }

    /// Resolve and kind-check one type expression, entering any scopes it
    /// opens on the way down.
    fn check_type(&mut self, ast: &Ast, ctx: CtxId, node: NodeId) -> Result<serin_types::Kind, DiagnosticError> {
        self.enter_type_scopes(ast, ctx, node)?;
        kind::check(ast, self, ctx, node)
    }

    fn enter_type_scopes(
        &mut self,
        ast: &Ast,
        ctx: CtxId,
        node: NodeId,
    ) -> Result<(), DiagnosticError> {
        match ast.node(node) {
            Node::Forall(def) => {
                let params = def.params.clone();
                let body = def.body;
                let inner = self.enter(ast, ctx, node)?;
                for param in params {
                    self.check_param(ast, inner, param)?;
                }
                self.enter_type_scopes(ast, inner, body)
            }
            Node::Fun(def) => {
                let tparams = def.tparams.clone();
                let params = def.params.clone();
                let ret = def.ret;
                let inner = if tparams.is_empty() {
                    ctx
                } else {
                    let inner = self.enter(ast, ctx, node)?;
                    for tparam in tparams {
                        self.check_param(ast, inner, tparam)?;
                    }
                    inner
                };
                for param in params {
                    self.enter_type_scopes(ast, inner, param)?;
                }
                self.enter_type_scopes(ast, inner, ret)
            }
            Node::Partial(def) => {
                let inner_node = def.inner;
                let inner = self.enter(ast, ctx, node)?;
                self.enter_type_scopes(ast, inner, inner_node)
            }
            Node::Apply(def) => {
                let head = def.head;
                let args = def.args.clone();
                self.enter_type_scopes(ast, ctx, head)?;
                for arg in args {
                    self.enter_type_scopes(ast, ctx, arg)?;
                }
                Ok(())
            }
            Node::Tuple(def) => {
                for elem in def.elems.clone() {
                    self.enter_type_scopes(ast, ctx, elem)?;
                }
                Ok(())
            }
            Node::Name(_) | Node::Hole(_) => Ok(()),
            Node::Alias(_) | Node::Data(_) | Node::Trait(_) | Node::Param(_) => {
                Err(Diagnostic::error(
                    Category::InvariantViolated,
                    "definition node found in type position",
                )
                .into())
            }
        }
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}
