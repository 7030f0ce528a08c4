//! Kind computation and kind checking.
//!
//! Every well-formed type has a kind in the algebra `* | k -> k'`.
//! [`kind_of`] is total on well-formed types and `None` on malformed ones;
//! [`check`] is the validating variant that explains what went wrong. Both
//! resolve parameters through a [`ParamEnv`] built during descent, falling
//! back to the scope chain for top-level references.
//!
//! The arrow law for applications compares the head's parameter kind against
//! the argument's kind by canonical kind code.

use serin_ast::{Ast, EntityId, KindAnn, Node, NodeId, ParamDef};
use serin_diag::{Category, Diagnostic, DiagnosticError};
use serin_types::Kind;

use crate::context::{CtxId, ScopeTree};

/// Lower a syntactic kind annotation to its semantic kind.
pub fn from_ann(ann: &KindAnn) -> Kind {
    match ann {
        KindAnn::Star => Kind::Star,
        KindAnn::Arrow(from, to) => Kind::arrow(from_ann(from), from_ann(to)),
    }
}

/// The declared kind of a parameter. Constrained and plain parameters are
/// concrete; only an explicit arrow annotation makes a parameter
/// higher-kinded.
pub fn param_kind(def: &ParamDef) -> Kind {
    def.kind.as_ref().map(from_ann).unwrap_or(Kind::Star)
}

// ---------------------------------------------------------------------------
// Parameter environment
// ---------------------------------------------------------------------------

/// One parameter visible to kind computation.
#[derive(Debug, Clone)]
pub struct ParamEntry {
    pub entity: EntityId,
    pub name: String,
    pub kind: Kind,
}

impl ParamEntry {
    pub fn from_node(ast: &Ast, node: NodeId) -> Option<Self> {
        let Node::Param(def) = ast.node(node) else {
            return None;
        };
        Some(Self {
            entity: def.id,
            name: def.name.clone(),
            kind: param_kind(def),
        })
    }
}

/// Ordered parameter environment, outermost first. Lookup is by name or
/// entity, innermost-first, so shadowing behaves lexically.
#[derive(Debug, Clone, Default)]
pub struct ParamEnv {
    entries: Vec<ParamEntry>,
}

impl ParamEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an environment from every parameter bound on the scope chain of
    /// `ctx`, outermost scope first.
    pub fn from_scope_chain(ast: &Ast, scopes: &ScopeTree, ctx: CtxId) -> Self {
        let mut chain = Vec::new();
        let mut cursor = Some(ctx);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = scopes.parent(current);
        }
        let mut env = Self::new();
        for current in chain.into_iter().rev() {
            let Some(owner) = scopes.owner(current) else {
                continue;
            };
            let owner = ast.node(owner);
            let params: Vec<NodeId> = match owner {
                Node::Trait(def) => def.params.iter().chain(def.assoc.iter()).copied().collect(),
                other => other.scope_params().to_vec(),
            };
            for param in params {
                if let Some(entry) = ParamEntry::from_node(ast, param) {
                    env.push(entry);
                }
            }
        }
        env
    }

    pub fn push(&mut self, entry: ParamEntry) {
        self.entries.push(entry);
    }

    pub fn push_node(&mut self, ast: &Ast, node: NodeId) {
        if let Some(entry) = ParamEntry::from_node(ast, node) {
            self.push(entry);
        }
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup_name(&self, name: &str) -> Option<&ParamEntry> {
        self.entries.iter().rev().find(|e| e.name == name)
    }

    pub fn lookup_entity(&self, entity: EntityId) -> Option<&ParamEntry> {
        self.entries.iter().rev().find(|e| e.entity == entity)
    }
}

// ---------------------------------------------------------------------------
// kind_of: total, None on malformed input
// ---------------------------------------------------------------------------

/// Kind of a type expression, `None` when the expression is malformed or
/// mentions an unfilled hole.
pub fn kind_of(
    ast: &Ast,
    scopes: &ScopeTree,
    ctx: CtxId,
    node: NodeId,
    env: &ParamEnv,
) -> Option<Kind> {
    match ast.node(node) {
        Node::Forall(_) | Node::Fun(_) | Node::Tuple(_) => Some(Kind::Star),
        Node::Hole(_) => None,
        Node::Partial(def) => kind_of(ast, scopes, ctx, def.inner, env),
        Node::Name(name) => {
            if let Some(entry) = env.lookup_name(&name.text) {
                return Some(entry.kind.clone());
            }
            let (_, id) = scopes.resolve_type_name(ctx, &name.text)?;
            let (_, def_node) = scopes.resolve_id(ctx, id)?;
            referent_kind(ast, def_node, id)
        }
        Node::Apply(def) => {
            let mut head_kind = kind_of(ast, scopes, ctx, def.head, env)?;
            for arg in &def.args {
                let Kind::Arrow(expected, rest) = head_kind else {
                    return None;
                };
                let arg_kind = kind_of(ast, scopes, ctx, *arg, env)?;
                if expected.code() != arg_kind.code() {
                    return None;
                }
                head_kind = *rest;
            }
            Some(head_kind)
        }
        Node::Alias(_) | Node::Data(_) | Node::Trait(_) | Node::Param(_) => None,
    }
}

/// Kind of a resolved top-level referent: the curried constructor kind for
/// aliases and datatypes, the declared kind for parameters.
fn referent_kind(ast: &Ast, def_node: NodeId, id: EntityId) -> Option<Kind> {
    match ast.node(def_node) {
        Node::Alias(def) if def.id == id => Some(constructor_kind(ast, &def.params)),
        Node::Data(def) if def.id == id => Some(constructor_kind(ast, &def.params)),
        Node::Param(def) if def.id == id => Some(param_kind(def)),
        // Constructors and methods share their definition node; a type-level
        // reference to one of those ids, or to a trait, has no kind.
        _ => None,
    }
}

fn constructor_kind(ast: &Ast, params: &[NodeId]) -> Kind {
    Kind::curried(params.iter().map(|&p| match ast.node(p) {
        Node::Param(def) => param_kind(def),
        _ => Kind::Star,
    }))
}

// ---------------------------------------------------------------------------
// check: validating kind computation
// ---------------------------------------------------------------------------

/// Validate a type expression: all names resolve, every application
/// satisfies the arrow law, holes appear only inside partials. Returns the
/// expression's kind.
pub fn check(
    ast: &Ast,
    scopes: &mut ScopeTree,
    ctx: CtxId,
    node: NodeId,
) -> Result<Kind, DiagnosticError> {
    let mut env = ParamEnv::from_scope_chain(ast, scopes, ctx);
    check_in_env(ast, scopes, ctx, node, &mut env)
}

fn check_in_env(
    ast: &Ast,
    scopes: &mut ScopeTree,
    ctx: CtxId,
    node: NodeId,
    env: &mut ParamEnv,
) -> Result<Kind, DiagnosticError> {
    match ast.node(node) {
        Node::Forall(def) => {
            let mark = env.len();
            for &param in &def.params {
                env.push_node(ast, param);
            }
            check_in_env(ast, scopes, ctx, def.body, env)?;
            env.truncate(mark);
            Ok(Kind::Star)
        }
        Node::Fun(def) => {
            let mark = env.len();
            for &tparam in &def.tparams {
                env.push_node(ast, tparam);
            }
            for &param in &def.params {
                let kind = check_in_env(ast, scopes, ctx, param, env)?;
                require_concrete(&kind, "function parameter")?;
            }
            let ret = check_in_env(ast, scopes, ctx, def.ret, env)?;
            require_concrete(&ret, "function return")?;
            env.truncate(mark);
            Ok(Kind::Star)
        }
        Node::Tuple(def) => {
            for &elem in &def.elems {
                let kind = check_in_env(ast, scopes, ctx, elem, env)?;
                require_concrete(&kind, "tuple element")?;
            }
            Ok(Kind::Star)
        }
        Node::Hole(_) => {
            if ast.enclosing_partial(node).is_none() {
                return Err(Diagnostic::error(
                    Category::InvariantViolated,
                    "hole outside of a partial scope",
                )
                .into());
            }
            // Consistency mode: an unfilled hole checks as concrete.
            Ok(Kind::Star)
        }
        Node::Partial(def) => check_in_env(ast, scopes, ctx, def.inner, env),
        Node::Name(name) => {
            if let Some(entry) = env.lookup_name(&name.text) {
                return Ok(entry.kind.clone());
            }
            let id = scopes.resolve_var(ast, ctx, node)?;
            let Some((_, def_node)) = scopes.resolve_id(ctx, id) else {
                return Err(Diagnostic::error(
                    Category::NotFound,
                    format!("type `{}` is not defined", name.text),
                )
                .into());
            };
            referent_kind(ast, def_node, id).ok_or_else(|| {
                Diagnostic::error(
                    Category::NotFound,
                    format!("`{}` does not name a type", name.text),
                )
                .into()
            })
        }
        Node::Apply(def) => {
            let mut head_kind = check_in_env(ast, scopes, ctx, def.head, env)?;
            for &arg in &def.args {
                let Kind::Arrow(expected, rest) = head_kind else {
                    return Err(Diagnostic::error(
                        Category::KindMismatch,
                        "cannot apply a type of kind `*` to an argument",
                    )
                    .into());
                };
                let arg_kind = check_in_env(ast, scopes, ctx, arg, env)?;
                if expected.code() != arg_kind.code() {
                    return Err(Diagnostic::error(
                        Category::KindMismatch,
                        format!(
                            "type application expects an argument of kind `{expected}`, \
                             found `{arg_kind}`"
                        ),
                    )
                    .into());
                }
                head_kind = *rest;
            }
            Ok(head_kind)
        }
        Node::Alias(_) | Node::Data(_) | Node::Trait(_) | Node::Param(_) => Err(Diagnostic::error(
            Category::InvariantViolated,
            "definition node found in type position",
        )
        .into()),
    }
}

fn require_concrete(kind: &Kind, what: &str) -> Result<(), DiagnosticError> {
    if kind.is_arrow() {
        return Err(Diagnostic::error(
            Category::KindMismatch,
            format!("{what} must have kind `*`, found `{kind}`"),
        )
        .into());
    }
    Ok(())
}
