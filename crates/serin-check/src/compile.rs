//! Canonical instruction emission: AST types down to [`TypeCode`]s.
//!
//! The compiler walks a type expression with an explicit binder stack.
//! Binders are seeded from the scope chain of the node's context and grow as
//! quantifiers are entered; a bound occurrence emits `Var` with the number
//! of binders between use and binding (innermost binder is delta 0). Each
//! quantified parameter gets its own `Forall` instruction and its own binder
//! level, so α-equivalent types produce identical codes.
//!
//! Tuples leave the surface algebra here: a tuple of arity n becomes an
//! application of the reserved constructor id `0xFF00 + n`.

use serin_ast::{Ast, ConstraintRef, EntityId, KindAnn, Node, NodeId};
use serin_diag::{Category, Diagnostic, DiagnosticError};
use serin_types::{Instr, TypeCode};

use crate::context::{CtxId, ScopeTree};
use crate::kind;

/// Compile a type expression in its context to a canonical code.
pub fn compile(
    ast: &Ast,
    scopes: &mut ScopeTree,
    ctx: CtxId,
    node: NodeId,
) -> Result<TypeCode, DiagnosticError> {
    let mut compiler = Compiler {
        ast,
        scopes,
        ctx,
        binders: Vec::new(),
    };
    compiler.seed_binders();
    let mut out = Vec::new();
    compiler.emit(node, &mut out)?;
    TypeCode::encode(out)
}

#[derive(Debug, Clone)]
struct Binder {
    entity: EntityId,
    name: String,
}

struct Compiler<'a> {
    ast: &'a Ast,
    scopes: &'a mut ScopeTree,
    ctx: CtxId,
    /// Outermost binder first; delta = distance from the top of the stack.
    binders: Vec<Binder>,
}

impl Compiler<'_> {
    /// Pre-populate the binder stack with every parameter bound on the
    /// context's scope chain, outermost scope first.
    fn seed_binders(&mut self) {
        let mut chain = Vec::new();
        let mut cursor = Some(self.ctx);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.scopes.parent(current);
        }
        for current in chain.into_iter().rev() {
            let Some(owner) = self.scopes.owner(current) else {
                continue;
            };
            let owner = self.ast.node(owner);
            let params: Vec<NodeId> = match owner {
                Node::Trait(def) => def.params.iter().chain(def.assoc.iter()).copied().collect(),
                other => other.scope_params().to_vec(),
            };
            for param in params {
                self.push_binder(param);
            }
        }
    }

    fn push_binder(&mut self, param: NodeId) {
        if let Node::Param(def) = self.ast.node(param) {
            self.binders.push(Binder {
                entity: def.id,
                name: def.name.clone(),
            });
        }
    }

    fn delta_by_name(&self, name: &str) -> Option<u32> {
        self.binders
            .iter()
            .rev()
            .position(|b| b.name == name)
            .map(|delta| delta as u32)
    }

    fn delta_by_entity(&self, entity: EntityId) -> Option<u32> {
        self.binders
            .iter()
            .rev()
            .position(|b| b.entity == entity)
            .map(|delta| delta as u32)
    }

    fn emit(&mut self, node: NodeId, out: &mut Vec<Instr>) -> Result<(), DiagnosticError> {
        match self.ast.node(node) {
            Node::Forall(def) => {
                let params = def.params.clone();
                let body = def.body;
                let mark = self.binders.len();
                self.emit_quantifier(&params, out)?;
                self.emit(body, out)?;
                self.binders.truncate(mark);
                Ok(())
            }
            Node::Fun(def) => {
                let tparams = def.tparams.clone();
                let params = def.params.clone();
                let ret = def.ret;
                let mark = self.binders.len();
                self.emit_quantifier(&tparams, out)?;
                if params.is_empty() {
                    // A nullary function takes the empty tuple.
                    out.push(Instr::Fun);
                    out.push(Instr::Ref(EntityId::tuple_ctor(0).0));
                } else {
                    for _ in 0..params.len() {
                        out.push(Instr::Fun);
                    }
                    for param in &params {
                        self.emit(*param, out)?;
                    }
                }
                self.emit(ret, out)?;
                self.binders.truncate(mark);
                Ok(())
            }
            Node::Apply(def) => {
                let head = def.head;
                let args = def.args.clone();
                for _ in 0..args.len() {
                    out.push(Instr::Apply);
                }
                self.emit(head, out)?;
                for arg in args {
                    self.emit(arg, out)?;
                }
                Ok(())
            }
            Node::Tuple(def) => {
                let elems = def.elems.clone();
                for _ in 0..elems.len() {
                    out.push(Instr::Apply);
                }
                out.push(Instr::Ref(EntityId::tuple_ctor(elems.len()).0));
                for elem in elems {
                    self.emit(elem, out)?;
                }
                Ok(())
            }
            Node::Hole(hole) => {
                out.push(Instr::Hole(hole.id.0 as u32));
                Ok(())
            }
            Node::Partial(def) => self.emit(def.inner, out),
            Node::Name(name) => {
                let text = name.text.clone();
                if let Some(delta) = self.delta_by_name(&text) {
                    out.push(Instr::Var(delta));
                    return Ok(());
                }
                let id = self.scopes.resolve_var(self.ast, self.ctx, node)?;
                self.emit_entity_ref(id, &text, out)
            }
            Node::Alias(_) | Node::Data(_) | Node::Trait(_) | Node::Param(_) => {
                Err(Diagnostic::error(
                    Category::InvariantViolated,
                    "definition node found in type position",
                )
                .into())
            }
        }
    }

    fn emit_entity_ref(
        &mut self,
        id: EntityId,
        text: &str,
        out: &mut Vec<Instr>,
    ) -> Result<(), DiagnosticError> {
        match self.scopes.resolve_id(self.ctx, id) {
            Some((_, def_node)) if matches!(self.ast.node(def_node), Node::Param(_)) => {
                // A parameter resolved through the context chain must sit on
                // the binder stack; a miss means the scope tree and the AST
                // disagree.
                let Some(delta) = self.delta_by_entity(id) else {
                    return Err(Diagnostic::error(
                        Category::InvariantViolated,
                        format!("parameter `{text}` is not on the binder stack"),
                    )
                    .into());
                };
                out.push(Instr::Var(delta));
                Ok(())
            }
            Some(_) => {
                out.push(Instr::Ref(id.0));
                Ok(())
            }
            None => Err(Diagnostic::error(
                Category::NotFound,
                format!("type `{text}` is not defined"),
            )
            .into()),
        }
    }

    /// Emit one `Forall` per parameter: its descriptor (a kind for HKT
    /// parameters, a sorted run of `Impl` terms for constrained ones,
    /// nothing for plain concrete parameters), pushing each binder as it is
    /// introduced so constraints may mention the parameter itself.
    fn emit_quantifier(
        &mut self,
        params: &[NodeId],
        out: &mut Vec<Instr>,
    ) -> Result<(), DiagnosticError> {
        for &param in params {
            let Node::Param(def) = self.ast.node(param) else {
                return Err(Diagnostic::error(
                    Category::InvariantViolated,
                    "quantifier parameter is not a parameter node",
                )
                .into());
            };
            let constraints = def.constraints.clone();
            let declared = def.kind.clone();
            out.push(Instr::Forall);
            self.push_binder(param);
            match declared {
                Some(ann @ KindAnn::Arrow(_, _)) => {
                    if !constraints.is_empty() {
                        return Err(Diagnostic::error(
                            Category::InvariantViolated,
                            "constraints on a higher-kinded parameter",
                        )
                        .into());
                    }
                    out.extend(kind::from_ann(&ann).instrs());
                }
                // A declared `*` canonicalizes the same as no annotation.
                Some(KindAnn::Star) | None => {
                    if !constraints.is_empty() {
                        self.emit_constraints(&constraints, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Emit `Impl` terms in ascending order of their fully-encoded
    /// sub-codes, so constraint sets canonicalize independently of their
    /// source order.
    fn emit_constraints(
        &mut self,
        constraints: &[ConstraintRef],
        out: &mut Vec<Instr>,
    ) -> Result<(), DiagnosticError> {
        let mut terms = Vec::with_capacity(constraints.len());
        for constraint in constraints {
            let instrs = self.constraint_term(constraint)?;
            let code = TypeCode::encode(instrs.iter().copied())?;
            terms.push((code, instrs));
        }
        terms.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (_, instrs) in terms {
            out.push(Instr::Impl);
            out.extend(instrs);
        }
        Ok(())
    }

    /// One constraint term: the trait reference, applied to any extra
    /// arguments with the usual curried prefixes.
    fn constraint_term(&mut self, constraint: &ConstraintRef) -> Result<Vec<Instr>, DiagnosticError> {
        let mut instrs = Vec::new();
        for _ in 0..constraint.args.len() {
            instrs.push(Instr::Apply);
        }
        instrs.push(Instr::Ref(constraint.trait_id.0));
        for &arg in &constraint.args {
            self.emit(arg, &mut instrs)?;
        }
        Ok(instrs)
    }
}
