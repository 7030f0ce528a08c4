//! Unification of type expressions.
//!
//! The unifier carries an explicit [`UnifyState`] through recursion: two
//! parameter stacks (one per side, filled by unwrapping quantifiers), the
//! instances captured for each parameter slot, and the hole assignment map.
//! [`UnifyState::swap`] exchanges the sides and is an involution; recursion
//! into function parameters swaps, recursion into returns does not.
//!
//! Failure is not transactional: a failed call leaves the state wherever it
//! got to. Callers that need speculative unification clone the state first
//! and restore the snapshot on failure.

use std::collections::BTreeMap;

use serin_ast::{Ast, EntityId, HoleId, KindAnn, Node, NodeId};
use serin_diag::{Category, Diagnostic};
use serin_types::Kind;

use crate::context::ScopeTree;
use crate::impls::ImplIndex;
use crate::kind::{self, ParamEnv};
use crate::trace::{UnifyAction, UnifyStep};

/// Hole identity: the enclosing partial plus the hole id within it.
pub type HoleKey = (NodeId, HoleId);

/// One quantified parameter available to unification.
#[derive(Debug, Clone)]
pub struct ParamSlot {
    /// The parameter node (always a `Node::Param`).
    pub param: NodeId,
    pub entity: EntityId,
    /// Instances this parameter has been instantiated with so far.
    pub captures: Vec<NodeId>,
}

/// One side's stack of unwrapped quantifier parameters, innermost last.
#[derive(Debug, Clone, Default)]
pub struct ParamStack {
    slots: Vec<ParamSlot>,
}

impl ParamStack {
    pub fn push(&mut self, param: NodeId, entity: EntityId) {
        self.slots.push(ParamSlot {
            param,
            entity,
            captures: Vec::new(),
        });
    }

    pub fn slot_by_entity(&self, entity: EntityId) -> Option<usize> {
        self.slots.iter().rposition(|s| s.entity == entity)
    }

    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    fn param_env(&self, ast: &Ast) -> ParamEnv {
        let mut env = ParamEnv::new();
        for slot in &self.slots {
            env.push_node(ast, slot.param);
        }
        env
    }
}

/// Unification state, explicit so callers can snapshot it.
#[derive(Debug, Clone, Default)]
pub struct UnifyState {
    lhs: ParamStack,
    rhs: ParamStack,
    holes: BTreeMap<HoleKey, NodeId>,
}

impl UnifyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exchange the two sides. Involution: used around contravariant
    /// recursion into function parameters.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.lhs, &mut self.rhs);
    }

    pub fn lhs(&self) -> &ParamStack {
        &self.lhs
    }

    pub fn rhs(&self) -> &ParamStack {
        &self.rhs
    }

    /// The type assigned to a hole, if any.
    pub fn hole_assignment(&self, key: HoleKey) -> Option<NodeId> {
        self.holes.get(&key).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lhs,
    Rhs,
}

/// Find the slot for a parameter entity, preferring `preferred`'s stack.
///
/// Capture replay re-enters unification with expressions whose parameters
/// belong to either side, so a miss on the preferred stack falls back to
/// the other one.
fn slot_for(st: &UnifyState, preferred: Side, entity: EntityId) -> Option<(Side, usize)> {
    let (first, second) = match preferred {
        Side::Lhs => ((&st.lhs, Side::Lhs), (&st.rhs, Side::Rhs)),
        Side::Rhs => ((&st.rhs, Side::Rhs), (&st.lhs, Side::Lhs)),
    };
    if let Some(idx) = first.0.slot_by_entity(entity) {
        return Some((first.1, idx));
    }
    second.0.slot_by_entity(entity).map(|idx| (second.1, idx))
}

const MAX_DEPTH: usize = 4096;

/// The unification engine.
///
/// Owns no state between calls beyond tracing and the first failure
/// diagnostic; the unification environment itself lives in [`UnifyState`].
pub struct Unifier<'a> {
    ast: &'a Ast,
    scopes: &'a mut ScopeTree,
    impls: &'a ImplIndex,
    depth: usize,
    tracing: bool,
    steps: Vec<UnifyStep>,
    failure: Option<Diagnostic>,
}

impl<'a> Unifier<'a> {
    pub fn new(ast: &'a Ast, scopes: &'a mut ScopeTree, impls: &'a ImplIndex) -> Self {
        Self {
            ast,
            scopes,
            impls,
            depth: 0,
            tracing: false,
            steps: Vec::new(),
            failure: None,
        }
    }

    /// Record one trace step per rule firing. Zero overhead when disabled.
    pub fn enable_tracing(&mut self) {
        self.tracing = true;
    }

    pub fn take_trace(&mut self) -> Vec<UnifyStep> {
        std::mem::take(&mut self.steps)
    }

    /// The first failure diagnostic of the most recent run, if any.
    pub fn failure(&self) -> Option<&Diagnostic> {
        self.failure.as_ref()
    }

    /// Unify two type expressions under a fresh state.
    pub fn unify(&mut self, lhs: NodeId, rhs: NodeId) -> bool {
        let mut state = UnifyState::new();
        self.unify_in(&mut state, lhs, rhs)
    }

    /// Unify under a caller-provided state, which accumulates parameter
    /// stacks, captures, and hole assignments across calls.
    pub fn unify_in(&mut self, state: &mut UnifyState, lhs: NodeId, rhs: NodeId) -> bool {
        self.failure = None;
        self.unify_nodes(state, lhs, rhs)
    }

    // -- rule dispatch ------------------------------------------------------

    fn unify_nodes(&mut self, st: &mut UnifyState, a: NodeId, b: NodeId) -> bool {
        self.depth += 1;
        let result = self.unify_nodes_inner(st, a, b);
        self.depth -= 1;
        result
    }

    fn unify_nodes_inner(&mut self, st: &mut UnifyState, a: NodeId, b: NodeId) -> bool {
        if self.depth > MAX_DEPTH {
            return self.fail(
                a,
                b,
                Diagnostic::error(
                    Category::InvariantViolated,
                    "unification recursion limit exceeded",
                ),
            );
        }

        // Partials are scope wrappers; unification sees through them.
        if let Node::Partial(p) = self.ast.node(a) {
            return self.unify_nodes(st, p.inner, b);
        }
        if let Node::Partial(p) = self.ast.node(b) {
            return self.unify_nodes(st, a, p.inner);
        }

        // Bound variable on either side: instantiate its parameter slot.
        let ra = self.referent_of(a);
        let rb = self.referent_of(b);
        if let (Some(ea), Some(eb)) = (ra, rb) {
            // The same entity on both sides unifies without touching a slot.
            if ea == eb {
                return true;
            }
        }
        if let Some(entity) = ra {
            if let Some((side, idx)) = slot_for(st, Side::Lhs, entity) {
                return self.instantiate(st, side, idx, b);
            }
        }
        if let Some(entity) = rb {
            if let Some((side, idx)) = slot_for(st, Side::Rhs, entity) {
                return self.instantiate(st, side, idx, a);
            }
        }

        // Quantifier on either side: unwrap fully, then unify the bodies
        // under the extended environment. Non-function bodies are
        // existentials and unify only by node identity.
        if self.is_quantified(a) || self.is_quantified(b) {
            let Some(a_body) = self.unwrap_quantifiers(st, Side::Lhs, a) else {
                return false;
            };
            let Some(b_body) = self.unwrap_quantifiers(st, Side::Rhs, b) else {
                return false;
            };
            self.step(UnifyAction::Unwrap, a, b, "quantifiers unwrapped");
            let a_fun = matches!(self.ast.node(a_body), Node::Fun(_));
            let b_fun = matches!(self.ast.node(b_body), Node::Fun(_));
            if a_fun && b_fun {
                return self.unify_funs(st, a_body, b_body);
            }
            self.step(
                UnifyAction::ExistentialIdentity,
                a_body,
                b_body,
                "existential bodies compared by identity",
            );
            if a_body == b_body {
                return true;
            }
            return self.fail(
                a_body,
                b_body,
                Diagnostic::error(
                    Category::UnifyFail,
                    "existential types unify only with themselves",
                ),
            );
        }

        // Hole on either side.
        let a_hole = matches!(self.ast.node(a), Node::Hole(_));
        let b_hole = matches!(self.ast.node(b), Node::Hole(_));
        if a_hole || b_hole {
            return self.unify_holes(st, a, b, a_hole, b_hole);
        }

        self.unify_structural(st, a, b)
    }

    fn unify_structural(&mut self, st: &mut UnifyState, a: NodeId, b: NodeId) -> bool {
        match (self.ast.node(a), self.ast.node(b)) {
            (Node::Apply(fa), Node::Apply(fb)) => {
                let (ha, args_a) = (fa.head, fa.args.clone());
                let (hb, args_b) = (fb.head, fb.args.clone());
                if args_a.len() != args_b.len() {
                    return self.fail(
                        a,
                        b,
                        Diagnostic::error(
                            Category::ArityMismatch,
                            format!(
                                "type application arity mismatch: {} vs {}",
                                args_a.len(),
                                args_b.len()
                            ),
                        ),
                    );
                }
                self.step(UnifyAction::Decompose, a, b, "application heads and arguments");
                if !self.unify_nodes(st, ha, hb) {
                    return false;
                }
                args_a
                    .into_iter()
                    .zip(args_b)
                    .all(|(x, y)| self.unify_nodes(st, x, y))
            }
            (Node::Tuple(ta), Node::Tuple(tb)) => {
                let elems_a = ta.elems.clone();
                let elems_b = tb.elems.clone();
                if elems_a.len() != elems_b.len() {
                    return self.fail(
                        a,
                        b,
                        Diagnostic::error(
                            Category::ArityMismatch,
                            format!(
                                "tuple length mismatch: {} vs {}",
                                elems_a.len(),
                                elems_b.len()
                            ),
                        ),
                    );
                }
                self.step(UnifyAction::Decompose, a, b, "tuple elements");
                elems_a
                    .into_iter()
                    .zip(elems_b)
                    .all(|(x, y)| self.unify_nodes(st, x, y))
            }
            (Node::Fun(_), Node::Fun(_)) => self.unify_funs(st, a, b),
            (Node::Name(_), Node::Name(_)) => {
                // Both names resolved to rigid parameters or top-level
                // entities (slots were handled above): equal iff the ids are.
                match (self.referent_of(a), self.referent_of(b)) {
                    (Some(x), Some(y)) if x == y => true,
                    _ => self.fail(
                        a,
                        b,
                        Diagnostic::error(
                            Category::UnifyFail,
                            format!(
                                "cannot unify `{}` with `{}`",
                                self.describe(a),
                                self.describe(b)
                            ),
                        ),
                    ),
                }
            }
            _ => self.fail(
                a,
                b,
                Diagnostic::error(
                    Category::UnifyFail,
                    format!(
                        "cannot unify `{}` with `{}`",
                        self.describe(a),
                        self.describe(b)
                    ),
                ),
            ),
        }
    }

    /// Function rule: parameters pairwise under a swapped state
    /// (contravariance), returns under the original state.
    fn unify_funs(&mut self, st: &mut UnifyState, a: NodeId, b: NodeId) -> bool {
        let (Node::Fun(fa), Node::Fun(fb)) = (self.ast.node(a), self.ast.node(b)) else {
            return self.fail(
                a,
                b,
                Diagnostic::error(Category::InvariantViolated, "function rule on non-functions"),
            );
        };
        let (params_a, ret_a) = (fa.params.clone(), fa.ret);
        let (params_b, ret_b) = (fb.params.clone(), fb.ret);
        if params_a.len() != params_b.len() {
            return self.fail(
                a,
                b,
                Diagnostic::error(
                    Category::ArityMismatch,
                    format!(
                        "function parameter count mismatch: {} vs {}",
                        params_a.len(),
                        params_b.len()
                    ),
                ),
            );
        }
        self.step(UnifyAction::Decompose, a, b, "function parameters and return");
        st.swap();
        for (pa, pb) in params_a.iter().zip(&params_b) {
            if !self.unify_nodes(st, *pb, *pa) {
                st.swap();
                return false;
            }
        }
        st.swap();
        self.unify_nodes(st, ret_a, ret_b)
    }

    // -- holes --------------------------------------------------------------

    fn unify_holes(
        &mut self,
        st: &mut UnifyState,
        a: NodeId,
        b: NodeId,
        a_hole: bool,
        b_hole: bool,
    ) -> bool {
        match (a_hole, b_hole) {
            (true, true) => {
                let (Some(ka), Some(kb)) = (self.hole_key(a), self.hole_key(b)) else {
                    return self.hole_outside_partial(a, b);
                };
                if ka == kb {
                    return true;
                }
                match (st.holes.get(&ka).copied(), st.holes.get(&kb).copied()) {
                    (None, None) => self.fail(
                        a,
                        b,
                        Diagnostic::error(
                            Category::UnresolvedHole,
                            "two unassigned holes cannot be unified",
                        ),
                    ),
                    (Some(ta), None) => {
                        self.step(UnifyAction::FillHole, b, ta, "hole pointed at assignment");
                        st.holes.insert(kb, ta);
                        true
                    }
                    (None, Some(tb)) => {
                        self.step(UnifyAction::FillHole, a, tb, "hole pointed at assignment");
                        st.holes.insert(ka, tb);
                        true
                    }
                    (Some(ta), Some(tb)) => self.unify_nodes(st, ta, tb),
                }
            }
            (true, false) => {
                let Some(ka) = self.hole_key(a) else {
                    return self.hole_outside_partial(a, b);
                };
                match st.holes.get(&ka).copied() {
                    Some(ta) => self.unify_nodes(st, ta, b),
                    None => {
                        self.step(UnifyAction::FillHole, a, b, "hole assigned");
                        st.holes.insert(ka, b);
                        true
                    }
                }
            }
            (false, true) => {
                let Some(kb) = self.hole_key(b) else {
                    return self.hole_outside_partial(a, b);
                };
                match st.holes.get(&kb).copied() {
                    Some(tb) => self.unify_nodes(st, a, tb),
                    None => {
                        self.step(UnifyAction::FillHole, b, a, "hole assigned");
                        st.holes.insert(kb, a);
                        true
                    }
                }
            }
            (false, false) => unreachable!("hole rule entered without a hole"),
        }
    }

    fn hole_key(&self, node: NodeId) -> Option<HoleKey> {
        let Node::Hole(hole) = self.ast.node(node) else {
            return None;
        };
        let partial = self.ast.enclosing_partial(node)?;
        Some((partial, hole.id))
    }

    fn hole_outside_partial(&mut self, a: NodeId, b: NodeId) -> bool {
        self.fail(
            a,
            b,
            Diagnostic::error(
                Category::InvariantViolated,
                "hole outside of a partial scope",
            ),
        )
    }

    // -- quantifier unwrapping ----------------------------------------------

    fn is_quantified(&self, node: NodeId) -> bool {
        match self.ast.node(node) {
            Node::Forall(_) => true,
            Node::Fun(f) => !f.tparams.is_empty(),
            _ => false,
        }
    }

    /// Peel nested quantifiers, entering their scopes and pushing their
    /// parameters onto `side`'s stack. Returns the underlying body; a
    /// generic function contributes its tparams and stays as the body.
    fn unwrap_quantifiers(&mut self, st: &mut UnifyState, side: Side, node: NodeId) -> Option<NodeId> {
        let mut current = node;
        loop {
            match self.ast.node(current) {
                Node::Forall(def) => {
                    let params = def.params.clone();
                    let body = def.body;
                    if !self.open_scope(st, side, current, &params) {
                        return None;
                    }
                    current = body;
                }
                Node::Fun(def) if !def.tparams.is_empty() => {
                    let tparams = def.tparams.clone();
                    if !self.open_scope(st, side, current, &tparams) {
                        return None;
                    }
                    return Some(current);
                }
                Node::Partial(def) => {
                    current = def.inner;
                }
                _ => return Some(current),
            }
        }
    }

    fn open_scope(
        &mut self,
        st: &mut UnifyState,
        side: Side,
        scope_node: NodeId,
        params: &[NodeId],
    ) -> bool {
        let parent = self.scopes.find_context(self.ast, scope_node);
        if let Err(err) = self.scopes.enter(self.ast, parent, scope_node) {
            return self.fail(scope_node, scope_node, err.0);
        }
        let stack = match side {
            Side::Lhs => &mut st.lhs,
            Side::Rhs => &mut st.rhs,
        };
        for &param in params {
            if let Node::Param(def) = self.ast.node(param) {
                stack.push(param, def.id);
            }
        }
        true
    }

    // -- instantiation ------------------------------------------------------

    /// Instantiate the parameter in `slot` with `candidate`: discharge its
    /// constraints (or compare kinds for an HKT parameter), replay the
    /// candidate against every previous capture, then record the capture.
    fn instantiate(&mut self, st: &mut UnifyState, side: Side, slot: usize, candidate: NodeId) -> bool {
        let param_node = match side {
            Side::Lhs => st.lhs.slots[slot].param,
            Side::Rhs => st.rhs.slots[slot].param,
        };
        let Node::Param(def) = self.ast.node(param_node) else {
            return self.fail(
                param_node,
                candidate,
                Diagnostic::error(Category::InvariantViolated, "slot holds a non-parameter"),
            );
        };
        let param_name = def.name.clone();
        let declared = def.kind.clone();
        let constraints = def.constraints.clone();

        self.step(
            UnifyAction::Instantiate,
            param_node,
            candidate,
            format!("`{param_name}` instantiated"),
        );

        if let Some(ann @ KindAnn::Arrow(_, _)) = declared {
            if !self.discharge_kind(st, side, &param_name, &ann, candidate) {
                return false;
            }
        } else if !constraints.is_empty() {
            for constraint in &constraints {
                if !self.discharge_constraint(&param_name, constraint.trait_id, candidate) {
                    return false;
                }
            }
        }

        let previous = match side {
            Side::Lhs => st.lhs.slots[slot].captures.clone(),
            Side::Rhs => st.rhs.slots[slot].captures.clone(),
        };
        for prev in previous {
            self.step(
                UnifyAction::CaptureReplay,
                candidate,
                prev,
                format!("replay against earlier instance of `{param_name}`"),
            );
            if !self.unify_nodes(st, candidate, prev) {
                return false;
            }
        }
        let stack = match side {
            Side::Lhs => &mut st.lhs,
            Side::Rhs => &mut st.rhs,
        };
        stack.slots[slot].captures.push(candidate);
        true
    }

    /// HKT instantiation: the parameter's declared kind and the candidate's
    /// kind must have equal canonical codes. The candidate's kind is
    /// computed under the opposite side's parameters.
    fn discharge_kind(
        &mut self,
        st: &UnifyState,
        side: Side,
        param_name: &str,
        declared: &KindAnn,
        candidate: NodeId,
    ) -> bool {
        let declared_kind = kind::from_ann(declared);
        let other = match side {
            Side::Lhs => &st.rhs,
            Side::Rhs => &st.lhs,
        };
        let env = other.param_env(self.ast);
        // A filled hole has the kind of its filling.
        let mut target = candidate;
        if let Some(key) = self.hole_key(candidate) {
            if let Some(&fill) = st.holes.get(&key) {
                target = fill;
            }
        }
        let ctx = self.scopes.find_context(self.ast, target);
        let candidate_kind = kind::kind_of(self.ast, self.scopes, ctx, target, &env);
        self.step(
            UnifyAction::KindCheck,
            candidate,
            candidate,
            format!(
                "`{param_name}` expects kind `{declared_kind}`, candidate has `{}`",
                candidate_kind
                    .as_ref()
                    .map(Kind::to_string)
                    .unwrap_or_else(|| "?".into())
            ),
        );
        match candidate_kind {
            Some(k) if k.code() == declared_kind.code() => true,
            _ => {
                self.failure.get_or_insert_with(|| {
                    Diagnostic::error(
                        Category::UnifyFail,
                        format!(
                            "parameter `{param_name}` of kind `{declared_kind}` cannot be \
                             instantiated with a type of a different kind"
                        ),
                    )
                });
                false
            }
        }
    }

    /// Constraint discharge: the candidate's canonical code must be a key
    /// under the trait's code in the impl index.
    fn discharge_constraint(&mut self, param_name: &str, trait_id: EntityId, candidate: NodeId) -> bool {
        let trait_key = match ImplIndex::trait_code(trait_id) {
            Ok(code) => code,
            Err(err) => return self.record_failure(err.0),
        };
        let type_key = match self.scopes.normalize(self.ast, candidate) {
            Ok(code) => code,
            Err(err) => return self.record_failure(err.0),
        };
        let ok = self.impls.contains(&trait_key, &type_key);
        self.step(
            UnifyAction::Discharge,
            candidate,
            candidate,
            format!(
                "constraint on `{param_name}`: impl {}",
                if ok { "found" } else { "missing" }
            ),
        );
        if !ok {
            let trait_name = self
                .trait_name(trait_id)
                .unwrap_or_else(|| format!("{trait_id}"));
            return self.record_failure(Diagnostic::error(
                Category::UnifyFail,
                format!(
                    "constraint not discharged: no impl of `{trait_name}` for the candidate \
                     instantiating `{param_name}`"
                ),
            ));
        }
        true
    }

    fn trait_name(&self, trait_id: EntityId) -> Option<String> {
        let (_, node) = self.scopes.resolve_id(ScopeTree::ROOT, trait_id)?;
        match self.ast.node(node) {
            Node::Trait(def) => Some(def.name.clone()),
            _ => None,
        }
    }

    // -- name resolution ----------------------------------------------------

    /// The entity a name refers to, if the node is a name that resolves.
    fn referent_of(&mut self, node: NodeId) -> Option<EntityId> {
        if !matches!(self.ast.node(node), Node::Name(_)) {
            return None;
        }
        let ctx = self.scopes.find_context(self.ast, node);
        self.scopes.resolve_var(self.ast, ctx, node).ok()
    }

    // -- bookkeeping --------------------------------------------------------

    fn fail(&mut self, left: NodeId, right: NodeId, diag: Diagnostic) -> bool {
        let detail = diag.message.clone();
        self.failure.get_or_insert(diag);
        if self.tracing {
            let step = self.steps.len();
            let left = self.describe(left);
            let right = self.describe(right);
            self.steps.push(UnifyStep {
                step,
                action: UnifyAction::Error,
                left,
                right,
                detail,
            });
        }
        false
    }

    fn record_failure(&mut self, diag: Diagnostic) -> bool {
        self.failure.get_or_insert(diag);
        false
    }

    fn step(&mut self, action: UnifyAction, left: NodeId, right: NodeId, detail: impl Into<String>) {
        if !self.tracing {
            return;
        }
        let step = self.steps.len();
        let left = self.describe(left);
        let right = self.describe(right);
        self.steps.push(UnifyStep {
            step,
            action,
            left,
            right,
            detail: detail.into(),
        });
    }

    fn describe(&self, node: NodeId) -> String {
        match self.ast.node(node) {
            Node::Name(name) => name.text.clone(),
            Node::Hole(hole) => format!("?{}", hole.id.0),
            Node::Forall(def) => format!("forall/{}", def.params.len()),
            Node::Fun(def) => format!("fun/{}", def.params.len()),
            Node::Apply(def) => format!("apply/{}", def.args.len()),
            Node::Tuple(def) => format!("tuple/{}", def.elems.len()),
            Node::Partial(_) => "partial".into(),
            Node::Alias(def) => def.name.clone(),
            Node::Data(def) => def.name.clone(),
            Node::Trait(def) => def.name.clone(),
            Node::Param(def) => def.name.clone(),
        }
    }
}

