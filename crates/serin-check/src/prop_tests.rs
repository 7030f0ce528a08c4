//! Property tests for normalization and unification using proptest.
//!
//! These tests stress invariants that must hold for ANY well-formed type,
//! not just hand-picked examples. Key properties:
//!
//! 1. Round-trip: decoding a normalized code and re-encoding it reproduces
//!    the code exactly
//! 2. Canonical equality: α-renamed builds of the same type share a code
//! 3. Unification reflexivity: a type unifies with an α-renamed copy
//! 4. Symmetry for non-function types
//! 5. Hole idempotence: a filled hole behaves like its filling
//! 6. Kind soundness: whatever checks has a kind

use proptest::prelude::*;

use serin_ast::{Ast, HoleId, NodeId, Repository};
use serin_types::TypeCode;

use crate::context::ScopeTree;
use crate::impls::ImplIndex;
use crate::kind::{self, ParamEnv};
use crate::unify::{Unifier, UnifyState};

// ---------------------------------------------------------------------------
// Type descriptions and strategies
// ---------------------------------------------------------------------------

/// A generated type over the fixed world, with `Var(i)` referring to the
/// i-th quantified parameter (0 = outermost).
#[derive(Debug, Clone)]
enum TyDesc {
    Int,
    Bool,
    Var(usize),
    List(Box<TyDesc>),
    Pair(Box<TyDesc>, Box<TyDesc>),
    Tuple(Vec<TyDesc>),
}

/// A generated polymorphic function: `binders` quantified parameters over a
/// function from `params` to `ret`. Quantifier bodies are kept functional so
/// that α-renamed copies unify (non-function bodies are existential).
#[derive(Debug, Clone)]
struct SchemeDesc {
    binders: usize,
    params: Vec<TyDesc>,
    ret: TyDesc,
}

fn arb_ty(binders: usize) -> impl Strategy<Value = TyDesc> {
    let leaf = if binders > 0 {
        prop_oneof![
            Just(TyDesc::Int),
            Just(TyDesc::Bool),
            (0..binders).prop_map(TyDesc::Var),
        ]
        .boxed()
    } else {
        prop_oneof![Just(TyDesc::Int), Just(TyDesc::Bool)].boxed()
    };
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| TyDesc::List(Box::new(t))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| TyDesc::Pair(Box::new(a), Box::new(b))),
            prop::collection::vec(inner, 1..4).prop_map(TyDesc::Tuple),
        ]
    })
}

fn arb_scheme() -> impl Strategy<Value = SchemeDesc> {
    (0usize..3).prop_flat_map(|binders| {
        (
            prop::collection::vec(arb_ty(binders), 1..4),
            arb_ty(binders),
        )
            .prop_map(move |(params, ret)| SchemeDesc {
                binders,
                params,
                ret,
            })
    })
}

// ---------------------------------------------------------------------------
// Building generated descriptions into the arena
// ---------------------------------------------------------------------------

struct PropWorld {
    repo: Repository,
    ast: Ast,
    scopes: ScopeTree,
    impls: ImplIndex,
}

impl PropWorld {
    fn new() -> Self {
        let mut repo = Repository::starting_at(0);
        let mut ast = Ast::new();
        let mut scopes = ScopeTree::new();

        let int_def = ast.data(&mut repo, "Int", vec![], vec![]);
        let bool_def = ast.data(&mut repo, "Bool", vec![], vec![]);
        let t = ast.param(&mut repo, "Elem");
        let list_def = ast.data(&mut repo, "List", vec![t], vec![]);
        let a = ast.param(&mut repo, "Fst");
        let b = ast.param(&mut repo, "Snd");
        let pair_def = ast.data(&mut repo, "Pair", vec![a, b], vec![]);
        for def in [int_def, bool_def, list_def, pair_def] {
            scopes
                .define(&ast, ScopeTree::ROOT, def)
                .expect("world definitions are distinct");
        }

        Self {
            repo,
            ast,
            scopes,
            impls: ImplIndex::new(),
        }
    }

    fn build_ty(&mut self, param_names: &[String], desc: &TyDesc) -> NodeId {
        match desc {
            TyDesc::Int => self.ast.name("Int"),
            TyDesc::Bool => self.ast.name("Bool"),
            TyDesc::Var(i) => {
                let name = param_names[*i].clone();
                self.ast.name(name)
            }
            TyDesc::List(elem) => {
                let head = self.ast.name("List");
                let arg = self.build_ty(param_names, elem);
                self.ast.apply(head, vec![arg])
            }
            TyDesc::Pair(fst, snd) => {
                let head = self.ast.name("Pair");
                let a = self.build_ty(param_names, fst);
                let b = self.build_ty(param_names, snd);
                self.ast.apply(head, vec![a, b])
            }
            TyDesc::Tuple(elems) => {
                let nodes: Vec<NodeId> = elems
                    .iter()
                    .map(|e| self.build_ty(param_names, e))
                    .collect();
                self.ast.tuple(nodes)
            }
        }
    }

    /// Build a scheme, naming its parameters `{prefix}0..{prefix}k`, so two
    /// builds with different prefixes are α-renamings of each other.
    fn build_scheme(&mut self, desc: &SchemeDesc, prefix: &str) -> NodeId {
        let names: Vec<String> = (0..desc.binders).map(|i| format!("{prefix}{i}")).collect();
        let params: Vec<NodeId> = desc
            .params
            .iter()
            .map(|p| self.build_ty(&names, p))
            .collect();
        let ret = self.build_ty(&names, &desc.ret);
        let fun = self.ast.fun(params, ret);
        if desc.binders == 0 {
            return fun;
        }
        let binder_nodes: Vec<NodeId> = names
            .iter()
            .map(|n| self.ast.param(&mut self.repo, n.clone()))
            .collect();
        self.ast.forall(binder_nodes, fun)
    }

    fn normalize(&mut self, node: NodeId) -> TypeCode {
        self.scopes
            .normalize(&self.ast, node)
            .expect("generated types normalize")
    }

    fn unifier(&mut self) -> Unifier<'_> {
        Unifier::new(&self.ast, &mut self.scopes, &self.impls)
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    /// Decoding a normalized code and re-encoding it reproduces the code.
    #[test]
    fn roundtrip_through_the_decoder(desc in arb_scheme()) {
        let mut w = PropWorld::new();
        let node = w.build_scheme(&desc, "T");
        let code = w.normalize(node);
        let decoded = code.decode_all().expect("normalized codes decode");
        prop_assert_eq!(TypeCode::encode(decoded.instrs()).unwrap(), code);
    }

    /// α-renamed builds of the same description share a code byte-for-byte,
    /// and building twice with the same prefix is deterministic.
    #[test]
    fn alpha_equivalent_builds_share_a_code(desc in arb_scheme()) {
        let mut w = PropWorld::new();
        let first = w.build_scheme(&desc, "T");
        let second = w.build_scheme(&desc, "U");
        let third = w.build_scheme(&desc, "T");
        let code = w.normalize(first);
        prop_assert_eq!(w.normalize(second), code.clone());
        prop_assert_eq!(w.normalize(third), code);
    }

    /// A type unifies with an α-renamed copy of itself.
    #[test]
    fn unification_is_reflexive(desc in arb_scheme()) {
        let mut w = PropWorld::new();
        let left = w.build_scheme(&desc, "T");
        let right = w.build_scheme(&desc, "U");
        prop_assert!(w.unifier().unify(left, left));
        prop_assert!(w.unifier().unify(left, right));
    }

    /// For non-function types the direction of unification is irrelevant.
    #[test]
    fn unification_is_symmetric_for_ground_types(
        a in arb_ty(0),
        b in arb_ty(0),
    ) {
        let mut w = PropWorld::new();
        let left = w.build_ty(&[], &a);
        let right = w.build_ty(&[], &b);
        let forward = w.unifier().unify(left, right);
        let backward = w.unifier().unify(right, left);
        prop_assert_eq!(forward, backward);
    }

    /// After a hole takes T, unifying it with T' succeeds exactly when
    /// T ~ T' would.
    #[test]
    fn filled_holes_behave_like_their_filling(
        first in arb_ty(0),
        second in arb_ty(0),
    ) {
        let mut w = PropWorld::new();
        let hole = w.ast.hole(HoleId(0));
        let partial = w.ast.partial(&mut w.repo, vec![hole], hole);
        let t = w.build_ty(&[], &first);
        let t2 = w.build_ty(&[], &second);

        let mut st = UnifyState::new();
        let mut uni = w.unifier();
        prop_assert!(uni.unify_in(&mut st, partial, t));
        let through_hole = uni.unify_in(&mut st, partial, t2);
        let direct = uni.unify(t, t2);
        prop_assert_eq!(through_hole, direct);
    }

    /// Whatever checks has a kind (kind soundness).
    #[test]
    fn checked_types_have_a_kind(desc in arb_scheme()) {
        let mut w = PropWorld::new();
        let node = w.build_scheme(&desc, "T");
        w.scopes
            .check(&w.ast, ScopeTree::ROOT, node)
            .expect("generated types check");
        let env = ParamEnv::new();
        let computed = kind::kind_of(&w.ast, &w.scopes, ScopeTree::ROOT, node, &env);
        prop_assert!(computed.is_some());
    }
}
