//! AST node definitions for Serin.
//!
//! This crate defines the abstract syntax tree consumed by the checker core.
//! Nodes live in an [`Ast`] arena and refer to each other through [`NodeId`]
//! indices; parent pointers are kept in a side-table so the tree can carry
//! upward references without reference cycles. Entities (anything that can be
//! named or instantiated) receive a unique [`EntityId`] from a [`Repository`]
//! at construction time.

use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a named entity (alias, datatype, trait, parameter,
/// constructor, method, partial scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl EntityId {
    /// First id of the reserved synthetic tuple-constructor block.
    ///
    /// Tuple types canonicalize as applications of a per-arity constructor
    /// drawn from the top of the 16-bit id space. User entities never land
    /// here; see [`Repository::fresh`].
    pub const TUPLE_BASE: u32 = 0xFF00;

    /// The synthetic constructor id for tuples of the given arity.
    pub fn tuple_ctor(arity: usize) -> Self {
        debug_assert!(arity <= 0xFF, "tuple arity exceeds reserved block");
        Self(Self::TUPLE_BASE + arity as u32)
    }

    /// Whether this id lies in the reserved tuple-constructor block.
    pub fn is_tuple_ctor(self) -> bool {
        (Self::TUPLE_BASE..=0xFFFF).contains(&self.0)
    }

    /// Arity encoded in a tuple-constructor id, if it is one.
    pub fn tuple_arity(self) -> Option<usize> {
        self.is_tuple_ctor().then(|| (self.0 - Self::TUPLE_BASE) as usize)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index of a node in the [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a hole, unique only within its enclosing [`PartialTy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HoleId(pub u16);

// ---------------------------------------------------------------------------
// Repository: entity id allocation
// ---------------------------------------------------------------------------

/// Monotonic allocator for [`EntityId`]s.
///
/// One repository serves a whole compilation session; every entity gets a
/// distinct id, so ids double as identity across the scope tree. Allocation
/// is not reentrant — the repository is passed by `&mut` wherever nodes are
/// constructed.
#[derive(Debug, Default)]
pub struct Repository {
    next: u32,
}

impl Repository {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// Create a repository with an explicit starting id.
    ///
    /// Production code should use `new()`. This constructor exists for unit
    /// tests that need deterministic ids at known offsets.
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    /// Allocate a fresh entity id.
    ///
    /// The reserved tuple-constructor block is skipped: user entities and
    /// synthetic tuple constructors must never collide.
    pub fn fresh(&mut self) -> EntityId {
        if (EntityId::TUPLE_BASE..=0xFFFF).contains(&self.next) {
            self.next = 0x1_0000;
        }
        let id = EntityId(self.next);
        self.next += 1;
        id
    }
}

// ---------------------------------------------------------------------------
// Kind annotations
// ---------------------------------------------------------------------------

/// A syntactic kind annotation on a type parameter.
///
/// This is the surface form; the checker lowers it to its semantic kind.
/// A parameter with no annotation and no constraints is concrete (`*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindAnn {
    /// Kind `*`.
    Star,
    /// Kind arrow, e.g. `* -> *` for a unary type constructor.
    Arrow(Box<KindAnn>, Box<KindAnn>),
}

impl KindAnn {
    pub fn arrow(from: KindAnn, to: KindAnn) -> Self {
        KindAnn::Arrow(Box::new(from), Box::new(to))
    }

    /// The unary constructor kind `* -> *`.
    pub fn unary() -> Self {
        Self::arrow(KindAnn::Star, KindAnn::Star)
    }
}

// ---------------------------------------------------------------------------
// Node payloads
// ---------------------------------------------------------------------------

/// A trait constraint on a type parameter: the trait entity plus any
/// type arguments beyond the constrained parameter itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRef {
    pub trait_id: EntityId,
    pub args: Vec<NodeId>,
}

/// `Alias`: a named type abbreviation with optional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasDef {
    pub id: EntityId,
    pub name: String,
    pub params: Vec<NodeId>,
    pub body: NodeId,
}

/// One constructor of a datatype. Constructors are value-namespace entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtorDef {
    pub id: EntityId,
    pub name: String,
    pub fields: Vec<NodeId>,
}

/// `Data`: a named datatype with parameters and constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDef {
    pub id: EntityId,
    pub name: String,
    pub params: Vec<NodeId>,
    pub ctors: Vec<CtorDef>,
}

/// One method signature inside a trait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitMethod {
    pub id: EntityId,
    pub name: String,
    pub signature: NodeId,
}

/// `Trait`: a constraint interface with supertraits, parameters,
/// associated parameters, and method signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitDef {
    pub id: EntityId,
    pub name: String,
    pub supertraits: Vec<EntityId>,
    pub params: Vec<NodeId>,
    pub assoc: Vec<NodeId>,
    pub methods: Vec<TraitMethod>,
}

/// `Param`: a type parameter. Carries either a kind annotation (HKT), a
/// constraint list (concrete, bounded), or neither (concrete, unbounded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    pub id: EntityId,
    pub name: String,
    pub constraints: Vec<ConstraintRef>,
    pub kind: Option<KindAnn>,
}

/// `Hole`: an unknown type filled in by unification. Only well-formed inside
/// a [`PartialTy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoleTy {
    pub id: HoleId,
}

/// `Partial`: the scope that introduces holes, as parameters are introduced
/// by a quantifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialTy {
    pub id: EntityId,
    pub holes: Vec<NodeId>,
    pub inner: NodeId,
}

/// `Forall`: universal quantification over type parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForallTy {
    pub params: Vec<NodeId>,
    pub body: NodeId,
}

/// `Apply`: type application of a head expression to arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyTy {
    pub head: NodeId,
    pub args: Vec<NodeId>,
}

/// `Tuple`: a product of element types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleTy {
    pub elems: Vec<NodeId>,
}

/// `Fun`: a function type. Generic parameters, if any, belong to the
/// function itself and are unwrapped by the unifier on use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunTy {
    pub tparams: Vec<NodeId>,
    pub params: Vec<NodeId>,
    pub ret: NodeId,
}

/// `Name`: a textual type reference, resolved through the context chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    pub text: String,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A node in the AST arena.
///
/// The checker dispatches on this enum exhaustively; adding a variant is a
/// compile-time error everywhere a node is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Alias(AliasDef),
    Data(DataDef),
    Trait(TraitDef),
    Param(ParamDef),
    Hole(HoleTy),
    Partial(PartialTy),
    Forall(ForallTy),
    Apply(ApplyTy),
    Tuple(TupleTy),
    Fun(FunTy),
    Name(NameRef),
}

impl Node {
    /// Entity id of a defining node, if it has one.
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            Node::Alias(a) => Some(a.id),
            Node::Data(d) => Some(d.id),
            Node::Trait(t) => Some(t.id),
            Node::Param(p) => Some(p.id),
            Node::Partial(p) => Some(p.id),
            Node::Hole(_)
            | Node::Forall(_)
            | Node::Apply(_)
            | Node::Tuple(_)
            | Node::Fun(_)
            | Node::Name(_) => None,
        }
    }

    /// Name of a defining node, if it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Node::Alias(a) => Some(&a.name),
            Node::Data(d) => Some(&d.name),
            Node::Trait(t) => Some(&t.name),
            Node::Param(p) => Some(&p.name),
            Node::Hole(_)
            | Node::Partial(_)
            | Node::Forall(_)
            | Node::Apply(_)
            | Node::Tuple(_)
            | Node::Fun(_)
            | Node::Name(_) => None,
        }
    }

    /// Whether this node opens a lexical scope of its own.
    ///
    /// Quantifier-like scopes (parameterized alias/data/trait, `Forall`,
    /// generic `Fun`) also bump the De Bruijn depth; `Partial` opens a scope
    /// for its holes without bumping depth.
    pub fn is_scope(&self) -> bool {
        match self {
            Node::Alias(a) => !a.params.is_empty(),
            Node::Data(d) => !d.params.is_empty(),
            Node::Trait(_) => true,
            Node::Forall(_) => true,
            Node::Fun(f) => !f.tparams.is_empty(),
            Node::Partial(_) => true,
            Node::Param(_) | Node::Hole(_) | Node::Apply(_) | Node::Tuple(_) | Node::Name(_) => {
                false
            }
        }
    }

    /// Whether this scope introduces type parameters (and so a new
    /// De Bruijn frame).
    pub fn binds_params(&self) -> bool {
        match self {
            Node::Alias(a) => !a.params.is_empty(),
            Node::Data(d) => !d.params.is_empty(),
            Node::Trait(_) => true,
            Node::Forall(_) => true,
            Node::Fun(f) => !f.tparams.is_empty(),
            _ => false,
        }
    }

    /// Parameter list of a scope node, empty for non-binding nodes.
    pub fn scope_params(&self) -> &[NodeId] {
        match self {
            Node::Alias(a) => &a.params,
            Node::Data(d) => &d.params,
            Node::Trait(t) => &t.params,
            Node::Forall(f) => &f.params,
            Node::Fun(f) => &f.tparams,
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Ast arena
// ---------------------------------------------------------------------------

/// Arena of AST nodes with a parent side-table.
///
/// Builders allocate nodes, assign entity ids from the caller's
/// [`Repository`], and set the parent pointer of every child as it is
/// attached to its enclosing node.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.parents.push(None);
        id
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) {
        debug_assert!(
            self.parents[child.index()].is_none(),
            "node {child:?} attached twice"
        );
        self.parents[child.index()] = Some(parent);
    }

    // -- ingress builders ---------------------------------------------------

    /// A textual type reference. Attached to its enclosing node by whichever
    /// builder consumes it.
    pub fn name(&mut self, text: impl Into<String>) -> NodeId {
        self.push(Node::Name(NameRef { text: text.into() }))
    }

    /// An unconstrained concrete type parameter.
    pub fn param(&mut self, repo: &mut Repository, name: impl Into<String>) -> NodeId {
        self.push(Node::Param(ParamDef {
            id: repo.fresh(),
            name: name.into(),
            constraints: Vec::new(),
            kind: None,
        }))
    }

    /// A type parameter with trait constraints. Constraint argument nodes are
    /// attached to the parameter.
    pub fn constrained_param(
        &mut self,
        repo: &mut Repository,
        name: impl Into<String>,
        constraints: Vec<ConstraintRef>,
    ) -> NodeId {
        let arg_nodes: Vec<NodeId> = constraints
            .iter()
            .flat_map(|c| c.args.iter().copied())
            .collect();
        let node = self.push(Node::Param(ParamDef {
            id: repo.fresh(),
            name: name.into(),
            constraints,
            kind: None,
        }));
        for arg in arg_nodes {
            self.attach(arg, node);
        }
        node
    }

    /// A higher-kinded type parameter with a declared kind.
    pub fn hkt_param(
        &mut self,
        repo: &mut Repository,
        name: impl Into<String>,
        kind: KindAnn,
    ) -> NodeId {
        self.push(Node::Param(ParamDef {
            id: repo.fresh(),
            name: name.into(),
            constraints: Vec::new(),
            kind: Some(kind),
        }))
    }

    /// Universal quantification over `params`.
    pub fn forall(&mut self, params: Vec<NodeId>, body: NodeId) -> NodeId {
        let node = self.push(Node::Forall(ForallTy {
            params: params.clone(),
            body,
        }));
        for p in params {
            self.attach(p, node);
        }
        self.attach(body, node);
        node
    }

    /// Type application `head args...`.
    pub fn apply(&mut self, head: NodeId, args: Vec<NodeId>) -> NodeId {
        let node = self.push(Node::Apply(ApplyTy {
            head,
            args: args.clone(),
        }));
        self.attach(head, node);
        for a in args {
            self.attach(a, node);
        }
        node
    }

    /// Tuple of element types.
    pub fn tuple(&mut self, elems: Vec<NodeId>) -> NodeId {
        let node = self.push(Node::Tuple(TupleTy {
            elems: elems.clone(),
        }));
        for e in elems {
            self.attach(e, node);
        }
        node
    }

    /// Function type with no generic parameters of its own.
    pub fn fun(&mut self, params: Vec<NodeId>, ret: NodeId) -> NodeId {
        self.generic_fun(Vec::new(), params, ret)
    }

    /// Function type carrying its own generic parameters.
    pub fn generic_fun(&mut self, tparams: Vec<NodeId>, params: Vec<NodeId>, ret: NodeId) -> NodeId {
        let node = self.push(Node::Fun(FunTy {
            tparams: tparams.clone(),
            params: params.clone(),
            ret,
        }));
        for t in tparams {
            self.attach(t, node);
        }
        for p in params {
            self.attach(p, node);
        }
        self.attach(ret, node);
        node
    }

    /// A hole scope: `holes` lists the hole nodes enclosed by this partial
    /// and `inner` is the type they appear in.
    ///
    /// The caller builds `inner` first, using hole nodes obtained from
    /// [`Ast::hole`]; the ids must be unique within this partial. Holes are
    /// already parented by the type they occur in, so only `inner` is
    /// attached here.
    pub fn partial(&mut self, repo: &mut Repository, holes: Vec<NodeId>, inner: NodeId) -> NodeId {
        let node = self.push(Node::Partial(PartialTy {
            id: repo.fresh(),
            holes,
            inner,
        }));
        self.attach(inner, node);
        node
    }

    /// A hole occurrence. Ill-formed unless later enclosed by a partial.
    pub fn hole(&mut self, id: HoleId) -> NodeId {
        self.push(Node::Hole(HoleTy { id }))
    }

    /// A type alias definition.
    pub fn alias(
        &mut self,
        repo: &mut Repository,
        name: impl Into<String>,
        params: Vec<NodeId>,
        body: NodeId,
    ) -> NodeId {
        let node = self.push(Node::Alias(AliasDef {
            id: repo.fresh(),
            name: name.into(),
            params: params.clone(),
            body,
        }));
        for p in params {
            self.attach(p, node);
        }
        self.attach(body, node);
        node
    }

    /// A datatype definition. Constructor field nodes are attached to the
    /// datatype node.
    pub fn data(
        &mut self,
        repo: &mut Repository,
        name: impl Into<String>,
        params: Vec<NodeId>,
        ctors: Vec<(String, Vec<NodeId>)>,
    ) -> NodeId {
        let ctors: Vec<CtorDef> = ctors
            .into_iter()
            .map(|(name, fields)| CtorDef {
                id: repo.fresh(),
                name,
                fields,
            })
            .collect();
        let field_nodes: Vec<NodeId> = ctors
            .iter()
            .flat_map(|c| c.fields.iter().copied())
            .collect();
        let node = self.push(Node::Data(DataDef {
            id: repo.fresh(),
            name: name.into(),
            params: params.clone(),
            ctors,
        }));
        for p in params {
            self.attach(p, node);
        }
        for f in field_nodes {
            self.attach(f, node);
        }
        node
    }

    /// A trait definition.
    pub fn trait_def(
        &mut self,
        repo: &mut Repository,
        name: impl Into<String>,
        supertraits: Vec<EntityId>,
        params: Vec<NodeId>,
        assoc: Vec<NodeId>,
        methods: Vec<(String, NodeId)>,
    ) -> NodeId {
        let methods: Vec<TraitMethod> = methods
            .into_iter()
            .map(|(name, signature)| TraitMethod {
                id: repo.fresh(),
                name,
                signature,
            })
            .collect();
        let sig_nodes: Vec<NodeId> = methods.iter().map(|m| m.signature).collect();
        let node = self.push(Node::Trait(TraitDef {
            id: repo.fresh(),
            name: name.into(),
            supertraits,
            params: params.clone(),
            assoc: assoc.clone(),
            methods,
        }));
        for p in params {
            self.attach(p, node);
        }
        for a in assoc {
            self.attach(a, node);
        }
        for s in sig_nodes {
            self.attach(s, node);
        }
        node
    }

    // -- traversal helpers --------------------------------------------------

    /// Walk the parent chain from `node` upward, yielding each ancestor.
    pub fn ancestors(&self, node: NodeId) -> Ancestors<'_> {
        Ancestors {
            ast: self,
            cursor: self.parent(node),
        }
    }

    /// The nearest enclosing scope node, if any.
    pub fn enclosing_scope(&self, node: NodeId) -> Option<NodeId> {
        self.ancestors(node).find(|&a| self.node(a).is_scope())
    }

    /// The nearest enclosing partial, if any. Used to key hole identity.
    pub fn enclosing_partial(&self, node: NodeId) -> Option<NodeId> {
        self.ancestors(node)
            .find(|&a| matches!(self.node(a), Node::Partial(_)))
    }
}

/// Iterator over a node's ancestors, nearest first.
pub struct Ancestors<'a> {
    ast: &'a Ast,
    cursor: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.cursor?;
        self.cursor = self.ast.parent(current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_skips_reserved_tuple_block() {
        let mut repo = Repository::starting_at(EntityId::TUPLE_BASE - 1);
        assert_eq!(repo.fresh(), EntityId(EntityId::TUPLE_BASE - 1));
        assert_eq!(repo.fresh(), EntityId(0x1_0000));
    }

    #[test]
    fn tuple_ctor_ids_round_trip_arity() {
        for arity in [0usize, 1, 2, 7, 255] {
            let id = EntityId::tuple_ctor(arity);
            assert!(id.is_tuple_ctor());
            assert_eq!(id.tuple_arity(), Some(arity));
        }
        assert_eq!(EntityId(3).tuple_arity(), None);
    }

    #[test]
    fn builders_set_parent_pointers() {
        let mut repo = Repository::new();
        let mut ast = Ast::new();
        let t = ast.param(&mut repo, "T");
        let head = ast.name("List");
        let var = ast.name("T");
        let body = ast.apply(head, vec![var]);
        let forall = ast.forall(vec![t], body);

        assert_eq!(ast.parent(t), Some(forall));
        assert_eq!(ast.parent(body), Some(forall));
        assert_eq!(ast.parent(head), Some(body));
        assert_eq!(ast.parent(var), Some(body));
        assert_eq!(ast.parent(forall), None);
    }

    #[test]
    fn enclosing_scope_finds_nearest_binder() {
        let mut repo = Repository::new();
        let mut ast = Ast::new();
        let t = ast.param(&mut repo, "T");
        let u = ast.param(&mut repo, "U");
        let var = ast.name("U");
        let inner = ast.forall(vec![u], var);
        let outer = ast.forall(vec![t], inner);

        assert_eq!(ast.enclosing_scope(var), Some(inner));
        assert_eq!(ast.enclosing_scope(inner), Some(outer));
        assert_eq!(ast.enclosing_scope(outer), None);
    }

    #[test]
    fn distinct_entities_get_distinct_ids() {
        let mut repo = Repository::new();
        let mut ast = Ast::new();
        let a = ast.param(&mut repo, "A");
        let b = ast.param(&mut repo, "B");
        let (Node::Param(pa), Node::Param(pb)) = (ast.node(a), ast.node(b)) else {
            panic!("params expected");
        };
        assert_ne!(pa.id, pb.id);
    }
}
