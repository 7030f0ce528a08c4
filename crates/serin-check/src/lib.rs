//! The Serin checker core: scope resolution, canonical type codes, kind
//! checking, and unification.
//!
//! This crate implements:
//! - A tree of lexical contexts with define / enter / resolve operations,
//!   anchoring the De Bruijn computation used by the canonical encoding
//! - Compilation of AST types to canonical [`serin_types::TypeCode`]s,
//!   memoized per node
//! - Kind checking over the algebra `* | k -> k'`
//! - Unification with universal quantification, existentials,
//!   constraint-based instantiation against a trait-impl index, and holes
//!
//! The intended flow: an external parser produces a finalized AST, the
//! driver `define`s top-level entities into the root context, registers
//! impls, and calls [`ScopeTree::check`] per definition. [`Unifier`] is the
//! caller-facing unification engine; it reports `true`/`false` and leaves
//! the first failure as a structured diagnostic.

pub mod compile;
pub mod context;
pub mod impls;
pub mod kind;
pub mod trace;
pub mod unify;

pub use context::{CtxId, ScopeTree};
pub use impls::{ImplDef, ImplIndex};
pub use kind::{ParamEnv, from_ann, kind_of, param_kind};
pub use trace::{UnifyAction, UnifyStep};
pub use unify::{ParamSlot, ParamStack, Unifier, UnifyState};

// Re-export for convenience.
pub use serin_diag::{Category, Diagnostic, DiagnosticError};
pub use serin_types::{Instr, Kind, TypeCode};


#[cfg(test)]
mod prop_tests;
