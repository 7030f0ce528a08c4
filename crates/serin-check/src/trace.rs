//! Tracing types for checker observability.
//!
//! These types capture step-by-step traces of unification, so that tools can
//! expose the checker's reasoning. Tracing is opt-in via
//! `Unifier::enable_tracing()` — zero overhead when disabled.

use serde::Serialize;

/// A single step in a unification trace.
#[derive(Debug, Clone, Serialize)]
pub struct UnifyStep {
    pub step: usize,
    pub action: UnifyAction,
    pub left: String,
    pub right: String,
    pub detail: String,
}

/// What action was taken during a unification step.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifyAction {
    /// Quantifiers unwrapped into the parameter stacks.
    Unwrap,
    /// A parameter was instantiated with a type from the other side.
    Instantiate,
    /// A fresh instance was unified against a previous capture.
    CaptureReplay,
    /// Constraint discharge against the impl index.
    Discharge,
    /// HKT parameter kind compared against candidate kind.
    KindCheck,
    /// Structural recursion into a compound type.
    Decompose,
    /// A hole was assigned a type.
    FillHole,
    /// Existential bodies compared by node identity.
    ExistentialIdentity,
    /// Unification failed.
    Error,
}
