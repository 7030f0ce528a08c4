//! Error reporting and diagnostics for Serin.
//!
//! This crate provides structured diagnostics for the checker core. Checking
//! aborts at the first error, so a diagnostic carries everything the caller
//! needs in one message: the offending name, arity, or canonical codes.
//!
//! Diagnostics are created by other crates (`serin-types`, `serin-check`)
//! and rendered here for display.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// Broad category for diagnostics. One variant per checker failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Duplicate name in the same namespace of a scope.
    Redeclaration,
    /// A referenced name is unbound.
    NotFound,
    /// A type application's head kind disagrees with its argument kind.
    KindMismatch,
    /// Type application or function parameter counts disagree.
    ArityMismatch,
    /// Two types cannot be unified.
    UnifyFail,
    /// A hole participated in bottom-bottom unification.
    UnresolvedHole,
    /// Two impls collide on the same (trait, type) pair.
    OverlappingImpl,
    /// Unknown opcode in a type code.
    InvalidOp,
    /// Truncated type code.
    UnexpectedEnd,
    /// An instruction word does not fit in 16 bits.
    Overflow,
    /// Internal assertion failure; fatal.
    InvariantViolated,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Redeclaration,
        Category::NotFound,
        Category::KindMismatch,
        Category::ArityMismatch,
        Category::UnifyFail,
        Category::UnresolvedHole,
        Category::OverlappingImpl,
        Category::InvalidOp,
        Category::UnexpectedEnd,
        Category::Overflow,
        Category::InvariantViolated,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Redeclaration => "redeclaration",
            Category::NotFound => "not_found",
            Category::KindMismatch => "kind_mismatch",
            Category::ArityMismatch => "arity_mismatch",
            Category::UnifyFail => "unify_fail",
            Category::UnresolvedHole => "unresolved_hole",
            Category::OverlappingImpl => "overlapping_impl",
            Category::InvalidOp => "invalid_op",
            Category::UnexpectedEnd => "unexpected_end",
            Category::Overflow => "overflow",
            Category::InvariantViolated => "invariant_violated",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::Redeclaration => "E0001",
            Category::NotFound => "E0002",
            Category::KindMismatch => "E0003",
            Category::ArityMismatch => "E0004",
            Category::UnifyFail => "E0005",
            Category::UnresolvedHole => "E0006",
            Category::OverlappingImpl => "E0007",
            Category::InvalidOp => "E0101",
            Category::UnexpectedEnd => "E0102",
            Category::Overflow => "E0103",
            Category::InvariantViolated => "E0901",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::Redeclaration => {
                "A name is defined more than once in the same namespace of a scope."
            }
            Category::NotFound => "A referenced variable, type, or trait is undefined.",
            Category::KindMismatch => {
                "A type application's head kind disagrees with the argument's kind."
            }
            Category::ArityMismatch => {
                "A type application or function has the wrong number of arguments."
            }
            Category::UnifyFail => "Two types cannot be unified.",
            Category::UnresolvedHole => {
                "A hole was unified against another unassigned hole and cannot be inferred."
            }
            Category::OverlappingImpl => {
                "Two implementations collide on the same (trait, type) pair."
            }
            Category::InvalidOp => "A type code contains an unknown opcode.",
            Category::UnexpectedEnd => "A type code ends in the middle of an instruction.",
            Category::Overflow => "An encoded instruction word does not fit in 16 bits.",
            Category::InvariantViolated => "An internal checker invariant was violated.",
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Warning,
            category,
            message: message.into(),
            help: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping a diagnostic.
///
/// The checker aborts at the first error, so unlike multi-error pipelines
/// this wrapper holds exactly one diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DiagnosticError(pub Diagnostic);

impl DiagnosticError {
    pub fn diagnostic(&self) -> &Diagnostic {
        &self.0
    }

    pub fn category(&self) -> Category {
        self.0.category
    }
}

impl From<Diagnostic> for DiagnosticError {
    fn from(diag: Diagnostic) -> Self {
        Self(diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_builder() {
        let diag = Diagnostic::error(Category::Redeclaration, "`X` is already defined")
            .with_help("rename one of the definitions");

        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("E0001"));
        assert_eq!(diag.category, Category::Redeclaration);
        assert!(diag.message.contains("already defined"));
        assert!(diag.help.unwrap().contains("rename"));
    }

    #[test]
    fn diagnostic_display() {
        let diag = Diagnostic::error(Category::UnifyFail, "cannot unify `Int` with `Bool`");
        let s = format!("{diag}");
        assert!(s.starts_with("error[E0005]: cannot unify"));
    }

    #[test]
    fn category_metadata_is_stable_and_unique() {
        let mut codes = std::collections::BTreeSet::new();
        for cat in Category::all() {
            assert!(!cat.as_str().is_empty());
            assert!(!cat.description().is_empty());
            assert!(
                codes.insert(cat.code()),
                "duplicate diagnostic code detected: {}",
                cat.code()
            );
        }
    }
}
