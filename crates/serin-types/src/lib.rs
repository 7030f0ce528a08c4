//! Type-algebra primitives for Serin.
//!
//! This crate defines the kind algebra and the canonical type code: the
//! compact word-string encoding whose byte-for-byte equality is a sound and
//! complete structural-equality test for normalized types. The checker in
//! `serin-check` compiles AST types down to [`code::TypeCode`]s; this crate
//! owns the instruction set, the encoder, the decoder, and the disassembler.

pub mod code;

pub use code::{CodeExpr, CodeParam, Instr, TypeCode};

use std::fmt;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Kind of a type or type constructor: `* | kind -> kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    Star,
    Arrow(Box<Kind>, Box<Kind>),
}

impl Kind {
    pub fn arrow(from: Kind, to: Kind) -> Self {
        Kind::Arrow(Box::new(from), Box::new(to))
    }

    /// The unary constructor kind `* -> *`.
    pub fn unary() -> Self {
        Self::arrow(Kind::Star, Kind::Star)
    }

    /// The curried kind of a constructor with `arity` concrete parameters,
    /// ending in `*`. Arity 0 is `*` itself.
    pub fn constructor(arity: usize) -> Self {
        let mut kind = Kind::Star;
        for _ in 0..arity {
            kind = Self::arrow(Kind::Star, kind);
        }
        kind
    }

    /// Curried kind from explicit parameter kinds, ending in `*`.
    pub fn curried(params: impl IntoIterator<Item = Kind>) -> Self {
        let params: Vec<Kind> = params.into_iter().collect();
        let mut kind = Kind::Star;
        for param in params.into_iter().rev() {
            kind = Self::arrow(param, kind);
        }
        kind
    }

    pub fn is_arrow(&self) -> bool {
        matches!(self, Kind::Arrow(_, _))
    }

    /// Canonical instruction emission for this kind, prefix form:
    /// `Concrete` for `*`, `Hkt k1 k2` for an arrow.
    pub fn instrs(&self) -> Vec<Instr> {
        let mut out = Vec::new();
        self.emit(&mut out);
        out
    }

    fn emit(&self, out: &mut Vec<Instr>) {
        match self {
            Kind::Star => out.push(Instr::Concrete),
            Kind::Arrow(from, to) => {
                out.push(Instr::Hkt);
                from.emit(out);
                to.emit(out);
            }
        }
    }

    /// Canonical code for this kind. Kind words never overflow, so this
    /// cannot fail.
    pub fn code(&self) -> TypeCode {
        TypeCode::encode(self.instrs()).expect("kind instructions carry no operands")
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Star => write!(f, "*"),
            Kind::Arrow(from, to) => {
                if from.is_arrow() {
                    write!(f, "({from}) -> {to}")
                } else {
                    write!(f, "{from} -> {to}")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parenthesizes_arrow_domains() {
        assert_eq!(Kind::Star.to_string(), "*");
        assert_eq!(Kind::unary().to_string(), "* -> *");
        assert_eq!(
            Kind::arrow(Kind::unary(), Kind::Star).to_string(),
            "(* -> *) -> *"
        );
        assert_eq!(Kind::constructor(2).to_string(), "* -> * -> *");
    }

    #[test]
    fn constructor_kind_arity() {
        assert_eq!(Kind::constructor(0), Kind::Star);
        assert_eq!(Kind::constructor(1), Kind::unary());
        assert_eq!(
            Kind::constructor(2),
            Kind::arrow(Kind::Star, Kind::unary())
        );
    }

    #[test]
    fn curried_kind_respects_parameter_order() {
        let higher = Kind::curried([Kind::unary(), Kind::Star]);
        assert_eq!(
            higher,
            Kind::arrow(Kind::unary(), Kind::arrow(Kind::Star, Kind::Star))
        );
    }

    #[test]
    fn kind_codes_distinguish_shapes() {
        let star = Kind::Star.code();
        let unary = Kind::unary().code();
        let left = Kind::arrow(Kind::unary(), Kind::Star).code();
        let right = Kind::arrow(Kind::Star, Kind::unary()).code();
        assert_ne!(star, unary);
        assert_ne!(left, right);
        assert_eq!(Kind::unary().code(), Kind::unary().code());
    }
}
