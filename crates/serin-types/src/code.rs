//! The canonical type code: instruction set, encoder, decoder, disassembler.
//!
//! A [`TypeCode`] is a word-string over a 16-bit alphabet. The checker
//! flattens a normalized type into a prefix instruction sequence and packs
//! each word into one code unit; two types are structurally α-equivalent
//! exactly when their codes compare equal. The decoder mirrors the grammar
//! (one token of lookahead) and exists for round-trip tests and for the
//! disassembler used in diagnostics.
//!
//! Curried forms are flat: `Apply f a₁ … aₙ` is n `Apply` prefixes, then
//! `f`, then the arguments; `Fun p₁ … pₖ r` is k `Fun` prefixes, then the
//! parameters, then the return. Multi-parameter quantifiers emit one
//! `Forall` per parameter, innermost binder carrying the smallest `Var`
//! delta.

use crate::Kind;
use serin_diag::{Category, Diagnostic, DiagnosticError};
use std::fmt;

/// Opcode word values.
mod op {
    pub const FORALL: u16 = 0x00;
    pub const CONCRETE: u16 = 0x01;
    pub const HKT: u16 = 0x02;
    pub const IMPL: u16 = 0x03;
    pub const HOLE: u16 = 0x04;
    pub const REF: u16 = 0x05;
    pub const VAR: u16 = 0x06;
    pub const FUN: u16 = 0x07;
    pub const APPLY: u16 = 0x08;
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// One instruction of the canonical encoding.
///
/// Operand-carrying variants hold `u32` so that the encoder is the single
/// place where the 16-bit limit is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instr {
    /// Quantifier. Followed by an optional parameter descriptor (a kind or
    /// a run of `Impl` terms), then the body.
    Forall,
    /// Kind `*`.
    Concrete,
    /// Kind arrow; followed by two kinds.
    Hkt,
    /// One trait-constraint term; followed by an expression.
    Impl,
    /// Hole occurrence; operand is the hole id.
    Hole(u32),
    /// Reference to a top-level entity; operand is the entity id.
    Ref(u32),
    /// Bound variable; operand is the De Bruijn delta.
    Var(u32),
    /// Function arrow.
    Fun,
    /// Single-argument application.
    Apply,
}

impl Instr {
    /// Opcode word for this instruction.
    fn opcode(self) -> u16 {
        match self {
            Instr::Forall => op::FORALL,
            Instr::Concrete => op::CONCRETE,
            Instr::Hkt => op::HKT,
            Instr::Impl => op::IMPL,
            Instr::Hole(_) => op::HOLE,
            Instr::Ref(_) => op::REF,
            Instr::Var(_) => op::VAR,
            Instr::Fun => op::FUN,
            Instr::Apply => op::APPLY,
        }
    }

    /// Operand word, if this instruction carries one.
    fn operand(self) -> Option<u32> {
        match self {
            Instr::Hole(w) | Instr::Ref(w) | Instr::Var(w) => Some(w),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TypeCode
// ---------------------------------------------------------------------------

/// A canonical type code: an opaque word-string.
///
/// Nominally typed so that raw strings and codes never mix. Equality and
/// ordering are word-by-word; ordering is what gives constraints their
/// canonical sort.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeCode(Box<[u16]>);

impl TypeCode {
    /// Fold an instruction sequence into a code.
    ///
    /// Fails with `Overflow` when an operand does not fit in 16 bits.
    pub fn encode(instrs: impl IntoIterator<Item = Instr>) -> Result<TypeCode, DiagnosticError> {
        let mut words = Vec::new();
        for instr in instrs {
            words.push(instr.opcode());
            if let Some(operand) = instr.operand() {
                let word = u16::try_from(operand).map_err(|_| {
                    DiagnosticError::from(Diagnostic::error(
                        Category::Overflow,
                        format!("operand {operand} does not fit in a 16-bit code unit"),
                    ))
                })?;
                words.push(word);
            }
        }
        Ok(TypeCode(words.into_boxed_slice()))
    }

    /// The raw code units.
    pub fn as_words(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode one expression starting at `offset`; returns the expression
    /// and the offset just past it.
    pub fn decode(&self, offset: usize) -> Result<(CodeExpr, usize), DiagnosticError> {
        let mut cursor = Cursor {
            words: &self.0,
            pos: offset,
        };
        let expr = cursor.expr()?;
        Ok((expr, cursor.pos))
    }

    /// Decode the whole code as a single expression; trailing words are an
    /// `InvalidOp` error.
    pub fn decode_all(&self) -> Result<CodeExpr, DiagnosticError> {
        let (expr, next) = self.decode(0)?;
        if next != self.0.len() {
            return Err(Diagnostic::error(
                Category::InvalidOp,
                format!("trailing words after expression at offset {next}"),
            )
            .into());
        }
        Ok(expr)
    }

    /// Human-readable listing, one instruction per line, for diagnostics.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut pos = 0;
        while pos < self.0.len() {
            let word = self.0[pos];
            let (mnemonic, takes_operand) = match word {
                op::FORALL => ("forall", false),
                op::CONCRETE => ("concrete", false),
                op::HKT => ("hkt", false),
                op::IMPL => ("impl", false),
                op::HOLE => ("hole", true),
                op::REF => ("ref", true),
                op::VAR => ("var", true),
                op::FUN => ("fun", false),
                op::APPLY => ("apply", false),
                _ => ("??", false),
            };
            out.push_str(&format!("{pos:04x}  {mnemonic}"));
            if takes_operand {
                if let Some(&operand) = self.0.get(pos + 1) {
                    out.push_str(&format!(" {operand}"));
                    pos += 1;
                } else {
                    out.push_str(" <truncated>");
                }
            }
            out.push('\n');
            pos += 1;
        }
        out
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCode[")?;
        for (i, w) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{w:02x}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, w) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{w:02x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decoded expressions
// ---------------------------------------------------------------------------

/// Parameter descriptor attached to a decoded `Forall`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeParam {
    /// Unconstrained concrete parameter.
    Plain,
    /// Higher-kinded parameter with its declared kind.
    Kinded(Kind),
    /// Concrete parameter with one or more constraint terms.
    Constrained(Vec<CodeExpr>),
}

/// A decoded type-code expression.
///
/// `Fun` and `Apply` are binary here; the flat curried emission decodes to a
/// left-nested spine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeExpr {
    Forall {
        param: CodeParam,
        body: Box<CodeExpr>,
    },
    Fun(Box<CodeExpr>, Box<CodeExpr>),
    Apply(Box<CodeExpr>, Box<CodeExpr>),
    Hole(u16),
    Ref(u16),
    Var(u16),
}

impl CodeExpr {
    /// Re-emit this expression as an instruction sequence.
    ///
    /// `TypeCode::encode(expr.instrs())` reproduces the code the expression
    /// was decoded from, which is what the round-trip tests check.
    pub fn instrs(&self) -> Vec<Instr> {
        let mut out = Vec::new();
        self.emit(&mut out);
        out
    }

    fn emit(&self, out: &mut Vec<Instr>) {
        match self {
            CodeExpr::Forall { param, body } => {
                out.push(Instr::Forall);
                match param {
                    CodeParam::Plain => {}
                    CodeParam::Kinded(kind) => out.extend(kind.instrs()),
                    CodeParam::Constrained(terms) => {
                        for term in terms {
                            out.push(Instr::Impl);
                            term.emit(out);
                        }
                    }
                }
                body.emit(out);
            }
            CodeExpr::Fun(a, b) => {
                out.push(Instr::Fun);
                a.emit(out);
                b.emit(out);
            }
            CodeExpr::Apply(f, a) => {
                out.push(Instr::Apply);
                f.emit(out);
                a.emit(out);
            }
            CodeExpr::Hole(w) => out.push(Instr::Hole(*w as u32)),
            CodeExpr::Ref(w) => out.push(Instr::Ref(*w as u32)),
            CodeExpr::Var(w) => out.push(Instr::Var(*w as u32)),
        }
    }

    /// The head entity id of a left-nested application spine, if the spine
    /// bottoms out in a `Ref`.
    pub fn spine_head(&self) -> Option<u16> {
        match self {
            CodeExpr::Apply(f, _) => f.spine_head(),
            CodeExpr::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// LL decoder
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    words: &'a [u16],
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<u16> {
        self.words.get(self.pos).copied()
    }

    fn next(&mut self, context: &str) -> Result<u16, DiagnosticError> {
        let word = self.peek().ok_or_else(|| {
            DiagnosticError::from(Diagnostic::error(
                Category::UnexpectedEnd,
                format!("type code ends inside {context} at offset {}", self.pos),
            ))
        })?;
        self.pos += 1;
        Ok(word)
    }

    fn expr(&mut self) -> Result<CodeExpr, DiagnosticError> {
        let word = self.next("an expression")?;
        match word {
            op::FORALL => {
                let param = self.param()?;
                let body = self.expr()?;
                Ok(CodeExpr::Forall {
                    param,
                    body: Box::new(body),
                })
            }
            op::FUN => {
                let a = self.expr()?;
                let b = self.expr()?;
                Ok(CodeExpr::Fun(Box::new(a), Box::new(b)))
            }
            op::APPLY => {
                let f = self.expr()?;
                let a = self.expr()?;
                Ok(CodeExpr::Apply(Box::new(f), Box::new(a)))
            }
            op::HOLE => Ok(CodeExpr::Hole(self.next("a hole operand")?)),
            op::REF => Ok(CodeExpr::Ref(self.next("a ref operand")?)),
            op::VAR => Ok(CodeExpr::Var(self.next("a var operand")?)),
            op::CONCRETE | op::HKT | op::IMPL => Err(Diagnostic::error(
                Category::InvalidOp,
                format!(
                    "opcode {word:#04x} is a parameter descriptor, not an expression \
                     (offset {})",
                    self.pos - 1
                ),
            )
            .into()),
            other => Err(Diagnostic::error(
                Category::InvalidOp,
                format!("unknown opcode {other:#06x} at offset {}", self.pos - 1),
            )
            .into()),
        }
    }

    /// Optional parameter descriptor after a `Forall`: a kind, a run of
    /// `Impl` terms, or nothing (lookahead decides).
    fn param(&mut self) -> Result<CodeParam, DiagnosticError> {
        match self.peek() {
            Some(op::CONCRETE) | Some(op::HKT) => Ok(CodeParam::Kinded(self.kind()?)),
            Some(op::IMPL) => {
                let mut terms = Vec::new();
                while self.peek() == Some(op::IMPL) {
                    self.pos += 1;
                    terms.push(self.expr()?);
                }
                Ok(CodeParam::Constrained(terms))
            }
            _ => Ok(CodeParam::Plain),
        }
    }

    fn kind(&mut self) -> Result<Kind, DiagnosticError> {
        let word = self.next("a kind")?;
        match word {
            op::CONCRETE => Ok(Kind::Star),
            op::HKT => {
                let from = self.kind()?;
                let to = self.kind()?;
                Ok(Kind::arrow(from, to))
            }
            other => Err(Diagnostic::error(
                Category::InvalidOp,
                format!("expected a kind, found opcode {other:#04x} at offset {}", self.pos - 1),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serin_diag::Category;

    fn code(instrs: Vec<Instr>) -> TypeCode {
        TypeCode::encode(instrs).expect("test instructions encode")
    }

    #[test]
    fn encode_packs_operands_after_opcodes() {
        let c = code(vec![Instr::Apply, Instr::Ref(3), Instr::Var(0)]);
        assert_eq!(c.as_words(), &[0x08, 0x05, 3, 0x06, 0]);
    }

    #[test]
    fn encode_rejects_oversized_operands() {
        let err = TypeCode::encode(vec![Instr::Ref(0x1_0000)]).unwrap_err();
        assert_eq!(err.category(), Category::Overflow);
    }

    #[test]
    fn decode_mirrors_curried_apply_emission() {
        // Apply f a1 a2 = two Apply prefixes, then f, then the arguments:
        // decodes as the left-nested spine ((f a1) a2).
        let c = code(vec![
            Instr::Apply,
            Instr::Apply,
            Instr::Ref(7),
            Instr::Var(0),
            Instr::Var(1),
        ]);
        let expr = c.decode_all().unwrap();
        assert_eq!(
            expr,
            CodeExpr::Apply(
                Box::new(CodeExpr::Apply(
                    Box::new(CodeExpr::Ref(7)),
                    Box::new(CodeExpr::Var(0)),
                )),
                Box::new(CodeExpr::Var(1)),
            )
        );
        assert_eq!(expr.spine_head(), Some(7));
    }

    #[test]
    fn decode_forall_with_kind_descriptor() {
        let c = code(vec![
            Instr::Forall,
            Instr::Hkt,
            Instr::Concrete,
            Instr::Concrete,
            Instr::Var(0),
        ]);
        let expr = c.decode_all().unwrap();
        assert_eq!(
            expr,
            CodeExpr::Forall {
                param: CodeParam::Kinded(Kind::unary()),
                body: Box::new(CodeExpr::Var(0)),
            }
        );
    }

    #[test]
    fn decode_forall_with_constraint_run() {
        let c = code(vec![
            Instr::Forall,
            Instr::Impl,
            Instr::Ref(2),
            Instr::Impl,
            Instr::Ref(9),
            Instr::Var(0),
        ]);
        let CodeExpr::Forall { param, body } = c.decode_all().unwrap() else {
            panic!("forall expected");
        };
        assert_eq!(
            param,
            CodeParam::Constrained(vec![CodeExpr::Ref(2), CodeExpr::Ref(9)])
        );
        assert_eq!(*body, CodeExpr::Var(0));
    }

    #[test]
    fn reencoding_a_decoded_expression_reproduces_the_code() {
        let original = code(vec![
            Instr::Forall,
            Instr::Forall,
            Instr::Fun,
            Instr::Fun,
            Instr::Var(1),
            Instr::Var(0),
            Instr::Var(0),
        ]);
        let expr = original.decode_all().unwrap();
        assert_eq!(TypeCode::encode(expr.instrs()).unwrap(), original);
    }

    #[test]
    fn decode_rejects_kind_in_expression_position() {
        let c = code(vec![Instr::Concrete]);
        let err = c.decode_all().unwrap_err();
        assert_eq!(err.category(), Category::InvalidOp);
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        let c = TypeCode(vec![0x00abu16].into_boxed_slice());
        let err = c.decode(0).unwrap_err();
        assert_eq!(err.category(), Category::InvalidOp);
    }

    #[test]
    fn decode_reports_truncation() {
        let c = code(vec![Instr::Fun, Instr::Var(0)]);
        let err = c.decode(0).unwrap_err();
        assert_eq!(err.category(), Category::UnexpectedEnd);

        let c = TypeCode(vec![op::REF].into_boxed_slice());
        let err = c.decode(0).unwrap_err();
        assert_eq!(err.category(), Category::UnexpectedEnd);
    }

    #[test]
    fn decode_offset_resumes_mid_code() {
        let c = code(vec![Instr::Ref(1), Instr::Ref(2)]);
        let (first, next) = c.decode(0).unwrap();
        let (second, end) = c.decode(next).unwrap();
        assert_eq!(first, CodeExpr::Ref(1));
        assert_eq!(second, CodeExpr::Ref(2));
        assert_eq!(end, c.len());
    }

    #[test]
    fn ordering_is_word_lexicographic() {
        let a = code(vec![Instr::Ref(1)]);
        let b = code(vec![Instr::Ref(2)]);
        assert!(a < b);
    }

    mod roundtrip_props {
        use super::*;
        use proptest::prelude::*;

        fn arb_kind() -> impl Strategy<Value = Kind> {
            let leaf = Just(Kind::Star);
            leaf.prop_recursive(3, 8, 2, |inner| {
                (inner.clone(), inner).prop_map(|(a, b)| Kind::arrow(a, b))
            })
        }

        fn arb_expr() -> impl Strategy<Value = CodeExpr> {
            let leaf = prop_oneof![
                (0u16..64).prop_map(CodeExpr::Hole),
                (0u16..64).prop_map(CodeExpr::Ref),
                (0u16..8).prop_map(CodeExpr::Var),
            ];
            leaf.prop_recursive(4, 24, 3, |inner| {
                prop_oneof![
                    (inner.clone(), inner.clone())
                        .prop_map(|(a, b)| CodeExpr::Fun(Box::new(a), Box::new(b))),
                    (inner.clone(), inner.clone())
                        .prop_map(|(f, a)| CodeExpr::Apply(Box::new(f), Box::new(a))),
                    (arb_param(inner.clone()), inner).prop_map(|(param, body)| {
                        CodeExpr::Forall {
                            param,
                            body: Box::new(body),
                        }
                    }),
                ]
            })
        }

        fn arb_param(expr: BoxedStrategy<CodeExpr>) -> impl Strategy<Value = CodeParam> {
            prop_oneof![
                Just(CodeParam::Plain),
                arb_kind().prop_map(CodeParam::Kinded),
                prop::collection::vec(expr, 1..3).prop_map(CodeParam::Constrained),
            ]
        }

        proptest! {
            /// decode ∘ encode is the identity on instruction streams.
            #[test]
            fn decode_inverts_encode(expr in arb_expr()) {
                let code = TypeCode::encode(expr.instrs()).unwrap();
                let decoded = code.decode_all().unwrap();
                prop_assert_eq!(&decoded, &expr);
                prop_assert_eq!(TypeCode::encode(decoded.instrs()).unwrap(), code);
            }
        }
    }

    #[test]
    fn disassembly_lists_one_instruction_per_line() {
        let c = code(vec![
            Instr::Forall,
            Instr::Apply,
            Instr::Ref(3),
            Instr::Var(0),
        ]);
        insta::assert_snapshot!(c.disassemble(), @r"
        0000  forall
        0001  apply
        0002  ref 3
        0004  var 0
        ");
    }
}
