//! Type error taxonomy with provenance tracking (component of C1/C6/C8).
//!
//! Every type error carries a `ConstraintOrigin` recording where the
//! constraint was generated, so diagnostics can say "argument 2 of `add`
//! expected Int, found String" instead of a bare type mismatch.
//!
//! `Signal` is deliberately a *separate* type from `TypeError`: `Display`
//! and `TypePath` queries are control-transfer, not failures (design note
//! "`in_display` escape" — represented here as an `Outcome`-shaped result
//! rather than folding them into the error enum and forcing every caller to
//! treat them as something to report).

use std::fmt;

use ember_common::Span;

use crate::ty::{Ty, TyVar};

/// Where a type constraint came from — used to phrase diagnostics in terms
/// of the construct the programmer wrote, not the internal unification
/// call that happened to fire.
#[derive(Clone, Debug)]
pub enum ConstraintOrigin {
    FnArg { call_site: Span, param_idx: usize },
    BinOp { op_span: Span },
    UnOp { op_span: Span },
    IfBranches { if_span: Span, then_span: Span, else_span: Span },
    SwitchArms { arm_span: Span },
    Annotation { annotation_span: Span },
    Return { return_span: Span, fn_span: Span },
    LetBinding { binding_span: Span },
    Assignment { lhs_span: Span, rhs_span: Span },
    UsingCandidate { type_name: String, method_name: String },
    /// Synthetic origin for built-in constraints (arithmetic operators,
    /// context-factory bootstrap bindings).
    Builtin,
}

/// A type error encountered while typing an expression.
#[derive(Clone, Debug)]
pub enum TypeError {
    Mismatch { expected: Ty, found: Ty, origin: ConstraintOrigin },
    InfiniteType { var: TyVar, ty: Ty, origin: ConstraintOrigin },
    ArityMismatch { expected: usize, found: usize, origin: ConstraintOrigin },
    /// Identifier lookup exhausted every step of the access-kind resolver's
    /// precedence order (locals → member → using → static → enum ctor →
    /// type) without a match.
    UnknownIdent { name: String, span: Span },
    /// Prefix-greedy module-path resolution failed at the first
    /// capitalized segment.
    ModuleNotFound { path: String, first_segment: String, span: Span },
    /// Wraps a unification failure that occurred while matching a specific
    /// call argument, so the message can name the formal parameter.
    ArgumentError { param_name: String, index: usize, inner: Box<TypeError> },
    Custom { message: String, origin: ConstraintOrigin },
    NotAFunction { ty: Ty, span: Span },
    /// An anonymous type access (or a non-generic struct literal) is
    /// missing a field that's required on the other side of a unification.
    MissingField { field: String, on: Ty, origin: ConstraintOrigin },
    UnknownField { ty: Ty, field: String, span: Span },
    NoSuchMethod { ty: Ty, method: String, span: Span },
    IllegalSuper { span: Span },
    ThisOutsideInstance { span: Span },
    BreakOutsideLoop { span: Span },
    ContinueOutsideLoop { span: Span },
    InvalidAssignTarget { span: Span },
    MissingConstructor { ty: Ty, span: Span },
    PrivateConstructor { ty: Ty, span: Span },
    /// Switch/match over an enum did not cover every constructor; carries
    /// the missing constructor names for "Some constructors are not
    /// matched: X, Y"-shaped messages.
    NonExhaustiveMatch { missing: Vec<String>, span: Span },
    RedundantArm { span: Span },
    CannotCompare { left: Ty, right: Ty, origin: ConstraintOrigin },
    InvalidGuardExpression { span: Span },
    MixedMatchAndValueSwitch { span: Span },
    DuplicateCaseValue { span: Span },
    InconsistentPatternBindings { constructor: String, span: Span },
}

impl fmt::Display for ConstraintOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintOrigin::FnArg { param_idx, .. } => write!(f, "argument {}", param_idx + 1),
            ConstraintOrigin::BinOp { .. } => write!(f, "binary operator"),
            ConstraintOrigin::UnOp { .. } => write!(f, "unary operator"),
            ConstraintOrigin::IfBranches { .. } => write!(f, "if/else branches"),
            ConstraintOrigin::SwitchArms { .. } => write!(f, "switch/match arms"),
            ConstraintOrigin::Annotation { .. } => write!(f, "type annotation"),
            ConstraintOrigin::Return { .. } => write!(f, "return value"),
            ConstraintOrigin::LetBinding { .. } => write!(f, "let binding"),
            ConstraintOrigin::Assignment { .. } => write!(f, "assignment"),
            ConstraintOrigin::UsingCandidate { type_name, method_name } => {
                write!(f, "using-extension candidate {type_name}.{method_name}")
            }
            ConstraintOrigin::Builtin => write!(f, "builtin"),
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::Mismatch { expected, found, origin } => {
                write!(f, "type mismatch in {origin}: expected {expected}, found {found}")
            }
            TypeError::InfiniteType { ty, .. } => write!(f, "infinite type: variable occurs in {ty}"),
            TypeError::ArityMismatch { expected, found, origin } => {
                write!(f, "arity mismatch in {origin}: expected {expected} argument(s), found {found}")
            }
            TypeError::UnknownIdent { name, .. } => write!(f, "Unknown identifier: {name}"),
            TypeError::ModuleNotFound { path, first_segment, .. } => {
                write!(f, "Module not found: {first_segment} (resolving {path})")
            }
            TypeError::ArgumentError { param_name, index, inner } => {
                write!(f, "For optional/required argument '{param_name}' (position {index}): {inner}")
            }
            TypeError::Custom { message, .. } => write!(f, "{message}"),
            TypeError::NotAFunction { ty, .. } => write!(f, "cannot call a value of type {ty}"),
            TypeError::MissingField { field, on, .. } => write!(f, "missing field '{field}' on {on}"),
            TypeError::UnknownField { ty, field, .. } => write!(f, "{ty} has no field '{field}'"),
            TypeError::NoSuchMethod { ty, method, .. } => write!(f, "{ty} has no method '{method}'"),
            TypeError::IllegalSuper { .. } => write!(f, "super can only be used inside a super call context with a super class present"),
            TypeError::ThisOutsideInstance { .. } => write!(f, "cannot access this in a static context"),
            TypeError::BreakOutsideLoop { .. } => write!(f, "break outside of a loop"),
            TypeError::ContinueOutsideLoop { .. } => write!(f, "continue outside of a loop"),
            TypeError::InvalidAssignTarget { .. } => write!(f, "invalid assignment target"),
            TypeError::MissingConstructor { ty, .. } => write!(f, "{ty} has no constructor"),
            TypeError::PrivateConstructor { ty, .. } => write!(f, "{ty}'s constructor is private"),
            TypeError::NonExhaustiveMatch { missing, .. } => {
                write!(f, "Some constructors are not matched: {}", missing.join(", "))
            }
            TypeError::RedundantArm { .. } => write!(f, "this case is unreachable (already covered above)"),
            TypeError::CannotCompare { left, right, .. } => write!(f, "Cannot compare {left} and {right}"),
            TypeError::InvalidGuardExpression { .. } => write!(f, "guard expression must have type Bool"),
            TypeError::MixedMatchAndValueSwitch { .. } => write!(f, "cannot mix a constructor pattern into a value switch"),
            TypeError::DuplicateCaseValue { .. } => write!(f, "duplicate case value"),
            TypeError::InconsistentPatternBindings { constructor, .. } => {
                write!(f, "inconsistent bindings across alternatives of pattern {constructor}")
            }
        }
    }
}

impl std::error::Error for TypeError {}

/// Non-error control transfer produced by editor-integration queries.
/// Typing code that may trigger one propagates it exactly like an error
/// (via `?`) but a driver-level caller must not report it as a failure.
#[derive(Clone, Debug)]
pub enum Signal {
    /// A `display` query: the type synthesized at the query point, usually
    /// an anonymous type collecting the reachable fields.
    Display(Ty),
    /// A `TypePath` completion query over a dotted prefix.
    TypePath(String),
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Display(ty) => write!(f, "display query: {ty}"),
            Signal::TypePath(path) => write!(f, "type path query: {path}"),
        }
    }
}

/// The result of typing one node: either a plain error, or a non-error
/// signal that must unwind to the query's caller without being reported.
pub type TypeResult<T> = Result<T, Outcome>;

#[derive(Clone, Debug)]
pub enum Outcome {
    Err(TypeError),
    Signal(Signal),
}

impl From<TypeError> for Outcome {
    fn from(e: TypeError) -> Self {
        Outcome::Err(e)
    }
}

impl From<Signal> for Outcome {
    fn from(s: Signal) -> Self {
        Outcome::Signal(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_error_wraps_and_names_the_parameter() {
        let inner = TypeError::Mismatch { expected: Ty::int(), found: Ty::string(), origin: ConstraintOrigin::Builtin };
        let wrapped = TypeError::ArgumentError { param_name: "count".into(), index: 1, inner: Box::new(inner) };
        let msg = wrapped.to_string();
        assert!(msg.contains("'count'"));
        assert!(msg.contains("mismatch"));
    }

    #[test]
    fn non_exhaustive_match_lists_missing_constructors() {
        let err = TypeError::NonExhaustiveMatch { missing: vec!["None".into()], span: Span::synthetic() };
        assert_eq!(err.to_string(), "Some constructors are not matched: None");
    }

    #[test]
    fn signal_is_not_a_type_error() {
        let outcome: Outcome = Signal::Display(Ty::int()).into();
        assert!(matches!(outcome, Outcome::Signal(_)));
    }
}
