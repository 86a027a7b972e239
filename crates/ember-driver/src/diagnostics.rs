//! Ariadne-rendered type-error reporting, mirroring `snowc`'s
//! `report_diagnostics`: a `Report` built from the error's span, labeled
//! with the error's own `Display` message, printed against the checked
//! file's source text.

use ariadne::{Label, Report, ReportKind, Source};
use ember_common::Span;

use ember_typeck::{ConstraintOrigin, TypeError};

/// The span most relevant to reporting `err` against source text. Recurses
/// through `ArgumentError` to the wrapped failure, since that's the one a
/// human actually needs to look at; every other variant carries its own
/// span or a `ConstraintOrigin` that does.
fn primary_span(err: &TypeError) -> Span {
    match err {
        TypeError::Mismatch { origin, .. }
        | TypeError::InfiniteType { origin, .. }
        | TypeError::ArityMismatch { origin, .. }
        | TypeError::MissingField { origin, .. }
        | TypeError::CannotCompare { origin, .. } => origin_span(origin),
        TypeError::UnknownIdent { span, .. }
        | TypeError::ModuleNotFound { span, .. }
        | TypeError::NotAFunction { span, .. }
        | TypeError::UnknownField { span, .. }
        | TypeError::NoSuchMethod { span, .. }
        | TypeError::IllegalSuper { span }
        | TypeError::ThisOutsideInstance { span }
        | TypeError::BreakOutsideLoop { span }
        | TypeError::ContinueOutsideLoop { span }
        | TypeError::InvalidAssignTarget { span }
        | TypeError::MissingConstructor { span, .. }
        | TypeError::PrivateConstructor { span, .. }
        | TypeError::NonExhaustiveMatch { span, .. }
        | TypeError::RedundantArm { span }
        | TypeError::InvalidGuardExpression { span }
        | TypeError::MixedMatchAndValueSwitch { span }
        | TypeError::DuplicateCaseValue { span }
        | TypeError::InconsistentPatternBindings { span, .. } => *span,
        TypeError::ArgumentError { inner, .. } => primary_span(inner),
        TypeError::Custom { .. } => Span::synthetic(),
    }
}

fn origin_span(origin: &ConstraintOrigin) -> Span {
    match origin {
        ConstraintOrigin::FnArg { call_site, .. } => *call_site,
        ConstraintOrigin::BinOp { op_span } => *op_span,
        ConstraintOrigin::UnOp { op_span } => *op_span,
        ConstraintOrigin::IfBranches { if_span, .. } => *if_span,
        ConstraintOrigin::SwitchArms { arm_span } => *arm_span,
        ConstraintOrigin::Annotation { annotation_span } => *annotation_span,
        ConstraintOrigin::Return { return_span, .. } => *return_span,
        ConstraintOrigin::LetBinding { binding_span } => *binding_span,
        ConstraintOrigin::Assignment { lhs_span, .. } => *lhs_span,
        ConstraintOrigin::UsingCandidate { .. } | ConstraintOrigin::Builtin => Span::synthetic(),
    }
}

/// Render one type error as an ariadne report against `source`/`file_name`.
pub fn render(err: &TypeError, source: &str, file_name: &str) -> String {
    let span = primary_span(err);
    let start = span.start as usize;
    let end = (span.end as usize).max(start + 1).min(source.len().max(start + 1));
    let message = err.to_string();

    let mut buf = Vec::new();
    let result = Report::<std::ops::Range<usize>>::build(ReportKind::Error, start..end)
        .with_message("Type error")
        .with_label(Label::new(start..end).with_message(&message))
        .finish()
        .write(Source::from(source), &mut buf);

    match result {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        // Ariadne needs a span genuinely inside `source`; degrade to a
        // plain line rather than lose the diagnostic when it isn't (e.g. a
        // `Custom`/`Builtin`-origin error with only a synthetic span).
        Err(_) => format!("{file_name}: {message}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_common::Span;
    use ember_typeck::Ty;

    #[test]
    fn renders_a_mismatch_against_its_origin_span() {
        let err = TypeError::Mismatch {
            expected: Ty::int(),
            found: Ty::string(),
            origin: ConstraintOrigin::BinOp { op_span: Span::new(2, 4) },
        };
        let rendered = render(&err, "1 + \"x\"", "snippet");
        assert!(rendered.contains("expected"));
    }

    #[test]
    fn falls_back_to_plain_text_for_a_synthetic_span() {
        let err = TypeError::Custom { message: "something went wrong".into(), origin: ConstraintOrigin::Builtin };
        let rendered = render(&err, "", "snippet");
        insta::assert_snapshot!(rendered.trim_end(), @"snippet: something went wrong");
    }

    #[test]
    fn snapshots_a_module_not_found_diagnostic() {
        let err = TypeError::ModuleNotFound { path: "Foo.Bar".into(), first_segment: "Foo".into(), span: Span::synthetic() };
        let rendered = render(&err, "", "snippet");
        insta::assert_snapshot!(rendered.trim_end(), @"snippet: Module not found: Foo (resolving Foo.Bar)");
    }
}
