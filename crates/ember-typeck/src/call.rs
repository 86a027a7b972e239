//! The call-parameter matcher (C4): `unify_call_params(name, actuals,
//! formals, pos, inline) -> [typed actuals]`.
//!
//! Traverses formals left-to-right against actuals, typing each actual
//! with the formal's type as an expected-type hint (so function literals
//! passed as arguments can pick up their parameter types from context).
//! Optional formals get a skip-and-retry: if the current actual doesn't
//! unify against the current formal and the formal is optional, a default
//! value is synthesized for that formal and the same actual is retried
//! against the next one.

use ember_ast::{ParamDecl, Pos};

use crate::context::{Backend, TypingContext};
use crate::error::{ConstraintOrigin, Outcome, TypeError, TypeResult};
use crate::texpr::{TExpr, TNode};
use crate::ty::Ty;

/// One formal parameter's resolved type, paired with its declaration for
/// diagnostics and default-value synthesis.
pub struct ResolvedFormal {
    pub name: String,
    pub ty: Ty,
    pub optional: bool,
}

pub fn resolve_formals(ctx: &mut TypingContext, params: &[ParamDecl]) -> Vec<ResolvedFormal> {
    params
        .iter()
        .map(|p| ResolvedFormal { name: p.name.clone(), ty: crate::tyexpr::resolve_type_expr(ctx, &p.ty), optional: p.optional })
        .collect()
}

/// The distinguished `PosInfos` alias name: a formal of this type, left
/// unsupplied by the caller, is synthesized as a `(file, line, class,
/// method)` record rather than a bare `null`.
const POS_INFOS: &str = "PosInfos";

/// Elaborate a call's actual arguments against its formals.
///
/// `call_name` is used only for diagnostics. `inline` suppresses the
/// optional-tail trimming pass (inlined calls always keep every argument
/// slot, since there is no backend ABI boundary to trim for).
pub fn unify_call_params(
    ctx: &mut TypingContext,
    call_name: &str,
    actuals: Vec<UntypedArg>,
    formals: &[ResolvedFormal],
    pos: &Pos,
    inline: bool,
) -> TypeResult<Vec<TNode>> {
    let mut result: Vec<TNode> = Vec::with_capacity(formals.len());
    let mut actual_iter = actuals.into_iter().peekable();
    let mut formal_idx = 0;
    let mut skip_trail: Vec<(usize, TypeError)> = Vec::new();

    while formal_idx < formals.len() {
        let formal = &formals[formal_idx];

        let Some(actual) = actual_iter.peek() else {
            // Actuals exhausted before formals: fill remaining optionals
            // with defaults, or report a missing-argument error.
            if formal.optional {
                result.push(default_value(ctx, formal, call_name, pos));
                formal_idx += 1;
                continue;
            } else {
                return Err(Outcome::Err(TypeError::ArityMismatch {
                    expected: formals.len(),
                    found: result.len(),
                    origin: ConstraintOrigin::FnArg { call_site: pos.span, param_idx: formal_idx },
                }));
            }
        };

        let saved_param_type = ctx.param_type.take();
        ctx.param_type = Some(formal.ty.clone());
        let typed = actual.clone().type_with(ctx);
        ctx.param_type = saved_param_type;

        match typed {
            Ok(node) => {
                let unify_result = ctx.infer.unify(
                    formal.ty.clone(),
                    node.ty.clone(),
                    ConstraintOrigin::FnArg { call_site: pos.span, param_idx: formal_idx },
                );
                match unify_result {
                    Ok(()) => {
                        result.push(node);
                        actual_iter.next();
                        formal_idx += 1;
                    }
                    Err(e) => {
                        if formal.optional {
                            skip_trail.push((formal_idx, e));
                            result.push(default_value(ctx, formal, call_name, pos));
                            formal_idx += 1;
                        } else {
                            return Err(Outcome::Err(TypeError::ArgumentError {
                                param_name: formal.name.clone(),
                                index: formal_idx,
                                inner: Box::new(e),
                            }));
                        }
                    }
                }
            }
            Err(outcome) => return Err(outcome),
        }
    }

    // Formals exhausted before actuals: too many arguments, unless the
    // excess is explained by exactly one prior skip (in which case that
    // skip's own unification error is the more useful diagnostic).
    if actual_iter.peek().is_some() {
        if skip_trail.len() == 1 {
            let (idx, err) = skip_trail.into_iter().next().unwrap();
            return Err(Outcome::Err(TypeError::ArgumentError {
                param_name: formals[idx].name.clone(),
                index: idx,
                inner: Box::new(err),
            }));
        }
        let extra = actual_iter.count();
        return Err(Outcome::Err(TypeError::ArityMismatch {
            expected: formals.len(),
            found: formals.len() + extra,
            origin: ConstraintOrigin::FnArg { call_site: pos.span, param_idx: formals.len() },
        }));
    }

    if !inline && ctx.flags.backend.trims_trailing_null_args() {
        trim_trailing_null_args(&mut result);
    }

    Ok(result)
}

/// One caller-supplied actual argument, wrapped so it can be typed lazily
/// (with the formal's type installed as `ctx.param_type` first) and
/// re-typed on a skip-and-retry without re-parsing anything.
#[derive(Clone)]
pub struct UntypedArg {
    inner: std::rc::Rc<dyn Fn(&mut TypingContext) -> TypeResult<TNode>>,
}

impl UntypedArg {
    pub fn new(f: impl Fn(&mut TypingContext) -> TypeResult<TNode> + 'static) -> Self {
        UntypedArg { inner: std::rc::Rc::new(f) }
    }

    /// An actual that's already a typed node (the common case once the
    /// expression typer has run it once) — re-typing is a clone, not a
    /// re-infer, so a skip-and-retry never re-runs side-effecting typing
    /// logic on the same actual twice.
    pub fn already_typed(node: TNode) -> Self {
        UntypedArg::new(move |_ctx| Ok(node.clone()))
    }

    fn type_with(self, ctx: &mut TypingContext) -> TypeResult<TNode> {
        (self.inner)(ctx)
    }
}

/// Synthesize the value for an optional formal the caller didn't supply:
/// a `PosInfos` record built from the call site, or a typed `null`.
fn default_value(ctx: &mut TypingContext, formal: &ResolvedFormal, call_name: &str, pos: &Pos) -> TNode {
    if formal.ty.head_name() == Some(POS_INFOS) {
        // The typer only carries byte spans, not full source text, so the
        // real line number is left to whichever stage renders this record
        // against the source file; `span.start` is recorded as a
        // placeholder ordinal here.
        let infos = ember_ast::PosInfosValue {
            file: pos.file.clone(),
            line: pos.span.start,
            class: ctx.curclass.clone(),
            method: ctx.curmethod.clone().or_else(|| Some(call_name.to_string())),
        };
        let fields = vec![
            ("fileName".to_string(), TNode::new(TExpr::Const(ember_ast::UConstant::String(infos.file)), Ty::string(), pos.clone())),
            (
                "lineNumber".to_string(),
                TNode::new(TExpr::Const(ember_ast::UConstant::Int(infos.line as i64)), Ty::int(), pos.clone()),
            ),
            (
                "className".to_string(),
                TNode::new(TExpr::Const(ember_ast::UConstant::String(infos.class.unwrap_or_default())), Ty::string(), pos.clone()),
            ),
            (
                "methodName".to_string(),
                TNode::new(TExpr::Const(ember_ast::UConstant::String(infos.method.unwrap_or_default())), Ty::string(), pos.clone()),
            ),
        ];
        return TNode::new(TExpr::ObjectLit(fields), formal.ty.clone(), pos.clone());
    }
    TNode::new(TExpr::Const(ember_ast::UConstant::Null), formal.ty.clone(), pos.clone())
}

/// True when a typed node is a literal `null` — what the optional-tail
/// trimming pass looks for.
fn is_literal_null(node: &TNode) -> bool {
    matches!(node.expr, TExpr::Const(ember_ast::UConstant::Null))
}

/// Backends whose call ABI can't represent a trailing `null` argument drop
/// literal-null trailers from the emitted argument list; a literal null in
/// a non-trailing position is left alone (it still occupies a real slot).
fn trim_trailing_null_args(args: &mut Vec<TNode>) {
    while matches!(args.last(), Some(last) if is_literal_null(last)) {
        args.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{FixtureLoader, UTypeExpr};

    fn root_ctx() -> TypingContext {
        let loader = FixtureLoader::new();
        TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap()
    }

    fn int_arg(n: i64) -> UntypedArg {
        UntypedArg::already_typed(TNode::new(TExpr::Const(ember_ast::UConstant::Int(n)), Ty::int(), Pos::synthetic()))
    }

    fn string_arg(s: &str) -> UntypedArg {
        UntypedArg::already_typed(TNode::new(TExpr::Const(ember_ast::UConstant::String(s.into())), Ty::string(), Pos::synthetic()))
    }

    fn formals() -> Vec<ResolvedFormal> {
        vec![
            ResolvedFormal { name: "a".into(), ty: Ty::int(), optional: false },
            ResolvedFormal { name: "b".into(), ty: Ty::string(), optional: true },
            ResolvedFormal { name: "c".into(), ty: Ty::int(), optional: false },
        ]
    }

    #[test]
    fn s3_optional_argument_skip() {
        // f(1, 3) against f(a: Int, ?b: String, c: Int) elaborates to
        // f(1, null, 3) with the middle optional filled by a default.
        let mut ctx = root_ctx();
        let pos = Pos::synthetic();
        let result = unify_call_params(&mut ctx, "f", vec![int_arg(1), int_arg(3)], &formals(), &pos, false).unwrap();
        assert_eq!(result.len(), 3);
        assert!(is_literal_null(&result[1]));
        assert_eq!(result[2].ty, Ty::int());
    }

    #[test]
    fn s3_too_few_arguments_fails() {
        let mut ctx = root_ctx();
        let pos = Pos::synthetic();
        let result = unify_call_params(&mut ctx, "f", vec![int_arg(1), string_arg("x")], &formals(), &pos, false);
        assert!(result.is_err());
    }

    #[test]
    fn exact_match_does_not_skip_anything() {
        let mut ctx = root_ctx();
        let pos = Pos::synthetic();
        let result = unify_call_params(&mut ctx, "f", vec![int_arg(1), string_arg("x"), int_arg(3)], &formals(), &pos, false).unwrap();
        assert_eq!(result.len(), 3);
        assert!(!is_literal_null(&result[1]));
    }

    #[test]
    fn too_many_arguments_is_an_error() {
        let mut ctx = root_ctx();
        let pos = Pos::synthetic();
        let too_many = vec![int_arg(1), string_arg("x"), int_arg(3), int_arg(4)];
        let result = unify_call_params(&mut ctx, "f", too_many, &formals(), &pos, false);
        assert!(result.is_err());
    }

    #[test]
    fn pos_infos_formal_synthesizes_a_record() {
        let mut ctx = root_ctx();
        let pos = Pos::synthetic();
        let posinfos_formal = vec![ResolvedFormal { name: "pos".into(), ty: Ty::named("PosInfos", vec![]), optional: true }];
        let result = unify_call_params(&mut ctx, "trace", vec![], &posinfos_formal, &pos, false).unwrap();
        assert!(matches!(result[0].expr, TExpr::ObjectLit(_)));
    }

    #[test]
    fn trimming_backend_drops_trailing_null_but_keeps_interior_ones() {
        let mut ctx = root_ctx();
        ctx.flags.backend = Backend::Flash9;
        let pos = Pos::synthetic();
        let trailing_optional_formals = vec![
            ResolvedFormal { name: "a".into(), ty: Ty::int(), optional: false },
            ResolvedFormal { name: "b".into(), ty: Ty::string(), optional: true },
        ];
        let result = unify_call_params(&mut ctx, "f", vec![int_arg(1)], &trailing_optional_formals, &pos, false).unwrap();
        assert_eq!(result.len(), 1);
        let _ = UTypeExpr::simple("String");
    }
}
