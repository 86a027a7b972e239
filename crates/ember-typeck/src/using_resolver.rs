//! The using-extension resolver (C7): `using_field(mode, receiver, name)`.
//!
//! Makes a static method usable as if it were an instance method of its
//! first parameter's type, via a declaration-scoped `using` import.
//! Resolution is first-match-in-declaration-order over `local_using` — an
//! invariant observable from the outside (§5 "ordering guarantees"), so
//! this function must never reorder or dedupe candidates.

use ember_ast::Pos;
use tracing::trace;

use crate::access::{AccessKind, Mode};
use crate::context::TypingContext;
use crate::error::TypeResult;
use crate::texpr::TNode;
use crate::ty::Ty;

/// Attempt to resolve `receiver.name` as a using-extension call.
///
/// Returns `Ok(None)` rather than an error when no candidate matches, since
/// "no using-extension found" is not itself a failure — the caller (the
/// ordinary identifier/field lookup in `access.rs`) falls through to its
/// next precedence step.
pub fn using_field(ctx: &mut TypingContext, mode: Mode, receiver: Box<TNode>, name: &str) -> TypeResult<Option<AccessKind>> {
    if mode == Mode::Set {
        return Ok(None);
    }

    for using_class in ctx.local_using.clone() {
        let Some(candidate) = using_class.statics.iter().find(|f| f.name == name).cloned() else {
            continue;
        };
        let ember_ast::FieldKind::Method { params, ret, has_self: _, .. } = &candidate.kind else {
            continue;
        };
        let Some(first_param) = params.first() else {
            continue;
        };

        let first_param_ty = crate::tyexpr::resolve_type_expr(ctx, first_param);
        let is_spurious_dynamic = matches!(first_param_ty, Ty::Dynamic) && matches!(ctx.infer.resolve(receiver.ty.clone()), Ty::Dynamic);

        let matched = !is_spurious_dynamic
            && ctx
                .infer
                .speculative(|infer| infer.unify(first_param_ty.clone(), receiver.ty.clone(), crate::error::ConstraintOrigin::UsingCandidate {
                    type_name: using_class.name.clone(),
                    method_name: name.to_string(),
                }))
                .is_ok();

        if matched {
            trace!(class = %using_class.name, method = name, "using-extension resolved");
            let ret_ty = crate::tyexpr::resolve_type_expr(ctx, ret);
            let rest_params: Vec<Ty> = params[1..].iter().map(|p| crate::tyexpr::resolve_type_expr(ctx, p)).collect();
            let applied_ty = Ty::fun(rest_params, ret_ty);
            let static_path = format!("{}.{}", using_class.name, name);
            return Ok(Some(AccessKind::Using { applied_static: static_path, first_arg: receiver }));
        }
    }

    let _ = Pos::synthetic();
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{ClassField, ClassType, FieldKind, FieldVisibility, MethodKind, ParamDecl, TypeParamDecl, UTypeExpr};

    fn root_ctx() -> TypingContext {
        let loader = ember_ast::FixtureLoader::new();
        TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap()
    }

    fn tools_class() -> ClassType {
        ClassType {
            name: "Tools".into(),
            path: "Tools".into(),
            type_params: Vec::<TypeParamDecl>::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: vec![ClassField {
                name: "len".into(),
                kind: FieldKind::Method {
                    kind: MethodKind::Normal,
                    params: vec![UTypeExpr::simple("String")],
                    ret: UTypeExpr::simple("Int"),
                    has_self: false,
                },
                visibility: FieldVisibility::Public,
                is_static: true,
            }],
            constructor: None,
            is_extern: false,
            constructor_is_private: false,
        }
    }

    #[test]
    fn resolves_first_compatible_static_method() {
        let mut ctx = root_ctx();
        ctx.local_using.push(tools_class());
        let receiver = TNode::new(crate::texpr::TExpr::Const(ember_ast::UConstant::String("abc".into())), Ty::string(), Pos::synthetic());
        let found = using_field(&mut ctx, Mode::Call, Box::new(receiver), "len").unwrap();
        assert!(matches!(found, Some(AccessKind::Using { applied_static, .. }) if applied_static == "Tools.len"));
    }

    #[test]
    fn set_mode_is_always_disallowed() {
        let mut ctx = root_ctx();
        ctx.local_using.push(tools_class());
        let receiver = TNode::new(crate::texpr::TExpr::Const(ember_ast::UConstant::String("abc".into())), Ty::string(), Pos::synthetic());
        let found = using_field(&mut ctx, Mode::Set, Box::new(receiver), "len").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn no_match_when_first_param_incompatible() {
        let mut ctx = root_ctx();
        ctx.local_using.push(tools_class());
        let receiver = TNode::new(crate::texpr::TExpr::Const(ember_ast::UConstant::Int(1)), Ty::int(), Pos::synthetic());
        let found = using_field(&mut ctx, Mode::Call, Box::new(receiver), "len").unwrap();
        assert!(found.is_none());
    }
}
