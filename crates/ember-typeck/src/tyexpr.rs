//! Resolves an unresolved [`UTypeExpr`] annotation into a concrete [`Ty`].
//!
//! This is the one place every component goes through to turn a written
//! type annotation into the algebraic representation the unifier works
//! over: field types, parameter/return types, cast targets, catch-variable
//! types. Type parameters currently in scope resolve to a bare `Con`
//! carrying their own name (`Ty::type_param`); everything else either names
//! a primitive, a registered class/enum, or is dynamic.

use ember_ast::{Pos, UTypeExpr};

use crate::context::TypingContext;
use crate::ty::{AnonType, AnonStatus, Ty};

pub fn resolve_type_expr(ctx: &mut TypingContext, annotation: &UTypeExpr) -> Ty {
    match annotation {
        UTypeExpr::Dynamic(None) => Ty::Dynamic,
        UTypeExpr::Dynamic(Some(inner)) => resolve_type_expr(ctx, inner),
        UTypeExpr::Function(params, ret) => {
            let params = params.iter().map(|p| resolve_type_expr(ctx, p)).collect();
            let ret = resolve_type_expr(ctx, ret);
            Ty::fun(params, ret)
        }
        UTypeExpr::Anonymous(fields) => {
            let fields = fields.iter().map(|(n, t)| (n.clone(), resolve_type_expr(ctx, t))).collect();
            Ty::Anonymous(AnonType { fields, status: AnonStatus::Closed })
        }
        UTypeExpr::Path(name, args) => resolve_named(ctx, name, args),
    }
}

fn resolve_named(ctx: &mut TypingContext, name: &str, args: &[UTypeExpr]) -> Ty {
    match name {
        "Int" => return Ty::int(),
        "Float" => return Ty::float(),
        "String" => return Ty::string(),
        "Bool" => return Ty::bool(),
        "Void" => return Ty::void(),
        "Dynamic" => return Ty::Dynamic,
        "Null" => {
            let inner = args.first().map(|a| resolve_type_expr(ctx, a)).unwrap_or(Ty::Dynamic);
            return ctx.lift_nullable(Ty::nullable(inner));
        }
        "Array" => {
            let inner = args.first().map(|a| resolve_type_expr(ctx, a)).unwrap_or_else(|| ctx.infer.fresh_var());
            return Ty::array(inner);
        }
        _ => {}
    }
    if ctx.type_params.iter().any(|p| p == name) {
        return Ty::type_param(name);
    }
    if let Some(alias) = ctx.registry.lookup_alias(name) {
        return alias.aliased_type.clone();
    }
    // Not a primitive, a type parameter in scope, or a registered alias —
    // consult the loader before giving up on it being a known declaration,
    // so a field access on the resulting `Ty` can later find its fields.
    if ctx.registry.decl(name).is_none() {
        let annotation = UTypeExpr::Path(name.to_string(), args.to_vec());
        if let Ok(decl) = ctx.load_instance(&annotation, &Pos::synthetic(), true) {
            ctx.registry.register_decl(decl);
        }
    }
    let resolved_args: Vec<Ty> = args.iter().map(|a| resolve_type_expr(ctx, a)).collect();
    Ty::named(name.to_string(), resolved_args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::FixtureLoader;

    fn root_ctx() -> TypingContext {
        let loader = FixtureLoader::new();
        TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap()
    }

    #[test]
    fn resolves_primitives() {
        let mut ctx = root_ctx();
        assert_eq!(resolve_type_expr(&mut ctx, &UTypeExpr::simple("Int")), Ty::int());
        assert_eq!(resolve_type_expr(&mut ctx, &UTypeExpr::simple("String")), Ty::string());
    }

    #[test]
    fn resolves_in_scope_type_parameter() {
        let mut ctx = root_ctx();
        ctx.type_params.push("T".to_string());
        assert_eq!(resolve_type_expr(&mut ctx, &UTypeExpr::simple("T")), Ty::type_param("T"));
    }

    #[test]
    fn resolves_array_of_int() {
        let mut ctx = root_ctx();
        let ann = UTypeExpr::Path("Array".into(), vec![UTypeExpr::simple("Int")]);
        assert_eq!(resolve_type_expr(&mut ctx, &ann), Ty::array(Ty::int()));
    }

    #[test]
    fn unregistered_name_is_resolved_through_the_loader() {
        use ember_ast::{ClassType, TypeDecl, TypeParamDecl};

        let mut loader = FixtureLoader::new();
        loader.register_decl(TypeDecl::Class(ClassType {
            name: "Tools".into(),
            path: "Tools".into(),
            type_params: Vec::<TypeParamDecl>::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: Vec::new(),
            constructor: None,
            is_extern: false,
            constructor_is_private: false,
        }));
        let mut ctx = TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap();

        assert!(ctx.registry.decl("Tools").is_none());
        let ty = resolve_type_expr(&mut ctx, &UTypeExpr::simple("Tools"));
        assert_eq!(ty, Ty::named("Tools".to_string(), Vec::new()));
        assert!(ctx.registry.decl("Tools").is_some());
    }
}
