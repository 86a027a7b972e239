//! The access-kind resolver (C3): `type_access(expr, mode) -> AccessKind`.
//!
//! Classifies *how* a name or path is readable/writable before any of that
//! classification is lowered to a concrete typed node — field access
//! (`field_access.rs`), using-extensions (`using_resolver.rs`), and the
//! call-parameter matcher all consume an `AccessKind` rather than poking at
//! the untyped tree directly.

use ember_ast::{Pos, TypeDecl};

use crate::context::TypingContext;
use crate::error::{Outcome, TypeResult};
use crate::texpr::{TExpr, TNode};
use crate::ty::Ty;

/// Read/write/call mode a path is being resolved under. `Call` additionally
/// authorizes macro dispatch — a macro field can only ever be accessed in
/// `Call` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Get,
    Set,
    Call,
}

/// The tagged descriptor returned by the access resolver for any path+mode
/// triple (data model §3).
///
/// Invariants upheld by construction, never checked after the fact:
/// `Set`/`Macro` must never reach a read context without going through
/// `acc_get`'s lowering (`field_access.rs`); every `Expr` carries a fully
/// resolved type with no open monomorphs except a polymorphic `null`.
#[derive(Debug, Clone)]
pub enum AccessKind {
    /// Not readable/writable in the requested mode; carries the offending
    /// name for diagnostics.
    No(String),
    /// A plain typed expression node — the common case.
    Expr(TNode),
    /// Write-side deferred: must be combined with the RHS by the caller to
    /// emit the setter call. `field_name` is the underlying slot name
    /// (used by the self-accessor exception and by diagnostics).
    Set { receiver: Box<TNode>, setter_name: String, prop_type: Ty, field_name: String },
    /// A method to be inlined at the call/closure-synthesis site.
    Inline { receiver: Option<Box<TNode>>, field: String, ty: Ty },
    /// A macro call site: cannot be read or assigned, only called.
    Macro { receiver: Box<TNode>, field: String },
    /// An extension-method call with the first argument pre-bound.
    Using { applied_static: String, first_arg: Box<TNode> },
}

/// Keyword identifiers constant-folded directly to an expression, never
/// routed through ordinary identifier lookup.
pub fn type_keyword(ctx: &mut TypingContext, keyword: &str, mode: Mode, pos: &Pos) -> Option<TypeResult<AccessKind>> {
    match keyword {
        "true" | "false" if mode != Mode::Set => {
            let node = TNode::new(TExpr::Const(ember_ast::UConstant::Bool(keyword == "true")), Ty::bool(), pos.clone());
            Some(Ok(AccessKind::Expr(node)))
        }
        "true" | "false" => Some(Ok(AccessKind::No(keyword.to_string()))),
        "null" if mode != Mode::Set => {
            let ty = ctx.infer.fresh_var();
            let node = TNode::new(TExpr::Const(ember_ast::UConstant::Null), ty, pos.clone());
            Some(Ok(AccessKind::Expr(node)))
        }
        "null" => Some(Ok(AccessKind::No(keyword.to_string()))),
        "this" => Some(type_this(ctx, mode, pos)),
        "super" => Some(type_super(ctx, mode, pos)),
        _ => None,
    }
}

fn type_this(ctx: &mut TypingContext, mode: Mode, pos: &Pos) -> TypeResult<AccessKind> {
    if mode == Mode::Set {
        return Ok(AccessKind::No("this".to_string()));
    }
    if ctx.in_static {
        return Err(Outcome::Err(crate::error::TypeError::ThisOutsideInstance { span: pos.span }));
    }
    let ty = ctx.tthis.clone().unwrap_or(Ty::Dynamic);
    Ok(AccessKind::Expr(TNode::new(TExpr::Local("this".to_string()), ty, pos.clone())))
}

fn type_super(ctx: &mut TypingContext, mode: Mode, pos: &Pos) -> TypeResult<AccessKind> {
    if mode == Mode::Set {
        return Ok(AccessKind::No("super".to_string()));
    }
    let super_name = ctx
        .curclass
        .as_ref()
        .and_then(|name| ctx.registry.class(name))
        .and_then(|c| c.super_class.clone());
    if !ctx.in_super_call || super_name.is_none() {
        return Err(Outcome::Err(crate::error::TypeError::IllegalSuper { span: pos.span }));
    }
    let ty = Ty::named(super_name.unwrap(), Vec::new());
    Ok(AccessKind::Expr(TNode::new(TExpr::Local("super".to_string()), ty, pos.clone())))
}

/// Ordinary identifier lookup, in the precedence order fixed by §4.2:
/// local -> member field -> using-extension static -> static field ->
/// imported-enum constructor -> top-level type -> (if `untyped`) fresh
/// placeholder local, else `Unknown_ident`.
///
/// `allow_type` gates step 6 ("top-level type named `i`, when the grammar
/// context permits a type") — callers typing a value position pass `false`
/// so a bare class name isn't mistaken for an expression unless the
/// grammar position actually wants one (e.g. the receiver of a static call).
pub fn type_ident(ctx: &mut TypingContext, name: &str, mode: Mode, allow_type: bool, pos: &Pos) -> TypeResult<AccessKind> {
    // 1. Local variable.
    if let Some(ty) = ctx.lookup_local(name) {
        return Ok(AccessKind::Expr(TNode::new(TExpr::Local(name.to_string()), ty.clone(), pos.clone())));
    }

    // 2. Member field of the enclosing class (only outside static context).
    if !ctx.in_static {
        if let Some(class_name) = ctx.curclass.clone() {
            if let Some(class) = ctx.registry.class(&class_name).cloned() {
                if let Some(field) = class.find_field(name, false) {
                    let field = field.clone();
                    let this_node = TNode::new(TExpr::Local("this".to_string()), ctx.tthis.clone().unwrap_or(Ty::Dynamic), pos.clone());
                    return crate::field_access::field_access(ctx, mode, &field, Box::new(this_node), pos);
                }
            }
        }
    }

    // 3. Using-extension static method.
    if mode != Mode::Set {
        if let Some(this_ty) = ctx.tthis.clone() {
            if !ctx.in_static {
                let this_node = TNode::new(TExpr::Local("this".to_string()), this_ty, pos.clone());
                if let Some(found) = crate::using_resolver::using_field(ctx, mode, Box::new(this_node), name)? {
                    return Ok(found);
                }
            }
        }
    }

    // 4. Static field of the enclosing class.
    if let Some(class_name) = ctx.curclass.clone() {
        if let Some(class) = ctx.registry.class(&class_name).cloned() {
            if let Some(field) = class.find_field(name, true) {
                let field = field.clone();
                let type_node = TNode::new(TExpr::TypeRef(class.name.clone()), Ty::named(class.name.clone(), Vec::new()), pos.clone());
                return crate::field_access::field_access(ctx, mode, &field, Box::new(type_node), pos);
            }
        }
    }

    // 5. Constructor of any imported enum.
    if mode == Mode::Get || mode == Mode::Call {
        for decl in ctx.local_types.clone() {
            if let TypeDecl::Enum(en) = &decl {
                if let Some(ctor) = en.constructors.iter().find(|c| c.name == name) {
                    let enum_ty = Ty::named(en.name.clone(), en.type_params.iter().map(|_| ctx.infer.fresh_var()).collect());
                    if ctor.args.is_empty() {
                        return Ok(AccessKind::Expr(TNode::new(
                            TExpr::EnumCtor { enum_name: en.name.clone(), ctor: ctor.name.clone(), args: Vec::new() },
                            enum_ty,
                            pos.clone(),
                        )));
                    }
                    // A constructor with arguments, referenced bare (not
                    // called), types as a function value producing the enum.
                    let param_tys: Vec<Ty> = ctor.args.iter().map(|_| ctx.infer.fresh_var()).collect();
                    let fn_ty = Ty::fun(param_tys, enum_ty);
                    return Ok(AccessKind::Inline { receiver: None, field: format!("{}.{}", en.name, ctor.name), ty: fn_ty });
                }
            }
        }
    }

    // 6. Top-level type named `i`, only where the grammar permits a type.
    if allow_type {
        if let Some(decl) = ctx.registry.decl(name) {
            return Ok(AccessKind::Expr(TNode::new(TExpr::TypeRef(decl.name().to_string()), Ty::named(decl.name().to_string(), Vec::new()), pos.clone())));
        }
    }

    // 7. `untyped` escape, or failure.
    if ctx.untyped {
        tracing::warn!(identifier = name, "inventing placeholder local under untyped");
        let ty = ctx.infer.fresh_var();
        ctx.push_local(name.to_string(), ty.clone());
        return Ok(AccessKind::Expr(TNode::new(TExpr::Local(name.to_string()), ty, pos.clone())));
    }

    Err(Outcome::Err(crate::error::TypeError::UnknownIdent { name: name.to_string(), span: pos.span }))
}

/// Array subscript `e1[e2]`: produces an `Expr` of the element type,
/// determined primarily by array-access metadata walking the class
/// hierarchy, falling back to unifying `e1` with the array type.
pub fn type_array_access(ctx: &mut TypingContext, e1: TNode, e2: TNode, pos: &Pos) -> TypeResult<TNode> {
    use crate::error::ConstraintOrigin;

    ctx.infer
        .unify(e2.ty.clone(), Ty::int(), ConstraintOrigin::Builtin)
        .map_err(|e| Outcome::Err(e))?;

    let elem = if let Some(head) = e1.ty.head_name() {
        if head == "Array" {
            e1.ty.type_args().first().cloned().unwrap_or(Ty::Dynamic)
        } else if let Some(class) = ctx.registry.class(head).cloned() {
            array_access_elem_type(&class, ctx)
        } else {
            ctx.infer.fresh_var()
        }
    } else {
        ctx.infer.fresh_var()
    };

    if elem == Ty::Dynamic || matches!(elem, Ty::Var(_)) {
        let fresh = ctx.infer.fresh_var();
        let array_ty = Ty::array(fresh.clone());
        let _ = ctx.infer.unify(e1.ty.clone(), array_ty, ConstraintOrigin::Builtin);
    }

    Ok(TNode::new(TExpr::Index(Box::new(e1), Box::new(e2)), elem, pos.clone()))
}

/// Walk a class hierarchy looking for `cl_array_access` metadata (modeled
/// here as an `@:arrayAccess`-style marker on a `get(index)` method);
/// returns `Dynamic` if none is found, signalling the caller to fall back
/// to unifying the receiver with the array type instead.
fn array_access_elem_type(class: &ember_ast::ClassType, ctx: &mut TypingContext) -> Ty {
    for field in &class.fields {
        if field.name == "__get" {
            if let ember_ast::FieldKind::Method { ret, .. } = &field.kind {
                return crate::tyexpr::resolve_type_expr(ctx, ret);
            }
        }
    }
    Ty::Dynamic
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{ClassType, FixtureLoader, TypeParamDecl};

    fn root_ctx() -> TypingContext {
        let loader = FixtureLoader::new();
        TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap()
    }

    #[test]
    fn local_variable_wins_over_everything_else() {
        let mut ctx = root_ctx();
        ctx.push_local("x", Ty::int());
        let pos = Pos::synthetic();
        let result = type_ident(&mut ctx, "x", Mode::Get, false, &pos).unwrap();
        assert!(matches!(result, AccessKind::Expr(node) if node.ty == Ty::int()));
    }

    #[test]
    fn unknown_identifier_is_an_error_outside_untyped() {
        let mut ctx = root_ctx();
        let pos = Pos::synthetic();
        let result = type_ident(&mut ctx, "nope", Mode::Get, false, &pos);
        assert!(matches!(result, Err(Outcome::Err(crate::error::TypeError::UnknownIdent { .. }))));
    }

    #[test]
    fn untyped_mode_invents_a_placeholder_local() {
        let mut ctx = root_ctx();
        ctx.untyped = true;
        let pos = Pos::synthetic();
        let result = type_ident(&mut ctx, "mystery", Mode::Get, false, &pos).unwrap();
        assert!(matches!(result, AccessKind::Expr(_)));
        assert!(ctx.lookup_local("mystery").is_some());
    }

    #[test]
    fn this_is_illegal_in_static_context() {
        let mut ctx = root_ctx();
        ctx.in_static = true;
        let pos = Pos::synthetic();
        let result = type_this(&mut ctx, Mode::Get, &pos);
        assert!(matches!(result, Err(Outcome::Err(crate::error::TypeError::ThisOutsideInstance { .. }))));
    }

    #[test]
    fn super_requires_super_call_context_and_a_super_class() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(ClassType {
            name: "Base".into(),
            path: "Base".into(),
            type_params: Vec::<TypeParamDecl>::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: Vec::new(),
            constructor: None,
            is_extern: false,
            constructor_is_private: false,
        });
        ctx.curclass = Some("Base".to_string());
        ctx.in_super_call = true;
        let pos = Pos::synthetic();
        let result = type_super(&mut ctx, Mode::Get, &pos);
        assert!(matches!(result, Err(Outcome::Err(crate::error::TypeError::IllegalSuper { .. }))));
    }
}
