//! The expression typer (C6): `type_expr(node, need_val) -> TNode`.
//!
//! The single entry point that drives every other component in this crate:
//! identifiers and field paths go through `access.rs`/`field_access.rs`,
//! calls go through `call.rs`, using-extensions through `using_resolver.rs`,
//! numeric operator typing through `kind.rs`, enum-match coverage through
//! `exhaustiveness.rs`. Nothing here re-derives a rule one of those modules
//! already owns.
//!
//! `need_val` mirrors `UExpr::Switch`'s own flag (§4.5a): a block, if, or
//! switch typed with `need_val = false` always types as `Void`, even when
//! its arms disagree or produce a value nobody reads — this is what lets a
//! statement-position `if` skip the branch-unification that an
//! expression-position ternary can't.

use std::collections::HashMap;

use ember_ast::{
    BinOp, ClassField, ClassType, EnumConstructor, EnumType, FieldKind, UCase, UCasePattern, UConstant, UExpr, UFunctionLit, UNode, UParam,
    USubPattern, UTypeExpr, UnOp,
};
use ember_common::Span;

use crate::access::{self, AccessKind, Mode};
use crate::call;
use crate::context::TypingContext;
use crate::error::{ConstraintOrigin, Outcome, TypeError, TypeResult};
use crate::exhaustiveness;
use crate::field_access;
use crate::kind::{self, Kind};
use crate::texpr::{TCatch, TEnumArm, TExpr, TFunctionLit, TNode, TValueArm};
use crate::ty::{AnonStatus, AnonType, Ty};
use crate::tyexpr;
use crate::using_resolver;

/// Type one untyped node. `need_val` is `false` for a statement whose
/// result is discarded (the common case for everything but the last
/// statement of a value-producing block).
pub fn type_expr(ctx: &mut TypingContext, node: &UNode, need_val: bool) -> TypeResult<TNode> {
    let pos = &node.pos;
    match &node.expr {
        UExpr::Const(c) => Ok(type_const(ctx, c, pos)),
        UExpr::This => acc_get_keyword(ctx, "this", pos),
        UExpr::Super => acc_get_keyword(ctx, "super", pos),
        UExpr::Ident(name) if matches!(name.as_str(), "true" | "false" | "null") => acc_get_keyword(ctx, name, pos),
        UExpr::Ident(name) => {
            let ak = access::type_ident(ctx, name, Mode::Get, true, pos)?;
            field_access::acc_get(ctx, ak, pos)
        }
        UExpr::Field(base, name) => {
            let ak = type_field_path(ctx, base, name, Mode::Get, pos)?;
            field_access::acc_get(ctx, ak, pos)
        }
        UExpr::Index(a, b) => {
            let ta = type_expr(ctx, a, true)?;
            let tb = type_expr(ctx, b, true)?;
            access::type_array_access(ctx, ta, tb, pos)
        }
        UExpr::ArrayLit(items) => type_array_lit(ctx, items, pos),
        UExpr::ObjectLit(fields) => type_object_lit(ctx, fields, pos),
        UExpr::Block(stmts) => type_block(ctx, stmts, need_val, pos),
        UExpr::Var { name, ty, init, is_static } => type_var(ctx, name, ty.as_ref(), init.as_deref(), *is_static, pos),
        UExpr::If { cond, then_branch, else_branch } => type_if(ctx, cond, then_branch, else_branch.as_deref(), need_val, pos),
        UExpr::While { cond, body, do_while } => type_while(ctx, cond, body, *do_while, pos),
        UExpr::For { var_name, iterable, body } => type_for(ctx, var_name, iterable, body, pos),
        UExpr::Switch { subject, cases, default, need_val: nv } => type_switch(ctx, subject, cases, default.as_deref(), *nv, pos),
        UExpr::Ternary { cond, then_branch, else_branch } => type_ternary(ctx, cond, then_branch, else_branch, pos),
        UExpr::Return(e) => type_return(ctx, e.as_deref(), pos),
        UExpr::Break => {
            if !ctx.in_loop {
                return Err(Outcome::Err(TypeError::BreakOutsideLoop { span: pos.span }));
            }
            Ok(TNode::new(TExpr::Break, Ty::Never, pos.clone()))
        }
        UExpr::Continue => {
            if !ctx.in_loop {
                return Err(Outcome::Err(TypeError::ContinueOutsideLoop { span: pos.span }));
            }
            Ok(TNode::new(TExpr::Continue, Ty::Never, pos.clone()))
        }
        UExpr::Throw(e) => {
            let te = type_expr(ctx, e, true)?;
            Ok(TNode::new(TExpr::Throw(Box::new(te)), Ty::Never, pos.clone()))
        }
        UExpr::Try { body, catches } => type_try(ctx, body, catches, pos),
        UExpr::Function(f) => type_function_lit(ctx, f, pos),
        UExpr::New { path, type_args, args } => type_new(ctx, path, type_args, args, pos),
        UExpr::Unop { op, operand, postfix } => type_unop(ctx, *op, operand, *postfix, pos),
        UExpr::Binop { op, lhs, rhs } => type_binop(ctx, *op, lhs, rhs, pos),
        UExpr::Assign { lhs, rhs } => type_assign(ctx, lhs, rhs, pos),
        UExpr::OpAssign { op, lhs, rhs } => type_op_assign(ctx, *op, lhs, rhs, pos),
        UExpr::Call { callee, args } => type_call(ctx, callee, args, pos),
        UExpr::Cast { expr, ty } => type_cast(ctx, expr, ty.as_ref(), pos),
        UExpr::Untyped(inner) => type_untyped(ctx, inner, pos),
        UExpr::Display(inner) => type_display(ctx, inner, pos),
    }
}

fn acc_get_keyword(ctx: &mut TypingContext, keyword: &str, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let ak = access::type_keyword(ctx, keyword, Mode::Get, pos).expect("keyword dispatch covers this name")?;
    field_access::acc_get(ctx, ak, pos)
}

fn type_const(ctx: &mut TypingContext, c: &UConstant, pos: &ember_ast::Pos) -> TNode {
    match c {
        UConstant::Int(v) => TNode::new(TExpr::Const(UConstant::Int(*v)), Ty::int(), pos.clone()),
        UConstant::Float(v) => TNode::new(TExpr::Const(UConstant::Float(*v)), Ty::float(), pos.clone()),
        UConstant::String(s) => TNode::new(TExpr::Const(UConstant::String(s.clone())), Ty::string(), pos.clone()),
        UConstant::Bool(b) => TNode::new(TExpr::Const(UConstant::Bool(*b)), Ty::bool(), pos.clone()),
        UConstant::Null => TNode::new(TExpr::Const(UConstant::Null), ctx.infer.fresh_var(), pos.clone()),
    }
}

// ── Receivers and field paths ───────────────────────────────────────────

/// Type a receiver expression once, so a `Field`/index path built on top of
/// it (a plain read, or the get-half and set-half of a compound assignment)
/// never re-evaluates the subexpression that produced it.
fn type_receiver(ctx: &mut TypingContext, node: &UNode) -> TypeResult<TNode> {
    match &node.expr {
        UExpr::Field(base, name) => {
            let ak = type_field_path(ctx, base, name, Mode::Get, &node.pos)?;
            field_access::acc_get(ctx, ak, &node.pos)
        }
        UExpr::Ident(name) => {
            let ak = access::type_ident(ctx, name, Mode::Get, true, &node.pos)?;
            field_access::acc_get(ctx, ak, &node.pos)
        }
        _ => type_expr(ctx, node, true),
    }
}

/// Flatten a left-associative `Field`/`Ident` chain into its dotted
/// segments, each carrying its own position. `None` if the chain holds
/// anything else partway through (a call, an index, a literal) — never a
/// module path, so the caller skips straight to plain expression typing.
fn flatten_dotted_path(node: &UNode) -> Option<Vec<(String, ember_ast::Pos)>> {
    match &node.expr {
        UExpr::Ident(name) => Some(vec![(name.clone(), node.pos.clone())]),
        UExpr::Field(base, name) => {
            let mut segments = flatten_dotted_path(base)?;
            segments.push((name.clone(), node.pos.clone()));
            Some(segments)
        }
        _ => None,
    }
}

fn type_field_path(ctx: &mut TypingContext, base: &UNode, name: &str, mode: Mode, pos: &ember_ast::Pos) -> TypeResult<AccessKind> {
    if let Some(mut chain) = flatten_dotted_path(base) {
        chain.push((name.to_string(), pos.clone()));
        if let Some(ak) = try_module_path(ctx, &chain, mode)? {
            return Ok(ak);
        }
    }

    match type_receiver(ctx, base) {
        Ok(receiver) => resolve_field_access(ctx, receiver, name, mode, pos),
        Err(Outcome::Err(TypeError::UnknownIdent { name: ident_name, span })) => {
            Err(Outcome::Err(module_not_found_or_unknown_ident(base, ident_name, span)))
        }
        Err(other) => Err(other),
    }
}

/// When the base of a field path fails to resolve at its own root — the
/// very first identifier of the chain — and that identifier is
/// capitalized, report a failed module-path resolution instead of a plain
/// unknown identifier (spec.md:95/249).
fn module_not_found_or_unknown_ident(base: &UNode, ident_name: String, span: Span) -> TypeError {
    if let Some(chain) = flatten_dotted_path(base) {
        if let Some((first_name, first_pos)) = chain.first() {
            if *first_name == ident_name && first_pos.span == span && first_name.chars().next().is_some_and(|c| c.is_uppercase()) {
                let path = chain.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(".");
                return TypeError::ModuleNotFound { path, first_segment: first_name.clone(), span };
            }
        }
    }
    TypeError::UnknownIdent { name: ident_name, span }
}

/// spec.md:95 — prefix-greedy module-path resolution. Tries every prefix
/// of `chain` longest-to-shortest as a module path; the first prefix that
/// both loads as a module and has a declaration matching the next segment
/// commits, folding any further suffix through ordinary field resolution.
/// `Ok(None)` means no prefix matched, so the caller falls back to
/// expression-then-field.
fn try_module_path(ctx: &mut TypingContext, chain: &[(String, ember_ast::Pos)], mode: Mode) -> TypeResult<Option<AccessKind>> {
    if chain.len() < 2 {
        return Ok(None);
    }
    let (first_name, _) = &chain[0];
    if !first_name.chars().next().is_some_and(|c| c.is_uppercase()) {
        return Ok(None);
    }
    if ctx.lookup_local(first_name).is_some() {
        return Ok(None);
    }

    for prefix_len in (1..chain.len()).rev() {
        let path = chain[..prefix_len].iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(".");
        let load_pos = chain[prefix_len - 1].1.clone();
        let Ok(mut module) = ctx.load_module(&path, &load_pos) else { continue };

        let type_name = chain[prefix_len].0.clone();
        let Some(decl) = module.decls.remove(&type_name) else { continue };
        ctx.registry.register_decl(decl);
        for other in module.decls.into_values() {
            ctx.registry.register_decl(other);
        }

        let type_pos = chain[prefix_len].1.clone();
        let mut receiver = TNode::new(TExpr::TypeRef(type_name.clone()), Ty::named(type_name, Vec::new()), type_pos);
        let remaining = &chain[prefix_len + 1..];
        if remaining.is_empty() {
            return Ok(Some(AccessKind::Expr(receiver)));
        }
        for (idx, (seg_name, seg_pos)) in remaining.iter().enumerate() {
            let is_last = idx + 1 == remaining.len();
            let seg_mode = if is_last { mode } else { Mode::Get };
            let ak = resolve_field_access(ctx, receiver, seg_name, seg_mode, seg_pos)?;
            if is_last {
                return Ok(Some(ak));
            }
            receiver = field_access::acc_get(ctx, ak, seg_pos)?;
        }
        unreachable!("remaining is non-empty, loop always returns on its last iteration");
    }

    Ok(None)
}

/// Look up `name` on an already-typed `receiver`, whether it's a value
/// (instance field/method/using-extension) or a bare type reference
/// (static field, or enum constructor).
fn resolve_field_access(ctx: &mut TypingContext, receiver: TNode, name: &str, mode: Mode, pos: &ember_ast::Pos) -> TypeResult<AccessKind> {
    if let TExpr::TypeRef(type_name) = &receiver.expr {
        let type_name = type_name.clone();
        if let Some(class) = ctx.registry.class(&type_name).cloned() {
            if let Some(field) = class.find_field(name, true) {
                return field_access::field_access(ctx, mode, field, Box::new(receiver), pos);
            }
        }
        if let Some(en) = ctx.registry.enum_(&type_name).cloned() {
            if let Some(ctor) = en.constructors.iter().find(|c| c.name == name) {
                return Ok(enum_ctor_access(ctx, &en, ctor));
            }
        }
        return Err(Outcome::Err(TypeError::UnknownField { ty: receiver.ty.clone(), field: name.to_string(), span: pos.span }));
    }

    let resolved = ctx.infer.resolve(receiver.ty.clone());
    if let Some(class_name) = resolved.head_name() {
        if let Some(class) = ctx.registry.class(class_name).cloned() {
            if let Some(field) = class.find_field(name, false) {
                return field_access::field_access(ctx, mode, field, Box::new(receiver), pos);
            }
        }
    }

    if mode != Mode::Set {
        if let Some(found) = using_resolver::using_field(ctx, mode, Box::new(receiver.clone()), name)? {
            return Ok(found);
        }
    }

    if matches!(resolved, Ty::Dynamic) {
        return Ok(AccessKind::Expr(TNode::new(TExpr::Field { receiver: Box::new(receiver), name: name.to_string() }, Ty::Dynamic, pos.clone())));
    }

    Err(Outcome::Err(TypeError::UnknownField { ty: receiver.ty, field: name.to_string(), span: pos.span }))
}

/// A bare (uncalled) reference to an enum constructor: a value directly for
/// a zero-arity constructor, or a callable closure-like value otherwise.
fn enum_ctor_access(ctx: &mut TypingContext, en: &EnumType, ctor: &EnumConstructor) -> AccessKind {
    let enum_ty_args: Vec<Ty> = en.type_params.iter().map(|_| ctx.infer.fresh_var()).collect();
    if ctor.args.is_empty() {
        let enum_ty = Ty::named(en.name.clone(), enum_ty_args);
        return AccessKind::Expr(TNode::new(
            TExpr::EnumCtor { enum_name: en.name.clone(), ctor: ctor.name.clone(), args: Vec::new() },
            enum_ty,
            ember_ast::Pos::synthetic(),
        ));
    }
    let field_tys = enum_ctor_field_types(ctx, en, &ctor.name, &enum_ty_args);
    let fn_ty = Ty::fun(field_tys, Ty::named(en.name.clone(), enum_ty_args));
    AccessKind::Inline { receiver: None, field: format!("{}.{}", en.name, ctor.name), ty: fn_ty }
}

/// Resolve an enum constructor's declared argument types, substituting the
/// enum's own type parameters with the concrete arguments carried by this
/// particular instantiation (`Option<Shape>`'s `Some` carries `Shape`, not
/// the bare parameter `T`).
fn enum_ctor_field_types(ctx: &mut TypingContext, en: &EnumType, ctor_name: &str, enum_ty_args: &[Ty]) -> Vec<Ty> {
    let Some(ctor) = en.constructors.iter().find(|c| c.name == ctor_name) else {
        return Vec::new();
    };
    let subst: HashMap<String, Ty> = en.type_params.iter().map(|p| p.name.clone()).zip(enum_ty_args.iter().cloned()).collect();
    ctor.args
        .iter()
        .map(|(_, ty_expr)| {
            let resolved = tyexpr::resolve_type_expr(ctx, ty_expr);
            subst_type_param_names(resolved, &subst)
        })
        .collect()
}

fn subst_type_param_names(ty: Ty, subst: &HashMap<String, Ty>) -> Ty {
    match ty {
        Ty::Con(c) => subst.get(&c.name).cloned().unwrap_or(Ty::Con(c)),
        Ty::App(con, args) => {
            let args: Vec<Ty> = args.into_iter().map(|a| subst_type_param_names(a, subst)).collect();
            if let Ty::Con(c) = con.as_ref() {
                if args.is_empty() {
                    if let Some(replacement) = subst.get(&c.name) {
                        return replacement.clone();
                    }
                }
            }
            Ty::App(Box::new(subst_type_param_names(*con, subst)), args)
        }
        Ty::Fun(params, ret) => {
            Ty::Fun(params.into_iter().map(|p| subst_type_param_names(p, subst)).collect(), Box::new(subst_type_param_names(*ret, subst)))
        }
        Ty::Tuple(elems) => Ty::Tuple(elems.into_iter().map(|e| subst_type_param_names(e, subst)).collect()),
        Ty::Null(inner) => Ty::Null(Box::new(subst_type_param_names(*inner, subst))),
        Ty::Anonymous(anon) => Ty::Anonymous(AnonType {
            fields: anon.fields.into_iter().map(|(n, t)| (n, subst_type_param_names(t, subst))).collect(),
            status: anon.status,
        }),
        other => other,
    }
}

fn class_is_ancestor_or_self(ctx: &TypingContext, ancestor: &str, from: &str) -> bool {
    if ancestor == from {
        return true;
    }
    let mut current = ctx.registry.class(from).and_then(|c| c.super_class.clone());
    while let Some(name) = current {
        if name == ancestor {
            return true;
        }
        current = ctx.registry.class(&name).and_then(|c| c.super_class.clone());
    }
    false
}

// ── Literals ─────────────────────────────────────────────────────────────

fn type_array_lit(ctx: &mut TypingContext, items: &[UNode], pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let elem_ty = ctx.infer.fresh_var();
    let mut typed_items = Vec::with_capacity(items.len());
    for item in items {
        let t = type_expr(ctx, item, true)?;
        ctx.infer.unify(elem_ty.clone(), t.ty.clone(), ConstraintOrigin::Builtin).map_err(Outcome::Err)?;
        typed_items.push(t);
    }
    Ok(TNode::new(TExpr::ArrayLit(typed_items), Ty::array(elem_ty), pos.clone()))
}

fn type_object_lit(ctx: &mut TypingContext, fields: &[(String, UNode)], pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let mut typed = Vec::with_capacity(fields.len());
    let mut anon_fields = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        let t = type_expr(ctx, value, true)?;
        anon_fields.push((name.clone(), t.ty.clone()));
        typed.push((name.clone(), t));
    }
    let ty = Ty::Anonymous(AnonType { fields: anon_fields, status: AnonStatus::Const });
    Ok(TNode::new(TExpr::ObjectLit(typed), ty, pos.clone()))
}

// ── Statements and control flow ─────────────────────────────────────────

fn type_block(ctx: &mut TypingContext, stmts: &[UNode], need_val: bool, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    ctx.with_scope(|ctx| {
        let n = stmts.len();
        let mut typed = Vec::with_capacity(n);
        for (i, stmt) in stmts.iter().enumerate() {
            let want_val = need_val && i + 1 == n;
            typed.push(type_expr(ctx, stmt, want_val)?);
        }
        let ty = if need_val { typed.last().map(|t| t.ty.clone()).unwrap_or_else(Ty::void) } else { Ty::void() };
        Ok(TNode::new(TExpr::Block(typed), ty, pos.clone()))
    })
}

fn type_var(
    ctx: &mut TypingContext,
    name: &str,
    ty_ann: Option<&UTypeExpr>,
    init: Option<&UNode>,
    is_static: bool,
    pos: &ember_ast::Pos,
) -> TypeResult<TNode> {
    let declared = ty_ann.map(|t| tyexpr::resolve_type_expr(ctx, t));

    let typed_init = match init {
        Some(e) => {
            let saved = ctx.param_type.take();
            ctx.param_type = declared.clone();
            let t = type_expr(ctx, e, true);
            ctx.param_type = saved;
            let t = t?;
            if let Some(d) = &declared {
                ctx.infer.unify(d.clone(), t.ty.clone(), ConstraintOrigin::LetBinding { binding_span: pos.span }).map_err(Outcome::Err)?;
            }
            Some((Box::new(t.clone()), t.ty))
        }
        None => None,
    };

    let final_ty = declared.unwrap_or_else(|| typed_init.as_ref().map(|(_, t)| t.clone()).unwrap_or_else(|| ctx.infer.fresh_var()));
    ctx.push_local(name.to_string(), final_ty);

    Ok(TNode::new(
        TExpr::Var { name: name.to_string(), init: typed_init.map(|(n, _)| n), is_static },
        Ty::void(),
        pos.clone(),
    ))
}

fn type_if(
    ctx: &mut TypingContext,
    cond: &UNode,
    then_branch: &UNode,
    else_branch: Option<&UNode>,
    need_val: bool,
    pos: &ember_ast::Pos,
) -> TypeResult<TNode> {
    let tcond = type_expr(ctx, cond, true)?;
    ctx.infer.unify(tcond.ty.clone(), Ty::bool(), ConstraintOrigin::Builtin).map_err(Outcome::Err)?;

    let tthen = ctx.with_scope(|ctx| type_expr(ctx, then_branch, need_val))?;
    let telse = match else_branch {
        Some(e) => Some(ctx.with_scope(|ctx| type_expr(ctx, e, need_val))?),
        None => None,
    };

    let ty = if need_val {
        match &telse {
            Some(te) => {
                let origin = ConstraintOrigin::IfBranches { if_span: pos.span, then_span: then_branch.pos.span, else_span: te.pos.span };
                ctx.infer.unify(tthen.ty.clone(), te.ty.clone(), origin).map_err(Outcome::Err)?;
                tthen.ty.clone()
            }
            None => Ty::void(),
        }
    } else {
        Ty::void()
    };

    Ok(TNode::new(TExpr::If { cond: Box::new(tcond), then_branch: Box::new(tthen), else_branch: telse.map(Box::new) }, ty, pos.clone()))
}

fn type_while(ctx: &mut TypingContext, cond: &UNode, body: &UNode, do_while: bool, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let tcond = type_expr(ctx, cond, true)?;
    ctx.infer.unify(tcond.ty.clone(), Ty::bool(), ConstraintOrigin::Builtin).map_err(Outcome::Err)?;

    let was_loop = ctx.in_loop;
    ctx.in_loop = true;
    let tbody = ctx.with_scope(|ctx| type_expr(ctx, body, false));
    ctx.in_loop = was_loop;

    Ok(TNode::new(TExpr::While { cond: Box::new(tcond), body: Box::new(tbody?), do_while }, Ty::void(), pos.clone()))
}

/// An (external, consumed-only) collaborator that may special-case a
/// literal range iterable (`for (i in lo...hi)`) before the typer falls
/// back to synthesizing ordinary iterator resolution (spec.md:171).
/// Mirrors `macro_bridge::MacroInterpreter`'s installation pattern: the
/// root context installs one only if the target backend actually wants
/// the fast path; absent, every range for-loop still types correctly by
/// binding its loop variable to `Int` directly.
pub trait RangeForOptimizer {
    /// Called only when the for-loop's iterable is a `lo...hi` range
    /// expression (both operands already unified to `Int`). Returning
    /// `Some` overrides the loop variable's bound type; `None` declines,
    /// leaving the default `Int` binding in place.
    fn specialize_range_for(&mut self, lo: &Ty, hi: &Ty) -> Option<Ty>;
}

fn type_for(ctx: &mut TypingContext, var_name: &str, iterable: &UNode, body: &UNode, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let titer = type_expr(ctx, iterable, true)?;

    let elem_ty = if matches!(&iterable.expr, UExpr::Binop { op: BinOp::Range, .. }) {
        let specialized = ctx.g.range_for_optimizer.as_mut().and_then(|opt| opt.specialize_range_for(&Ty::int(), &Ty::int()));
        specialized.unwrap_or_else(Ty::int)
    } else {
        resolve_iterator_element_type(ctx, &titer, pos)?
    };

    let was_loop = ctx.in_loop;
    ctx.in_loop = true;
    let tbody = ctx.with_scope(|ctx| {
        ctx.push_local(var_name.to_string(), elem_ty.clone());
        type_expr(ctx, body, false)
    });
    ctx.in_loop = was_loop;

    Ok(TNode::new(TExpr::For { var_name: var_name.to_string(), iterable: Box::new(titer), body: Box::new(tbody?) }, Ty::void(), pos.clone()))
}

/// Resolves a for-loop's element type for an iterable that isn't a
/// specialized range (spec.md:171): `Array` and the synthetic `Iterator`
/// type `BinOp::Range` itself produces are both read off by type args
/// directly; any other class resolves its actual `iterator()` method (a
/// collection handing back an iterator) or, failing that, verifies the
/// class is already an iterator via its own `next()` method.
fn resolve_iterator_element_type(ctx: &mut TypingContext, titer: &TNode, pos: &ember_ast::Pos) -> TypeResult<Ty> {
    let resolved = ctx.infer.resolve(titer.ty.clone());

    if matches!(resolved.head_name(), Some("Array") | Some("Iterator")) {
        return Ok(resolved.type_args().first().cloned().unwrap_or(Ty::Dynamic));
    }

    if let Some(class_name) = resolved.head_name() {
        if let Some(class) = ctx.registry.class(class_name).cloned() {
            let subst: HashMap<String, Ty> =
                class.type_params.iter().map(|p| p.name.clone()).zip(resolved.type_args().iter().cloned()).collect();

            if let Some(method) = find_zero_arg_method(&class, "iterator") {
                let ret = subst_type_param_names(tyexpr::resolve_type_expr(ctx, method_return_type(method)), &subst);
                let ret = ctx.infer.resolve(ret);
                if let Some(elem) = ret.type_args().first().cloned() {
                    return Ok(elem);
                }
            }
            if let Some(method) = find_zero_arg_method(&class, "next") {
                let ret = subst_type_param_names(tyexpr::resolve_type_expr(ctx, method_return_type(method)), &subst);
                return Ok(ret);
            }
        }
    }

    if matches!(resolved, Ty::Dynamic) {
        return Ok(ctx.infer.fresh_var());
    }

    Err(Outcome::Err(TypeError::NoSuchMethod { ty: titer.ty.clone(), method: "iterator".to_string(), span: pos.span }))
}

fn find_zero_arg_method<'a>(class: &'a ClassType, name: &str) -> Option<&'a ClassField> {
    class.fields.iter().find(|f| f.name == name && matches!(&f.kind, FieldKind::Method { params, .. } if params.is_empty()))
}

fn method_return_type(field: &ClassField) -> &UTypeExpr {
    match &field.kind {
        FieldKind::Method { ret, .. } => ret,
        FieldKind::Var { ty, .. } => ty,
    }
}

fn type_ternary(ctx: &mut TypingContext, cond: &UNode, then_branch: &UNode, else_branch: &UNode, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let tcond = type_expr(ctx, cond, true)?;
    ctx.infer.unify(tcond.ty.clone(), Ty::bool(), ConstraintOrigin::Builtin).map_err(Outcome::Err)?;
    let tthen = type_expr(ctx, then_branch, true)?;
    let telse = type_expr(ctx, else_branch, true)?;
    let origin = ConstraintOrigin::IfBranches { if_span: pos.span, then_span: then_branch.pos.span, else_span: else_branch.pos.span };
    ctx.infer.unify(tthen.ty.clone(), telse.ty.clone(), origin).map_err(Outcome::Err)?;
    let ty = tthen.ty.clone();
    Ok(TNode::new(TExpr::Ternary { cond: Box::new(tcond), then_branch: Box::new(tthen), else_branch: Box::new(telse) }, ty, pos.clone()))
}

fn type_return(ctx: &mut TypingContext, e: Option<&UNode>, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let value = match e {
        Some(expr) => {
            let te = type_expr(ctx, expr, true)?;
            if let Some(ret_ty) = ctx.ret.clone() {
                ctx.infer
                    .unify(ret_ty, te.ty.clone(), ConstraintOrigin::Return { return_span: pos.span, fn_span: pos.span })
                    .map_err(Outcome::Err)?;
            }
            Some(Box::new(te))
        }
        None => {
            if let Some(ret_ty) = ctx.ret.clone() {
                ctx.infer
                    .unify(ret_ty, Ty::void(), ConstraintOrigin::Return { return_span: pos.span, fn_span: pos.span })
                    .map_err(Outcome::Err)?;
            }
            None
        }
    };
    Ok(TNode::new(TExpr::Return(value), Ty::Never, pos.clone()))
}

fn type_try(ctx: &mut TypingContext, body: &UNode, catches: &[ember_ast::UCatch], pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let tbody = ctx.with_scope(|ctx| type_expr(ctx, body, true))?;

    let mut tcatches = Vec::with_capacity(catches.len());
    for c in catches {
        let cty = tyexpr::resolve_type_expr(ctx, &c.ty);
        if let Some(head) = cty.head_name() {
            if let Some(class) = ctx.registry.class(head) {
                // A parameterized catch class is allowed exactly when every
                // type argument it's caught with is the dynamic top
                // (`catch (e: Box<Dynamic>)`), not when the declaration
                // itself happens to be generic.
                let all_dynamic = cty.type_args().iter().all(|a| matches!(ctx.infer.resolve(a.clone()), Ty::Dynamic));
                if !class.type_params.is_empty() && !all_dynamic {
                    return Err(Outcome::Err(TypeError::Custom {
                        message: format!("cannot catch a parameterized type ({head})"),
                        origin: ConstraintOrigin::Builtin,
                    }));
                }
            }
        }
        let body = ctx.with_scope(|ctx| {
            ctx.push_local(c.name.clone(), cty.clone());
            type_expr(ctx, &c.body, true)
        })?;
        tcatches.push(TCatch { name: c.name.clone(), ty: cty, body: Box::new(body) });
    }

    let ty = tbody.ty.clone();
    Ok(TNode::new(TExpr::Try { body: Box::new(tbody), catches: tcatches }, ty, pos.clone()))
}

// ── Switch / match ──────────────────────────────────────────────────────

fn type_switch(
    ctx: &mut TypingContext,
    subject: &UNode,
    cases: &[UCase],
    default: Option<&UNode>,
    need_val: bool,
    pos: &ember_ast::Pos,
) -> TypeResult<TNode> {
    let tsubject = type_expr(ctx, subject, true)?;
    let has_ctor = cases.iter().any(|c| matches!(c.pattern, UCasePattern::Constructor { .. }));
    let has_value = cases.iter().any(|c| matches!(c.pattern, UCasePattern::Value(_)));
    if has_ctor && has_value {
        return Err(Outcome::Err(TypeError::MixedMatchAndValueSwitch { span: pos.span }));
    }

    if has_ctor {
        type_switch_enum(ctx, tsubject, cases, default, need_val, pos)
    } else {
        type_switch_value(ctx, tsubject, cases, default, need_val, pos)
    }
}

fn type_switch_enum(
    ctx: &mut TypingContext,
    tsubject: TNode,
    cases: &[UCase],
    default: Option<&UNode>,
    need_val: bool,
    pos: &ember_ast::Pos,
) -> TypeResult<TNode> {
    let resolved_subject_ty = ctx.infer.resolve(tsubject.ty.clone());
    let enum_name = resolved_subject_ty
        .head_name()
        .ok_or_else(|| Outcome::Err(TypeError::Custom { message: format!("{resolved_subject_ty} is not an enum"), origin: ConstraintOrigin::Builtin }))?
        .to_string();
    let en = ctx
        .registry
        .enum_(&enum_name)
        .cloned()
        .ok_or_else(|| Outcome::Err(TypeError::Custom { message: format!("unknown enum {enum_name}"), origin: ConstraintOrigin::Builtin }))?;
    let enum_ty_args = resolved_subject_ty.type_args().to_vec();

    let mut arms = Vec::new();
    let mut wildcard_body: Option<&UNode> = None;
    let mut pats: Vec<exhaustiveness::Pat> = Vec::new();

    for case in cases {
        match &case.pattern {
            UCasePattern::Constructor { name, args } => {
                let field_tys = enum_ctor_field_types(ctx, &en, name, &enum_ty_args);
                let (bindings, guard, body) = ctx.with_scope(|ctx| {
                    let mut bindings = Vec::with_capacity(args.len());
                    for (sub, fty) in args.iter().zip(field_tys.iter()) {
                        match sub {
                            USubPattern::Bind(bind_name) => {
                                ctx.push_local(bind_name.clone(), fty.clone());
                                bindings.push(Some(bind_name.clone()));
                            }
                            USubPattern::Wildcard => bindings.push(None),
                        }
                    }
                    let guard = match &case.guard {
                        Some(g) => {
                            let tg = type_expr(ctx, g, true)?;
                            ctx.infer.unify(tg.ty.clone(), Ty::bool(), ConstraintOrigin::Builtin).map_err(Outcome::Err)?;
                            Some(Box::new(tg))
                        }
                        None => None,
                    };
                    let body = type_expr(ctx, &case.body, need_val)?;
                    Ok((bindings, guard, body))
                })?;
                pats.push(exhaustiveness::Pat::Constructor { name: name.clone(), type_name: enum_name.clone(), args: vec![exhaustiveness::Pat::Wildcard; args.len()] });
                arms.push(TEnumArm { constructor: name.clone(), bindings, guard, body: Box::new(body) });
            }
            UCasePattern::Wildcard => {
                wildcard_body = Some(&case.body);
                pats.push(exhaustiveness::Pat::Wildcard);
            }
            UCasePattern::Value(_) => unreachable!("mixed value/constructor switch already rejected"),
        }
    }

    let default_source = default.or(wildcard_body);
    let typed_default = match default_source {
        Some(d) => Some(Box::new(type_expr(ctx, d, need_val)?)),
        None => None,
    };

    let type_info = enum_type_info(&en);
    if typed_default.is_none() {
        if let Some(missing) = exhaustiveness::check_exhaustiveness(&pats, &type_info) {
            let missing_names: Vec<String> =
                missing.iter().filter_map(|p| if let exhaustiveness::Pat::Constructor { name, .. } = p { Some(name.clone()) } else { None }).collect();
            return Err(Outcome::Err(TypeError::NonExhaustiveMatch { missing: missing_names, span: pos.span }));
        }
    }
    for idx in exhaustiveness::check_redundancy(&pats, &type_info) {
        if idx < pats.len() {
            ctx.infer.warnings.push(TypeError::RedundantArm { span: pos.span });
        }
    }

    let ty = lub_of_arms(ctx, arms.iter().map(|a| &a.body), typed_default.as_deref(), need_val, pos)?;
    Ok(TNode::new(TExpr::SwitchEnum { subject: Box::new(tsubject), arms, default: typed_default }, ty, pos.clone()))
}

fn enum_type_info(en: &EnumType) -> exhaustiveness::TypeInfo {
    exhaustiveness::TypeInfo::SumType {
        variants: en.constructors.iter().map(|c| exhaustiveness::ConstructorSig { name: c.name.clone(), arity: c.args.len() }).collect(),
    }
}

fn type_switch_value(
    ctx: &mut TypingContext,
    tsubject: TNode,
    cases: &[UCase],
    default: Option<&UNode>,
    need_val: bool,
    pos: &ember_ast::Pos,
) -> TypeResult<TNode> {
    let mut arms = Vec::new();
    let mut seen_values: Vec<String> = Vec::new();

    for case in cases {
        let UCasePattern::Value(value_node) = &case.pattern else { unreachable!("value switch case") };
        let typed_value = type_expr(ctx, value_node, true)?;
        ctx.infer
            .unify(tsubject.ty.clone(), typed_value.ty.clone(), ConstraintOrigin::SwitchArms { arm_span: pos.span })
            .map_err(Outcome::Err)?;

        if let TExpr::Const(c) = &typed_value.expr {
            let repr = format!("{c:?}");
            if seen_values.contains(&repr) {
                return Err(Outcome::Err(TypeError::DuplicateCaseValue { span: case.pos.span }));
            }
            seen_values.push(repr);
        }

        let guard = match &case.guard {
            Some(g) => {
                let tg = type_expr(ctx, g, true)?;
                ctx.infer.unify(tg.ty.clone(), Ty::bool(), ConstraintOrigin::Builtin).map_err(Outcome::Err)?;
                Some(Box::new(tg))
            }
            None => None,
        };
        let body = type_expr(ctx, &case.body, need_val)?;
        arms.push(TValueArm { value: Box::new(typed_value), guard, body: Box::new(body) });
    }

    let typed_default = match default {
        Some(d) => Some(Box::new(type_expr(ctx, d, need_val)?)),
        None => None,
    };

    let ty = lub_of_arms(ctx, arms.iter().map(|a| &a.body), typed_default.as_deref(), need_val, pos)?;
    Ok(TNode::new(TExpr::SwitchValue { subject: Box::new(tsubject), arms, default: typed_default }, ty, pos.clone()))
}

fn lub_of_arms<'a>(
    ctx: &mut TypingContext,
    bodies: impl Iterator<Item = &'a Box<TNode>>,
    default: Option<&TNode>,
    need_val: bool,
    pos: &ember_ast::Pos,
) -> TypeResult<Ty> {
    if !need_val {
        return Ok(Ty::void());
    }
    let mut acc: Option<Ty> = None;
    for body in bodies {
        acc = Some(match acc {
            None => body.ty.clone(),
            Some(running) => {
                ctx.infer.unify(running.clone(), body.ty.clone(), ConstraintOrigin::SwitchArms { arm_span: pos.span }).map_err(Outcome::Err)?;
                running
            }
        });
    }
    if let Some(d) = default {
        acc = Some(match acc {
            None => d.ty.clone(),
            Some(running) => {
                ctx.infer.unify(running.clone(), d.ty.clone(), ConstraintOrigin::SwitchArms { arm_span: pos.span }).map_err(Outcome::Err)?;
                running
            }
        });
    }
    Ok(acc.unwrap_or_else(Ty::void))
}

// ── Function literals, `new` ─────────────────────────────────────────────

fn type_function_lit(ctx: &mut TypingContext, f: &UFunctionLit, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let expected_fn = ctx.param_type.take();
    let expected_params: Vec<Option<Ty>> = match &expected_fn {
        Some(Ty::Fun(ps, _)) => ps.iter().cloned().map(Some).collect(),
        _ => Vec::new(),
    };
    let expected_ret = match &expected_fn {
        Some(Ty::Fun(_, r)) => Some((**r).clone()),
        _ => None,
    };

    let result = ctx.with_scope(|ctx| {
        let mut param_tys = Vec::with_capacity(f.params.len());
        for (i, p) in f.params.iter().enumerate() {
            let declared = p.ty.as_ref().map(|t| tyexpr::resolve_type_expr(ctx, t));
            let hint = expected_params.get(i).cloned().flatten();
            let pty = declared.or(hint).unwrap_or_else(|| ctx.infer.fresh_var());
            ctx.push_local(p.name.clone(), pty.clone());
            param_tys.push(pty);
        }

        let declared_ret = f.ret.as_ref().map(|t| tyexpr::resolve_type_expr(ctx, t));
        let ret_ty = declared_ret.clone().or_else(|| expected_ret.clone()).unwrap_or_else(|| ctx.infer.fresh_var());

        let saved_ret = ctx.ret.replace(ret_ty.clone());
        let tbody = type_expr(ctx, &f.body, true);
        ctx.ret = saved_ret;
        let tbody = tbody?;

        if declared_ret.is_none() {
            let _ = ctx.infer.unify(ret_ty.clone(), tbody.ty.clone(), ConstraintOrigin::Return { return_span: pos.span, fn_span: pos.span });
        }

        let names: Vec<String> = f.params.iter().map(|p: &UParam| p.name.clone()).collect();
        let named_params: Vec<(String, Ty)> = names.into_iter().zip(param_tys.iter().cloned()).collect();
        Ok((named_params, ret_ty, tbody))
    })?;

    let (named_params, ret_ty, tbody) = result;
    let fn_ty = Ty::fun(named_params.iter().map(|(_, t)| t.clone()).collect(), ret_ty.clone());
    Ok(TNode::new(TExpr::Function(TFunctionLit { params: named_params, ret: ret_ty, body: Box::new(tbody) }), fn_ty, pos.clone()))
}

fn type_new(ctx: &mut TypingContext, path: &str, type_args: &[UTypeExpr], args: &[UNode], pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let class = ctx.registry.class(path).cloned().ok_or_else(|| Outcome::Err(TypeError::UnknownIdent { name: path.to_string(), span: pos.span }))?;

    if class.constructor_is_private {
        let allowed = ctx.curclass.as_ref().is_some_and(|cur| class_is_ancestor_or_self(ctx, &class.name, cur));
        if !allowed {
            return Err(Outcome::Err(TypeError::PrivateConstructor { ty: Ty::named(class.name.clone(), Vec::new()), span: pos.span }));
        }
    }

    let ctor_field = class.constructor.clone().ok_or_else(|| Outcome::Err(TypeError::MissingConstructor { ty: Ty::named(class.name.clone(), Vec::new()), span: pos.span }))?;
    let FieldKind::Method { params, .. } = &ctor_field.kind else {
        return Err(Outcome::Err(TypeError::MissingConstructor { ty: Ty::named(class.name.clone(), Vec::new()), span: pos.span }));
    };

    let formals = call::resolve_formals(ctx, params);
    let untyped_args: Vec<call::UntypedArg> = args
        .iter()
        .map(|a| {
            let a = a.clone();
            call::UntypedArg::new(move |ctx| type_expr(ctx, &a, true))
        })
        .collect();
    let typed_args = call::unify_call_params(ctx, path, untyped_args, &formals, pos, false)?;

    let resolved_type_args: Vec<Ty> = type_args.iter().map(|t| tyexpr::resolve_type_expr(ctx, t)).collect();
    let ty = Ty::named(class.name.clone(), resolved_type_args);
    Ok(TNode::new(TExpr::New { class: class.name, args: typed_args }, ty, pos.clone()))
}

// ── Unary/binary operators ──────────────────────────────────────────────

fn type_unop(ctx: &mut TypingContext, op: UnOp, operand: &UNode, postfix: bool, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match op {
        UnOp::Not => {
            let t = type_expr(ctx, operand, true)?;
            ctx.infer.unify(t.ty.clone(), Ty::bool(), ConstraintOrigin::UnOp { op_span: pos.span }).map_err(Outcome::Err)?;
            Ok(TNode::new(TExpr::Unop { op, operand: Box::new(t), postfix }, Ty::bool(), pos.clone()))
        }
        UnOp::Neg => {
            let t = type_expr(ctx, operand, true)?;
            let k = kind::classify(&mut ctx.infer, &ctx.registry, &t.ty);
            let ty = match k {
                Kind::KInt => Ty::int(),
                Kind::KFloat => Ty::float(),
                Kind::KDyn => Ty::Dynamic,
                Kind::KParam(pty) => pty,
                _ => return Err(Outcome::Err(TypeError::Custom { message: format!("cannot negate {}", t.ty), origin: ConstraintOrigin::UnOp { op_span: pos.span } })),
            };
            Ok(TNode::new(TExpr::Unop { op, operand: Box::new(t), postfix }, ty, pos.clone()))
        }
        UnOp::Increment | UnOp::Decrement => type_incr_decr(ctx, op, operand, postfix, pos),
    }
}

fn type_incr_decr(ctx: &mut TypingContext, op: UnOp, operand: &UNode, postfix: bool, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match &operand.expr {
        UExpr::Field(base, name) => {
            let receiver = type_receiver(ctx, base)?;
            let get_ak = resolve_field_access(ctx, receiver.clone(), name, Mode::Get, &operand.pos)?;
            let get_node = field_access::acc_get(ctx, get_ak, &operand.pos)?;
            check_incrementable(ctx, &get_node, pos)?;
            let set_ak = resolve_field_access(ctx, receiver, name, Mode::Set, &operand.pos)?;
            build_incr_decr(op, postfix, get_node, set_ak, pos)
        }
        UExpr::Ident(name) => {
            let get_ak = access::type_ident(ctx, name, Mode::Get, false, &operand.pos)?;
            let get_node = field_access::acc_get(ctx, get_ak, &operand.pos)?;
            check_incrementable(ctx, &get_node, pos)?;
            let set_ak = access::type_ident(ctx, name, Mode::Set, false, &operand.pos)?;
            build_incr_decr(op, postfix, get_node, set_ak, pos)
        }
        _ => {
            let t = type_expr(ctx, operand, true)?;
            check_incrementable(ctx, &t, pos)?;
            let ty = t.ty.clone();
            Ok(TNode::new(TExpr::Unop { op, operand: Box::new(t), postfix }, ty, pos.clone()))
        }
    }
}

fn check_incrementable(ctx: &mut TypingContext, node: &TNode, pos: &ember_ast::Pos) -> TypeResult<()> {
    let k = kind::classify(&mut ctx.infer, &ctx.registry, &node.ty);
    if matches!(k, Kind::KInt | Kind::KFloat | Kind::KParam(_) | Kind::KDyn) {
        Ok(())
    } else {
        Err(Outcome::Err(TypeError::Custom { message: format!("cannot increment/decrement {}", node.ty), origin: ConstraintOrigin::UnOp { op_span: pos.span } }))
    }
}

fn build_incr_decr(op: UnOp, postfix: bool, get_node: TNode, set_ak: AccessKind, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match set_ak {
        AccessKind::Set { receiver, setter_name, prop_type, .. } => {
            let one = TNode::new(TExpr::Const(UConstant::Int(1)), get_node.ty.clone(), pos.clone());
            let bin_op = if op == UnOp::Increment { BinOp::Add } else { BinOp::Sub };
            let ty = get_node.ty.clone();
            let new_value = TNode::new(TExpr::Binop { op: bin_op, lhs: Box::new(get_node), rhs: Box::new(one) }, prop_type, pos.clone());
            Ok(TNode::new(TExpr::SetterBlock { receiver_name: "__recv".to_string(), receiver, setter: setter_name, value: Box::new(new_value) }, ty, pos.clone()))
        }
        _ => {
            let ty = get_node.ty.clone();
            Ok(TNode::new(TExpr::Unop { op, operand: Box::new(get_node), postfix }, ty, pos.clone()))
        }
    }
}

fn type_binop(ctx: &mut TypingContext, op: BinOp, lhs: &UNode, rhs: &UNode, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match op {
        BinOp::And | BinOp::Or => {
            let tl = type_expr(ctx, lhs, true)?;
            ctx.infer.unify(tl.ty.clone(), Ty::bool(), ConstraintOrigin::BinOp { op_span: pos.span }).map_err(Outcome::Err)?;
            let tr = type_expr(ctx, rhs, true)?;
            ctx.infer.unify(tr.ty.clone(), Ty::bool(), ConstraintOrigin::BinOp { op_span: pos.span }).map_err(Outcome::Err)?;
            Ok(TNode::new(TExpr::Binop { op, lhs: Box::new(tl), rhs: Box::new(tr) }, Ty::bool(), pos.clone()))
        }
        BinOp::Eq | BinOp::NotEq => {
            let tl = type_expr(ctx, lhs, true)?;
            let tr = type_expr(ctx, rhs, true)?;
            let compatible = ctx.infer.speculative(|infer| infer.unify(tl.ty.clone(), tr.ty.clone(), ConstraintOrigin::BinOp { op_span: pos.span })).is_ok();
            let either_dynamic = matches!(ctx.infer.resolve(tl.ty.clone()), Ty::Dynamic) || matches!(ctx.infer.resolve(tr.ty.clone()), Ty::Dynamic);
            if !compatible && !either_dynamic {
                return Err(Outcome::Err(TypeError::CannotCompare { left: tl.ty, right: tr.ty, origin: ConstraintOrigin::BinOp { op_span: pos.span } }));
            }
            Ok(TNode::new(TExpr::Binop { op, lhs: Box::new(tl), rhs: Box::new(tr) }, Ty::bool(), pos.clone()))
        }
        BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
            let tl = type_expr(ctx, lhs, true)?;
            let tr = type_expr(ctx, rhs, true)?;
            let kl = kind::classify(&mut ctx.infer, &ctx.registry, &tl.ty);
            let kr = kind::classify(&mut ctx.infer, &ctx.registry, &tr.ty);
            let numeric_or_string = |k: &Kind| matches!(k, Kind::KInt | Kind::KFloat | Kind::KString | Kind::KDyn | Kind::KParam(_));
            if !numeric_or_string(&kl) && !numeric_or_string(&kr) {
                return Err(Outcome::Err(TypeError::CannotCompare { left: tl.ty, right: tr.ty, origin: ConstraintOrigin::BinOp { op_span: pos.span } }));
            }
            Ok(TNode::new(TExpr::Binop { op, lhs: Box::new(tl), rhs: Box::new(tr) }, Ty::bool(), pos.clone()))
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            let tl = type_expr(ctx, lhs, true)?;
            let tr = type_expr(ctx, rhs, true)?;
            let l_dyn = matches!(ctx.infer.resolve(tl.ty.clone()), Ty::Dynamic);
            kind::unify_int(&mut ctx.infer, l_dyn, &tl.ty);
            let r_dyn = matches!(ctx.infer.resolve(tr.ty.clone()), Ty::Dynamic);
            kind::unify_int(&mut ctx.infer, r_dyn, &tr.ty);
            Ok(TNode::new(TExpr::Binop { op, lhs: Box::new(tl), rhs: Box::new(tr) }, Ty::int(), pos.clone()))
        }
        BinOp::Range => {
            let tl = type_expr(ctx, lhs, true)?;
            ctx.infer.unify(tl.ty.clone(), Ty::int(), ConstraintOrigin::BinOp { op_span: pos.span }).map_err(Outcome::Err)?;
            let tr = type_expr(ctx, rhs, true)?;
            ctx.infer.unify(tr.ty.clone(), Ty::int(), ConstraintOrigin::BinOp { op_span: pos.span }).map_err(Outcome::Err)?;
            Ok(TNode::new(TExpr::Binop { op, lhs: Box::new(tl), rhs: Box::new(tr) }, Ty::named("Iterator", vec![Ty::int()]), pos.clone()))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let tl = type_expr(ctx, lhs, true)?;
            let tr = type_expr(ctx, rhs, true)?;
            let ty = arith_result_ty(ctx, op, &tl.ty, &tr.ty, pos)?;
            Ok(TNode::new(TExpr::Binop { op, lhs: Box::new(tl), rhs: Box::new(tr) }, ty, pos.clone()))
        }
    }
}

/// The numeric-kind dispatch table for `+ - * / %`, per §4.5 "arithmetic
/// operators": string concatenation wins over everything, dynamic
/// propagates, float widens int, a numeric type-parameter carries its own
/// constraint type through, and plain `Int op Int` stays `Int` except
/// `/`, which always produces a `Float`.
fn arith_result_ty(ctx: &mut TypingContext, op: BinOp, lty: &Ty, rty: &Ty, pos: &ember_ast::Pos) -> TypeResult<Ty> {
    let kl = kind::classify(&mut ctx.infer, &ctx.registry, lty);
    let kr = kind::classify(&mut ctx.infer, &ctx.registry, rty);

    if op == BinOp::Add && (kl == Kind::KString || kr == Kind::KString) {
        return Ok(Ty::string());
    }
    if kl == Kind::KDyn || kr == Kind::KDyn {
        return Ok(Ty::Dynamic);
    }
    if let Kind::KParam(t) = &kl {
        return Ok(t.clone());
    }
    if let Kind::KParam(t) = &kr {
        return Ok(t.clone());
    }
    if kl == Kind::KFloat || kr == Kind::KFloat {
        return Ok(Ty::float());
    }
    if kl == Kind::KInt && kr == Kind::KInt {
        return Ok(if op == BinOp::Div { Ty::float() } else { Ty::int() });
    }

    Err(Outcome::Err(TypeError::Custom { message: format!("cannot apply operator to {lty} and {rty}"), origin: ConstraintOrigin::BinOp { op_span: pos.span } }))
}

// ── Assignment ───────────────────────────────────────────────────────────

fn resolve_access_for_assign(ctx: &mut TypingContext, node: &UNode, mode: Mode) -> TypeResult<AccessKind> {
    match &node.expr {
        UExpr::Ident(name) => access::type_ident(ctx, name, mode, false, &node.pos),
        UExpr::This => access::type_keyword(ctx, "this", mode, &node.pos).expect("this is always handled"),
        UExpr::Super => access::type_keyword(ctx, "super", mode, &node.pos).expect("super is always handled"),
        _ => Err(Outcome::Err(TypeError::InvalidAssignTarget { span: node.pos.span })),
    }
}

fn type_assign(ctx: &mut TypingContext, lhs: &UNode, rhs: &UNode, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match &lhs.expr {
        UExpr::Index(a, b) => {
            let ta = type_expr(ctx, a, true)?;
            let tb = type_expr(ctx, b, true)?;
            let index_node = access::type_array_access(ctx, ta, tb, &lhs.pos)?;
            let tr = type_with_hint(ctx, rhs, index_node.ty.clone())?;
            let origin = ConstraintOrigin::Assignment { lhs_span: lhs.pos.span, rhs_span: rhs.pos.span };
            ctx.infer.unify(index_node.ty.clone(), tr.ty.clone(), origin).map_err(Outcome::Err)?;
            let ty = tr.ty.clone();
            Ok(TNode::new(TExpr::Assign { lhs: Box::new(index_node), rhs: Box::new(tr) }, ty, pos.clone()))
        }
        UExpr::Field(base, name) => {
            let receiver = type_receiver(ctx, base)?;
            let ak = resolve_field_access(ctx, receiver, name, Mode::Set, &lhs.pos)?;
            finish_assign(ctx, ak, rhs, lhs, pos)
        }
        _ => {
            let ak = resolve_access_for_assign(ctx, lhs, Mode::Set)?;
            finish_assign(ctx, ak, rhs, lhs, pos)
        }
    }
}

fn finish_assign(ctx: &mut TypingContext, ak: AccessKind, rhs: &UNode, lhs: &UNode, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match ak {
        AccessKind::Set { receiver, setter_name, prop_type, .. } => {
            let tr = type_with_hint(ctx, rhs, prop_type.clone())?;
            let origin = ConstraintOrigin::Assignment { lhs_span: lhs.pos.span, rhs_span: rhs.pos.span };
            ctx.infer.unify(prop_type, tr.ty.clone(), origin).map_err(Outcome::Err)?;
            let ty = tr.ty.clone();
            Ok(TNode::new(TExpr::SetterBlock { receiver_name: "__recv".to_string(), receiver, setter: setter_name, value: Box::new(tr) }, ty, pos.clone()))
        }
        AccessKind::Expr(target) => {
            let tr = type_with_hint(ctx, rhs, target.ty.clone())?;
            let origin = ConstraintOrigin::Assignment { lhs_span: lhs.pos.span, rhs_span: rhs.pos.span };
            ctx.infer.unify(target.ty.clone(), tr.ty.clone(), origin).map_err(Outcome::Err)?;
            let ty = tr.ty.clone();
            Ok(TNode::new(TExpr::Assign { lhs: Box::new(target), rhs: Box::new(tr) }, ty, pos.clone()))
        }
        _ => Err(Outcome::Err(TypeError::InvalidAssignTarget { span: lhs.pos.span })),
    }
}

fn type_with_hint(ctx: &mut TypingContext, node: &UNode, hint: Ty) -> TypeResult<TNode> {
    let saved = ctx.param_type.take();
    ctx.param_type = Some(hint);
    let t = type_expr(ctx, node, true);
    ctx.param_type = saved;
    t
}

fn type_op_assign(ctx: &mut TypingContext, op: BinOp, lhs: &UNode, rhs: &UNode, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match &lhs.expr {
        UExpr::Index(a, b) => {
            let ta = type_expr(ctx, a, true)?;
            let tb = type_expr(ctx, b, true)?;
            let index_node = access::type_array_access(ctx, ta, tb, &lhs.pos)?;
            let tr = type_expr(ctx, rhs, true)?;
            let result_ty = arith_result_ty(ctx, op, &index_node.ty, &tr.ty, pos)?;
            let origin = ConstraintOrigin::Assignment { lhs_span: lhs.pos.span, rhs_span: rhs.pos.span };
            ctx.infer.unify(index_node.ty.clone(), result_ty.clone(), origin).map_err(Outcome::Err)?;
            Ok(TNode::new(TExpr::OpAssign { op, lhs: Box::new(index_node), rhs: Box::new(tr) }, result_ty, pos.clone()))
        }
        UExpr::Field(base, name) => {
            let receiver = type_receiver(ctx, base)?;
            let get_ak = resolve_field_access(ctx, receiver.clone(), name, Mode::Get, &lhs.pos)?;
            let get_node = field_access::acc_get(ctx, get_ak, &lhs.pos)?;
            let tr = type_expr(ctx, rhs, true)?;
            let result_ty = arith_result_ty(ctx, op, &get_node.ty, &tr.ty, pos)?;
            let set_ak = resolve_field_access(ctx, receiver, name, Mode::Set, &lhs.pos)?;
            finish_op_assign(op, get_node, tr, result_ty, set_ak, pos)
        }
        _ => {
            let get_ak = resolve_access_for_assign(ctx, lhs, Mode::Get)?;
            let get_node = field_access::acc_get(ctx, get_ak, &lhs.pos)?;
            let tr = type_expr(ctx, rhs, true)?;
            let result_ty = arith_result_ty(ctx, op, &get_node.ty, &tr.ty, pos)?;
            let set_ak = resolve_access_for_assign(ctx, lhs, Mode::Set)?;
            finish_op_assign(op, get_node, tr, result_ty, set_ak, pos)
        }
    }
}

fn finish_op_assign(op: BinOp, get_node: TNode, rhs: TNode, result_ty: Ty, set_ak: AccessKind, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match set_ak {
        AccessKind::Set { receiver, setter_name, .. } => {
            let computed = TNode::new(TExpr::Binop { op, lhs: Box::new(get_node), rhs: Box::new(rhs) }, result_ty.clone(), pos.clone());
            Ok(TNode::new(
                TExpr::SetterBlock { receiver_name: "__recv".to_string(), receiver, setter: setter_name, value: Box::new(computed) },
                result_ty,
                pos.clone(),
            ))
        }
        AccessKind::Expr(target) => Ok(TNode::new(TExpr::OpAssign { op, lhs: Box::new(target), rhs: Box::new(rhs) }, result_ty, pos.clone())),
        _ => Err(Outcome::Err(TypeError::InvalidAssignTarget { span: pos.span })),
    }
}

// ── Calls ────────────────────────────────────────────────────────────────

fn type_call(ctx: &mut TypingContext, callee: &UNode, args: &[UNode], pos: &ember_ast::Pos) -> TypeResult<TNode> {
    match &callee.expr {
        UExpr::Field(base, name) => {
            let receiver = type_receiver(ctx, base)?;
            if let TExpr::TypeRef(type_name) = &receiver.expr {
                if let Some(en) = ctx.registry.enum_(type_name).cloned() {
                    if let Some(ctor) = en.constructors.iter().find(|c| &c.name == name).cloned() {
                        return type_enum_ctor_call(ctx, &en, &ctor, args, pos);
                    }
                }
            }
            let ak = resolve_field_access(ctx, receiver, name, Mode::Call, &callee.pos)?;
            type_call_on_access(ctx, ak, args, pos, name)
        }
        UExpr::Ident(name) => {
            for decl in ctx.local_types.clone() {
                if let ember_ast::TypeDecl::Enum(en) = &decl {
                    if let Some(ctor) = en.constructors.iter().find(|c| &c.name == name).cloned() {
                        return type_enum_ctor_call(ctx, en, &ctor, args, pos);
                    }
                }
            }
            let ak = access::type_ident(ctx, name, Mode::Call, true, &callee.pos)?;
            type_call_on_access(ctx, ak, args, pos, name)
        }
        _ => {
            let tcallee = type_expr(ctx, callee, true)?;
            type_call_value(ctx, tcallee, args, pos, "<anonymous>")
        }
    }
}

fn type_enum_ctor_call(ctx: &mut TypingContext, en: &EnumType, ctor: &EnumConstructor, args: &[UNode], pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let enum_ty_args: Vec<Ty> = en.type_params.iter().map(|_| ctx.infer.fresh_var()).collect();
    let field_tys = enum_ctor_field_types(ctx, en, &ctor.name, &enum_ty_args);
    let formals: Vec<call::ResolvedFormal> =
        ctor.args.iter().zip(field_tys).map(|((name, _), ty)| call::ResolvedFormal { name: name.clone(), ty, optional: false }).collect();
    let untyped: Vec<call::UntypedArg> = args
        .iter()
        .map(|a| {
            let a = a.clone();
            call::UntypedArg::new(move |ctx| type_expr(ctx, &a, true))
        })
        .collect();
    let typed_args = call::unify_call_params(ctx, &ctor.name, untyped, &formals, pos, false)?;
    Ok(TNode::new(TExpr::EnumCtor { enum_name: en.name.clone(), ctor: ctor.name.clone(), args: typed_args }, Ty::named(en.name.clone(), enum_ty_args), pos.clone()))
}

fn type_call_on_access(ctx: &mut TypingContext, ak: AccessKind, args: &[UNode], pos: &ember_ast::Pos, call_name: &str) -> TypeResult<TNode> {
    match ak {
        AccessKind::Macro { receiver, field } => crate::macro_bridge::dispatch_macro_call(ctx, receiver, &field, args, pos),
        AccessKind::Using { applied_static, first_arg } => type_using_call(ctx, applied_static, first_arg, args, pos),
        AccessKind::Inline { receiver, field, ty } => type_inline_call(ctx, receiver, field, ty, args, pos, call_name),
        AccessKind::Expr(node) => type_call_value(ctx, node, args, pos, call_name),
        AccessKind::No(name) => Err(Outcome::Err(TypeError::UnknownField { ty: Ty::Dynamic, field: name, span: pos.span })),
        AccessKind::Set { field_name, .. } => {
            Err(Outcome::Err(TypeError::Custom { message: format!("cannot call the setter-only field '{field_name}'"), origin: ConstraintOrigin::Builtin }))
        }
    }
}

fn type_using_call(ctx: &mut TypingContext, applied_static: String, first_arg: Box<TNode>, args: &[UNode], pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let (class_name, method_name) = applied_static.split_once('.').unwrap_or((applied_static.as_str(), ""));
    let class = ctx
        .registry
        .class(class_name)
        .cloned()
        .ok_or_else(|| Outcome::Err(TypeError::UnknownIdent { name: class_name.to_string(), span: pos.span }))?;
    let field = class
        .find_field(method_name, true)
        .cloned()
        .ok_or_else(|| Outcome::Err(TypeError::NoSuchMethod { ty: Ty::named(class_name.to_string(), Vec::new()), method: method_name.to_string(), span: pos.span }))?;
    let FieldKind::Method { params, ret, .. } = &field.kind else {
        return Err(Outcome::Err(TypeError::NoSuchMethod { ty: Ty::named(class_name.to_string(), Vec::new()), method: method_name.to_string(), span: pos.span }));
    };

    let all_formals = call::resolve_formals(ctx, params);
    let mut untyped: Vec<call::UntypedArg> = vec![call::UntypedArg::already_typed(*first_arg)];
    untyped.extend(args.iter().map(|a| {
        let a = a.clone();
        call::UntypedArg::new(move |ctx| type_expr(ctx, &a, true))
    }));

    let ret_ty = tyexpr::resolve_type_expr(ctx, ret);
    let callee_ty = Ty::fun(all_formals.iter().map(|f| f.ty.clone()).collect(), ret_ty.clone());
    let typed_args = call::unify_call_params(ctx, method_name, untyped, &all_formals, pos, false)?;
    let callee_node = TNode::new(TExpr::StaticField { class: class_name.to_string(), name: method_name.to_string() }, callee_ty, pos.clone());
    Ok(TNode::new(TExpr::Call { callee: Box::new(callee_node), args: typed_args }, ret_ty, pos.clone()))
}

fn type_inline_call(
    ctx: &mut TypingContext,
    receiver: Option<Box<TNode>>,
    field: String,
    ty: Ty,
    args: &[UNode],
    pos: &ember_ast::Pos,
    call_name: &str,
) -> TypeResult<TNode> {
    let Ty::Fun(param_tys, ret) = &ty else {
        return Err(Outcome::Err(TypeError::NotAFunction { ty, span: pos.span }));
    };
    let formals: Vec<call::ResolvedFormal> =
        param_tys.iter().enumerate().map(|(i, t)| call::ResolvedFormal { name: format!("p{i}"), ty: t.clone(), optional: false }).collect();
    let untyped: Vec<call::UntypedArg> = args
        .iter()
        .map(|a| {
            let a = a.clone();
            call::UntypedArg::new(move |ctx| type_expr(ctx, &a, true))
        })
        .collect();
    let typed_args = call::unify_call_params(ctx, call_name, untyped, &formals, pos, true)?;
    let ret_ty = (**ret).clone();
    let callee_node = TNode::new(TExpr::Closure { receiver, method: field, ty: ty.clone() }, ty, pos.clone());
    let call_node = TNode::new(TExpr::Call { callee: Box::new(callee_node), args: typed_args }, ret_ty.clone(), pos.clone());
    Ok(TNode::new(TExpr::Inlined(Box::new(call_node)), ret_ty, pos.clone()))
}

fn type_call_value(ctx: &mut TypingContext, callee: TNode, args: &[UNode], pos: &ember_ast::Pos, call_name: &str) -> TypeResult<TNode> {
    let resolved = ctx.infer.resolve(callee.ty.clone());
    match resolved {
        Ty::Fun(param_tys, ret) => {
            let formals: Vec<call::ResolvedFormal> =
                param_tys.iter().enumerate().map(|(i, t)| call::ResolvedFormal { name: format!("arg{i}"), ty: t.clone(), optional: false }).collect();
            let untyped: Vec<call::UntypedArg> = args
                .iter()
                .map(|a| {
                    let a = a.clone();
                    call::UntypedArg::new(move |ctx| type_expr(ctx, &a, true))
                })
                .collect();
            let typed_args = call::unify_call_params(ctx, call_name, untyped, &formals, pos, false)?;
            Ok(TNode::new(TExpr::Call { callee: Box::new(callee), args: typed_args }, *ret, pos.clone()))
        }
        Ty::Dynamic => {
            let mut typed_args = Vec::with_capacity(args.len());
            for a in args {
                typed_args.push(type_expr(ctx, a, true)?);
            }
            Ok(TNode::new(TExpr::Call { callee: Box::new(callee), args: typed_args }, Ty::Dynamic, pos.clone()))
        }
        other => Err(Outcome::Err(TypeError::NotAFunction { ty: other, span: pos.span })),
    }
}

// ── Cast, untyped, display ───────────────────────────────────────────────

fn type_cast(ctx: &mut TypingContext, expr: &UNode, ty: Option<&UTypeExpr>, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let te = type_expr(ctx, expr, true)?;
    match ty {
        Some(t) => {
            let target = tyexpr::resolve_type_expr(ctx, t);
            let checked_class = target.head_name().map(|s| s.to_string());
            // spec.md:183 — a checked cast target must be a class or enum
            // with every type parameter left Dynamic (`Box<Int>` is not a
            // legal target, `Box<Dynamic>` and a plain non-generic class are).
            let is_class_or_enum =
                checked_class.as_deref().is_some_and(|name| ctx.registry.class(name).is_some() || ctx.registry.enum_(name).is_some());
            let all_dynamic = target.type_args().iter().all(|a| matches!(ctx.infer.resolve(a.clone()), Ty::Dynamic));
            if !is_class_or_enum || !all_dynamic {
                return Err(Outcome::Err(TypeError::Custom {
                    message: format!("cannot cast to {target}: a checked cast target must be a class or enum with every type parameter left Dynamic"),
                    origin: ConstraintOrigin::Builtin,
                }));
            }
            Ok(TNode::new(TExpr::Cast { expr: Box::new(te), checked_class }, target, pos.clone()))
        }
        // `cast(e)` is unchecked coercion to a fresh monomorph (kind.rs's
        // `KUnk`), never the dynamic top: the result can still narrow
        // through later context the way a genuine monomorph would.
        None => Ok(TNode::new(TExpr::Cast { expr: Box::new(te), checked_class: None }, ctx.infer.fresh_var(), pos.clone())),
    }
}

fn type_untyped(ctx: &mut TypingContext, inner: &UNode, pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let was = ctx.untyped;
    ctx.untyped = true;
    let t = type_expr(ctx, inner, true);
    ctx.untyped = was;
    let t = t?;
    let ty = t.ty.clone();
    Ok(TNode::new(TExpr::Untyped(Box::new(t)), ty, pos.clone()))
}

fn type_display(ctx: &mut TypingContext, inner: &UNode, _pos: &ember_ast::Pos) -> TypeResult<TNode> {
    let was = ctx.in_display;
    ctx.in_display = true;
    let result = type_expr(ctx, inner, true);
    ctx.in_display = was;
    let t = result?;
    Err(Outcome::Signal(crate::error::Signal::Display(t.ty)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{node, FixtureLoader, UCase, UCasePattern};

    fn root_ctx() -> TypingContext {
        let loader = FixtureLoader::new();
        TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap()
    }

    fn int_lit(v: i64) -> UNode {
        node(UExpr::Const(UConstant::Int(v)), 0, 1)
    }

    fn string_lit(s: &str) -> UNode {
        node(UExpr::Const(UConstant::String(s.to_string())), 0, 1)
    }

    #[test]
    fn int_plus_int_is_int() {
        let mut ctx = root_ctx();
        let expr = node(UExpr::Binop { op: BinOp::Add, lhs: Box::new(int_lit(1)), rhs: Box::new(int_lit(2)) }, 0, 1);
        let t = type_expr(&mut ctx, &expr, true).unwrap();
        assert_eq!(t.ty, Ty::int());
    }

    #[test]
    fn int_divided_by_int_widens_to_float() {
        let mut ctx = root_ctx();
        let expr = node(UExpr::Binop { op: BinOp::Div, lhs: Box::new(int_lit(4)), rhs: Box::new(int_lit(2)) }, 0, 1);
        let t = type_expr(&mut ctx, &expr, true).unwrap();
        assert_eq!(t.ty, Ty::float());
    }

    #[test]
    fn string_plus_anything_concatenates() {
        let mut ctx = root_ctx();
        let expr = node(UExpr::Binop { op: BinOp::Add, lhs: Box::new(string_lit("n = ")), rhs: Box::new(int_lit(1)) }, 0, 1);
        let t = type_expr(&mut ctx, &expr, true).unwrap();
        assert_eq!(t.ty, Ty::string());
    }

    #[test]
    fn mismatched_if_branches_in_value_position_is_an_error() {
        let mut ctx = root_ctx();
        let expr = node(
            UExpr::If {
                cond: Box::new(node(UExpr::Const(UConstant::Bool(true)), 0, 1)),
                then_branch: Box::new(int_lit(1)),
                else_branch: Some(Box::new(string_lit("no"))),
            },
            0,
            1,
        );
        assert!(type_expr(&mut ctx, &expr, true).is_err());
    }

    #[test]
    fn statement_position_if_ignores_branch_mismatch() {
        let mut ctx = root_ctx();
        let expr = node(
            UExpr::If {
                cond: Box::new(node(UExpr::Const(UConstant::Bool(true)), 0, 1)),
                then_branch: Box::new(int_lit(1)),
                else_branch: Some(Box::new(string_lit("no"))),
            },
            0,
            1,
        );
        let t = type_expr(&mut ctx, &expr, false).unwrap();
        assert_eq!(t.ty, Ty::void());
    }

    #[test]
    fn var_decl_binds_a_local_visible_afterward() {
        let mut ctx = root_ctx();
        let block = node(
            UExpr::Block(vec![
                node(UExpr::Var { name: "x".into(), ty: None, init: Some(Box::new(int_lit(5))), is_static: false }, 0, 1),
                node(UExpr::Ident("x".into()), 0, 1),
            ]),
            0,
            1,
        );
        let t = type_expr(&mut ctx, &block, true).unwrap();
        assert_eq!(t.ty, Ty::int());
        assert!(ctx.lookup_local("x").is_none(), "block scope should not leak the local out");
    }

    #[test]
    fn assigning_to_a_literal_is_an_invalid_target() {
        let mut ctx = root_ctx();
        let expr = node(UExpr::Assign { lhs: Box::new(int_lit(1)), rhs: Box::new(int_lit(2)) }, 0, 1);
        assert!(matches!(type_expr(&mut ctx, &expr, true), Err(Outcome::Err(TypeError::InvalidAssignTarget { .. }))));
    }

    #[test]
    fn array_literal_unifies_every_element() {
        let mut ctx = root_ctx();
        let expr = node(UExpr::ArrayLit(vec![int_lit(1), int_lit(2), int_lit(3)]), 0, 1);
        let t = type_expr(&mut ctx, &expr, true).unwrap();
        assert_eq!(t.ty, Ty::array(Ty::int()));
    }

    #[test]
    fn for_loop_binds_the_array_element_type() {
        let mut ctx = root_ctx();
        let arr = node(UExpr::ArrayLit(vec![int_lit(1), int_lit(2)]), 0, 1);
        let body = node(UExpr::Ident("it".into()), 0, 1);
        let expr = node(UExpr::For { var_name: "it".into(), iterable: Box::new(arr), body: Box::new(body) }, 0, 1);
        let t = type_expr(&mut ctx, &expr, false).unwrap();
        assert_eq!(t.ty, Ty::void());
    }

    fn option_enum() -> ember_ast::EnumType {
        ember_ast::EnumType {
            name: "Option".into(),
            path: "Option".into(),
            type_params: vec![ember_ast::TypeParamDecl { name: "T".into(), constraints: Vec::new() }],
            constructors: vec![
                EnumConstructor { name: "Some".into(), args: vec![("v".into(), UTypeExpr::simple("T"))] },
                EnumConstructor { name: "None".into(), args: Vec::new() },
            ],
        }
    }

    #[test]
    fn enum_switch_missing_a_constructor_is_non_exhaustive() {
        let mut ctx = root_ctx();
        ctx.registry.register_enum(option_enum());
        let subject = node(UExpr::Ident("None".into()), 0, 1);
        ctx.local_types.push(ember_ast::TypeDecl::Enum(option_enum()));

        let cases = vec![UCase {
            pattern: UCasePattern::Constructor { name: "Some".into(), args: vec![USubPattern::Wildcard] },
            guard: None,
            body: Box::new(int_lit(1)),
            pos: ember_ast::Pos::synthetic(),
        }];
        let expr = node(UExpr::Switch { subject: Box::new(subject), cases, default: None, need_val: true }, 0, 1);
        let result = type_expr(&mut ctx, &expr, true);
        assert!(matches!(result, Err(Outcome::Err(TypeError::NonExhaustiveMatch { .. }))));
    }

    #[test]
    fn enum_switch_with_wildcard_case_is_exhaustive() {
        let mut ctx = root_ctx();
        ctx.registry.register_enum(option_enum());
        ctx.local_types.push(ember_ast::TypeDecl::Enum(option_enum()));
        let subject = node(UExpr::Ident("None".into()), 0, 1);

        let cases = vec![
            UCase {
                pattern: UCasePattern::Constructor { name: "Some".into(), args: vec![USubPattern::Bind("v".into())] },
                guard: None,
                body: Box::new(int_lit(1)),
                pos: ember_ast::Pos::synthetic(),
            },
            UCase { pattern: UCasePattern::Wildcard, guard: None, body: Box::new(int_lit(0)), pos: ember_ast::Pos::synthetic() },
        ];
        let expr = node(UExpr::Switch { subject: Box::new(subject), cases, default: None, need_val: true }, 0, 1);
        let t = type_expr(&mut ctx, &expr, true).unwrap();
        assert_eq!(t.ty, Ty::int());
    }

    fn int_field(name: &str) -> ClassField {
        ClassField {
            name: name.to_string(),
            kind: FieldKind::Var {
                read: ember_ast::VarAccess::Normal,
                write: ember_ast::VarAccess::Normal,
                ty: UTypeExpr::simple("Int"),
                is_var_metadata: false,
            },
            visibility: ember_ast::FieldVisibility::Public,
            is_static: true,
        }
    }

    fn plain_class(name: &str, statics: Vec<ClassField>) -> ClassType {
        ClassType {
            name: name.to_string(),
            path: name.to_string(),
            type_params: Vec::<ember_ast::TypeParamDecl>::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics,
            constructor: None,
            is_extern: false,
            constructor_is_private: false,
        }
    }

    // ── Prefix-greedy module-path resolution (comment 1) ────────────────

    #[test]
    fn dotted_path_resolves_a_static_field_through_an_unregistered_module() {
        let mut loader = FixtureLoader::new();
        loader.register_module(ember_ast::Module {
            name: "Pkg".to_string(),
            decls: [("Tools".to_string(), ember_ast::TypeDecl::Class(plain_class("Tools", vec![int_field("x")])))].into_iter().collect(),
        });
        let mut ctx = TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap();

        let path = node(
            UExpr::Field(Box::new(node(UExpr::Field(Box::new(node(UExpr::Ident("Pkg".into()), 0, 3)), "Tools".into()), 0, 8)), "x".into()),
            0,
            10,
        );
        let t = type_expr(&mut ctx, &path, true).unwrap();
        assert_eq!(t.ty, Ty::int());
        assert!(ctx.registry.decl("Tools").is_some(), "resolving the path should register the loaded declaration");
    }

    #[test]
    fn dotted_path_with_an_unloadable_capitalized_start_is_module_not_found() {
        let mut ctx = root_ctx();
        let path = node(UExpr::Field(Box::new(node(UExpr::Ident("Bogus".into()), 0, 5)), "z".into()), 0, 7);
        let err = type_expr(&mut ctx, &path, true).unwrap_err();
        assert!(matches!(err, Outcome::Err(TypeError::ModuleNotFound { ref first_segment, .. }) if first_segment == "Bogus"));
    }

    // ── for-in element resolution (comment 3) ────────────────────────────

    fn class_with_iterator_method() -> ClassType {
        ClassType {
            constructor: Some(ClassField {
                name: "new".into(),
                kind: FieldKind::Method {
                    kind: ember_ast::MethodKind::Normal,
                    params: Vec::new(),
                    ret: UTypeExpr::simple("Void"),
                    has_self: true,
                },
                visibility: ember_ast::FieldVisibility::Public,
                is_static: false,
            }),
            fields: vec![ClassField {
                name: "iterator".into(),
                kind: FieldKind::Method {
                    kind: ember_ast::MethodKind::Normal,
                    params: Vec::new(),
                    ret: UTypeExpr::Path("Iterator".into(), vec![UTypeExpr::simple("Int")]),
                    has_self: true,
                },
                visibility: ember_ast::FieldVisibility::Public,
                is_static: false,
            }],
            ..plain_class("MyIter", Vec::new())
        }
    }

    #[test]
    fn custom_iterable_resolves_element_type_through_its_iterator_method() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(class_with_iterator_method());
        let new_expr = node(UExpr::New { path: "MyIter".into(), type_args: vec![], args: vec![] }, 0, 1);
        let titer = type_expr(&mut ctx, &new_expr, true).unwrap();
        let elem = resolve_iterator_element_type(&mut ctx, &titer, &ember_ast::Pos::synthetic()).unwrap();
        assert_eq!(elem, Ty::int());
    }

    #[test]
    fn range_for_binds_the_loop_var_as_int_without_an_optimizer_installed() {
        let mut ctx = root_ctx();
        let range = node(UExpr::Binop { op: BinOp::Range, lhs: Box::new(int_lit(0)), rhs: Box::new(int_lit(10)) }, 0, 1);
        let body = node(
            UExpr::Var { name: "x".into(), ty: Some(UTypeExpr::simple("Int")), init: Some(Box::new(node(UExpr::Ident("i".into()), 0, 1))), is_static: false },
            0,
            1,
        );
        let expr = node(UExpr::For { var_name: "i".into(), iterable: Box::new(range), body: Box::new(body) }, 0, 1);
        assert!(type_expr(&mut ctx, &expr, false).is_ok());
    }

    struct FixedRangeOptimizer(Ty);
    impl RangeForOptimizer for FixedRangeOptimizer {
        fn specialize_range_for(&mut self, _lo: &Ty, _hi: &Ty) -> Option<Ty> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn range_for_consults_the_installed_optimizer_before_the_int_fast_path() {
        let mut ctx = root_ctx();
        ctx.g.range_for_optimizer = Some(Box::new(FixedRangeOptimizer(Ty::string())));
        let range = node(UExpr::Binop { op: BinOp::Range, lhs: Box::new(int_lit(0)), rhs: Box::new(int_lit(10)) }, 0, 1);
        let body = node(
            UExpr::Var { name: "x".into(), ty: Some(UTypeExpr::simple("Int")), init: Some(Box::new(node(UExpr::Ident("i".into()), 0, 1))), is_static: false },
            0,
            1,
        );
        let expr = node(UExpr::For { var_name: "i".into(), iterable: Box::new(range), body: Box::new(body) }, 0, 1);
        let err = type_expr(&mut ctx, &expr, false);
        assert!(err.is_err(), "the optimizer's String element type should conflict with the Int annotation on `x`");
    }

    // ── catch-clause parameterized-class restriction (comment 4) ────────

    fn generic_box_class() -> ClassType {
        ClassType { type_params: vec![ember_ast::TypeParamDecl { name: "T".into(), constraints: Vec::new() }], ..plain_class("Box", Vec::new()) }
    }

    #[test]
    fn catch_allows_a_parameterized_class_when_every_type_arg_is_dynamic() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(generic_box_class());
        let catches = vec![ember_ast::UCatch {
            name: "e".into(),
            ty: UTypeExpr::Path("Box".into(), vec![UTypeExpr::Dynamic(None)]),
            body: Box::new(int_lit(0)),
            pos: ember_ast::Pos::synthetic(),
        }];
        let expr = node(UExpr::Try { body: Box::new(int_lit(1)), catches }, 0, 1);
        assert!(type_expr(&mut ctx, &expr, true).is_ok());
    }

    #[test]
    fn catch_rejects_a_parameterized_class_with_a_concrete_type_arg() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(generic_box_class());
        let catches = vec![ember_ast::UCatch {
            name: "e".into(),
            ty: UTypeExpr::Path("Box".into(), vec![UTypeExpr::simple("Int")]),
            body: Box::new(int_lit(0)),
            pos: ember_ast::Pos::synthetic(),
        }];
        let expr = node(UExpr::Try { body: Box::new(int_lit(1)), catches }, 0, 1);
        assert!(matches!(type_expr(&mut ctx, &expr, true), Err(Outcome::Err(TypeError::Custom { .. }))));
    }

    // ── cast legality (comment 5) ─────────────────────────────────────────

    #[test]
    fn untyped_cast_produces_a_fresh_monomorph_not_dynamic() {
        let mut ctx = root_ctx();
        let expr = node(UExpr::Cast { expr: Box::new(int_lit(1)), ty: None }, 0, 1);
        let t = type_expr(&mut ctx, &expr, true).unwrap();
        assert!(matches!(t.ty, Ty::Var(_)), "cast(e) without a target must type as a fresh variable, not Dynamic");
    }

    #[test]
    fn checked_cast_to_a_class_with_every_type_param_dynamic_is_allowed() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(generic_box_class());
        let expr = node(
            UExpr::Cast { expr: Box::new(int_lit(1)), ty: Some(UTypeExpr::Path("Box".into(), vec![UTypeExpr::Dynamic(None)])) },
            0,
            1,
        );
        assert!(type_expr(&mut ctx, &expr, true).is_ok());
    }

    #[test]
    fn checked_cast_to_a_class_with_a_concrete_type_param_is_rejected() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(generic_box_class());
        let expr = node(
            UExpr::Cast { expr: Box::new(int_lit(1)), ty: Some(UTypeExpr::Path("Box".into(), vec![UTypeExpr::simple("Int")])) },
            0,
            1,
        );
        assert!(matches!(type_expr(&mut ctx, &expr, true), Err(Outcome::Err(TypeError::Custom { .. }))));
    }

    #[test]
    fn checked_cast_to_a_non_class_type_is_rejected() {
        let mut ctx = root_ctx();
        let expr = node(UExpr::Cast { expr: Box::new(int_lit(1)), ty: Some(UTypeExpr::simple("Int")) }, 0, 1);
        assert!(matches!(type_expr(&mut ctx, &expr, true), Err(Outcome::Err(TypeError::Custom { .. }))));
    }
}
