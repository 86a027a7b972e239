//! The macro bridge (C9): a macro call `C.m(args)` is classified as
//! `AccessKind::Macro` by the field-access elaborator (§4.3's dispatch
//! table, `Method Normal/Macro` row) and dispatched here from the call
//! typer (`expr.rs::type_call_on_access`).
//!
//! Execution differs by phase (§4.8):
//! - **Top-level** (`!ctx.in_macro`): lazily compile the macro module via
//!   the (external, consumed-only) [`MacroInterpreter`], encode the call's
//!   arguments, invoke it, and splice the decoded expression back at the
//!   call site.
//! - **Nested** (`ctx.in_macro`): the outer macro hasn't run yet, so
//!   running the inner one now would need a result the interpreter can't
//!   produce yet. Instead emit a `DelayCall` placeholder and register a
//!   delayed action (drained by [`crate::finalize::finalize`], C8) that
//!   repeats the same encode/invoke/decode once the enclosing macro
//!   executes, against a snapshot of the locals visible at registration.

use ember_ast::{FieldKind, Pos, UNode};

use crate::context::TypingContext;
use crate::error::{ConstraintOrigin, Outcome, TypeError, TypeResult};
use crate::texpr::{TExpr, TNode};
use crate::ty::Ty;

/// An opaque handle to a compiled macro module, as handed back by
/// [`MacroInterpreter::load_macro_module`]. The typer never looks inside
/// it; only the interpreter that issued it knows what it denotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroModuleHandle(pub String);

/// One value crossing the typer/interpreter boundary. Per design note
/// "macro re-entry must not share interior-mutable type state with the
/// host context", call arguments are encoded to this serializable shape
/// rather than passed as live `TNode`s tied to the host's monomorph table.
#[derive(Debug, Clone)]
pub enum MacroValue {
    /// A single untyped expression argument — the by-expression calling
    /// convention used when the macro's first formal is `Expr`.
    Expr(UNode),
    /// All call-site arguments bundled as one array — the variadic calling
    /// convention used when the macro's first (and only) formal is
    /// `Array<Expr>`.
    ExprArray(Vec<UNode>),
}

#[derive(Debug, Clone)]
pub struct MacroError {
    pub message: String,
}

impl std::fmt::Display for MacroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MacroError {}

/// The external collaborator named in §1 ("macro interpreter, called via a
/// single entry point"). Everything this crate is actually responsible for
/// — detecting the call site, arity-checking `Expr`/`Array<Expr>` formals,
/// encoding arguments, splicing the decoded result, and deferring nested
/// calls — lives in this module; compiling the macro module's own body
/// into something runnable, and actually running it, is the interpreter's
/// problem, not the typer's.
pub trait MacroInterpreter {
    /// Compile (and internally cache) the macro module backing
    /// `class_name`, ready to run [`invoke`](Self::invoke) against.
    fn load_macro_module(&mut self, class_name: &str, pos: &Pos) -> Result<MacroModuleHandle, MacroError>;

    /// Run `method` on the module behind `handle` with already-encoded
    /// arguments, returning the untyped expression tree to splice at the
    /// call site.
    fn invoke(&mut self, handle: &MacroModuleHandle, method: &str, args: Vec<MacroValue>) -> Result<UNode, MacroError>;
}

/// Entry point called from `expr.rs` whenever a call's access kind resolved
/// to `AccessKind::Macro`.
pub fn dispatch_macro_call(ctx: &mut TypingContext, receiver: Box<TNode>, field: &str, args: &[UNode], pos: &Pos) -> TypeResult<TNode> {
    let class_name = receiver
        .ty
        .head_name()
        .map(str::to_string)
        .or_else(|| match &receiver.expr {
            TExpr::TypeRef(name) => Some(name.clone()),
            _ => None,
        })
        .ok_or_else(|| Outcome::Err(TypeError::NoSuchMethod { ty: receiver.ty.clone(), method: field.to_string(), span: pos.span }))?;

    if ctx.in_macro {
        return Ok(delay_call(ctx, class_name, field.to_string(), args.to_vec(), pos.clone()));
    }

    top_level_macro_call(ctx, &class_name, field, args, pos)
}

fn top_level_macro_call(ctx: &mut TypingContext, class_name: &str, field: &str, args: &[UNode], pos: &Pos) -> TypeResult<TNode> {
    let class = ctx
        .registry
        .class(class_name)
        .cloned()
        .ok_or_else(|| Outcome::Err(TypeError::NoSuchMethod { ty: Ty::named(class_name.to_string(), Vec::new()), method: field.to_string(), span: pos.span }))?;

    let macro_field = class
        .find_field(field, true)
        .cloned()
        .ok_or_else(|| Outcome::Err(TypeError::NoSuchMethod { ty: Ty::named(class_name.to_string(), Vec::new()), method: field.to_string(), span: pos.span }))?;

    let encoded = encode_args(&macro_field, args, field, pos)?;

    let handle = ensure_macro_handle(ctx, class_name, pos)?;

    let decoded = {
        let interpreter = ctx.g.macro_interpreter.as_mut().ok_or_else(|| {
            Outcome::Err(TypeError::Custom {
                message: "no macro interpreter installed for this compilation".to_string(),
                origin: ConstraintOrigin::Builtin,
            })
        })?;
        interpreter
            .invoke(&handle, field, encoded)
            .map_err(|e| Outcome::Err(TypeError::Custom { message: e.message, origin: ConstraintOrigin::Builtin }))?
    };

    splice(ctx, decoded)
}

/// Lazily compile and cache the macro module for `class_name`, per
/// "lazily build a sibling typing context ... load the macro module,
/// finalize, hand generated types to the interpreter" — the sibling
/// context construction and finalization is the interpreter's internal
/// affair (it owns the module's own typing, per the class comment above);
/// this function's job is purely the memoization contract `Globals`
/// documents (`macro_handles`).
fn ensure_macro_handle(ctx: &mut TypingContext, class_name: &str, pos: &Pos) -> TypeResult<MacroModuleHandle> {
    if let Some(handle) = ctx.g.macro_handles.get(class_name) {
        return Ok(handle.clone());
    }
    tracing::debug!(class = class_name, "compiling macro module for first use");
    let handle = {
        let interpreter = ctx.g.macro_interpreter.as_mut().ok_or_else(|| {
            Outcome::Err(TypeError::Custom {
                message: "no macro interpreter installed for this compilation".to_string(),
                origin: ConstraintOrigin::Builtin,
            })
        })?;
        interpreter
            .load_macro_module(class_name, pos)
            .map_err(|e| Outcome::Err(TypeError::Custom { message: e.message, origin: ConstraintOrigin::Builtin }))?
    };
    ctx.g.macro_handles.insert(class_name.to_string(), handle.clone());
    Ok(handle)
}

/// Type the interpreter's decoded expression in the *host* context (not
/// the sibling the macro ran against) and wrap it in a `MacroSplice` node
/// so downstream consumers can tell a macro-produced subtree from one the
/// programmer wrote directly.
fn splice(ctx: &mut TypingContext, decoded: UNode) -> TypeResult<TNode> {
    let typed = crate::expr::type_expr(ctx, &decoded, true)?;
    let ty = typed.ty.clone();
    let pos = typed.pos.clone();
    Ok(TNode::new(TExpr::MacroSplice(Box::new(typed)), ty, pos))
}

/// Arity-check and encode a macro call's arguments per the bridge-level
/// rule in §4.8: if the macro's first declared parameter is `Expr`, the
/// call is by-expression and the argument count must match the formal
/// count exactly; if it's `Array<Expr>`, every argument is bundled into a
/// single variadic array instead.
fn encode_args(field: &ember_ast::ClassField, args: &[UNode], call_name: &str, pos: &Pos) -> TypeResult<Vec<MacroValue>> {
    let FieldKind::Method { params, .. } = &field.kind else {
        return Err(Outcome::Err(TypeError::NotAFunction { ty: Ty::Dynamic, span: pos.span }));
    };

    if let Some(first) = params.first() {
        if is_expr_array(&first.ty) {
            return Ok(vec![MacroValue::ExprArray(args.to_vec())]);
        }
    }

    if args.len() != params.len() {
        return Err(Outcome::Err(TypeError::ArityMismatch {
            expected: params.len(),
            found: args.len(),
            origin: ConstraintOrigin::FnArg { call_site: pos.span, param_idx: args.len().min(params.len()) },
        }));
    }

    let _ = call_name;
    Ok(args.iter().cloned().map(MacroValue::Expr).collect())
}

fn is_expr_array(ty: &ember_ast::UTypeExpr) -> bool {
    matches!(ty, ember_ast::UTypeExpr::Path(name, args)
        if name == "Array" && matches!(args.first(), Some(ember_ast::UTypeExpr::Path(inner, _)) if inner == "Expr"))
}

/// Register a delayed action for a macro call made from inside another
/// macro's body: returns a `DelayCall` placeholder immediately, and
/// enqueues the real encode/invoke/decode/splice to run once the outer
/// macro has executed and `finalize` drains the queue. The locals visible
/// right now are snapshotted (by value, via `ctx.locals.clone()`) since the
/// typing context they'd otherwise read from may have moved on by the time
/// this action runs.
fn delay_call(ctx: &mut TypingContext, class_name: String, field: String, args: Vec<UNode>, pos: Pos) -> TNode {
    let slot = ctx.g.delayed_closures.len();
    let locals_snapshot = ctx.locals.clone();
    let result_ty = ctx.infer.fresh_var();
    let result_ty_for_action = result_ty.clone();

    ctx.g.enqueue(Box::new(move |ctx: &mut TypingContext| {
        let saved_locals = std::mem::replace(&mut ctx.locals, locals_snapshot);
        let outcome = top_level_macro_call(ctx, &class_name, &field, &args, &pos);
        ctx.locals = saved_locals;
        match outcome {
            Ok(node) => ctx.infer.unify(result_ty_for_action, node.ty, crate::error::ConstraintOrigin::Builtin),
            Err(Outcome::Err(e)) => Err(e),
            // A display/type-path signal escaping a delayed macro call has
            // nowhere left to unwind to; surface it as a custom error
            // instead of silently dropping it.
            Err(Outcome::Signal(s)) => Err(TypeError::Custom { message: format!("unexpected signal from delayed macro call: {s}"), origin: ConstraintOrigin::Builtin }),
        }
    }));

    TNode::new(TExpr::DelayCall { slot }, result_ty, pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{ClassField, ClassType, FieldVisibility, MethodKind, ParamDecl, TypeParamDecl, UTypeExpr};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn root_ctx() -> TypingContext {
        let loader = ember_ast::FixtureLoader::new();
        TypingContext::new_root(Box::new(loader), crate::context::ContextFlags::default()).unwrap()
    }

    fn macro_class(param_ty: UTypeExpr) -> ClassType {
        ClassType {
            name: "Macros".into(),
            path: "Macros".into(),
            type_params: Vec::<TypeParamDecl>::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: vec![ClassField {
                name: "build".into(),
                kind: FieldKind::Method {
                    kind: MethodKind::Macro,
                    params: vec![ParamDecl::required("e", param_ty)],
                    ret: UTypeExpr::simple("Dynamic"),
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

    /// A fake interpreter that always splices back a constant `1`, and
    /// records how many times each method was called.
    struct FakeInterpreter {
        calls: Rc<RefCell<Vec<String>>>,
    }

    impl MacroInterpreter for FakeInterpreter {
        fn load_macro_module(&mut self, class_name: &str, _pos: &Pos) -> Result<MacroModuleHandle, MacroError> {
            Ok(MacroModuleHandle(class_name.to_string()))
        }

        fn invoke(&mut self, handle: &MacroModuleHandle, method: &str, args: Vec<MacroValue>) -> Result<UNode, MacroError> {
            self.calls.borrow_mut().push(format!("{}.{}({} args)", handle.0, method, args.len()));
            Ok(ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(1)), 0, 0))
        }
    }

    fn receiver_of_class(name: &str) -> Box<TNode> {
        Box::new(TNode::new(TExpr::TypeRef(name.to_string()), Ty::named(name, vec![]), Pos::synthetic()))
    }

    #[test]
    fn top_level_macro_call_splices_the_decoded_expression() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(macro_class(UTypeExpr::simple("Expr")));
        let calls = Rc::new(RefCell::new(Vec::new()));
        ctx.g.macro_interpreter = Some(Box::new(FakeInterpreter { calls: calls.clone() }));

        let pos = Pos::synthetic();
        let arg = ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(2)), 0, 1);
        let result = dispatch_macro_call(&mut ctx, receiver_of_class("Macros"), "build", &[arg], &pos).unwrap();

        assert!(matches!(result.expr, TExpr::MacroSplice(_)));
        assert_eq!(calls.borrow().as_slice(), ["Macros.build(1 args)"]);
    }

    #[test]
    fn second_call_reuses_the_cached_handle() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(macro_class(UTypeExpr::simple("Expr")));
        let calls = Rc::new(RefCell::new(Vec::new()));
        ctx.g.macro_interpreter = Some(Box::new(FakeInterpreter { calls: calls.clone() }));
        let pos = Pos::synthetic();
        let arg = ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(2)), 0, 1);

        dispatch_macro_call(&mut ctx, receiver_of_class("Macros"), "build", &[arg.clone()], &pos).unwrap();
        dispatch_macro_call(&mut ctx, receiver_of_class("Macros"), "build", &[arg], &pos).unwrap();

        assert_eq!(ctx.g.macro_handles.len(), 1);
    }

    #[test]
    fn array_of_expr_formal_bundles_all_arguments() {
        let mut ctx = root_ctx();
        let array_of_expr = UTypeExpr::Path("Array".into(), vec![UTypeExpr::simple("Expr")]);
        ctx.registry.register_class(macro_class(array_of_expr));
        let calls = Rc::new(RefCell::new(Vec::new()));
        ctx.g.macro_interpreter = Some(Box::new(FakeInterpreter { calls: calls.clone() }));
        let pos = Pos::synthetic();
        let args = vec![
            ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(1)), 0, 1),
            ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(2)), 1, 2),
            ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(3)), 2, 3),
        ];

        dispatch_macro_call(&mut ctx, receiver_of_class("Macros"), "build", &args, &pos).unwrap();
        assert_eq!(calls.borrow().as_slice(), ["Macros.build(1 args)"]);
    }

    #[test]
    fn expr_formal_arity_mismatch_is_an_error() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(macro_class(UTypeExpr::simple("Expr")));
        ctx.g.macro_interpreter = Some(Box::new(FakeInterpreter { calls: Rc::new(RefCell::new(Vec::new())) }));
        let pos = Pos::synthetic();
        let args = vec![
            ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(1)), 0, 1),
            ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(2)), 1, 2),
        ];

        let result = dispatch_macro_call(&mut ctx, receiver_of_class("Macros"), "build", &args, &pos);
        assert!(matches!(result, Err(Outcome::Err(TypeError::ArityMismatch { .. }))));
    }

    #[test]
    fn nested_macro_call_defers_instead_of_reentering() {
        let mut ctx = root_ctx();
        ctx.registry.register_class(macro_class(UTypeExpr::simple("Expr")));
        ctx.in_macro = true;
        let pos = Pos::synthetic();
        let arg = ember_ast::node(ember_ast::UExpr::Const(ember_ast::UConstant::Int(2)), 0, 1);

        let result = dispatch_macro_call(&mut ctx, receiver_of_class("Macros"), "build", &[arg], &pos).unwrap();
        assert!(matches!(result.expr, TExpr::DelayCall { slot: 0 }));
        assert_eq!(ctx.g.delayed_closures.len(), 1);
    }
}
