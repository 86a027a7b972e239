//! Finalization & reachability (C8).
//!
//! Two responsibilities, both run at module close:
//!
//! - [`finalize`] drains the delayed-closure queue (§5 "delayed-closure
//!   enqueue" suspension point) to a fixpoint — draining a closure may
//!   enqueue more (a deferred nested macro call typing another deferred
//!   nested macro call), so the loop keeps going until a drain pass adds
//!   nothing new.
//! - [`generate`] performs the reachability DFS from `main`: superclass,
//!   interfaces, each static field's initializer (typed once, memoized),
//!   and every type referenced by a typed initializer's `new`, type-expr,
//!   static-method-call, or match-subject-enum forms. A [`FinalizationState::Generating`]
//!   node observed again mid-walk is a static-initialization cycle —
//!   logged, not raised, and both types still finish in `Done` state (S6).

use rustc_hash::{FxHashMap, FxHashSet};

use ember_ast::{ClassType, EnumType, TypeDecl, UNode};
use tracing::warn;

use crate::context::TypingContext;
use crate::error::{Outcome, TypeError};
use crate::texpr::{TCatch, TEnumArm, TExpr, TNode, TValueArm};

/// Drain `ctx.g.delayed_closures` to a fixpoint. Re-running `finalize` on an
/// already-finalized context is a no-op (invariant 5, §8): an empty queue
/// drains zero closures and returns immediately.
pub fn finalize(ctx: &mut TypingContext) -> Result<(), TypeError> {
    loop {
        let pending = std::mem::take(&mut ctx.g.delayed_closures);
        if pending.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = pending.len(), "draining delayed-closure queue");
        for action in pending {
            action(ctx)?;
        }
    }
}

/// Per-type finalization state (data model §3): `Generating` observed
/// recursively signals a static-initialization cycle, non-fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizationState {
    NotYet,
    Generating,
    Done,
}

/// Supplies the untyped initializer expression for one static field.
/// `ClassField` (like every declaration shape this crate consumes) carries
/// only signatures, never bodies — the same boundary that keeps method
/// bodies out of `decl.rs` — so the reachability walker asks this trait for
/// the body to type, exactly as the expression typer asks a `ModuleLoader`
/// for a declaration's shape.
pub trait StaticInitSource {
    fn static_init(&self, class_name: &str, field_name: &str) -> Option<UNode>;
}

/// A `StaticInitSource` with nothing to supply — every static field is
/// walked for reachability but none are typed, useful when only the
/// superclass/interface/explicit-use graph is wanted.
pub struct NoStaticInits;

impl StaticInitSource for NoStaticInits {
    fn static_init(&self, _class_name: &str, _field_name: &str) -> Option<UNode> {
        None
    }
}

pub struct ReachabilityResult {
    /// Every type transitively reachable from `main` (or, with no `main`,
    /// every type this compilation's registry already holds), in visit
    /// order, with the synthetic `@Main` class appended last when `main`
    /// was given.
    pub types: Vec<TypeDecl>,
    /// Distinct modules (the portion of each type's dotted path before its
    /// own name) containing a reachable type, in first-seen order.
    pub modules: Vec<String>,
}

/// Walk every type reachable from `main`, finalizing static initializers
/// along the way. `excludes` names types to mark `extern` in the output
/// with their static initializer dropped (still walked for superclass and
/// interface reachability, since exclusion concerns init semantics only).
pub fn generate(
    ctx: &mut TypingContext,
    statics: &dyn StaticInitSource,
    main: Option<&str>,
    excludes: &[String],
) -> Result<ReachabilityResult, TypeError> {
    let mut walker = Walker {
        states: FxHashMap::default(),
        statics_done: FxHashSet::default(),
        excludes: excludes.iter().cloned().collect(),
        ordered_types: Vec::new(),
        seen_modules: FxHashSet::default(),
        ordered_modules: Vec::new(),
    };

    let roots: Vec<String> = match main {
        Some(main_class) => vec![main_class.to_string()],
        None => {
            let mut all: Vec<String> = ctx.registry.classes().map(|c| c.name.clone()).collect();
            all.sort();
            all
        }
    };

    for root in roots {
        walker.walk_type(ctx, statics, &root)?;
    }

    if let Some(main_class) = main {
        walker.ordered_types.push(TypeDecl::Class(synthetic_main_class(main_class)));
    }

    Ok(ReachabilityResult { types: walker.ordered_types, modules: walker.ordered_modules })
}

/// The `@Main` class appended as the last reachable type when a driver
/// entry point is given: `init = main.main()` in the distilled spec is a
/// static-initializer body this crate doesn't synthesize an expression for
/// (no typed-AST constructor exists outside the expression typer itself),
/// so the class is recorded bodiless — its presence in the output list is
/// what downstream code generators key off of, not its (absent) fields.
fn synthetic_main_class(main_class: &str) -> ClassType {
    ClassType {
        name: "@Main".to_string(),
        path: format!("{main_class}.@Main"),
        type_params: Vec::new(),
        super_class: None,
        interfaces: Vec::new(),
        fields: Vec::new(),
        statics: Vec::new(),
        constructor: None,
        is_extern: false,
        constructor_is_private: false,
    }
}

struct Walker {
    states: FxHashMap<String, FinalizationState>,
    statics_done: FxHashSet<(String, String)>,
    excludes: FxHashSet<String>,
    ordered_types: Vec<TypeDecl>,
    seen_modules: FxHashSet<String>,
    ordered_modules: Vec<String>,
}

impl Walker {
    fn walk_type(&mut self, ctx: &mut TypingContext, statics: &dyn StaticInitSource, name: &str) -> Result<(), TypeError> {
        match self.states.get(name).copied().unwrap_or(FinalizationState::NotYet) {
            FinalizationState::Done => return Ok(()),
            FinalizationState::Generating => {
                warn!(type_name = name, "maybe loop in static generation");
                return Ok(());
            }
            FinalizationState::NotYet => {}
        }

        let Some(decl) = ctx.registry.decl(name) else {
            // Referenced but never registered (e.g. a builtin primitive
            // named in a `new`/type-expr); nothing to walk or record.
            return Ok(());
        };

        self.states.insert(name.to_string(), FinalizationState::Generating);
        self.record_module(&decl);

        match decl {
            TypeDecl::Class(class) => self.walk_class(ctx, statics, class)?,
            TypeDecl::Enum(en) => self.walk_enum(en),
        }

        self.states.insert(name.to_string(), FinalizationState::Done);
        Ok(())
    }

    fn record_module(&mut self, decl: &TypeDecl) {
        let path = decl.path();
        let module = match path.rsplit_once('.') {
            Some((module, _)) => module.to_string(),
            None => path.to_string(),
        };
        if self.seen_modules.insert(module.clone()) {
            self.ordered_modules.push(module);
        }
    }

    fn walk_class(&mut self, ctx: &mut TypingContext, statics: &dyn StaticInitSource, class: ClassType) -> Result<(), TypeError> {
        let excluded = self.excludes.contains(&class.name);

        if let Some(super_name) = class.super_class.clone() {
            self.walk_type(ctx, statics, &super_name)?;
        }
        for iface in class.interfaces.clone() {
            self.walk_type(ctx, statics, &iface)?;
        }

        if !excluded {
            for field in class.statics.clone() {
                if !matches!(field.kind, ember_ast::FieldKind::Var { .. }) {
                    continue;
                }
                let key = (class.name.clone(), field.name.clone());
                if !self.statics_done.insert(key) {
                    continue;
                }
                let Some(init_expr) = statics.static_init(&class.name, &field.name) else {
                    continue;
                };
                let referenced = self.type_static_init(ctx, &class.name, &init_expr)?;
                for discovered in referenced {
                    self.walk_type(ctx, statics, &discovered)?;
                }
            }
        }

        let out_class = if excluded { ClassType { is_extern: true, ..class } } else { class };
        self.ordered_types.push(TypeDecl::Class(out_class));
        Ok(())
    }

    fn walk_enum(&mut self, en: EnumType) {
        self.ordered_types.push(TypeDecl::Enum(en));
    }

    /// Type one static field's initializer with `curclass`/`in_static` set
    /// appropriately, then scan the resulting typed tree for further
    /// reachable type names.
    fn type_static_init(&self, ctx: &mut TypingContext, class_name: &str, init_expr: &UNode) -> Result<Vec<String>, TypeError> {
        let saved_class = ctx.curclass.take();
        let saved_static = ctx.in_static;
        ctx.curclass = Some(class_name.to_string());
        ctx.in_static = true;

        let typed = crate::expr::type_expr(ctx, init_expr, true);

        ctx.curclass = saved_class;
        ctx.in_static = saved_static;

        let node = match typed {
            Ok(node) => node,
            Err(Outcome::Err(e)) => return Err(e),
            Err(Outcome::Signal(s)) => {
                return Err(TypeError::Custom {
                    message: format!("unexpected signal while finalizing a static initializer: {s}"),
                    origin: crate::error::ConstraintOrigin::Builtin,
                });
            }
        };

        let mut referenced = Vec::new();
        collect_referenced_types(&node, &mut referenced);
        Ok(referenced)
    }
}

/// Scan a typed expression tree for every type name it mentions through a
/// `new`, a bare type reference, a static-field/method receiver, an enum
/// constructor, or a match subject's enum type.
fn collect_referenced_types(node: &TNode, out: &mut Vec<String>) {
    if let Some(head) = node.ty.head_name() {
        out.push(head.to_string());
    }
    match &node.expr {
        TExpr::New { class, args } => {
            out.push(class.clone());
            for a in args {
                collect_referenced_types(a, out);
            }
        }
        TExpr::TypeRef(name) => out.push(name.clone()),
        TExpr::StaticField { class, .. } => out.push(class.clone()),
        TExpr::EnumCtor { enum_name, args, .. } => {
            out.push(enum_name.clone());
            for a in args {
                collect_referenced_types(a, out);
            }
        }
        TExpr::Field { receiver, .. } => collect_referenced_types(receiver, out),
        TExpr::Index(a, b) => {
            collect_referenced_types(a, out);
            collect_referenced_types(b, out);
        }
        TExpr::ArrayLit(items) => items.iter().for_each(|i| collect_referenced_types(i, out)),
        TExpr::ObjectLit(fields) => fields.iter().for_each(|(_, v)| collect_referenced_types(v, out)),
        TExpr::Block(stmts) => stmts.iter().for_each(|s| collect_referenced_types(s, out)),
        TExpr::Var { init, .. } => {
            if let Some(i) = init {
                collect_referenced_types(i, out);
            }
        }
        TExpr::If { cond, then_branch, else_branch } => {
            collect_referenced_types(cond, out);
            collect_referenced_types(then_branch, out);
            if let Some(e) = else_branch {
                collect_referenced_types(e, out);
            }
        }
        TExpr::While { cond, body, .. } => {
            collect_referenced_types(cond, out);
            collect_referenced_types(body, out);
        }
        TExpr::For { iterable, body, .. } => {
            collect_referenced_types(iterable, out);
            collect_referenced_types(body, out);
        }
        TExpr::SwitchEnum { subject, arms, default } => {
            collect_referenced_types(subject, out);
            walk_enum_arms(arms, out);
            if let Some(d) = default {
                collect_referenced_types(d, out);
            }
        }
        TExpr::SwitchValue { subject, arms, default } => {
            collect_referenced_types(subject, out);
            walk_value_arms(arms, out);
            if let Some(d) = default {
                collect_referenced_types(d, out);
            }
        }
        TExpr::Ternary { cond, then_branch, else_branch } => {
            collect_referenced_types(cond, out);
            collect_referenced_types(then_branch, out);
            collect_referenced_types(else_branch, out);
        }
        TExpr::Return(inner) => {
            if let Some(i) = inner {
                collect_referenced_types(i, out);
            }
        }
        TExpr::Throw(e) => collect_referenced_types(e, out),
        TExpr::Try { body, catches } => {
            collect_referenced_types(body, out);
            walk_catches(catches, out);
        }
        TExpr::Function(f) => collect_referenced_types(&f.body, out),
        TExpr::Unop { operand, .. } => collect_referenced_types(operand, out),
        TExpr::Binop { lhs, rhs, .. } | TExpr::Assign { lhs, rhs } | TExpr::OpAssign { lhs, rhs, .. } => {
            collect_referenced_types(lhs, out);
            collect_referenced_types(rhs, out);
        }
        TExpr::SetterBlock { receiver, value, .. } => {
            collect_referenced_types(receiver, out);
            collect_referenced_types(value, out);
        }
        TExpr::Call { callee, args } => {
            collect_referenced_types(callee, out);
            args.iter().for_each(|a| collect_referenced_types(a, out));
        }
        TExpr::Closure { receiver, .. } => {
            if let Some(r) = receiver {
                collect_referenced_types(r, out);
            }
        }
        TExpr::UsingEta { captured_receiver, .. } => collect_referenced_types(captured_receiver, out),
        TExpr::Inlined(inner) | TExpr::Untyped(inner) | TExpr::MacroSplice(inner) => collect_referenced_types(inner, out),
        TExpr::Cast { expr, checked_class } => {
            collect_referenced_types(expr, out);
            if let Some(c) = checked_class {
                out.push(c.clone());
            }
        }
        TExpr::Const(_) | TExpr::Local(_) | TExpr::Break | TExpr::Continue | TExpr::DelayCall { .. } => {}
    }
}

fn walk_enum_arms(arms: &[TEnumArm], out: &mut Vec<String>) {
    for arm in arms {
        if let Some(g) = &arm.guard {
            collect_referenced_types(g, out);
        }
        collect_referenced_types(&arm.body, out);
    }
}

fn walk_value_arms(arms: &[TValueArm], out: &mut Vec<String>) {
    for arm in arms {
        collect_referenced_types(&arm.value, out);
        if let Some(g) = &arm.guard {
            collect_referenced_types(g, out);
        }
        collect_referenced_types(&arm.body, out);
    }
}

fn walk_catches(catches: &[TCatch], out: &mut Vec<String>) {
    for catch in catches {
        if let Some(head) = catch.ty.head_name() {
            out.push(head.to_string());
        }
        collect_referenced_types(&catch.body, out);
    }
}
