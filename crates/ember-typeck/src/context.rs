//! The typing context (data model §3) and the root-context factory (C10).
//!
//! One [`TypingContext`] lives per compilation; the macro bridge (C9)
//! constructs a sibling with its own `TypeRegistry` and `InferCtx` rather
//! than sharing either, per the design note "macro re-entry must not share
//! interior-mutable type state with the host context".

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::debug;

use ember_ast::{ClassType, EnumType, LoaderError, Module, ModuleLoader, Pos, TypeDecl, UTypeExpr};

use crate::error::TypeError;
use crate::ty::{Ty, TyVar};
use crate::unify::InferCtx;

/// Backend-selection switch (§6 "Context flags"). Affects nullable lifting,
/// optional-argument trimming, accessor prefixing, and the `__unprotect__`
/// intrinsic — all left as no-ops for backends this crate does not emit
/// code for, but recorded so the policy decisions in `field_access.rs` and
/// `call.rs` have something concrete to switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The bytecode/interpreter backend macros run against; also the
    /// default for ordinary compilation.
    Neko,
    Flash,
    Flash9,
    Js,
    As3,
    Cpp,
}

impl Backend {
    /// Value-typed backends (`Flash`/`Flash9`/`Cpp`) cannot represent a
    /// bare nullable reference type the way the others can, so `Null<T>`
    /// stays a distinct wrapper for them instead of collapsing to `T`.
    pub fn is_value_typed(self) -> bool {
        matches!(self, Backend::Flash | Backend::Flash9 | Backend::Cpp)
    }

    /// Backends whose call ABI cannot represent a trailing `null` argument,
    /// so the call-parameter matcher trims literal-null optional trailers.
    pub fn trims_trailing_null_args(self) -> bool {
        matches!(self, Backend::Flash | Backend::Flash9 | Backend::As3)
    }
}

#[derive(Debug, Clone)]
pub struct ContextFlags {
    pub no_inline: bool,
    pub no_traces: bool,
    pub backend: Backend,
    /// Set on the sibling context the macro bridge (C9) builds; relaxes
    /// nothing by itself but is consulted so nested macro calls register a
    /// `delay_call` instead of reentering the interpreter directly.
    pub in_macro: bool,
}

impl Default for ContextFlags {
    fn default() -> Self {
        ContextFlags { no_inline: false, no_traces: false, backend: Backend::Neko, in_macro: false }
    }
}

/// A resolved type alias binding, as consulted by the numeric kind
/// classifier (C2) when a `Con` name isn't one of the three primitives.
#[derive(Debug, Clone)]
pub struct AliasInfo {
    pub aliased_type: Ty,
}

/// The name-keyed store of every type declaration visible to this
/// compilation, populated by the (external) module loader as paths are
/// resolved. Consumed by every component that needs to look a name up by
/// its declaration rather than by its `Ty` shape.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    classes: FxHashMap<String, ClassType>,
    enums: FxHashMap<String, EnumType>,
    aliases: FxHashMap<String, AliasInfo>,
    /// Type-parameter name -> the numeric interface it's constrained to,
    /// so `classify` can report `KParam(t)` instead of `KOther`.
    numeric_params: FxHashMap<String, Ty>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register_class(&mut self, class: ClassType) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn register_enum(&mut self, en: EnumType) {
        self.enums.insert(en.name.clone(), en);
    }

    pub fn register_decl(&mut self, decl: TypeDecl) {
        match decl {
            TypeDecl::Class(c) => self.register_class(c),
            TypeDecl::Enum(e) => self.register_enum(e),
        }
    }

    pub fn register_alias(&mut self, name: impl Into<String>, aliased_type: Ty) {
        self.aliases.insert(name.into(), AliasInfo { aliased_type });
    }

    pub fn mark_numeric_param(&mut self, name: impl Into<String>, constraint_ty: Ty) {
        self.numeric_params.insert(name.into(), constraint_ty);
    }

    pub fn class(&self, name: &str) -> Option<&ClassType> {
        self.classes.get(name)
    }

    pub fn enum_(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    pub fn decl(&self, name: &str) -> Option<TypeDecl> {
        if let Some(c) = self.classes.get(name) {
            return Some(TypeDecl::Class(c.clone()));
        }
        self.enums.get(name).map(|e| TypeDecl::Enum(e.clone()))
    }

    pub fn lookup_alias(&self, name: &str) -> Option<&AliasInfo> {
        self.aliases.get(name)
    }

    pub fn numeric_type_param(&self, name: &str) -> Option<Ty> {
        self.numeric_params.get(name).cloned()
    }

    /// All registered classes that declare at least one `using`-eligible
    /// static method, for candidate iteration in the using-extension
    /// resolver; the *order* iterated is the caller's `local_using` list,
    /// not this registry, so this is just a by-name lookup surface.
    pub fn classes(&self) -> impl Iterator<Item = &ClassType> {
        self.classes.values()
    }
}

/// One pending action queued by the field-access elaborator or the macro
/// bridge, drained to a fixpoint by [`crate::finalize::finalize`] (C8).
/// Represented as a boxed closure per design note "delayed closures for
/// finalization": a FIFO of callbacks that may enqueue more of themselves
/// while running. Takes the whole [`TypingContext`] (not just the infer
/// table and registry) since a deferred action typically needs to reenter
/// the expression typer itself — finishing a nested macro splice, for
/// instance, rather than only touching unification state.
pub type DelayedAction = Box<dyn FnOnce(&mut TypingContext) -> Result<(), TypeError>>;

/// Globals (`g` in the data model): state shared by the whole compilation
/// rather than scoped to one typing context, and in particular *not*
/// shared with a macro bridge's sibling context.
#[derive(Default)]
pub struct Globals {
    pub delayed_closures: VecDeque<DelayedAction>,
    pub inlining_enabled: bool,
    /// Macro modules already compiled this compilation, keyed by the
    /// class name declaring the macro methods, so a second top-level call
    /// into the same class reuses the handle instead of recompiling.
    pub macro_handles: FxHashMap<String, crate::macro_bridge::MacroModuleHandle>,
    /// The (external, consumed-only) macro interpreter, installed once by
    /// whoever constructs the root context for a compilation that actually
    /// runs macros; absent for pure type-checking without macro execution.
    pub macro_interpreter: Option<Box<dyn crate::macro_bridge::MacroInterpreter>>,
    /// The (external, consumed-only) module loader, kept for the lifetime of
    /// the compilation rather than only at root-context bootstrap: field
    /// paths (C3) and named type annotations (`tyexpr::resolve_named`) both
    /// need to resolve a not-yet-registered name on demand, long after the
    /// initial `StdTypes`/`String`/`Array` bootstrap has run.
    pub module_loader: Option<Box<dyn ModuleLoader>>,
    /// The (external, consumed-only) range-for specializer consulted by
    /// `expr::type_for` before it synthesizes ordinary iterator resolution
    /// (spec.md:171); absent by default, so a `for (i in a...b)` loop
    /// always falls through to binding the loop variable as `Int` directly.
    pub range_for_optimizer: Option<Box<dyn crate::expr::RangeForOptimizer>>,
}

impl Globals {
    pub fn enqueue(&mut self, action: DelayedAction) {
        self.delayed_closures.push_back(action);
    }
}

/// Open-anonymous-type bookkeeping cell (design note "open anonymous
/// types"): tracks a monomorph that currently denotes an `Opened`
/// anonymous type, so scope exit can close it.
#[derive(Debug, Clone, Copy)]
pub struct OpenedAnon {
    pub var: TyVar,
}

/// A snapshot of every scope-local piece of state, taken on block entry and
/// restored on exit (normal, error, or display-signal) per the "scoped
/// acquisition" discipline in §5.
pub struct ScopeSnapshot {
    locals_len: usize,
    local_types_len: usize,
    local_using_len: usize,
    type_params_len: usize,
    opened_len: usize,
}

/// One compilation's typing context. Locals are a simple ordered `Vec`
/// rather than a `HashMap` so shadowing (`let x = 1; let x = "a";`) is
/// resolved by last-match-wins without a separate rename pass for the
/// common case; `locals_map`/`locals_map_inv` handle the renaming needed
/// only when a shadowed local must keep a *distinct* runtime slot.
pub struct TypingContext {
    pub locals: Vec<(String, Ty)>,
    pub locals_map: FxHashMap<String, String>,
    pub locals_map_inv: FxHashMap<String, String>,
    pub local_types: Vec<TypeDecl>,
    /// `using` clauses, in declaration order — using-extension resolution
    /// is first-match-wins over this list (C7).
    pub local_using: Vec<ClassType>,
    pub type_params: Vec<String>,

    pub curclass: Option<String>,
    pub curmethod: Option<String>,
    pub tthis: Option<Ty>,
    pub ret: Option<Ty>,

    pub in_static: bool,
    pub in_constructor: bool,
    pub in_loop: bool,
    pub in_super_call: bool,
    pub in_display: bool,
    pub in_macro: bool,
    pub untyped: bool,

    pub opened: Vec<OpenedAnon>,
    /// Expected-type hint threaded into function-literal inference by the
    /// call site (bidirectional inference seed for unresolved arg types).
    pub param_type: Option<Ty>,

    pub flags: ContextFlags,
    pub registry: TypeRegistry,
    pub infer: InferCtx,
    pub g: Globals,
}

impl TypingContext {
    fn empty(flags: ContextFlags) -> Self {
        TypingContext {
            locals: Vec::new(),
            locals_map: FxHashMap::default(),
            locals_map_inv: FxHashMap::default(),
            local_types: Vec::new(),
            local_using: Vec::new(),
            type_params: Vec::new(),
            curclass: None,
            curmethod: None,
            tthis: None,
            ret: None,
            in_static: false,
            in_constructor: false,
            in_loop: false,
            in_super_call: false,
            in_display: false,
            in_macro: flags.in_macro,
            untyped: false,
            opened: Vec::new(),
            param_type: None,
            flags,
            registry: TypeRegistry::new(),
            infer: InferCtx::new(),
            g: Globals { inlining_enabled: true, ..Globals::default() },
        }
    }

    /// C10: construct the root typing context. Loads the standard
    /// library's `StdTypes` module, binds `Void`/`Bool` from it and
    /// `Float`/`Int` from their own declarations, loads `String`/`Array`
    /// to populate the builtin registry, and installs the nullable-lift
    /// policy for the selected backend.
    pub fn new_root(mut loader: Box<dyn ModuleLoader>, flags: ContextFlags) -> Result<Self, TypeError> {
        let mut ctx = TypingContext::empty(flags);
        let pos = Pos::synthetic();

        debug!(backend = ?ctx.flags.backend, "constructing root typing context");

        if let Ok(std_types) = loader.load_module("StdTypes", &pos) {
            for decl in std_types.decls.into_values() {
                ctx.registry.register_decl(decl);
            }
        }
        if let Ok(string_mod) = loader.load_module("String", &pos) {
            for decl in string_mod.decls.into_values() {
                ctx.registry.register_decl(decl);
            }
        }
        if let Ok(array_mod) = loader.load_module("Array", &pos) {
            for decl in array_mod.decls.into_values() {
                ctx.registry.register_decl(decl);
            }
        }

        // Bare primitives are always available even if the fixture loader
        // didn't register `StdTypes`/`Float`/`Int` declarations; the kind
        // classifier and unifier only need the `Ty` shape, not a `TypeDecl`.
        ctx.registry.register_alias("Void", Ty::void());

        ctx.g.module_loader = Some(loader);

        Ok(ctx)
    }

    /// Load a module by dotted path on demand, used by the prefix-greedy
    /// module-path resolver in `expr::type_field_path`. Returns `None` when
    /// this compilation has no loader installed (e.g. a hermetic unit test
    /// that never calls `new_root`'s bootstrap with a real one).
    pub fn load_module(&mut self, path: &str, pos: &Pos) -> Result<Module, LoaderError> {
        match self.g.module_loader.as_mut() {
            Some(loader) => loader.load_module(path, pos),
            None => Err(LoaderError::new(format!("no module loader installed: {path}"), pos.clone())),
        }
    }

    /// Resolve a single type declaration by dotted path, consulted by
    /// `tyexpr::resolve_named` for a name absent from the registry.
    pub fn load_type_def(&mut self, path: &str, pos: &Pos) -> Result<TypeDecl, LoaderError> {
        match self.g.module_loader.as_mut() {
            Some(loader) => loader.load_type_def(path, pos),
            None => Err(LoaderError::new(format!("no module loader installed: {path}"), pos.clone())),
        }
    }

    /// Resolve a type annotation written at a use site, filling omitted
    /// type parameters with their declared defaults when `allow_param_defaults`.
    pub fn load_instance(
        &mut self,
        type_expr: &UTypeExpr,
        pos: &Pos,
        allow_param_defaults: bool,
    ) -> Result<TypeDecl, LoaderError> {
        match self.g.module_loader.as_mut() {
            Some(loader) => loader.load_instance(type_expr, pos, allow_param_defaults),
            None => Err(LoaderError::new("no module loader installed", pos.clone())),
        }
    }

    /// Collapse `Null<T>` to `T` per the selected backend's nullable-lift
    /// policy: reference-typed backends don't need a wrapper, value-typed
    /// backends (`Flash`/`Flash9`/`Cpp`) do.
    pub fn lift_nullable(&self, ty: Ty) -> Ty {
        if self.flags.backend.is_value_typed() {
            ty
        } else {
            match ty {
                Ty::Null(inner) => *inner,
                other => other,
            }
        }
    }

    // ── Local scope management ──────────────────────────────────────────

    pub fn lookup_local(&self, name: &str) -> Option<&Ty> {
        self.locals.iter().rev().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn push_local(&mut self, name: impl Into<String>, ty: Ty) {
        self.locals.push((name.into(), ty));
    }

    /// Save every piece of scope-local state before entering a new block,
    /// per §5's "scoped acquisition": `locals`, `locals_map`,
    /// `locals_map_inv`, `local_types`, `local_using`, `type_params`, and
    /// the `opened` stack are all restorable, even though in practice only
    /// `locals` commonly grows inside a block.
    pub fn save_scope(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            locals_len: self.locals.len(),
            local_types_len: self.local_types.len(),
            local_using_len: self.local_using.len(),
            type_params_len: self.type_params.len(),
            opened_len: self.opened.len(),
        }
    }

    /// Restore a previously saved snapshot. Called on every exit path from
    /// a block — normal return, a propagated `Err`, or a `Display`/`TypePath`
    /// signal — so later sibling statements never see locals introduced by
    /// an arm that didn't actually run.
    pub fn restore_scope(&mut self, snapshot: ScopeSnapshot) {
        self.locals.truncate(snapshot.locals_len);
        self.local_types.truncate(snapshot.local_types_len);
        self.local_using.truncate(snapshot.local_using_len);
        self.type_params.truncate(snapshot.type_params_len);
        self.opened.truncate(snapshot.opened_len);
    }

    /// Run `f` inside a saved/restored scope, propagating whatever `f`
    /// returns (error or signal) after restoring, matching the discipline
    /// that restoration happens on every exit path, not just success.
    pub fn with_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, crate::error::Outcome>) -> Result<T, crate::error::Outcome> {
        let snapshot = self.save_scope();
        let result = f(self);
        self.restore_scope(snapshot);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::FixtureLoader;

    #[test]
    fn root_context_defaults_to_neko_backend() {
        let loader = FixtureLoader::new();
        let ctx = TypingContext::new_root(Box::new(loader), ContextFlags::default()).unwrap();
        assert_eq!(ctx.flags.backend, Backend::Neko);
        assert!(!ctx.flags.backend.is_value_typed());
    }

    #[test]
    fn scope_restores_locals_introduced_inside_it() {
        let loader = FixtureLoader::new();
        let mut ctx = TypingContext::new_root(Box::new(loader), ContextFlags::default()).unwrap();
        ctx.push_local("outer", Ty::int());
        let _: Result<(), crate::error::Outcome> = ctx.with_scope(|ctx| {
            ctx.push_local("inner", Ty::string());
            assert!(ctx.lookup_local("inner").is_some());
            Ok(())
        });
        assert!(ctx.lookup_local("outer").is_some());
        assert!(ctx.lookup_local("inner").is_none());
    }

    #[test]
    fn value_typed_backend_keeps_null_wrapper() {
        let loader = FixtureLoader::new();
        let mut flags = ContextFlags::default();
        flags.backend = Backend::Cpp;
        let ctx = TypingContext::new_root(Box::new(loader), flags).unwrap();
        assert_eq!(ctx.lift_nullable(Ty::nullable(Ty::int())), Ty::nullable(Ty::int()));
    }

    #[test]
    fn reference_typed_backend_collapses_null_wrapper() {
        let loader = FixtureLoader::new();
        let ctx = TypingContext::new_root(Box::new(loader), ContextFlags::default()).unwrap();
        assert_eq!(ctx.lift_nullable(Ty::nullable(Ty::int())), Ty::int());
    }

    #[test]
    fn module_loader_is_retained_for_on_demand_resolution() {
        let loader = FixtureLoader::new();
        let mut ctx = TypingContext::new_root(Box::new(loader), ContextFlags::default()).unwrap();
        let pos = Pos::synthetic();
        assert!(ctx.load_module("NoSuchModule", &pos).is_err());
    }
}
