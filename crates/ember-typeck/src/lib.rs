//! The expression typer: access-kind resolution, overload-resolution-driven
//! expression typing, inline/closure synthesis, and module
//! finalization/reachability.
//!
//! Module map against the design components (§4):
//!
//! - `ty`/`unify`/`kind` — the monomorphic type representation, the
//!   union-find unifier (C1), and the numeric-kind lattice (C2).
//! - `tyexpr` — resolves a source-level type annotation (`UTypeExpr`) to a
//!   `Ty` (C3).
//! - `access` — classifies an identifier/field/index access into an
//!   `AccessKind` and types the keyword/`this`/`super`/array forms (C5/C6
//!   groundwork).
//! - `field_access` — the property-dispatch table driving member reads and
//!   writes (C5).
//! - `call` — the call-parameter matcher (C4).
//! - `using_resolver` — first-match-wins `using`-extension resolution (C7).
//! - `expr` — the single `type_expr` entry point tying every other
//!   component together (C6).
//! - `macro_bridge` — the macro call bridge, top-level and delayed (C9).
//! - `finalize` — delayed-closure draining and reachability (C8).
//! - `exhaustiveness` — enum-match exhaustiveness/redundancy checking
//!   (Maranget's algorithm), consulted by `expr`'s switch/match typing.
//! - `context`/`error`/`texpr` — the shared data model: `TypingContext`,
//!   the error/signal taxonomy, and the typed-expression tree.

pub mod access;
pub mod call;
pub mod context;
pub mod error;
pub mod exhaustiveness;
pub mod expr;
pub mod field_access;
pub mod finalize;
pub mod kind;
pub mod macro_bridge;
pub mod texpr;
pub mod ty;
pub mod tyexpr;
pub mod unify;
pub mod using_resolver;

pub use context::{AliasInfo, Backend, ContextFlags, DelayedAction, Globals, TypeRegistry, TypingContext};
pub use error::{ConstraintOrigin, Outcome, Signal, TypeError, TypeResult};
pub use expr::type_expr;
pub use finalize::{finalize, generate, FinalizationState, NoStaticInits, ReachabilityResult, StaticInitSource};
pub use macro_bridge::{MacroError, MacroInterpreter, MacroModuleHandle, MacroValue};
pub use texpr::{TCatch, TEnumArm, TExpr, TFunctionLit, TNode, TValueArm};
pub use ty::{AnonStatus, AnonType, Scheme, Ty, TyVar};
