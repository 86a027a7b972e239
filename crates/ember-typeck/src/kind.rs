//! Numeric kind classifier (C2).
//!
//! Maps a resolved type to the representation-intent lattice used by binop
//! and unop typing: `classify` never unifies anything, it only reads the
//! already-`resolve`d shape of a type.

use crate::context::TypeRegistry;
use crate::error::ConstraintOrigin;
use crate::ty::Ty;
use crate::unify::InferCtx;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    KInt,
    KFloat,
    KString,
    /// An unbound monomorph: no information yet.
    KUnk,
    /// The dynamic top type.
    KDyn,
    /// Anything else with a concrete, non-numeric shape.
    KOther,
    /// A type parameter constrained by a numeric interface, carrying the
    /// parameter's own type for later use as the binop's result type.
    KParam(Ty),
}

/// Classify a resolved type into the numeric kind lattice.
///
/// Follows monomorphs (via `ctx.resolve`) and type aliases (via the
/// registry) before inspecting the shape. Performs no unification.
pub fn classify(ctx: &mut InferCtx, registry: &TypeRegistry, ty: &Ty) -> Kind {
    let resolved = ctx.resolve(ty.clone());
    classify_resolved(registry, &resolved)
}

fn classify_resolved(registry: &TypeRegistry, ty: &Ty) -> Kind {
    match ty {
        Ty::Var(_) => Kind::KUnk,
        Ty::Dynamic => Kind::KDyn,
        Ty::Con(c) => match c.name.as_str() {
            "Int" => Kind::KInt,
            "Float" => Kind::KFloat,
            "String" => Kind::KString,
            name => {
                if let Some(alias) = registry.lookup_alias(name) {
                    return classify_resolved(registry, &alias.aliased_type);
                }
                if let Some(constraint_ty) = registry.numeric_type_param(name) {
                    return Kind::KParam(constraint_ty);
                }
                Kind::KOther
            }
        },
        Ty::App(con, _) => classify_resolved(registry, con),
        _ => Kind::KOther,
    }
}

/// Attempt to unify `e`'s type with `Int`, unless `e` looks like it was
/// derived from a dynamic source (a local of dynamic type, or an array
/// index / field access / call whose receiver is dynamic), in which case
/// unify with `Float` instead and report failure.
///
/// Preserved verbatim from the distilled design: silently truncating a
/// value that flowed out of dynamically-typed code is worse than widening
/// it to `Float`, even though the reverse (an `Int` becoming a `Float`
/// unexpectedly) is itself a footgun — open question left unresolved
/// upstream, so the heuristic is kept rather than "fixed" here.
pub fn unify_int(ctx: &mut InferCtx, e_is_dynamic_derived: bool, e_ty: &Ty) -> bool {
    if e_is_dynamic_derived {
        let _ = ctx.unify(e_ty.clone(), Ty::float(), ConstraintOrigin::Builtin);
        false
    } else {
        ctx.unify(e_ty.clone(), Ty::int(), ConstraintOrigin::Builtin).is_ok()
    }
}
