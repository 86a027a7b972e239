//! Type representation for the expression typer.
//!
//! Defines the core `Ty` enum, type constructors (`TyCon`), type variables
//! (`TyVar`), and polymorphic type schemes (`Scheme`). These form the
//! algebraic type representation named as component C1 ("consumed only" by
//! the rest of the typer, but owned here since nothing upstream of this
//! crate defines it).

use std::collections::HashMap;
use std::fmt;

/// A type variable, identified by a `u32` index into the unification table.
///
/// Type variables are created during inference and unified with concrete
/// types or other variables. The `ena` crate handles the union-find
/// mechanics; this is the "monomorph cell" of the design notes, represented
/// as an arena-indexed id with the unification table as its side table
/// rather than an `Rc<RefCell<_>>` per cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TyVar(pub u32);

/// A named type constructor: `Int`, `String`, a class name, an enum name, a
/// type parameter name, or an interface name. Identity is name-only.
///
/// `display_prefix` carries a module qualifier used only for diagnostics
/// (e.g. "Geometry.Point"); it is intentionally excluded from `PartialEq`
/// and `Hash` so two references to the same declaration compare equal
/// regardless of which import path produced the display string.
#[derive(Clone, Debug)]
pub struct TyCon {
    pub name: String,
    pub display_prefix: Option<String>,
}

impl PartialEq for TyCon {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for TyCon {}

impl std::hash::Hash for TyCon {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl TyCon {
    pub fn new(name: impl Into<String>) -> Self {
        TyCon { name: name.into(), display_prefix: None }
    }

    pub fn with_module(name: impl Into<String>, module: impl Into<String>) -> Self {
        TyCon { name: name.into(), display_prefix: Some(module.into()) }
    }
}

impl fmt::Display for TyCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.display_prefix {
            write!(f, "{}.{}", prefix, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// The open/closed/statics lifecycle of an anonymous structural type, per
/// design note "Open anonymous types": fields accumulate on an `Opened`
/// anonymous type as field accesses are inferred against it, until the
/// typer closes it at a scope boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnonStatus {
    /// A literal object expression's type: fixed at construction.
    Const,
    /// No further fields may be added.
    Closed,
    /// Fields may still be appended as new accesses are discovered.
    Opened,
    /// Mirrors the static fields of a named class (used for `Class<T>`-like
    /// static access expressions).
    Statics(String),
    /// Mirrors the constructors of a named enum.
    EnumStatics(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnonType {
    pub fields: Vec<(String, Ty)>,
    pub status: AnonStatus,
}

impl AnonType {
    pub fn field(&self, name: &str) -> Option<&Ty> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// A resolved type.
///
/// `Con`/`App` cover concrete named types uniformly — primitives, classes,
/// enums, interfaces, and type parameters are all `Con`/`App` nodes; *which*
/// kind of declaration a name denotes is looked up in the type registry
/// (`context::TypeRegistry`), not encoded in `Ty` itself, matching the
/// name-keyed-registry idiom used for struct/alias/sum-type lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Var(TyVar),
    Con(TyCon),
    Fun(Vec<Ty>, Box<Ty>),
    App(Box<Ty>, Vec<Ty>),
    Tuple(Vec<Ty>),
    /// The dynamic top type: unifies with anything, carries no static
    /// guarantee. Distinct from `Con("Dynamic")` so `classify`/`unify` can
    /// match it without a name comparison.
    Dynamic,
    /// A nullable wrapper, `Null<T>`. On reference-typed backends this
    /// collapses to `T` at the context-factory level (see `context.rs`);
    /// kept as a distinct constructor here so the collapse is a deliberate,
    /// documented policy rather than baked into the unifier.
    Null(Box<Ty>),
    /// An anonymous structural type, e.g. `{ x: Int, y: Int }`.
    Anonymous(AnonType),
    /// The bottom type: `throw`, `return`, and other non-returning forms.
    Never,
}

impl Ty {
    pub fn int() -> Ty {
        Ty::Con(TyCon::new("Int"))
    }

    pub fn float() -> Ty {
        Ty::Con(TyCon::new("Float"))
    }

    pub fn string() -> Ty {
        Ty::Con(TyCon::new("String"))
    }

    pub fn bool() -> Ty {
        Ty::Con(TyCon::new("Bool"))
    }

    /// `Void`, the unit type returned by statements. Represented as the
    /// empty tuple so "least-upper-bound with void" in switch/if arms is
    /// the same tuple-unification code path as any other tuple.
    pub fn void() -> Ty {
        Ty::Tuple(Vec::new())
    }

    pub fn dynamic() -> Ty {
        Ty::Dynamic
    }

    pub fn nullable(inner: Ty) -> Ty {
        Ty::Null(Box::new(inner))
    }

    pub fn fun(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Fun(params, Box::new(ret))
    }

    /// A named type applied to arguments, used uniformly for classes,
    /// enums, and interfaces: `Ty::named("Point", vec![])`,
    /// `Ty::named("Option", vec![Ty::int()])`.
    pub fn named(name: impl Into<String>, args: Vec<Ty>) -> Ty {
        Ty::App(Box::new(Ty::Con(TyCon::new(name))), args)
    }

    /// A bare type-parameter reference, e.g. `T` in `class Box<T>`.
    pub fn type_param(name: impl Into<String>) -> Ty {
        Ty::Con(TyCon::new(name))
    }

    pub fn array(inner: Ty) -> Ty {
        Ty::App(Box::new(Ty::Con(TyCon::new("Array"))), vec![inner])
    }

    /// The head type-constructor name, if this is a `Con` or `App(Con, _)`.
    pub fn head_name(&self) -> Option<&str> {
        match self {
            Ty::Con(c) => Some(&c.name),
            Ty::App(con, _) => con.head_name(),
            _ => None,
        }
    }

    pub fn type_args(&self) -> &[Ty] {
        match self {
            Ty::App(_, args) => args,
            _ => &[],
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Var(v) => write!(f, "?{}", v.0),
            Ty::Con(c) => write!(f, "{}", c),
            Ty::Fun(params, ret) => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Ty::App(con, args) => {
                write!(f, "{}", con)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", a)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Ty::Tuple(elems) if elems.is_empty() => write!(f, "Void"),
            Ty::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Ty::Dynamic => write!(f, "Dynamic"),
            Ty::Null(inner) => write!(f, "Null<{}>", inner),
            Ty::Anonymous(anon) => {
                write!(f, "{{ ")?;
                for (i, (name, ty)) in anon.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, " }}")
            }
            Ty::Never => write!(f, "Never"),
        }
    }
}

/// A polymorphic type scheme: a type with universally quantified variables.
#[derive(Clone, Debug)]
pub struct Scheme {
    pub vars: Vec<TyVar>,
    pub ty: Ty,
}

impl Scheme {
    pub fn mono(ty: Ty) -> Self {
        Scheme { vars: Vec::new(), ty }
    }

    /// Build a self-contained scheme from a resolved type by collecting all
    /// free `TyVar`s and remapping them to sequential ids starting from 0,
    /// so the scheme is independent of any particular `InferCtx`'s table.
    pub fn normalize_from_ty(ty: Ty) -> Self {
        let mut seen_vars: Vec<TyVar> = Vec::new();
        collect_free_tyvars(&ty, &mut seen_vars);
        if seen_vars.is_empty() {
            return Scheme { vars: Vec::new(), ty };
        }
        let mut mapping: HashMap<TyVar, TyVar> = HashMap::new();
        let mut next_id: u32 = 0;
        for var in &seen_vars {
            if !mapping.contains_key(var) {
                mapping.insert(*var, TyVar(next_id));
                next_id += 1;
            }
        }
        let new_vars: Vec<TyVar> = seen_vars.iter().map(|v| mapping[v]).collect();
        let mut deduped_vars: Vec<TyVar> = Vec::new();
        let mut seen_set = std::collections::HashSet::new();
        for v in &new_vars {
            if seen_set.insert(*v) {
                deduped_vars.push(*v);
            }
        }
        let new_ty = remap_tyvars(&ty, &mapping);
        Scheme { vars: deduped_vars, ty: new_ty }
    }
}

fn collect_free_tyvars(ty: &Ty, out: &mut Vec<TyVar>) {
    match ty {
        Ty::Var(v) => out.push(*v),
        Ty::Con(_) | Ty::Never | Ty::Dynamic => {}
        Ty::Fun(params, ret) => {
            for p in params {
                collect_free_tyvars(p, out);
            }
            collect_free_tyvars(ret, out);
        }
        Ty::App(con, args) => {
            collect_free_tyvars(con, out);
            for a in args {
                collect_free_tyvars(a, out);
            }
        }
        Ty::Tuple(elems) => {
            for e in elems {
                collect_free_tyvars(e, out);
            }
        }
        Ty::Null(inner) => collect_free_tyvars(inner, out),
        Ty::Anonymous(anon) => {
            for (_, t) in &anon.fields {
                collect_free_tyvars(t, out);
            }
        }
    }
}

fn remap_tyvars(ty: &Ty, mapping: &HashMap<TyVar, TyVar>) -> Ty {
    match ty {
        Ty::Var(v) => mapping.get(v).map(|nv| Ty::Var(*nv)).unwrap_or_else(|| ty.clone()),
        Ty::Con(_) | Ty::Never | Ty::Dynamic => ty.clone(),
        Ty::Fun(params, ret) => {
            let params = params.iter().map(|p| remap_tyvars(p, mapping)).collect();
            let ret = Box::new(remap_tyvars(ret, mapping));
            Ty::Fun(params, ret)
        }
        Ty::App(con, args) => {
            let con = Box::new(remap_tyvars(con, mapping));
            let args = args.iter().map(|a| remap_tyvars(a, mapping)).collect();
            Ty::App(con, args)
        }
        Ty::Tuple(elems) => Ty::Tuple(elems.iter().map(|e| remap_tyvars(e, mapping)).collect()),
        Ty::Null(inner) => Ty::Null(Box::new(remap_tyvars(inner, mapping))),
        Ty::Anonymous(anon) => Ty::Anonymous(AnonType {
            fields: anon.fields.iter().map(|(n, t)| (n.clone(), remap_tyvars(t, mapping))).collect(),
            status: anon.status.clone(),
        }),
    }
}

// ── ena trait implementations ──────────────────────────────────────────

impl ena::unify::UnifyKey for TyVar {
    type Value = Option<Ty>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TyVar(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

impl ena::unify::EqUnifyValue for Ty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_source_syntax() {
        assert_eq!(Ty::int().to_string(), "Int");
        assert_eq!(Ty::named("Option", vec![Ty::int()]).to_string(), "Option<Int>");
        assert_eq!(Ty::void().to_string(), "Void");
        assert_eq!(Ty::nullable(Ty::int()).to_string(), "Null<Int>");
    }

    #[test]
    fn normalize_from_ty_dedups_and_remaps() {
        let ty = Ty::Fun(vec![Ty::Var(TyVar(7)), Ty::Var(TyVar(7))], Box::new(Ty::Var(TyVar(3))));
        let scheme = Scheme::normalize_from_ty(ty);
        assert_eq!(scheme.vars, vec![TyVar(0), TyVar(1)]);
        match scheme.ty {
            Ty::Fun(params, ret) => {
                assert_eq!(params[0], Ty::Var(TyVar(0)));
                assert_eq!(params[1], Ty::Var(TyVar(0)));
                assert_eq!(*ret, Ty::Var(TyVar(1)));
            }
            other => panic!("expected Fun, got {other:?}"),
        }
    }

    #[test]
    fn tycon_equality_ignores_display_prefix() {
        let a = TyCon::new("Point");
        let b = TyCon::with_module("Point", "Geometry");
        assert_eq!(a, b);
    }
}
