//! Unresolved type annotations as written in source, before the module
//! loader turns them into a concrete [`crate::decl`] reference or the typer
//! turns them into a `Ty`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UTypeExpr {
    /// A dotted path with optional type arguments, e.g. `Array<Int>`.
    Path(String, Vec<UTypeExpr>),
    Function(Vec<UTypeExpr>, Box<UTypeExpr>),
    Anonymous(Vec<(String, UTypeExpr)>),
    /// The dynamic top type, written `Dynamic` or `Dynamic<T>`.
    Dynamic(Option<Box<UTypeExpr>>),
}

impl UTypeExpr {
    pub fn simple(name: impl Into<String>) -> Self {
        UTypeExpr::Path(name.into(), Vec::new())
    }
}
