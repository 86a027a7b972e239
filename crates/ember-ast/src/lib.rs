//! Untyped expression trees, type declarations, and the module-loader
//! boundary consumed by `ember-typeck`.
//!
//! Producing these trees (lexing, parsing) is out of scope for this
//! workspace; this crate only defines their shape so the typer and its
//! tests can build or deserialize them without depending on a real parser.

pub mod decl;
pub mod fixture_loader;
pub mod module_loader;
pub mod pos;
pub mod ty_expr;
pub mod uexpr;

pub use decl::{
    ClassField, ClassType, EnumConstructor, EnumType, FieldKind, FieldVisibility, MethodKind,
    Module, ParamDecl, TypeDecl, TypeParamDecl, VarAccess,
};
pub use fixture_loader::FixtureLoader;
pub use module_loader::{LoaderError, ModuleLoader};
pub use pos::{Pos, PosInfosValue};
pub use ty_expr::UTypeExpr;
pub use uexpr::{
    node, BinOp, UCase, UCasePattern, UCatch, UConstant, UExpr, UFunctionLit, UNode, UParam,
    USubPattern, UnOp,
};
