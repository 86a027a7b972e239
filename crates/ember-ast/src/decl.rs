//! Type declarations as handed back by the module loader: the static shape
//! of classes, enums, and interfaces that the typer resolves names and
//! field accesses against. These are produced by the (external) module
//! loader, never by the typer itself.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ty_expr::UTypeExpr;

/// How a method is dispatched, per the field-access elaborator's dispatch
/// table (normal virtual call, copied-in-at-call-site inline, externally
/// provided dynamic slot, or a compile-time macro).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Normal,
    Inline,
    Dynamic,
    Macro,
}

/// Read/write accessor mode for a `var` field, mirroring the source
/// language's `(get, set)` property syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarAccess {
    /// Direct field access (`default`).
    Normal,
    /// Accessible only from within the declaring class hierarchy.
    No,
    /// Dispatches through an accessor method named here (`get_x`/`set_x`).
    Call(String),
    /// Read dispatches through `resolve(name: String)`.
    Resolve,
    /// Treated as an inline variable: substituted at the use site.
    Inline,
    /// Access is always an error.
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldVisibility {
    Public,
    Private,
}

/// One formal parameter of a declared method, as the call-parameter
/// matcher (C4) needs it: a name (for diagnostics and `PosInfos`
/// synthesis), a type, and whether it's optional (`?name: T` / a default).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: UTypeExpr,
    pub optional: bool,
}

impl ParamDecl {
    pub fn required(name: impl Into<String>, ty: UTypeExpr) -> Self {
        ParamDecl { name: name.into(), ty, optional: false }
    }

    pub fn optional(name: impl Into<String>, ty: UTypeExpr) -> Self {
        ParamDecl { name: name.into(), ty, optional: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Method { kind: MethodKind, params: Vec<ParamDecl>, ret: UTypeExpr, has_self: bool },
    Var { read: VarAccess, write: VarAccess, ty: UTypeExpr, is_var_metadata: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassField {
    pub name: String,
    pub kind: FieldKind,
    pub visibility: FieldVisibility,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParamDecl {
    pub name: String,
    /// Names of interfaces this parameter is constrained to implement.
    /// A numeric-interface constraint (e.g. `Float`) makes the parameter
    /// classify as `KParam` rather than `KOther` under the kind lattice.
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassType {
    pub name: String,
    pub path: String,
    pub type_params: Vec<TypeParamDecl>,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<ClassField>,
    pub statics: Vec<ClassField>,
    pub constructor: Option<ClassField>,
    pub is_extern: bool,
    /// Private constructors are only callable from a parent class of `self`.
    pub constructor_is_private: bool,
}

impl ClassType {
    pub fn find_field(&self, name: &str, is_static: bool) -> Option<&ClassField> {
        let set = if is_static { &self.statics } else { &self.fields };
        set.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumConstructor {
    pub name: String,
    /// Named constructor arguments, e.g. `Some(v: T)` -> `[("v", T)]`.
    pub args: Vec<(String, UTypeExpr)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub path: String,
    pub type_params: Vec<TypeParamDecl>,
    pub constructors: Vec<EnumConstructor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeDecl {
    Class(ClassType),
    Enum(EnumType),
}

impl TypeDecl {
    pub fn name(&self) -> &str {
        match self {
            TypeDecl::Class(c) => &c.name,
            TypeDecl::Enum(e) => &e.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            TypeDecl::Class(c) => &c.path,
            TypeDecl::Enum(e) => &e.path,
        }
    }
}

/// An in-memory module: a named bag of top-level type declarations, as
/// returned by [`crate::module_loader::ModuleLoader::load_module`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub decls: FxHashMap<String, TypeDecl>,
}
