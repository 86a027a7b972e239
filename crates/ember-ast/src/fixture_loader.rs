//! An in-memory [`ModuleLoader`] for tests and the CLI's demo fixtures.
//!
//! Holds a fixed map of modules built up-front; nothing is lazily fetched
//! from disk or network, so tests are hermetic and deterministic.

use rustc_hash::FxHashMap;

use crate::decl::{Module, TypeDecl};
use crate::module_loader::{LoaderError, ModuleLoader};
use crate::pos::Pos;
use crate::ty_expr::UTypeExpr;

#[derive(Debug, Default)]
pub struct FixtureLoader {
    pub modules: FxHashMap<String, Module>,
    /// Flat index of declarations by simple name, for `using`/constructor
    /// lookups that don't go through a module path.
    pub decls_by_name: FxHashMap<String, TypeDecl>,
}

impl FixtureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_module(&mut self, module: Module) {
        for decl in module.decls.values() {
            self.decls_by_name.insert(decl.name().to_string(), decl.clone());
        }
        self.modules.insert(module.name.clone(), module);
    }

    pub fn register_decl(&mut self, decl: TypeDecl) {
        self.decls_by_name.insert(decl.name().to_string(), decl);
    }
}

impl ModuleLoader for FixtureLoader {
    fn load_module(&mut self, path: &str, pos: &Pos) -> Result<Module, LoaderError> {
        self.modules
            .get(path)
            .cloned()
            .ok_or_else(|| LoaderError::new(format!("module not found: {path}"), pos.clone()))
    }

    fn load_type_def(&mut self, path: &str, pos: &Pos) -> Result<TypeDecl, LoaderError> {
        let simple = path.rsplit('.').next().unwrap_or(path);
        self.decls_by_name
            .get(simple)
            .cloned()
            .ok_or_else(|| LoaderError::new(format!("type not found: {path}"), pos.clone()))
    }

    fn load_instance(
        &mut self,
        type_expr: &UTypeExpr,
        pos: &Pos,
        _allow_param_defaults: bool,
    ) -> Result<TypeDecl, LoaderError> {
        match type_expr {
            UTypeExpr::Path(name, _args) => self.load_type_def(name, pos),
            _ => Err(LoaderError::new("expected a named type path", pos.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl::{ClassType, TypeParamDecl};

    #[test]
    fn registers_and_resolves_by_simple_name() {
        let mut loader = FixtureLoader::new();
        loader.register_decl(TypeDecl::Class(ClassType {
            name: "Tools".into(),
            path: "Tools".into(),
            type_params: Vec::<TypeParamDecl>::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: Vec::new(),
            constructor: None,
            is_extern: false,
            constructor_is_private: false,
        }));
        let pos = Pos::synthetic();
        let found = loader.load_type_def("Tools", &pos).unwrap();
        assert_eq!(found.name(), "Tools");
    }

    #[test]
    fn missing_module_is_an_error() {
        let mut loader = FixtureLoader::new();
        let pos = Pos::synthetic();
        assert!(loader.load_module("Nope", &pos).is_err());
    }
}
