//! A [`ModuleLoader`] backed by pre-parsed module trees on disk.
//!
//! Lexing and parsing `.ember` source is out of this workspace's scope (see
//! `ember-ast`'s own module doc comment: producing an untyped tree is
//! "explicitly out of scope"), so the driver's module boundary is a
//! directory of `<ModuleName>.json` files — each one an
//! [`ember_ast::Module`] serialized by whatever upstream stage does own
//! parsing — rather than a directory of source files.

use std::path::{Path, PathBuf};

use ember_ast::{LoaderError, Module, ModuleLoader, Pos, TypeDecl, UTypeExpr};

pub struct JsonModuleLoader {
    root: PathBuf,
}

impl JsonModuleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonModuleLoader { root: root.into() }
    }

    fn module_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

impl ModuleLoader for JsonModuleLoader {
    fn load_module(&mut self, path: &str, pos: &Pos) -> Result<Module, LoaderError> {
        let file = self.module_path(path);
        let content = std::fs::read_to_string(&file).map_err(|e| LoaderError::new(format!("reading {}: {e}", file.display()), pos.clone()))?;
        serde_json::from_str(&content).map_err(|e| LoaderError::new(format!("parsing {}: {e}", file.display()), pos.clone()))
    }

    fn load_type_def(&mut self, path: &str, pos: &Pos) -> Result<TypeDecl, LoaderError> {
        let (module_name, simple) = path.rsplit_once('.').unwrap_or((path, path));
        let module = self.load_module(module_name, pos)?;
        module.decls.get(simple).cloned().ok_or_else(|| LoaderError::new(format!("type not found: {path}"), pos.clone()))
    }

    fn load_instance(&mut self, type_expr: &UTypeExpr, pos: &Pos, _allow_param_defaults: bool) -> Result<TypeDecl, LoaderError> {
        match type_expr {
            UTypeExpr::Path(name, _args) => self.load_type_def(name, pos),
            _ => Err(LoaderError::new("expected a named type path", pos.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_ast::{ClassType, TypeParamDecl};
    use rustc_hash::FxHashMap;

    fn write_module(dir: &Path, name: &str, decls: Vec<TypeDecl>) {
        let mut map = FxHashMap::default();
        for decl in decls {
            map.insert(decl.name().to_string(), decl);
        }
        let module = Module { name: name.to_string(), decls: map };
        let path = dir.join(format!("{name}.json"));
        std::fs::write(path, serde_json::to_string(&module).unwrap()).unwrap();
    }

    fn sample_class(name: &str) -> TypeDecl {
        TypeDecl::Class(ClassType {
            name: name.to_string(),
            path: name.to_string(),
            type_params: Vec::<TypeParamDecl>::new(),
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            statics: Vec::new(),
            constructor: None,
            is_extern: false,
            constructor_is_private: false,
        })
    }

    #[test]
    fn loads_a_module_written_as_json() {
        let dir = std::env::temp_dir().join(format!("ember-driver-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        write_module(&dir, "Geometry", vec![sample_class("Point")]);

        let mut loader = JsonModuleLoader::new(&dir);
        let pos = Pos::synthetic();
        let module = loader.load_module("Geometry", &pos).unwrap();
        assert_eq!(module.name, "Geometry");
        assert!(module.decls.contains_key("Point"));

        let decl = loader.load_type_def("Geometry.Point", &pos).unwrap();
        assert_eq!(decl.name(), "Point");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_module_file_is_a_loader_error() {
        let dir = std::env::temp_dir().join(format!("ember-driver-test-missing-{}", std::process::id()));
        let mut loader = JsonModuleLoader::new(&dir);
        let pos = Pos::synthetic();
        assert!(loader.load_module("Nope", &pos).is_err());
    }
}
