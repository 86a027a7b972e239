//! The `ember.toml` project manifest.
//!
//! Mirrors `snow-pkg::manifest::Manifest`'s shape (a `[package]` table
//! parsed with `toml` + `serde`) but carries the one concern that's actually
//! in this workspace's scope — typer context flags and the finalization
//! entry point — rather than dependency resolution, which belongs to the
//! (external) package manager.

use std::path::Path;

use serde::Deserialize;

use ember_typeck::Backend;

#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub package: Package,
    #[serde(default)]
    pub typer: TyperSettings,
}

#[derive(Debug, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The `[typer]` table: flags mapping 1:1 onto `ember_typeck::ContextFlags`,
/// plus the entry point and exclusion list `finalize::generate` needs.
#[derive(Debug, Default, Deserialize)]
pub struct TyperSettings {
    /// The class whose `main` static method roots the reachability walk
    /// (C8). With no `main`, every declared type is treated as reachable.
    #[serde(default)]
    pub main: Option<String>,
    /// Types marked `extern` with their static initializer dropped, per
    /// `finalize::generate`'s `excludes` parameter.
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub no_inline: bool,
    #[serde(default)]
    pub no_traces: bool,
    #[serde(default)]
    pub backend: BackendSetting,
}

#[derive(Debug, Default, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum BackendSetting {
    #[default]
    Neko,
    Flash,
    Flash9,
    Js,
    As3,
    Cpp,
}

impl From<BackendSetting> for Backend {
    fn from(backend: BackendSetting) -> Self {
        match backend {
            BackendSetting::Neko => Backend::Neko,
            BackendSetting::Flash => Backend::Flash,
            BackendSetting::Flash9 => Backend::Flash9,
            BackendSetting::Js => Backend::Js,
            BackendSetting::As3 => Backend::As3,
            BackendSetting::Cpp => Backend::Cpp,
        }
    }
}

impl ProjectConfig {
    pub fn from_file(path: &Path) -> Result<ProjectConfig, String> {
        let content = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<ProjectConfig, String> {
        toml::from_str(content).map_err(|e| format!("failed to parse manifest: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_manifest() {
        let cfg = ProjectConfig::from_toml_str(
            r#"
            [package]
            name = "demo"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.package.name, "demo");
        assert!(cfg.typer.main.is_none());
        assert!(matches!(cfg.typer.backend, BackendSetting::Neko));
    }

    #[test]
    fn parses_typer_settings() {
        let cfg = ProjectConfig::from_toml_str(
            r#"
            [package]
            name = "demo"

            [typer]
            main = "Main"
            excludes = ["Legacy"]
            backend = "flash9"
            no_inline = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.typer.main.as_deref(), Some("Main"));
        assert_eq!(cfg.typer.excludes, vec!["Legacy".to_string()]);
        assert!(matches!(cfg.typer.backend, BackendSetting::Flash9));
        assert!(cfg.typer.no_inline);
    }

    #[test]
    fn missing_package_table_is_an_error() {
        assert!(ProjectConfig::from_toml_str("").is_err());
    }
}
