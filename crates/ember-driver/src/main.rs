//! `emberc` — the expression typer's CLI driver.
//!
//! Loads a project's `ember.toml`, reads every `<ModuleName>.json` file
//! under its module directory (`JsonModuleLoader`'s boundary, since parsing
//! `.ember` source is out of this workspace's scope), registers the
//! declarations in a root [`TypingContext`], and runs the finalization and
//! reachability walk (C8) from the configured `main` entry point.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use ember_driver::config::ProjectConfig;
use ember_driver::diagnostics;
use ember_driver::json_loader::JsonModuleLoader;
use ember_typeck::{ContextFlags, NoStaticInits, TypeError, TypingContext};

#[derive(Parser)]
#[command(name = "emberc", version, about = "The Ember expression typer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type-check a project: register every module's declarations and walk
    /// reachability from the configured `main` entry point.
    Check {
        /// Path to the project directory (must contain `ember.toml`).
        dir: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { dir } => {
            if let Err(e) = check(&dir) {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
    }
}

fn check(dir: &Path) -> Result<(), String> {
    if !dir.is_dir() {
        return Err(format!("'{}' is not a directory", dir.display()));
    }

    let manifest_path = dir.join("ember.toml");
    let config = ProjectConfig::from_file(&manifest_path)
        .map_err(|e| format!("reading '{}': {e}", manifest_path.display()))?;

    let modules_dir = dir.join("modules");
    let loader = JsonModuleLoader::new(&modules_dir);

    let mut flags = ContextFlags::default();
    flags.no_inline = config.typer.no_inline;
    flags.no_traces = config.typer.no_traces;
    flags.backend = config.typer.backend.into();

    let mut ctx = TypingContext::new_root(Box::new(loader), flags).map_err(|e| render_top_level(&e))?;

    for module_name in discover_modules(&modules_dir)? {
        let pos = ember_ast::Pos::synthetic();
        let module = ctx.load_module(&module_name, &pos).map_err(|e| e.message)?;
        for decl in module.decls.into_values() {
            ctx.registry.register_decl(decl);
        }
    }

    let result = ember_typeck::generate(&mut ctx, &NoStaticInits, config.typer.main.as_deref(), &config.typer.excludes)
        .map_err(|e| render_top_level(&e))?;
    ember_typeck::finalize(&mut ctx).map_err(|e| render_top_level(&e))?;

    println!("{} reachable type(s) across {} module(s):", result.types.len(), result.modules.len());
    for ty in &result.types {
        println!("  {}", ty.path());
    }

    Ok(())
}

/// A project-level error (manifest parsing, module loading, finalization)
/// has no source text to render ariadne labels against; fall back to the
/// same plain-text path `diagnostics::render` takes for a synthetic span.
fn render_top_level(err: &TypeError) -> String {
    diagnostics::render(err, "", "<project>")
}

/// List every module name discoverable as `<modules_dir>/<Name>.json`, in
/// alphabetical order so registration (and therefore diagnostics order) is
/// deterministic across runs.
fn discover_modules(modules_dir: &Path) -> Result<Vec<String>, String> {
    if !modules_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    let entries = std::fs::read_dir(modules_dir).map_err(|e| format!("reading '{}': {e}", modules_dir.display()))?;
    for entry in entries {
        let entry = entry.map_err(|e| e.to_string())?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
