//! Shared types used across the Ember compiler frontend crates.
//!
//! This crate carries only what has no natural home in a single frontend
//! stage: source spans and the module dependency graph used to order
//! compilation and, later, to walk reachability from an entry point.

pub mod module_graph;
pub mod span;

pub use module_graph::{CycleError, ModuleGraph, ModuleId, ModuleInfo};
pub use span::Span;
