//! Ambient-stack glue for the `emberc` CLI: project manifest parsing,
//! ariadne diagnostic rendering, and the JSON-backed module loader that
//! stands in for a real parser at this workspace's boundary.

pub mod config;
pub mod diagnostics;
pub mod json_loader;
