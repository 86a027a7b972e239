//! Source position metadata threaded through every untyped and typed node.

use ember_common::Span;
use serde::{Deserialize, Serialize};

/// A source position: a file path plus a byte span within it.
///
/// Every untyped node carries one (`epos` in the spec vocabulary); every
/// typed node carries the same position forward unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub file: String,
    pub span: Span,
}

impl Pos {
    pub fn new(file: impl Into<String>, span: Span) -> Self {
        Self { file: file.into(), span }
    }

    pub fn synthetic() -> Self {
        Self { file: "<synthetic>".into(), span: Span::synthetic() }
    }

    pub fn line(&self, source: &str) -> u32 {
        source
            .as_bytes()
            .iter()
            .take(self.span.start as usize)
            .filter(|&&b| b == b'\n')
            .count() as u32
            + 1
    }
}

/// The materialized form of the distinguished `PosInfos` type: a record of
/// `(file, line, class, method)` synthesized as a default argument value by
/// the call-parameter matcher (C4) whenever a formal parameter's type is
/// `PosInfos` and the caller supplied no matching argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosInfosValue {
    pub file: String,
    pub line: u32,
    pub class: Option<String>,
    pub method: Option<String>,
}
