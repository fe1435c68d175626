//! Structured engine error (§7). Every failure mode maps to exactly one of
//! these kinds rather than an ad-hoc exception hierarchy.

use thiserror::Error;

use crate::cypher::ParseError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("unsupported: {0}")]
    UnsupportedFeature(String),

    #[error("unresolved variable '{0}'")]
    UnresolvedVariable(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// `(position, line, column)`, present only for parse failures (§6).
    pub fn source_position(&self) -> Option<(usize, usize, usize)> {
        match self {
            EngineError::Parse(e) => Some((e.position, e.line, e.column)),
            _ => None,
        }
    }
}
