//! Error types for jetindex-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid table definition: {0}")]
    InvalidTableDefinition(String),

    #[error("column {column} cannot participate in an index: {reason}")]
    UnsupportedIndexColumnType { column: String, reason: String },

    #[error("character {ch:?} has no legacy index code")]
    UnmappedIndexCharacter { ch: char },

    #[error("entries have incompatible shape: {left} columns vs {right} columns")]
    IncompatibleEntryShape { left: usize, right: usize },

    #[error("storage failure: {0}")]
    StorageFailure(#[from] std::io::Error),

    #[error("format violation: {0}")]
    FormatViolation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
