//! Error types for dm-core

use crate::entity::EntityType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dm-core
#[derive(Debug, Error)]
pub enum Error {
    /// A mod script line could not be parsed
    #[error("parse error in mod '{mod_name}' line {line}: {message} ({text})")]
    Parse {
        mod_name: String,
        line: usize,
        text: String,
        message: String,
    },

    /// A type's modding range has no free ids left
    #[error("{entity} modding range {start}..={end} exhausted ({in_use} ids in use)")]
    RangeExhausted {
        entity: EntityType,
        start: u32,
        end: u32,
        in_use: usize,
    },

    /// Mutation attempted after the definition was frozen
    #[error("entity definition for {0} is frozen")]
    FrozenDefinition(EntityType),

    /// Merge invoked without any mod sources
    #[error("no mods supplied to merge")]
    NoSources,

    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
