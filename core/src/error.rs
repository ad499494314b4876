//! Error types for index construction

use std::path::PathBuf;
use thiserror::Error;

use crate::DocId;

/// Result type for indexing operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that abort an index build
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input archive could not be opened or read
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Archive entry is not of the form `.../<category>/<name>`
    #[error("archive entry `{0}` is not of the form <category>/<name>")]
    InvalidEntryPath(String),

    /// A block file is missing an expected delimiter or holds unparsable numbers
    #[error("corrupt block file {}: {reason}", path.display())]
    CorruptBlock { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The archive yielded no tokens at all
    #[error("corpus contains no indexable terms")]
    EmptyCorpus,

    #[error("term `{0}` is missing from the vocabulary")]
    UnknownTerm(String),

    #[error("document {0} has no recorded metadata")]
    UnknownDocument(DocId),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl IndexError {
    pub fn corrupt_block(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl From<bincode::Error> for IndexError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
