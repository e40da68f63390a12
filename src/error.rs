use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for table merging and aggregation.
#[derive(Error, Debug)]
pub enum CountError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from the header.
    #[error("{path}: missing column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}, line {line}: expected at least {expected} columns, found {found}")]
    TooFewColumns {
        path: PathBuf,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("{path}, line {line}: column '{column}' holds non-numeric value '{value}'")]
    InvalidNumber {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },

    /// Two inputs would produce the same output column.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("{path}: row key '{key}' occurs more than once")]
    DuplicateKey { path: PathBuf, key: String },

    /// An annotation cell uses the label reserved for unannotated rows.
    #[error("{path}, line {line}: column '{column}' uses the reserved label 'Unclassified'")]
    ReservedLabel {
        path: PathBuf,
        line: u64,
        column: String,
    },

    #[error("{0}: no header row")]
    EmptyHeader(PathBuf),

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invocation has no {kind} named '{key}'")]
    MissingInvocationField { kind: &'static str, key: String },

    #[error("invalid value '{value}' for parameter '{key}'")]
    InvalidParameter { key: String, value: String },
}

impl CountError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CountError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        CountError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for metacount operations.
pub type Result<T> = std::result::Result<T, CountError>;
