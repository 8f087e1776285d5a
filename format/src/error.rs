use std::{fmt, io, result::Result as StdResult};
use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Chunk,
    Bloom,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunk => f.write_str("chunk"),
            Self::Bloom => f.write_str("bloom"),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("Malformed {kind} file {range}: {reason}")]
    Format {
        kind: FileKind,
        range: String,
        reason: String,
    },
    #[error("Failed to {op}:\n{source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Invalid block range name {0:?}")]
    InvalidBlockRange(String),
    #[error("Invalid address {0:?}")]
    InvalidAddress(String),
    #[error("Operation was cancelled.")]
    Cancelled,
}

impl Error {
    pub fn format(kind: FileKind, range: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Format {
            kind,
            range: range.to_string(),
            reason: reason.into(),
        }
    }

    pub fn io(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { op, source }
    }

    /// Reports whether this error means the file itself is unusable,
    /// as opposed to a failed read on an otherwise valid file.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

pub type Result<T> = StdResult<T, Error>;
