use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShrinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Source root is not a readable directory: {}", .0.display())]
    SourceRoot(PathBuf),

    /// Durability can no longer be guaranteed; the run must stop.
    #[error("Fatal I/O while trying to {operation} {}: {source}", path.display())]
    Durability {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ShrinkError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ShrinkError::Durability { .. } => Some(ErrorKind::IoFatal),
            _ => None,
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ShrinkError>;

/// Closed taxonomy of things that can go wrong during a batch.
///
/// New kinds may be added; existing names are persisted in checkpoints and
/// logs and must never be repurposed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    EnumerationError,
    TransformFailure,
    OutputLarger,
    EmptyInput,
    CheckpointCorrupt,
    IoFatal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EnumerationError => "enumeration-error",
            ErrorKind::TransformFailure => "transform-failure",
            ErrorKind::OutputLarger => "output-larger",
            ErrorKind::EmptyInput => "empty-input",
            ErrorKind::CheckpointCorrupt => "checkpoint-corrupt",
            ErrorKind::IoFatal => "io-fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_kebab_case() {
        let s = serde_json::to_string(&ErrorKind::OutputLarger).unwrap();
        assert_eq!(s, "\"output-larger\"");
        let k: ErrorKind = serde_json::from_str("\"empty-input\"").unwrap();
        assert_eq!(k, ErrorKind::EmptyInput);
        assert_eq!(k.to_string(), "empty-input");
    }

    #[test]
    fn only_durability_maps_to_io_fatal() {
        let e = ShrinkError::Durability {
            operation: "persist",
            path: PathBuf::from("/x"),
            source: std::io::Error::other("disk gone"),
        };
        assert_eq!(e.kind(), Some(ErrorKind::IoFatal));
        assert_eq!(ShrinkError::Config("x".into()).kind(), None);
    }
}
