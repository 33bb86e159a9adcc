//! Error types for keylog

use thiserror::Error;

/// Result type alias for keylog operations
pub type Result<T> = std::result::Result<T, KeylogError>;

/// keylog error types
#[derive(Error, Debug)]
pub enum KeylogError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record line could not be decoded
    #[error("Parse error in line {line:?}: {reason}")]
    Parse { line: String, reason: String },

    /// A segment file name does not match the numeric or compacted pattern
    #[error("Invalid segment name: {0}")]
    NameFormat(String),

    /// Entry cannot be represented in the record format
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Attempted to write through a read-only segment handle
    #[error("Segment {0} is read-only")]
    ReadOnlySegment(String),

    /// A failed write in this segment could not be rolled back
    #[error("Segment {0} holds a partial write and accepts no more appends")]
    Poisoned(String),

    /// The log was closed and accepts no more writes
    #[error("Write-ahead log is closed")]
    Closed,

    /// Compaction error
    #[error("Compaction error: {0}")]
    Compaction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KeylogError {
    pub(crate) fn parse(line: &str, reason: impl Into<String>) -> Self {
        KeylogError::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeylogError::Io(_))
    }

    /// Check if error indicates on-disk corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            KeylogError::Parse { .. } | KeylogError::NameFormat(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let io = KeylogError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_retryable());
        assert!(!io.is_corruption());

        let parse = KeylogError::parse("a,b", "expected 3 fields");
        assert!(parse.is_corruption());
        assert!(!parse.is_retryable());
        assert!(parse.to_string().contains("expected 3 fields"));

        let name = KeylogError::NameFormat("junk.log".into());
        assert!(name.is_corruption());
    }
}
