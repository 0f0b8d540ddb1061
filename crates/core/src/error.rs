//! Error types for the FLEX feed converter.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the FLEX feed converter.
#[derive(Error, Debug)]
pub enum Error {
    /// Short read in the middle of a chunk (truncated capture).
    #[error("Framing error at byte {offset}: expected {expected} bytes, got {got}")]
    Framing {
        offset: u64,
        expected: usize,
        got: usize,
    },

    /// Fixed-width record that does not match its protocol layout.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Exchange code missing from the security code table.
    #[error("Unknown exchange code {exchange:?} for security {security:?}")]
    UnknownExchange { exchange: String, security: String },

    /// Source archive that cannot be opened.
    #[error("Unsupported archive: {0}")]
    UnsupportedArchive(String),

    /// Remote retrieval failure.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a malformed record error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedRecord(msg.into())
    }

    /// Create an unknown exchange error.
    pub fn unknown_exchange(exchange: impl Into<String>, security: impl Into<String>) -> Self {
        Error::UnknownExchange {
            exchange: exchange.into(),
            security: security.into(),
        }
    }

    /// Create an unsupported archive error.
    pub fn unsupported_archive(msg: impl Into<String>) -> Self {
        Error::UnsupportedArchive(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Error::Connection(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Error::Database(msg.into())
    }

    /// Whether the error only marks the end of usable input.
    ///
    /// Truncated captures end in a partial chunk; everything decoded before
    /// it is still valid.
    pub fn is_benign(&self) -> bool {
        matches!(self, Error::Framing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_framing_is_benign() {
        let framing = Error::Framing {
            offset: 41,
            expected: 100,
            got: 12,
        };
        assert!(framing.is_benign());
        assert!(!Error::malformed("bad").is_benign());
        assert!(!Error::unknown_exchange("9", "1234").is_benign());
    }

    #[test]
    fn test_unknown_exchange_message() {
        let err = Error::unknown_exchange("9", "1234");
        assert_eq!(
            err.to_string(),
            "Unknown exchange code \"9\" for security \"1234\""
        );
    }
}
