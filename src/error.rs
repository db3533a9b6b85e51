//! Error types for the posting pipeline

use thiserror::Error;

/// Errors surfaced by the posting pipeline
#[derive(Error, Debug)]
pub enum PostError {
    /// IO error during file or network operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is missing or inconsistent
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// TLS error during secure connection
    #[error("TLS error: {0}")]
    Tls(String),

    /// Server refused the connection or greeted with an unexpected code
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// AUTHINFO exchange rejected
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// GROUP command rejected
    #[error("failed to join group: {0}")]
    GroupError(String),

    /// Server rejected a POST transaction
    #[error("article rejected: {0}")]
    PostRejected(String),

    /// Server did not respond within the deadline
    #[error("timed out waiting for server response")]
    Timeout,

    /// yEnc framing or escape sequence is broken
    #[error("malformed article: {0}")]
    MalformedArticle(String),

    /// Decoded or on-disk data does not match its recorded checksum
    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// Reed-Solomon shard counts are incompatible with the field
    #[error("recovery encoder failure: {0}")]
    EncoderFailure(String),

    /// Part size must be positive
    #[error("invalid part size: {0}")]
    InvalidSize(i64),

    /// Redundancy percentage outside 1..=100
    #[error("invalid redundancy: {0}% (must be 1-100)")]
    InvalidRedundancy(u32),

    /// Pool was closed; no further clients can be leased
    #[error("connection pool is closed")]
    PoolClosed,

    /// Every configured server refused the upload
    #[error("all servers failed")]
    AllServersFailed,

    /// Response line could not be parsed
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Connection closed unexpectedly
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using PostError
pub type Result<T> = std::result::Result<T, PostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostError::InvalidRedundancy(120);
        assert_eq!(err.to_string(), "invalid redundancy: 120% (must be 1-100)");

        let err = PostError::PostRejected("441 posting failed".to_string());
        assert_eq!(err.to_string(), "article rejected: 441 posting failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PostError = io.into();
        assert!(matches!(err, PostError::Io(_)));
    }
}
