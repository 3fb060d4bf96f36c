use thiserror::Error;

/// Application-wide error types for the harvester.
#[derive(Error, Debug)]
pub enum AppError {
    /// Non-success HTTP status from the wiki API.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Any other HTTP client failure (bad request construction, body read).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The wiki reports the page as missing, or it has no revisions.
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// The wiki answered, but not with something we can decode.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Page listing could not be retrieved; the run cannot continue safely.
    #[error("Enumeration failed: {0}")]
    Enumeration(String),

    /// Raw page files or progress file could not be read or written.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Filter expression could not be parsed or refers to an unknown field.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if the error means storage is unavailable, which is fatal
    /// for whichever stage hit it.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::StorageError(_) | AppError::DatabaseError(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::StorageError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> AppError {
        AppError::HttpStatus {
            status: code,
            url: "https://wiki.test/api.php".into(),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(408).is_retryable());
        assert!(AppError::HttpError("connection reset by peer".into()).is_retryable());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!status(404).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!AppError::PageNotFound("Foo".into()).is_retryable());
        assert!(!AppError::MalformedResponse("no query".into()).is_retryable());
        assert!(!AppError::Enumeration("gave up".into()).is_retryable());
    }

    #[test]
    fn test_storage_errors() {
        assert!(AppError::StorageError("disk full".into()).is_storage());
        assert!(AppError::DatabaseError("locked".into()).is_storage());
        assert!(!AppError::Timeout(1).is_storage());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(AppError::from(io).is_storage());
    }
}
