/// Unified error handling for tidegate
///
/// Transport errors fall into four kinds: I/O failures, protocol integrity
/// failures (sequence mismatch), timeouts and partial writes. Each variant
/// carries the operation that failed so callers can decide reconnect policy.

use std::fmt;
use std::io;
use thiserror::Error;

/// Main error type for tidegate operations
#[derive(Debug, Error)]
pub enum TidegateError {
    /// Underlying stream read/write failure
    #[error("Network error during {operation}: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// Physical packet carried an unexpected sequence number
    #[error("invalid sequence {got} != {expected}")]
    InvalidSequence { expected: u8, got: u8 },

    /// Read exceeded the configured deadline
    #[error("Operation timed out: {operation}")]
    Timeout { operation: &'static str },

    /// Write failed or transferred fewer bytes than requested
    #[error("Bad connection during {operation}: {source}")]
    BadConnection {
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    /// Dialing the backend failed or timed out
    #[error("dial backend error: {address}: {reason}")]
    Dial { address: String, reason: String },

    /// Backend connection used before `connect` succeeded
    #[error("Backend {address} is not connected")]
    NotConnected { address: String },

    /// Backend connection used after `close`
    #[error("Backend {address} is closed")]
    Closed { address: String },

    /// Backend-level failures that are not tied to a stream operation
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Configuration center lookup errors
    #[error("Config center error: {message}")]
    ConfigCenter { message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for tidegate operations
pub type TidegateResult<T> = Result<T, TidegateError>;

impl TidegateError {
    /// Wrap an I/O error with the name of the failing operation
    pub fn network(operation: &'static str, source: io::Error) -> Self {
        TidegateError::Network { operation, source }
    }

    pub fn bad_connection(operation: &'static str, source: io::Error) -> Self {
        TidegateError::BadConnection { operation, source }
    }

    pub fn timeout(operation: &'static str) -> Self {
        TidegateError::Timeout { operation }
    }

    pub fn dial<A: Into<String>, R: Into<String>>(address: A, reason: R) -> Self {
        TidegateError::Dial {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn backend<S: Into<String>>(message: S) -> Self {
        TidegateError::Backend {
            message: message.into(),
        }
    }

    pub fn config_center<S: Into<String>>(message: S) -> Self {
        TidegateError::ConfigCenter {
            message: message.into(),
        }
    }

    /// Backend slow rather than backend gone
    pub fn is_timeout(&self) -> bool {
        matches!(self, TidegateError::Timeout { .. })
    }

    /// The stream is desynchronized and must be closed
    pub fn is_protocol(&self) -> bool {
        matches!(self, TidegateError::InvalidSequence { .. })
    }

    /// Stream-level failures, including use of a closed connection
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            TidegateError::Network { .. }
                | TidegateError::BadConnection { .. }
                | TidegateError::Dial { .. }
                | TidegateError::Closed { .. }
        )
    }

    /// Check if the caller may retry on a fresh backend connection
    pub fn is_recoverable(&self) -> bool {
        match self {
            TidegateError::Network { .. } => true,
            TidegateError::BadConnection { .. } => true,
            TidegateError::Dial { .. } => true,
            TidegateError::Timeout { .. } => true,
            TidegateError::InvalidSequence { .. } => true,
            TidegateError::ConfigCenter { .. } => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TidegateError::Config(_) => ErrorSeverity::Critical,
            TidegateError::NotConnected { .. } => ErrorSeverity::Critical,
            TidegateError::InvalidSequence { .. } => ErrorSeverity::Error,
            TidegateError::Network { .. } => ErrorSeverity::Warning,
            TidegateError::BadConnection { .. } => ErrorSeverity::Warning,
            TidegateError::Dial { .. } => ErrorSeverity::Warning,
            TidegateError::Timeout { .. } => ErrorSeverity::Warning,
            TidegateError::Closed { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_sequence_message() {
        let error = TidegateError::InvalidSequence {
            expected: 3,
            got: 7,
        };
        assert_eq!(error.to_string(), "invalid sequence 7 != 3");
        assert!(error.is_protocol());
        assert!(!error.is_io());
        assert!(!error.is_timeout());
    }

    #[test]
    fn test_timeout_is_distinct_from_io() {
        let timeout = TidegateError::timeout("read_one_packet");
        assert!(timeout.is_timeout());
        assert!(!timeout.is_io());

        let network = TidegateError::network(
            "read_one_packet",
            io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
        );
        assert!(network.is_io());
        assert!(!network.is_timeout());
        assert_eq!(
            network.to_string(),
            "Network error during read_one_packet: eof"
        );
    }

    #[test]
    fn test_error_severity() {
        let config_error = TidegateError::Config(ConfigError::ValidationError("test".to_string()));
        assert_eq!(config_error.severity(), ErrorSeverity::Critical);

        let dial_error = TidegateError::dial("127.0.0.1:3306", "connection refused");
        assert_eq!(dial_error.severity(), ErrorSeverity::Warning);
        assert_eq!(
            dial_error.to_string(),
            "dial backend error: 127.0.0.1:3306: connection refused"
        );
    }

    #[test]
    fn test_error_recoverability() {
        let bad_conn = TidegateError::bad_connection(
            "write_packet",
            io::Error::new(io::ErrorKind::WriteZero, "short write"),
        );
        assert!(bad_conn.is_recoverable());
        assert!(bad_conn.is_io());

        let config_error = TidegateError::Config(ConfigError::ValidationError("test".to_string()));
        assert!(!config_error.is_recoverable());

        let closed = TidegateError::Closed {
            address: "db:3306".to_string(),
        };
        assert!(closed.is_io());
        assert!(!closed.is_recoverable());
    }
}
