//! Error types for the store engine.

use mongostore_core::CoreError;
use std::fmt;
use thiserror::Error;

/// Result type for engine operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the connection manager, the driver and the executor.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Malformed connection string, port or options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server could not be reached or the connection dropped.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// No live connection is held.
    #[error("not connected")]
    NotConnected,

    /// Any other failure reported by the driver.
    #[error("operation failed: {0}")]
    Operation(String),

    /// A reconnect chain gave up.
    #[error("reconnect failed after {attempts} attempt(s): {last}")]
    ReconnectFailed {
        /// Number of reopen attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last: Box<StoreError>,
    },

    /// Entity or query translation error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Error classification driving the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Fatal, raised at connect time.
    Configuration,
    /// Fatal, never triggers a reconnect.
    Authentication,
    /// Eligible for reconnect in custom auto-reconnect mode.
    Connectivity,
    /// Surfaced immediately, never retried.
    Operation,
}

impl ErrorClass {
    /// Returns true for classes that must end a reconnect chain at once.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorClass::Configuration | ErrorClass::Authentication)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Authentication => "authentication",
            ErrorClass::Connectivity => "connectivity",
            ErrorClass::Operation => "operation",
        })
    }
}

impl StoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Creates a connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity(message.into())
    }

    /// Creates an operation error.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    /// Classifies this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Configuration(_) => ErrorClass::Configuration,
            StoreError::Authentication(_) => ErrorClass::Authentication,
            StoreError::Connectivity(_) | StoreError::NotConnected => ErrorClass::Connectivity,
            StoreError::ReconnectFailed { last, .. } => last.class(),
            StoreError::Operation(_) | StoreError::Core(_) => ErrorClass::Operation,
        }
    }

    /// Returns true if a reconnect may cure this error.
    ///
    /// `NotConnected` qualifies only while the store is meant to be open;
    /// [`ReconnectingHandler`](crate::ReconnectingHandler) checks that too.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Connectivity(_) | StoreError::NotConnected)
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match *err.kind {
            ErrorKind::Authentication { .. } => StoreError::Authentication(err.to_string()),
            ErrorKind::InvalidArgument { .. } => StoreError::Configuration(err.to_string()),
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. } => StoreError::Connectivity(err.to_string()),
            _ => StoreError::Operation(err.to_string()),
        }
    }
}

/// Failure code reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    /// Setup failed (`entity/configure`).
    Configure,
    /// An entity operation failed (`entity/error`).
    Error,
}

impl FailureCode {
    /// The host-visible code string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::Configure => "entity/configure",
            FailureCode::Error => "entity/error",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-visible failure of a store operation.
#[derive(Error, Debug, Clone)]
#[error("{code} [{store}/{operation}]: {error}")]
pub struct StoreFailure {
    /// Failure code.
    pub code: FailureCode,
    /// Name of the failing store.
    pub store: String,
    /// Operation that failed.
    pub operation: String,
    /// Underlying error.
    pub error: StoreError,
}

impl StoreFailure {
    /// Creates an `entity/error` failure.
    pub fn error(store: impl Into<String>, operation: impl Into<String>, error: StoreError) -> Self {
        Self {
            code: FailureCode::Error,
            store: store.into(),
            operation: operation.into(),
            error,
        }
    }

    /// Creates an `entity/configure` failure.
    pub fn configure(
        store: impl Into<String>,
        operation: impl Into<String>,
        error: StoreError,
    ) -> Self {
        Self {
            code: FailureCode::Configure,
            store: store.into(),
            operation: operation.into(),
            error,
        }
    }

    /// Classification of the underlying error.
    pub fn class(&self) -> ErrorClass {
        self.error.class()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(StoreError::configuration("bad port").class(), ErrorClass::Configuration);
        assert_eq!(StoreError::authentication("denied").class(), ErrorClass::Authentication);
        assert_eq!(StoreError::connectivity("refused").class(), ErrorClass::Connectivity);
        assert_eq!(StoreError::NotConnected.class(), ErrorClass::Connectivity);
        assert_eq!(StoreError::operation("E11000").class(), ErrorClass::Operation);
        assert_eq!(
            StoreError::from(CoreError::invalid_id("x")).class(),
            ErrorClass::Operation
        );
    }

    #[test]
    fn reconnect_failure_keeps_last_class() {
        let err = StoreError::ReconnectFailed {
            attempts: 3,
            last: Box::new(StoreError::connectivity("refused")),
        };
        assert_eq!(err.class(), ErrorClass::Connectivity);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("3 attempt"));
    }

    #[test]
    fn retryable_errors() {
        assert!(StoreError::connectivity("refused").is_retryable());
        assert!(StoreError::NotConnected.is_retryable());
        assert!(!StoreError::authentication("denied").is_retryable());
        assert!(!StoreError::operation("dup").is_retryable());
    }

    #[test]
    fn fatal_classes() {
        assert!(ErrorClass::Configuration.is_fatal());
        assert!(ErrorClass::Authentication.is_fatal());
        assert!(!ErrorClass::Connectivity.is_fatal());
        assert!(!ErrorClass::Operation.is_fatal());
    }

    #[test]
    fn failure_display() {
        let failure = StoreFailure::error("mongo-store", "load", StoreError::NotConnected);
        assert_eq!(failure.code.as_str(), "entity/error");
        assert_eq!(failure.to_string(), "entity/error [mongo-store/load]: not connected");

        let failure = StoreFailure::configure("mongo-store", "init", StoreError::configuration("x"));
        assert_eq!(failure.code, FailureCode::Configure);
        assert_eq!(failure.class(), ErrorClass::Configuration);
    }
}
