//! Error types for conformance runs.
//!
//! Observation errors are categorized so the observer can decide whether a
//! failed call is worth a second attempt. Everything else is either fatal
//! for the run (parse, missing key, bad registration) or recorded against a
//! single control (correlation, observation).

use thiserror::Error;

/// Categories of observation errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Timeouts and dropped connections (transient, retryable)
    Transient,
    /// Authentication failures, missing resources, anything else
    Permanent,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Transient observation failure",
            Self::Permanent => "Permanent observation failure",
        }
    }
}

/// Errors raised by an observation provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObservationError {
    /// The call did not complete within its time budget
    #[error("timed out after {millis}ms observing {kind}")]
    Timeout {
        /// Resource kind being observed
        kind: String,
        /// Time budget that expired
        millis: u64,
    },

    /// The connection was reset mid-call
    #[error("connection reset observing {kind}: {message}")]
    ConnectionReset {
        /// Resource kind being observed
        kind: String,
        /// Transport detail
        message: String,
    },

    /// Credentials were rejected
    #[error("unauthorized observing {kind}: {message}")]
    Unauthorized {
        /// Resource kind being observed
        kind: String,
        /// Detail from the provider
        message: String,
    },

    /// The requested resource does not exist
    #[error("{kind} not found: {selector}")]
    NotFound {
        /// Resource kind being observed
        kind: String,
        /// Selector that matched nothing
        selector: String,
    },

    /// Too many earlier calls are still running past their time budget
    #[error("provider is unresponsive observing {kind}: {stalled} calls still running")]
    Unresponsive {
        /// Resource kind being observed
        kind: String,
        /// Expired calls that have not returned yet
        stalled: usize,
    },

    /// Anything the provider could not classify
    #[error("observation failed: {0}")]
    Other(String),
}

impl ObservationError {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } | Self::ConnectionReset { .. } => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Errors that can occur while preparing or running controls.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed declaration or encoded declaration value
    #[error("invalid declaration {source_name}: {message}")]
    Parse {
        /// File or output name that failed to parse
        source_name: String,
        /// Parser message
        message: String,
    },

    /// A required declaration value is absent
    #[error("missing required key: {key}")]
    MissingKey {
        /// Name of the absent key
        key: String,
    },

    /// A declared value has the wrong shape
    #[error("unexpected type for {key}: expected {expected}")]
    Type {
        /// Name of the offending key
        key: String,
        /// Human description of the expected shape
        expected: &'static str,
    },

    /// A logical group has no observed instance
    #[error("no instance correlates to logical name '{name}'")]
    Correlation {
        /// Logical name that yielded zero instances
        name: String,
    },

    /// Observation failed after retries
    #[error(transparent)]
    Observation(#[from] ObservationError),

    /// Control registration rejected
    #[error("invalid control '{id}': {message}")]
    InvalidControl {
        /// Control identifier
        id: String,
        /// Reason for rejection
        message: String,
    },

    /// Control filter named an unregistered control
    #[error("unknown control: {0}")]
    UnknownControl(String),

    /// Regular expression failed to compile
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error aborts the whole run rather than one control.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Correlation { .. } | Self::Observation(_))
    }
}

/// Result type for conformance operations.
pub type Result<T> = std::result::Result<T, Error>;
