//! Error types for the Portico gateway.

use std::fmt;

use thiserror::Error;

/// Gateway-specific errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error (malformed or conflicting mapping). Fatal at startup.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Client identity could not be resolved and identity gating is enabled.
    #[error("Identity unresolved: {message}")]
    Identity {
        /// Error message.
        message: String,
    },

    /// Request denied by the configured IP allow/deny lists.
    #[error("Access denied: {reason}")]
    Denied {
        /// Reason for denial.
        reason: String,
    },

    /// Upstream unavailable (connection refused, timeout).
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
        /// Optional HTTP status code from upstream.
        status: Option<u16>,
    },

    /// Malformed upstream response.
    #[error("Upstream protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// Unexpected error in a pipeline stage. Surfaced generically to clients.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl GatewayError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an identity-gating error.
    pub fn identity(message: impl Into<String>) -> Self {
        Self::Identity {
            message: message.into(),
        }
    }

    /// Create an access-denied error.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status: None,
        }
    }

    /// Create an upstream error with status code.
    pub fn upstream_with_status(message: impl Into<String>, status: u16) -> Self {
        Self::Upstream {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create an upstream protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the HTTP status code returned to the client for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config { .. } => 500,
            Self::Identity { .. } => 403,
            Self::Denied { .. } => 403,
            Self::Upstream { status, .. } => status.unwrap_or(502),
            Self::Protocol { .. } => 502,
            Self::Server { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Get the error category for metrics and logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Identity { .. } => "identity",
            Self::Denied { .. } => "denied",
            Self::Upstream { .. } => "upstream",
            Self::Protocol { .. } => "protocol",
            Self::Server { .. } => "server",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// JSON error envelope returned to clients.
///
/// Clients always receive a well-formed response body; raw upstream or
/// connection-library error text never leaks beyond the error's own
/// display message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error code/category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl From<&GatewayError> for ErrorResponse {
    fn from(err: &GatewayError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}
