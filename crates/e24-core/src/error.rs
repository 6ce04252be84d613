//! Error types for e24cloud operations.
//!
//! Every failure raised by the session, the transport or the resource objects is
//! one of the variants below. Lookups are the only place where a missing resource
//! is not an error: they report it as `None` and leave it to the caller to turn
//! that into [`Error::NotFound`] with context.

use thiserror::Error;

/// Main error type for e24cloud operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Caller misuse (missing lookup key, unsupported HTTP method, empty identifier)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Resource does not exist (or is not visible to these credentials)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The API answered, but not with a successful response
    #[error("API request failed with status {status}: {body}")]
    RequestFailed {
        /// HTTP status code of the response
        status: u16,
        /// Raw response body
        body: String,
    },

    /// HTTP request could not be completed
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Operation timed out
    #[error("Timeout waiting for API: {0}")]
    Timeout(String),

    /// API host could not be reached
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Response body was not the JSON we expected
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Configuration error (missing credentials, invalid settings, no session)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Endpoint label is not part of the endpoint registry
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// No provisioning zone matches the configured endpoint
    #[error("Zone not resolvable for endpoint {0}")]
    ZoneUnresolved(String),

    /// Operation on an object that is no longer bound to a remote resource
    #[error("Invalid object state: {0}")]
    StateError(String),

    /// A refreshed record is missing a key the client expects
    #[error("Schema mismatch for {kind}: missing or invalid key `{key}`")]
    SchemaError {
        /// Resource kind whose record was applied
        kind: String,
        /// Offending key
        key: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Specialized result type for e24cloud operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::RequestFailed { .. } => "REQUEST_FAILED",
            Self::HttpError(_) => "HTTP_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::UnknownEndpoint(_) => "UNKNOWN_ENDPOINT",
            Self::ZoneUnresolved(_) => "ZONE_UNRESOLVED",
            Self::StateError(_) => "STATE_ERROR",
            Self::SchemaError { .. } => "SCHEMA_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Returns true for failures raised while talking to the API.
    ///
    /// These are the failures a lookup by id collapses into "not found".
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. }
                | Self::HttpError(_)
                | Self::Timeout(_)
                | Self::ServiceUnavailable(_)
                | Self::ParseError(_)
        )
    }

    /// Returns true for misconfiguration of the session or its endpoint.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::ValidationError(_)
                | Self::UnknownEndpoint(_)
                | Self::ZoneUnresolved(_)
        )
    }

    /// HTTP status carried by the error, if the API answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::ServiceUnavailable(err.to_string())
        } else {
            Self::HttpError(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::ConfigError(format!("Invalid URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
