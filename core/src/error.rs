//! Error types for the command gate.
//!
//! # Design
//! Only `ConfigError` ever reaches a caller as an `Err`: it is raised while
//! building a `Dispatcher` and is fatal to startup. `DispatchError` and
//! `FieldWriteError` are produced per packet and folded into
//! `Directive::Stop` by the interceptor; they exist as types so logs and the
//! host-does-IO entry points can say exactly what went wrong.

/// Invalid or incomplete dispatcher configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("rest_endpoint must be non-empty")]
    EmptyEndpoint,

    #[error("invalid rest_endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to parse dispatcher config: {0}")]
    Parse(String),

    #[error("invalid {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Failure of a single dispatch round trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// DNS, connect, TLS or framing failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response arrived with a status outside 2xx.
    #[error("HTTP {status}")]
    Status { status: u16 },

    /// Anything else, e.g. a request that could not be built.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

/// Failure to write response bytes back into a packet field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldWriteError {
    #[error("packet has no field named {0}")]
    UnknownField(String),

    #[error("field {0} is not a binary block")]
    NotABlock(String),

    #[error("{len} byte(s) do not fit field {field} (max {max})")]
    TooLarge { field: String, len: usize, max: usize },
}
