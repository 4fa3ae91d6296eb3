//! Error types.
//!
//! `IngestError` classifies everything that can go wrong inside the pipeline so
//! callers can decide whether a failure is local to one series or fatal to the
//! run. `AppError` is what the binary reports: a message plus a process exit code.

use thiserror::Error;

/// Classified pipeline failure.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// Network error, timeout or non-2xx response for one request.
    #[error("{origin} request failed: {message}")]
    TransientFetch {
        origin: String,
        status: Option<u16>,
        message: String,
    },

    /// Unexpected JSON shape, missing field, unparseable date or value.
    #[error("malformed {origin} response: {message}")]
    MalformedResponse { origin: String, message: String },

    /// Transaction or write failure against the store.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Missing credentials, unusable database, invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operator interrupt observed before the unit of work committed.
    #[error("cancelled by operator")]
    Cancelled,
}

impl IngestError {
    pub fn transient(origin: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::TransientFetch {
            origin: origin.into(),
            status,
            message: message.into(),
        }
    }

    pub fn malformed(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Short, stable name used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientFetch { .. } => "transient_fetch",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::TransientFetch { status: Some(429), .. })
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Connection failures and timeouts carry no status and are retryable, as are
    /// 429 and the gateway-style 5xx codes. Other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientFetch { status: None, .. } => true,
            Self::TransientFetch {
                status: Some(code), ..
            } => matches!(code, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Error returned by the binary entry point.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let exit_code = match &err {
            IngestError::Configuration(_) => 2,
            IngestError::TransientFetch { .. } | IngestError::MalformedResponse { .. } => 4,
            IngestError::Persistence(_) => 5,
            IngestError::Cancelled => 130,
        };
        Self::new(exit_code, err.to_string())
    }
}

impl From<crate::logging::LogError> for AppError {
    fn from(err: crate::logging::LogError) -> Self {
        Self::new(2, format!("Failed to initialize logging: {err}"))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
