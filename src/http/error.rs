//! Typed errors raised by the HTTP wrapper.

use reqwest::StatusCode;
use std::fmt;

/// Status-like classification carried by every [`HttpError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// HTTP 401 or envelope code "401"
    Unauthorized,
    /// HTTP 408, or the transport gave up waiting
    RequestTimeout,
    /// HTTP 500
    InternalServerError,
    /// HTTP 502
    BadGateway,
    /// HTTP 503
    ServiceUnavailable,
    /// HTTP 504
    GatewayTimeout,
    /// Any other non-2xx HTTP status
    Status(u16),
    /// Any other non-zero envelope code
    Application(String),
    /// No response was received at all
    Network,
    /// The response body could not be parsed
    Decode,
    /// A local file operation inside a transfer failed
    Io,
}

impl ErrorCode {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
            StatusCode::REQUEST_TIMEOUT => ErrorCode::RequestTimeout,
            StatusCode::INTERNAL_SERVER_ERROR => ErrorCode::InternalServerError,
            StatusCode::BAD_GATEWAY => ErrorCode::BadGateway,
            StatusCode::SERVICE_UNAVAILABLE => ErrorCode::ServiceUnavailable,
            StatusCode::GATEWAY_TIMEOUT => ErrorCode::GatewayTimeout,
            other => ErrorCode::Status(other.as_u16()),
        }
    }

    /// Maps an envelope code onto the known categories. Codes that happen to
    /// spell a known HTTP status get the typed variant so the retry wrapper
    /// treats `"503"` in a body the same as a 503 status.
    pub fn from_app_code(code: &str) -> Self {
        match code.trim() {
            "401" => ErrorCode::Unauthorized,
            "408" => ErrorCode::RequestTimeout,
            "500" => ErrorCode::InternalServerError,
            "502" => ErrorCode::BadGateway,
            "503" => ErrorCode::ServiceUnavailable,
            "504" => ErrorCode::GatewayTimeout,
            other => ErrorCode::Application(other.to_string()),
        }
    }

    /// Transient failures worth resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RequestTimeout
                | ErrorCode::InternalServerError
                | ErrorCode::BadGateway
                | ErrorCode::ServiceUnavailable
                | ErrorCode::GatewayTimeout
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unauthorized => write!(f, "401"),
            ErrorCode::RequestTimeout => write!(f, "408"),
            ErrorCode::InternalServerError => write!(f, "500"),
            ErrorCode::BadGateway => write!(f, "502"),
            ErrorCode::ServiceUnavailable => write!(f, "503"),
            ErrorCode::GatewayTimeout => write!(f, "504"),
            ErrorCode::Status(status) => write!(f, "{}", status),
            ErrorCode::Application(code) => write!(f, "{}", code),
            ErrorCode::Network => write!(f, "NETWORK_ERROR"),
            ErrorCode::Decode => write!(f, "DECODE_ERROR"),
            ErrorCode::Io => write!(f, "IO_ERROR"),
        }
    }
}

/// The single error shape surfaced to callers: a human-readable message and
/// a status-like code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub message: String,
    pub code: ErrorCode,
}

impl HttpError {
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message, ErrorCode::Unauthorized)
    }

    /// Wraps a local file failure from the runtime.
    pub fn io(error: anyhow::Error) -> Self {
        Self::new(format!("{:#}", error), ErrorCode::Io)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == ErrorCode::Unauthorized
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for HttpError {}
