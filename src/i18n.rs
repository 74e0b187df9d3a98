//! User-facing message lookup.
//!
//! Translation catalogs live outside this crate; the wrapper only asks for
//! messages by key.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// The session expired and the user is about to be logged out
    Unauthorized,
    /// The server rejected the request without saying why
    RequestFailed,
    /// No response arrived
    NetworkError,
    /// The transport gave up waiting for a response
    RequestTimeout,
    /// The response could not be understood
    UnexpectedResponse,
    /// Default success toast
    OperationSucceeded,
}

pub trait Localizer: Send + Sync {
    fn text(&self, key: MessageKey) -> String;
}

/// Built-in English catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct English;

impl Localizer for English {
    fn text(&self, key: MessageKey) -> String {
        match key {
            MessageKey::Unauthorized => "Your session has expired, please sign in again",
            MessageKey::RequestFailed => "Request failed",
            MessageKey::NetworkError => "Network error, please check your connection",
            MessageKey::RequestTimeout => "Request timed out, please try again",
            MessageKey::UnexpectedResponse => "Unexpected response from server",
            MessageKey::OperationSucceeded => "Operation succeeded",
        }
        .to_string()
    }
}
