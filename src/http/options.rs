//! Per-call request options.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Receives transfer progress as a whole percentage (0-100).
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Options accepted by every verb helper. Unset values fall back to the
/// client configuration.
#[derive(Clone)]
pub struct RequestOptions {
    /// Show failures through the notifier (default: true)
    pub show_error_message: bool,
    /// Show the server message on success (default: false)
    pub show_success_message: bool,
    /// Allow the retry wrapper to resubmit (default: true)
    pub enable_retry: bool,
    /// Retries left for this call; `None` uses the client default
    pub retry_count: Option<usize>,
    /// Overrides the client timeout for this call
    pub timeout: Option<Duration>,
    /// Merged over the default headers
    pub headers: HeaderMap,
    pub on_progress: Option<ProgressCallback>,
    /// Download only: skips filename detection
    pub file_name: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            show_error_message: true,
            show_success_message: false,
            enable_retry: true,
            retry_count: None,
            timeout: None,
            headers: HeaderMap::new(),
            on_progress: None,
            file_name: None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress the error notification.
    pub fn quiet(mut self) -> Self {
        self.show_error_message = false;
        self
    }

    pub fn with_success_message(mut self) -> Self {
        self.show_success_message = true;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.enable_retry = false;
        self
    }

    pub fn retries(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub(crate) fn report_progress(&self, loaded: u64, total: Option<u64>) {
        if let Some(callback) = &self.on_progress {
            callback(progress_percent(loaded, total));
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("show_error_message", &self.show_error_message)
            .field("show_success_message", &self.show_success_message)
            .field("enable_retry", &self.enable_retry)
            .field("retry_count", &self.retry_count)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("on_progress", &self.on_progress.is_some())
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// `floor(loaded / total * 100)` when the total is known, else 0.
pub fn progress_percent(loaded: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => (loaded.saturating_mul(100) / total).min(100) as u8,
        _ => 0,
    }
}
