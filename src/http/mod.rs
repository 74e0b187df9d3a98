//! HTTP client module with envelope handling, retry logic and error handling.

mod client;
mod envelope;
mod error;
mod options;
mod retry;

pub use client::HttpClient;
pub(crate) use client::Payload;
pub use envelope::{Envelope, Outcome, SUCCESS_CODE, UNAUTHORIZED_CODE};
pub use error::{ErrorCode, HttpError};
pub use options::{ProgressCallback, RequestOptions, progress_percent};
pub use retry::{DEFAULT_RETRY_COUNT, RETRY_DELAY_MS, RetryPolicy, with_retry};
