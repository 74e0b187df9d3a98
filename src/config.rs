//! Baseline client configuration.

use anyhow::{Context, Result};
use log::debug;
use std::time::Duration;

use crate::http::{DEFAULT_RETRY_COUNT, RETRY_DELAY_MS};
use crate::runtime::Runtime;

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Uploads get a longer timeout than ordinary calls.
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 300_000;

/// How long repeated unauthorized responses are suppressed after the first.
pub const UNAUTHORIZED_DEBOUNCE_MS: u64 = 3_000;

/// Delay between the unauthorized notification and the logout.
pub const LOGOUT_DELAY_MS: u64 = 1_000;

const USER_AGENT: &str = concat!("wirecall/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Prefix for relative request paths. Empty means paths are used as given.
    pub base_url: String,
    pub timeout: Duration,
    /// Keep cookies between calls, the equivalent of sending credentials.
    pub with_credentials: bool,
    pub retry_count: usize,
    pub retry_delay: Duration,
    pub upload_timeout: Duration,
    pub unauthorized_window: Duration,
    pub logout_delay: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            with_credentials: true,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            upload_timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
            unauthorized_window: Duration::from_millis(UNAUTHORIZED_DEBOUNCE_MS),
            logout_delay: Duration::from_millis(LOGOUT_DELAY_MS),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Applies the tuning knobs found in the environment over the defaults:
    /// `WIRECALL_TIMEOUT_MS`, `WIRECALL_UPLOAD_TIMEOUT_MS`, `WIRECALL_RETRIES`,
    /// `WIRECALL_RETRY_DELAY_MS` and `WIRECALL_WITH_CREDENTIALS`.
    pub fn from_env<R: Runtime>(runtime: &R) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = parse_env::<u64, _>(runtime, "WIRECALL_TIMEOUT_MS")? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env::<u64, _>(runtime, "WIRECALL_UPLOAD_TIMEOUT_MS")? {
            config.upload_timeout = Duration::from_millis(ms);
        }
        if let Some(count) = parse_env::<usize, _>(runtime, "WIRECALL_RETRIES")? {
            config.retry_count = count;
        }
        if let Some(ms) = parse_env::<u64, _>(runtime, "WIRECALL_RETRY_DELAY_MS")? {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(flag) = parse_env::<bool, _>(runtime, "WIRECALL_WITH_CREDENTIALS")? {
            config.with_credentials = flag;
        }

        debug!("Client configuration: {:?}", config);
        Ok(config)
    }

    /// Joins a relative path onto the base URL. Absolute URLs pass through.
    pub fn resolve_url(&self, url: &str) -> String {
        if self.base_url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }
}

fn parse_env<T, R>(runtime: &R, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    R: Runtime,
{
    match runtime.env_var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", key, value)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    fn runtime_with(vars: &'static [(&'static str, &'static str)]) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime.expect_env_var().returning(move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        });
        runtime
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_count, 0);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.upload_timeout, Duration::from_secs(300));
        assert!(config.with_credentials);
        assert!(config.user_agent.starts_with("wirecall/"));
    }

    #[test]
    fn test_from_env_without_variables() {
        let runtime = runtime_with(&[]);
        let config = ClientConfig::from_env(&runtime).unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_from_env_overrides() {
        let runtime = runtime_with(&[
            ("WIRECALL_TIMEOUT_MS", "1500"),
            ("WIRECALL_RETRIES", "2"),
            ("WIRECALL_RETRY_DELAY_MS", " 50 "),
            ("WIRECALL_WITH_CREDENTIALS", "false"),
        ]);

        let config = ClientConfig::from_env(&runtime).unwrap();
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry_count, 2);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert!(!config.with_credentials);
        assert_eq!(
            config.upload_timeout,
            Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq("WIRECALL_TIMEOUT_MS"))
            .returning(|_| Ok("soon".to_string()));

        let err = ClientConfig::from_env(&runtime).unwrap_err();
        assert!(err.to_string().contains("WIRECALL_TIMEOUT_MS"));
    }

    #[test]
    fn test_resolve_url() {
        let config = ClientConfig::new("https://api.example.com/v1/");
        assert_eq!(
            config.resolve_url("/users"),
            "https://api.example.com/v1/users"
        );
        assert_eq!(
            config.resolve_url("users/7"),
            "https://api.example.com/v1/users/7"
        );
        assert_eq!(
            config.resolve_url("http://other.example.com/x"),
            "http://other.example.com/x"
        );

        let config = ClientConfig::default();
        assert_eq!(config.resolve_url("/users"), "/users");
    }
}
