use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::ClientConfig,
    http::HttpClient,
    i18n::English,
    notify::ConsoleNotifier,
    runtime::{Runtime, default_download_dir},
    session::{SessionGuard, TokenSession},
};

/// Values the command line can override.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<usize>,
    pub download_dir: Option<PathBuf>,
    pub quiet: bool,
}

/// Everything a command needs, wired once per process. The session guard is
/// owned here and shared by every request the process makes.
pub struct Config<R: Runtime> {
    pub runtime: R,
    pub http: HttpClient,
    pub session: Arc<TokenSession>,
    pub download_dir: PathBuf,
    pub quiet: bool,
}

impl<R: Runtime> Config<R> {
    pub fn new(runtime: R, settings: Settings) -> Result<Self> {
        let mut client_config = ClientConfig::from_env(&runtime)?;
        if let Some(base_url) = settings.base_url {
            client_config.base_url = base_url;
        }
        if let Some(ms) = settings.timeout_ms {
            client_config.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = settings.retries {
            client_config.retry_count = retries;
        }

        if let Some(token) = &settings.token {
            debug!("Using access token for authentication: {}", mask_token(token));
        }

        let download_dir = match settings.download_dir {
            Some(dir) => dir,
            None => default_download_dir(&runtime)?,
        };

        let session = Arc::new(TokenSession::new(settings.token));
        let guard = Arc::new(SessionGuard::from_config(&client_config));
        let http = HttpClient::new(
            client_config,
            session.clone(),
            Arc::new(ConsoleNotifier::new(settings.quiet)),
            Arc::new(English),
            guard,
        )?;

        Ok(Self {
            runtime,
            http,
            session,
            download_dir,
            quiet: settings.quiet,
        })
    }
}

/// Keeps the first and last four characters of long tokens.
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
