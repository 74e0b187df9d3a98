//! Session collaborators: the token source, its logout action, and the
//! guard that debounces unauthorized responses.

mod guard;

use log::info;
use std::sync::{PoisonError, RwLock};

pub use guard::SessionGuard;

/// Where the access token comes from and how to end the session.
#[cfg_attr(test, mockall::automock)]
pub trait Session: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn logout(&self);
}

/// In-memory session holding a bearer token until logout.
#[derive(Debug, Default)]
pub struct TokenSession {
    token: RwLock<Option<String>>,
}

impl TokenSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Session for TokenSession {
    fn access_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn logout(&self) {
        let previous = self
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("Session token cleared");
        }
    }
}
