use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::Session;
use crate::config::ClientConfig;
use crate::http::HttpError;
use crate::i18n::{Localizer, MessageKey};
use crate::notify::Notifier;

#[derive(Default)]
struct GuardState {
    shown: bool,
    /// Bumped whenever a window opens or is reset; a reset task only closes
    /// the window it was armed for.
    generation: u64,
    reset_timer: Option<JoinHandle<()>>,
}

/// Makes sure a burst of unauthorized responses produces one notification
/// and one logout.
///
/// The first unauthorized response opens a window. Further responses inside
/// the window are still rejected but cause no side effects. The window is not
/// extended by later responses: it closes a fixed time after the first one.
pub struct SessionGuard {
    window: Duration,
    logout_delay: Duration,
    state: Arc<Mutex<GuardState>>,
}

impl SessionGuard {
    pub fn new(window: Duration, logout_delay: Duration) -> Self {
        Self {
            window,
            logout_delay,
            state: Arc::new(Mutex::new(GuardState::default())),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.unauthorized_window, config.logout_delay)
    }

    /// Must be called from within a tokio runtime: the logout and the window
    /// reset run as spawned tasks. Always returns the error to raise.
    pub fn handle_unauthorized(
        &self,
        session: Arc<dyn Session>,
        notifier: &dyn Notifier,
        localizer: &dyn Localizer,
    ) -> HttpError {
        let message = localizer.text(MessageKey::Unauthorized);

        let first = {
            let mut state = lock(&self.state);
            if state.shown {
                false
            } else {
                state.shown = true;
                state.generation += 1;
                let generation = state.generation;
                if let Some(stale) = state.reset_timer.take() {
                    stale.abort();
                }
                state.reset_timer = Some(self.arm_reset(generation));
                true
            }
        };

        if first {
            warn!(
                "Unauthorized response, logging out in {}ms",
                self.logout_delay.as_millis()
            );
            notifier.error(&message);
            let delay = self.logout_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                info!("Logging out after unauthorized response");
                session.logout();
            });
        } else {
            debug!("Unauthorized response suppressed, logout already scheduled");
        }

        HttpError::unauthorized(message)
    }

    /// Whether unauthorized side effects are currently suppressed.
    pub fn is_suppressing(&self) -> bool {
        lock(&self.state).shown
    }

    /// Closes the window early, e.g. after the user signed in again.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.shown = false;
        state.generation += 1;
        if let Some(timer) = state.reset_timer.take() {
            timer.abort();
        }
    }

    fn arm_reset(&self, generation: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            expire(&state, generation);
        })
    }
}

/// Closes the window armed at `generation`. A timer that lost the race with
/// `reset` or a newer window leaves the state alone.
fn expire(state: &Mutex<GuardState>, generation: u64) {
    let mut state = lock(state);
    if state.generation != generation {
        debug!("Stale unauthorized timer ignored");
        return;
    }
    state.shown = false;
    state.reset_timer = None;
    debug!("Unauthorized window closed");
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.state).reset_timer.take() {
            timer.abort();
        }
    }
}

fn lock(state: &Mutex<GuardState>) -> MutexGuard<'_, GuardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ErrorCode;
    use crate::i18n::English;
    use crate::notify::MockNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSession {
        logouts: AtomicUsize,
    }

    impl Session for CountingSession {
        fn access_token(&self) -> Option<String> {
            Some("token".to_string())
        }

        fn logout(&self) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn guard() -> SessionGuard {
        SessionGuard::new(Duration::from_secs(3), Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_unauthorized_logs_out_once() {
        let guard = guard();
        let session = Arc::new(CountingSession::default());
        let mut notifier = MockNotifier::new();
        notifier.expect_error().times(1).return_const(());

        let first = guard.handle_unauthorized(session.clone(), &notifier, &English);
        let second = guard.handle_unauthorized(session.clone(), &notifier, &English);

        assert_eq!(first.code, ErrorCode::Unauthorized);
        assert_eq!(second.code, ErrorCode::Unauthorized);
        assert!(guard.is_suppressing());
        assert_eq!(session.logouts.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(session.logouts.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(session.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_reopens_after_expiry() {
        let guard = guard();
        let session = Arc::new(CountingSession::default());
        let mut notifier = MockNotifier::new();
        notifier.expect_error().times(2).return_const(());

        guard.handle_unauthorized(session.clone(), &notifier, &English);
        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert!(!guard.is_suppressing());

        guard.handle_unauthorized(session.clone(), &notifier, &English);
        assert!(guard.is_suppressing());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(session.logouts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_responses_do_not_extend_window() {
        let guard = guard();
        let session = Arc::new(CountingSession::default());
        let mut notifier = MockNotifier::new();
        notifier.expect_error().times(1).return_const(());

        guard.handle_unauthorized(session.clone(), &notifier, &English);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        guard.handle_unauthorized(session.clone(), &notifier, &English);

        // 3.1s after the first response, not after the second
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!guard.is_suppressing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_window_early() {
        let guard = guard();
        let session = Arc::new(CountingSession::default());
        let mut notifier = MockNotifier::new();
        notifier.expect_error().times(2).return_const(());

        guard.handle_unauthorized(session.clone(), &notifier, &English);
        guard.reset();
        assert!(!guard.is_suppressing());

        guard.handle_unauthorized(session.clone(), &notifier, &English);
        assert!(guard.is_suppressing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_close_newer_window() {
        let guard = guard();
        let session = Arc::new(CountingSession::default());
        let mut notifier = MockNotifier::new();
        notifier.expect_error().times(2).return_const(());

        guard.handle_unauthorized(session.clone(), &notifier, &English);
        let first_generation = lock(&guard.state).generation;
        guard.reset();
        guard.handle_unauthorized(session.clone(), &notifier, &English);

        // the first timer woke up after the reset and only now gets the lock
        expire(&guard.state, first_generation);
        assert!(guard.is_suppressing());
        assert!(lock(&guard.state).reset_timer.is_some());

        let current = lock(&guard.state).generation;
        expire(&guard.state, current);
        assert!(!guard.is_suppressing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_message_is_localized() {
        let guard = guard();
        let session = Arc::new(CountingSession::default());
        let mut notifier = MockNotifier::new();
        notifier
            .expect_error()
            .withf(|message| message.contains("session has expired"))
            .times(1)
            .return_const(());

        let err = guard.handle_unauthorized(session, &notifier, &English);
        assert!(err.message.contains("session has expired"));
    }
}
