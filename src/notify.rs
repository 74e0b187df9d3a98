//! Notification sink for success and error toasts.

use log::debug;

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Prints notifications to stderr so stdout stays reserved for payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier {
    pub quiet: bool,
}

impl ConsoleNotifier {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Notifier for ConsoleNotifier {
    fn success(&self, message: &str) {
        debug!("success notification: {}", message);
        if !self.quiet {
            eprintln!("✔ {}", message);
        }
    }

    fn error(&self, message: &str) {
        debug!("error notification: {}", message);
        if !self.quiet {
            eprintln!("✘ {}", message);
        }
    }
}
