// src/notify.rs

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Info,
    Warning,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self {
            NotificationKind::Success => "✅",
            NotificationKind::Info => "ℹ️",
            NotificationKind::Warning => "⚠️",
            NotificationKind::Error => "❌",
        };
        f.write_str(icon)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Transient user-facing messages. Nothing is persisted.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NotificationKind);

    fn success(&self, message: &str) {
        self.notify(message, NotificationKind::Success);
    }

    fn info(&self, message: &str) {
        self.notify(message, NotificationKind::Info);
    }

    fn warning(&self, message: &str) {
        self.notify(message, NotificationKind::Warning);
    }

    fn error(&self, message: &str) {
        self.notify(message, NotificationKind::Error);
    }
}

/// Prints to stderr so stdout stays clean for rendered output.
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Error => error!("{}", message),
            NotificationKind::Warning => warn!("{}", message),
            _ => info!("{}", message),
        }
        eprintln!("{} {}", kind, message);
    }
}

/// Collects notifications in memory, for tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn has(&self, kind: NotificationKind, message: &str) -> bool {
        self.sent()
            .iter()
            .any(|n| n.kind == kind && n.message == message)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        debug!("Recorded notification: {:?} {}", kind, message);
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(Notification {
                kind,
                message: message.to_string(),
            });
        }
    }
}
