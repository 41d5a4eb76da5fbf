use log::{info, warn};
use notify_rust::{Hint, Notification};

use crate::domain::inbox::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// A toast for the user. How it is shown is up to the [`Notifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: Level,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            text: text.into(),
        }
    }
}

pub trait Notifier: Send {
    fn notice(&self, notice: &Notice);

    /// Called for messages that were not present in the previous fetch.
    fn new_message(&self, _message: &Message) {}
}

/// Only writes to the log; used when desktop notifications are off.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notice(&self, notice: &Notice) {
        match notice.level {
            Level::Info => info!("{}", notice.text),
            Level::Error => warn!("{}", notice.text),
        }
    }

    fn new_message(&self, message: &Message) {
        info!(
            "new message from {}: {}",
            message.sender_label(),
            message.subject_label()
        );
    }
}

pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            app_name: "tempinbox".to_string(),
        }
    }

    fn show(&self, summary: &str, body: &str) {
        let mut n = Notification::new();
        n.appname(&self.app_name)
            .summary(summary)
            .body(body)
            .hint(Hint::Category("email".to_string()));
        if let Err(e) = n.show() {
            warn!("notification error: {e}");
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notice(&self, notice: &Notice) {
        let summary = match notice.level {
            Level::Info => "Temporary inbox",
            Level::Error => "Temporary inbox error",
        };
        self.show(summary, &notice.text);
    }

    fn new_message(&self, message: &Message) {
        let summary = format!("{} — {}", message.sender_label(), message.subject_label());
        self.show(&summary, message.intro.as_deref().unwrap_or_default());
    }
}

/// Collects notices for assertions.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    pub notices: std::sync::Arc<std::sync::Mutex<Vec<Notice>>>,
    pub new_messages: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.notices
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.text.clone())
            .collect()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn notice(&self, notice: &Notice) {
        self.notices.lock().unwrap().push(notice.clone());
    }

    fn new_message(&self, message: &Message) {
        self.new_messages.lock().unwrap().push(message.id.clone());
    }
}
