use serde::Serialize;
use std::cell::RefCell;
use tracing::{info, warn};

/// User-facing, fire-and-forget feedback for finished actions.
pub trait Notifier {
    fn notify_success(&self, message: &str);
    fn notify_failure(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Writes notices to the log. Used when nothing renders them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify_success(&self, message: &str) {
        info!(target: "tarot_ledger_lib::notice", "{message}");
    }

    fn notify_failure(&self, message: &str) {
        warn!(target: "tarot_ledger_lib::notice", "{message}");
    }
}

/// Keeps notices in memory so a caller can hand them back to a UI.
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: RefCell<Vec<Notice>>,
}

impl NoticeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.borrow_mut())
    }

    pub fn snapshot(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    fn push(&self, level: NoticeLevel, message: &str) {
        self.notices.borrow_mut().push(Notice {
            level,
            message: message.to_string(),
        });
    }
}

impl Notifier for NoticeLog {
    fn notify_success(&self, message: &str) {
        self.push(NoticeLevel::Success, message);
    }

    fn notify_failure(&self, message: &str) {
        self.push(NoticeLevel::Failure, message);
    }
}

impl<N: Notifier + ?Sized> Notifier for &N {
    fn notify_success(&self, message: &str) {
        (**self).notify_success(message);
    }

    fn notify_failure(&self, message: &str) {
        (**self).notify_failure(message);
    }
}
