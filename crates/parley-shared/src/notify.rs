//! Fire-and-forget user notification sink.
//!
//! The host application decides how notices surface (toast, status bar,
//! nothing). Components never treat a notice as an error path.

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Error,
    Success,
    Info,
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NoticeKind, text: &str);
}

/// Default sink that routes notices to the tracing log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, kind: NoticeKind, text: &str) {
        match kind {
            NoticeKind::Error => tracing::warn!(notice = text, "User notice"),
            NoticeKind::Success | NoticeKind::Info => {
                tracing::info!(notice = text, "User notice")
            }
        }
    }
}
