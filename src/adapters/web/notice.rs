//! One-shot flash notices carried in the session until the next page render.

use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::warn;

const NOTICE_KEY: &str = "sportfund.notice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self.kind {
            NoticeKind::Success => "notice notice-success",
            NoticeKind::Error => "notice notice-error",
        }
    }
}

/// Stores a notice for the next rendered page. A session write failure
/// only loses the message.
pub(super) async fn push(session: &Session, notice: Notice) {
    if let Err(e) = session.insert(NOTICE_KEY, notice).await {
        warn!(error = %e, "failed to store notice");
    }
}

pub(super) async fn take(session: &Session) -> Option<Notice> {
    match session.remove::<Notice>(NOTICE_KEY).await {
        Ok(notice) => notice,
        Err(e) => {
            warn!(error = %e, "failed to read notice");
            None
        }
    }
}
