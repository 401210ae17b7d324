//! Bridge to the speech/notification layer.
//!
//! The orchestrator emits a [`TriggerNotice`] on an unbounded channel every
//! time an occurrence fires. The consuming side (speech output, toasts, a
//! tree view) is an external collaborator; the channel is the whole
//! contract. A closed channel is tolerated: notices are dropped with a
//! debug log, scheduling is unaffected.

use crate::model::TaskOccurrence;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Notification emitted when an occurrence fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerNotice {
    /// Title of the task that fired, ready to be spoken.
    pub title: String,
    /// The occurrence that fired.
    pub occurrence: TaskOccurrence,
    /// When the trigger pipeline ran.
    pub fired_at: NaiveDateTime,
}

/// Sending half of the notification channel.
pub type NoticeSender = mpsc::UnboundedSender<TriggerNotice>;

/// Receiving half of the notification channel.
pub type NoticeReceiver = mpsc::UnboundedReceiver<TriggerNotice>;

/// Create a notification channel pair.
#[must_use]
pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    mpsc::unbounded_channel()
}
