//! Rating recorder collaborator interface
//!
//! Rating storage and performer-average recomputation live outside this
//! service. The workflow engine only promises the recorder a single
//! `on_completed` call per posting, after Confirm Done commits.

use uuid::Uuid;

/// Notification target for completed postings.
pub trait RatingRecorder: Send + Sync {
    /// Called exactly once per posting, after the DONE transition commits.
    /// Fire-and-forget: the engine ignores whatever the recorder does with
    /// the notification.
    fn on_completed(&self, posting_id: Uuid, creator_id: Uuid, performer_id: Uuid);
}

/// Default recorder that only logs the completion.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl RatingRecorder for LogRecorder {
    fn on_completed(&self, posting_id: Uuid, creator_id: Uuid, performer_id: Uuid) {
        tracing::info!(
            %posting_id,
            %creator_id,
            %performer_id,
            "posting completed, eligible for rating"
        );
    }
}
