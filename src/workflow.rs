//! Workflow engine for the posting lifecycle
//!
//! The engine owns every status transition:
//! OPEN -> ASSIGNED -> DONE_REPORTED -> DONE, with OPEN and ASSIGNED also
//! able to reach CANCELLED. All mutation paths take the per-posting lock,
//! then run a single transaction, so concurrent callers racing on one
//! posting are totally ordered and always validate against committed state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::identity::{Actor, Role};
use crate::models::{
    Application, ApplicationStatus, CreatePostingRequest, Posting, PostingStatus,
    UpdatePostingRequest,
};
use crate::rating::RatingRecorder;
use crate::store::Store;

/// Events emitted after each committed transition
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    PostingCreated {
        posting_id: Uuid,
        creator: Uuid,
    },
    PostingUpdated {
        posting_id: Uuid,
    },
    ApplicationSubmitted {
        application_id: Uuid,
        posting_id: Uuid,
        performer: Uuid,
    },
    PerformerChosen {
        posting_id: Uuid,
        application_id: Uuid,
        performer: Uuid,
        rejected_siblings: u64,
    },
    DoneReported {
        posting_id: Uuid,
        performer: Uuid,
    },
    DoneConfirmed {
        posting_id: Uuid,
        creator: Uuid,
        performer: Uuid,
    },
    PostingCancelled {
        posting_id: Uuid,
    },
    ApplicationWithdrawn {
        application_id: Uuid,
        posting_id: Uuid,
    },
}

/// Registry of per-posting locks; operations on different postings never
/// contend.
struct PostingLocks {
    locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PostingLocks {
    fn new() -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
        }
    }

    async fn acquire(&self, posting_id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.write().await;
            locks.entry(posting_id).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

/// Coordinator for the posting/application lifecycle
pub struct WorkflowEngine {
    store: Store,
    locks: PostingLocks,
    recorder: Arc<dyn RatingRecorder>,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowEngine {
    pub fn new(store: Store, recorder: Arc<dyn RatingRecorder>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            store,
            locks: PostingLocks::new(),
            recorder,
            event_tx,
        }
    }

    /// Subscribe to workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Create a new posting (status OPEN, no performer)
    pub async fn create_posting(
        &self,
        actor: &Actor,
        req: CreatePostingRequest,
    ) -> Result<Posting> {
        if !actor.has_role(Role::Customer) {
            return Err(AppError::Forbidden(
                "Only customers can create postings".to_string(),
            ));
        }

        let posting = self.store.create_posting(actor.id, &req).await?;
        tracing::info!(posting_id = %posting.id, creator = %actor.id, "posting created");

        let _ = self.event_tx.send(WorkflowEvent::PostingCreated {
            posting_id: posting.id,
            creator: actor.id,
        });

        Ok(posting)
    }

    /// Edit a still-open posting's fields
    pub async fn update_posting(
        &self,
        actor: &Actor,
        posting_id: Uuid,
        req: UpdatePostingRequest,
    ) -> Result<Posting> {
        let _guard = self.locks.acquire(posting_id).await;
        let mut tx = self.store.begin().await?;

        let mut posting = self.store.get_posting_tx(&mut tx, posting_id).await?;
        if posting.creator != actor.id {
            return Err(AppError::Forbidden(
                "Only the creator can edit a posting".to_string(),
            ));
        }
        if posting.status != PostingStatus::Open {
            return Err(AppError::InvalidState(
                "Only an open posting can be edited".to_string(),
            ));
        }

        if let Some(title) = req.title {
            posting.title = title;
        }
        if let Some(description) = req.description {
            posting.description = description;
        }
        if let Some(category) = req.category {
            posting.category = category;
        }
        if let Some(execution_time) = req.execution_time {
            posting.execution_time = Some(execution_time);
        }
        if let Some(execution_location) = req.execution_location {
            posting.execution_location = Some(execution_location);
        }

        self.store.update_posting_fields_tx(&mut tx, &posting).await?;
        tx.commit().await?;

        let _ = self
            .event_tx
            .send(WorkflowEvent::PostingUpdated { posting_id });

        Ok(posting)
    }

    /// Submit an application to an open posting
    pub async fn submit_application(
        &self,
        actor: &Actor,
        posting_id: Uuid,
    ) -> Result<Application> {
        if !actor.has_role(Role::Performer) {
            return Err(AppError::Forbidden(
                "Only performers can apply to postings".to_string(),
            ));
        }

        let _guard = self.locks.acquire(posting_id).await;
        let mut tx = self.store.begin().await?;

        let posting = self.store.get_posting_tx(&mut tx, posting_id).await?;
        if posting.creator == actor.id {
            return Err(AppError::Forbidden(
                "Cannot apply to your own posting".to_string(),
            ));
        }
        if posting.status != PostingStatus::Open {
            return Err(AppError::InvalidState(
                "Posting is not open for applications".to_string(),
            ));
        }

        let application = self
            .store
            .create_application_tx(&mut tx, posting_id, actor.id)
            .await?;
        tx.commit().await?;

        tracing::info!(
            application_id = %application.id,
            posting_id = %posting_id,
            performer = %actor.id,
            "application submitted"
        );

        let _ = self.event_tx.send(WorkflowEvent::ApplicationSubmitted {
            application_id: application.id,
            posting_id,
            performer: actor.id,
        });

        Ok(application)
    }

    /// Arbitration: approve one application, reject every other pending
    /// sibling, and assign the posting, atomically.
    ///
    /// Concurrent attempts on the same posting serialize on its lock; the
    /// first commits OPEN -> ASSIGNED, every later attempt re-reads the
    /// assigned status and fails with `InvalidState`.
    pub async fn choose_performer(
        &self,
        actor: &Actor,
        posting_id: Uuid,
        application_id: Uuid,
    ) -> Result<Application> {
        // Posting lock first; the application rows are only ever touched
        // under their posting's lock, which fixes the lock order everywhere.
        let _guard = self.locks.acquire(posting_id).await;
        let mut tx = self.store.begin().await?;

        let posting = self.store.get_posting_tx(&mut tx, posting_id).await?;
        if posting.creator != actor.id {
            return Err(AppError::Forbidden(
                "Only the creator can choose a performer".to_string(),
            ));
        }
        if posting.status != PostingStatus::Open {
            return Err(AppError::InvalidState(
                "Posting is not open".to_string(),
            ));
        }
        // Status already guards this; double-check the relationship anyway
        if posting.performer.is_some() {
            return Err(AppError::InvalidState(
                "Posting already has a performer".to_string(),
            ));
        }

        let mut application = self.store.get_application_tx(&mut tx, application_id).await?;
        if application.posting_id != posting_id {
            return Err(AppError::InvalidState(
                "Application does not belong to this posting".to_string(),
            ));
        }
        if application.status != ApplicationStatus::Pending {
            return Err(AppError::InvalidState(
                "Application is not pending".to_string(),
            ));
        }

        self.store
            .set_application_status_tx(&mut tx, application_id, ApplicationStatus::Approved)
            .await?;
        self.store
            .assign_posting_tx(&mut tx, posting_id, application.performer)
            .await?;
        let rejected = self
            .store
            .reject_other_applications_tx(&mut tx, posting_id, application_id)
            .await?;
        tx.commit().await?;

        application.status = ApplicationStatus::Approved;

        tracing::info!(
            posting_id = %posting_id,
            application_id = %application_id,
            performer = %application.performer,
            rejected_siblings = rejected,
            "performer chosen"
        );

        let _ = self.event_tx.send(WorkflowEvent::PerformerChosen {
            posting_id,
            application_id,
            performer: application.performer,
            rejected_siblings: rejected,
        });

        Ok(application)
    }

    /// Performer reports the work finished: ASSIGNED -> DONE_REPORTED
    pub async fn report_done(&self, actor: &Actor, posting_id: Uuid) -> Result<Posting> {
        let _guard = self.locks.acquire(posting_id).await;
        let mut tx = self.store.begin().await?;

        let mut posting = self.store.get_posting_tx(&mut tx, posting_id).await?;
        // Status first: an OPEN posting has no performer to be forbidden
        // against
        if posting.status != PostingStatus::Assigned {
            return Err(AppError::InvalidState(
                "Posting is not assigned".to_string(),
            ));
        }
        if posting.performer != Some(actor.id) {
            return Err(AppError::Forbidden(
                "Only the assigned performer can report done".to_string(),
            ));
        }

        self.store
            .set_posting_status_tx(&mut tx, posting_id, PostingStatus::DoneReported)
            .await?;
        tx.commit().await?;

        posting.status = PostingStatus::DoneReported;
        tracing::info!(posting_id = %posting_id, "done reported");

        let _ = self.event_tx.send(WorkflowEvent::DoneReported {
            posting_id,
            performer: actor.id,
        });

        Ok(posting)
    }

    /// Creator confirms completion: DONE_REPORTED -> DONE. Notifies the
    /// rating recorder exactly once, after the commit.
    pub async fn confirm_done(&self, actor: &Actor, posting_id: Uuid) -> Result<Posting> {
        let _guard = self.locks.acquire(posting_id).await;
        let mut tx = self.store.begin().await?;

        let mut posting = self.store.get_posting_tx(&mut tx, posting_id).await?;
        if posting.creator != actor.id {
            return Err(AppError::Forbidden(
                "Only the creator can confirm done".to_string(),
            ));
        }
        if posting.status != PostingStatus::DoneReported {
            return Err(AppError::InvalidState(
                "Posting is not done-reported".to_string(),
            ));
        }
        let performer = posting.performer.ok_or_else(|| {
            AppError::Internal(format!("Posting {} done-reported without performer", posting_id))
        })?;

        self.store
            .set_posting_status_tx(&mut tx, posting_id, PostingStatus::Done)
            .await?;
        tx.commit().await?;

        posting.status = PostingStatus::Done;
        tracing::info!(posting_id = %posting_id, "done confirmed");

        // The state machine makes a second confirm fail before this point,
        // so the recorder sees each posting at most once.
        self.recorder
            .on_completed(posting_id, posting.creator, performer);

        let _ = self.event_tx.send(WorkflowEvent::DoneConfirmed {
            posting_id,
            creator: posting.creator,
            performer,
        });

        Ok(posting)
    }

    /// Creator withdraws the posting: {OPEN, ASSIGNED} -> CANCELLED
    pub async fn cancel_posting(&self, actor: &Actor, posting_id: Uuid) -> Result<Posting> {
        let _guard = self.locks.acquire(posting_id).await;
        let mut tx = self.store.begin().await?;

        let mut posting = self.store.get_posting_tx(&mut tx, posting_id).await?;
        if posting.creator != actor.id {
            return Err(AppError::Forbidden(
                "Only the creator can cancel a posting".to_string(),
            ));
        }
        if !posting.status.can_cancel_from() {
            return Err(AppError::InvalidState(format!(
                "Posting cannot be cancelled from status {}",
                posting.status.as_str()
            )));
        }

        self.store
            .set_posting_status_tx(&mut tx, posting_id, PostingStatus::Cancelled)
            .await?;
        tx.commit().await?;

        posting.status = PostingStatus::Cancelled;
        tracing::info!(posting_id = %posting_id, "posting cancelled");

        let _ = self
            .event_tx
            .send(WorkflowEvent::PostingCancelled { posting_id });

        Ok(posting)
    }

    /// Performer withdraws their own still-pending application
    pub async fn withdraw_application(&self, actor: &Actor, application_id: Uuid) -> Result<()> {
        // Resolve the parent posting before locking, then re-validate from
        // fresh state inside the critical section.
        let preview = self.store.get_application(application_id).await?;

        let _guard = self.locks.acquire(preview.posting_id).await;
        let mut tx = self.store.begin().await?;

        let application = self.store.get_application_tx(&mut tx, application_id).await?;
        if application.performer != actor.id {
            return Err(AppError::Forbidden(
                "Only the applicant can withdraw an application".to_string(),
            ));
        }

        let posting = self
            .store
            .get_posting_tx(&mut tx, application.posting_id)
            .await?;
        if posting.status != PostingStatus::Open {
            return Err(AppError::InvalidState(
                "Applications can only be withdrawn while the posting is open".to_string(),
            ));
        }
        if application.status != ApplicationStatus::Pending {
            return Err(AppError::InvalidState(
                "Only a pending application can be withdrawn".to_string(),
            ));
        }

        self.store.delete_application_tx(&mut tx, application_id).await?;
        tx.commit().await?;

        tracing::info!(application_id = %application_id, "application withdrawn");

        let _ = self.event_tx.send(WorkflowEvent::ApplicationWithdrawn {
            application_id,
            posting_id: application.posting_id,
        });

        Ok(())
    }

    // Read projections

    pub async fn open_postings(&self) -> Result<Vec<Posting>> {
        self.store.list_open_postings().await
    }

    pub async fn my_postings(&self, actor: &Actor) -> Result<Vec<Posting>> {
        self.store.list_postings_by_creator(actor.id).await
    }

    pub async fn my_applications(&self, actor: &Actor) -> Result<Vec<Application>> {
        self.store.list_applications_by_performer(actor.id).await
    }

    /// Posting detail: open postings are visible to everyone; otherwise the
    /// creator, the assigned performer, and support/admin.
    pub async fn get_posting(&self, actor: &Actor, posting_id: Uuid) -> Result<Posting> {
        let posting = self.store.get_posting(posting_id).await?;

        let allowed = posting.status == PostingStatus::Open
            || posting.creator == actor.id
            || posting.performer == Some(actor.id)
            || actor.roles.can_view_any();
        if !allowed {
            return Err(AppError::Forbidden(
                "Not allowed to view this posting".to_string(),
            ));
        }

        Ok(posting)
    }

    /// Applications for a posting: creator and support/admin only
    pub async fn applications_for_posting(
        &self,
        actor: &Actor,
        posting_id: Uuid,
    ) -> Result<Vec<Application>> {
        let posting = self.store.get_posting(posting_id).await?;

        if posting.creator != actor.id && !actor.roles.can_view_any() {
            return Err(AppError::Forbidden(
                "Only the creator can list a posting's applications".to_string(),
            ));
        }

        self.store.list_applications_for_posting(posting_id).await
    }
}
