//! Data models for postings and applications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job posting created by a customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub status: PostingStatus,
    /// Owning actor; immutable after creation
    pub creator: Uuid,
    /// Set exactly once, by arbitration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_location: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Posting {
    /// Invariant: performer is set iff the posting has progressed past OPEN
    /// on the happy path.
    pub fn performer_invariant_holds(&self) -> bool {
        match self.status {
            PostingStatus::Assigned | PostingStatus::DoneReported | PostingStatus::Done => {
                self.performer.is_some()
            }
            PostingStatus::Open => self.performer.is_none(),
            // A cancelled posting keeps whatever performer it had
            PostingStatus::Cancelled => true,
        }
    }
}

/// Status of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostingStatus {
    /// Open to performer applications
    Open,
    /// A performer has been chosen
    Assigned,
    /// The performer reported the work finished
    DoneReported,
    /// The creator confirmed completion
    Done,
    /// Withdrawn by the creator
    Cancelled,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingStatus::Open => "open",
            PostingStatus::Assigned => "assigned",
            PostingStatus::DoneReported => "done_reported",
            PostingStatus::Done => "done",
            PostingStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostingStatus::Done | PostingStatus::Cancelled)
    }

    /// Cancellation is reachable from OPEN and ASSIGNED only
    pub fn can_cancel_from(&self) -> bool {
        matches!(self, PostingStatus::Open | PostingStatus::Assigned)
    }
}

impl std::str::FromStr for PostingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PostingStatus::Open),
            "assigned" => Ok(PostingStatus::Assigned),
            "done_reported" => Ok(PostingStatus::DoneReported),
            "done" => Ok(PostingStatus::Done),
            "cancelled" => Ok(PostingStatus::Cancelled),
            _ => Err(format!("Invalid posting status: {}", s)),
        }
    }
}

/// A performer's application to a posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub posting_id: Uuid,
    /// Applicant actor; immutable
    pub performer: Uuid,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

/// Status of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// Waiting for the creator's decision
    Pending,
    /// Chosen by arbitration
    Approved,
    /// Passed over by arbitration
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            _ => Err(format!("Invalid application status: {}", s)),
        }
    }
}

/// Request to create a new posting
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostingRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub execution_time: Option<DateTime<Utc>>,
    pub execution_location: Option<String>,
}

/// Request to update a still-open posting; only provided fields change
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostingRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub execution_time: Option<DateTime<Utc>>,
    pub execution_location: Option<String>,
}
