//! Database store for postings and applications
//!
//! Point and set lookups run straight against the pool. State-mutating
//! workflow operations go through the `_tx` variants so every read and
//! write of a unit of work shares one transaction.

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Application, ApplicationStatus, CreatePostingRequest, Posting, PostingStatus};

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Begin a transaction for a single unit of work
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // Posting operations

    pub async fn create_posting(
        &self,
        creator: Uuid,
        req: &CreatePostingRequest,
    ) -> Result<Posting> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO postings (id, title, description, category, status, creator, performer, execution_time, execution_location, created_at)
            VALUES (?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.category)
        .bind(PostingStatus::Open.as_str())
        .bind(creator.to_string())
        .bind(req.execution_time)
        .bind(&req.execution_location)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Posting {
            id,
            title: req.title.clone(),
            description: req.description.clone(),
            category: req.category.clone(),
            status: PostingStatus::Open,
            creator,
            performer: None,
            execution_time: req.execution_time,
            execution_location: req.execution_location.clone(),
            created_at: now,
        })
    }

    pub async fn get_posting(&self, id: Uuid) -> Result<Posting> {
        let row = sqlx::query_as::<_, PostingRow>(
            r#"
            SELECT id, title, description, category, status, creator, performer, execution_time, execution_location, created_at
            FROM postings
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Posting {} not found", id)))?;

        row.try_into()
    }

    /// Fetch a posting inside an open transaction; used under the workflow
    /// lock so validation sees the freshest committed state.
    pub async fn get_posting_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<Posting> {
        let row = sqlx::query_as::<_, PostingRow>(
            r#"
            SELECT id, title, description, category, status, creator, performer, execution_time, execution_location, created_at
            FROM postings
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Posting {} not found", id)))?;

        row.try_into()
    }

    pub async fn list_open_postings(&self) -> Result<Vec<Posting>> {
        let rows = sqlx::query_as::<_, PostingRow>(
            r#"
            SELECT id, title, description, category, status, creator, performer, execution_time, execution_location, created_at
            FROM postings
            WHERE status = 'open'
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn list_postings_by_creator(&self, creator: Uuid) -> Result<Vec<Posting>> {
        let rows = sqlx::query_as::<_, PostingRow>(
            r#"
            SELECT id, title, description, category, status, creator, performer, execution_time, execution_location, created_at
            FROM postings
            WHERE creator = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(creator.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Persist the mutable fields of a still-open posting
    pub async fn update_posting_fields_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        posting: &Posting,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE postings
            SET title = ?, description = ?, category = ?, execution_time = ?, execution_location = ?
            WHERE id = ?
            "#,
        )
        .bind(&posting.title)
        .bind(&posting.description)
        .bind(&posting.category)
        .bind(posting.execution_time)
        .bind(&posting.execution_location)
        .bind(posting.id.to_string())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn set_posting_status_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        status: PostingStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE postings SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Assign a performer and mark the posting ASSIGNED in one statement
    pub async fn assign_posting_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        performer: Uuid,
    ) -> Result<()> {
        sqlx::query("UPDATE postings SET performer = ?, status = ? WHERE id = ?")
            .bind(performer.to_string())
            .bind(PostingStatus::Assigned.as_str())
            .bind(id.to_string())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    // Application operations

    /// Insert a new application. A race on the (posting_id, performer)
    /// uniqueness constraint surfaces as `Conflict`, not a storage fault.
    pub async fn create_application_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        posting_id: Uuid,
        performer: Uuid,
    ) -> Result<Application> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let res = sqlx::query(
            r#"
            INSERT INTO applications (id, posting_id, performer, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(posting_id.to_string())
        .bind(performer.to_string())
        .bind(ApplicationStatus::Pending.as_str())
        .bind(now)
        .execute(&mut **tx)
        .await;

        match res {
            Ok(_) => Ok(Application {
                id,
                posting_id,
                performer,
                status: ApplicationStatus::Pending,
                created_at: now,
            }),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AppError::Conflict(format!(
                    "Performer {} already applied to posting {}",
                    performer, posting_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_application(&self, id: Uuid) -> Result<Application> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, posting_id, performer, status, created_at
            FROM applications
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {} not found", id)))?;

        row.try_into()
    }

    pub async fn get_application_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<Application> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, posting_id, performer, status, created_at
            FROM applications
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {} not found", id)))?;

        row.try_into()
    }

    pub async fn list_applications_for_posting(&self, posting_id: Uuid) -> Result<Vec<Application>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, posting_id, performer, status, created_at
            FROM applications
            WHERE posting_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(posting_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn list_applications_by_performer(&self, performer: Uuid) -> Result<Vec<Application>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, posting_id, performer, status, created_at
            FROM applications
            WHERE performer = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(performer.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn set_application_status_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        status: ApplicationStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE applications SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Bulk-reject every sibling still PENDING; already-rejected rows stay
    /// untouched.
    pub async fn reject_other_applications_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        posting_id: Uuid,
        except: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = 'rejected'
            WHERE posting_id = ? AND id != ? AND status = 'pending'
            "#,
        )
        .bind(posting_id.to_string())
        .bind(except.to_string())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_application_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<()> {
        sqlx::query("DELETE FROM applications WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct PostingRow {
    id: String,
    title: String,
    description: String,
    category: String,
    status: String,
    creator: String,
    performer: Option<String>,
    execution_time: Option<chrono::DateTime<Utc>>,
    execution_location: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<PostingRow> for Posting {
    type Error = AppError;

    fn try_from(row: PostingRow) -> Result<Self> {
        let performer = row
            .performer
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid performer UUID: {}", e)))?;

        Ok(Posting {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            title: row.title,
            description: row.description,
            category: row.category,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            creator: Uuid::parse_str(&row.creator)
                .map_err(|e| AppError::Internal(format!("Invalid creator UUID: {}", e)))?,
            performer,
            execution_time: row.execution_time,
            execution_location: row.execution_location,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: String,
    posting_id: String,
    performer: String,
    status: String,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = AppError;

    fn try_from(row: ApplicationRow) -> Result<Self> {
        Ok(Application {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            posting_id: Uuid::parse_str(&row.posting_id)
                .map_err(|e| AppError::Internal(format!("Invalid posting UUID: {}", e)))?,
            performer: Uuid::parse_str(&row.performer)
                .map_err(|e| AppError::Internal(format!("Invalid performer UUID: {}", e)))?,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid status: {}", e)))?,
            created_at: row.created_at,
        })
    }
}
