//! Thin HTTP request layer
//!
//! Identity is resolved upstream; callers arrive with `x-actor-id` and
//! `x-actor-roles` headers carrying the authenticated actor and its
//! capability set. Handlers only translate between HTTP and the engine.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::identity::{Actor, RoleSet};
use crate::models::{Application, CreatePostingRequest, Posting, UpdatePostingRequest};
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/postings", post(create_posting).get(open_postings))
        .route("/postings/mine", get(my_postings))
        .route("/postings/:id", get(get_posting).patch(update_posting))
        .route("/postings/:id/cancel", post(cancel_posting))
        .route("/postings/:id/report-done", post(report_done))
        .route("/postings/:id/confirm-done", post(confirm_done))
        .route(
            "/postings/:id/applications",
            post(submit_application).get(applications_for_posting),
        )
        .route(
            "/postings/:id/applications/:app_id/choose",
            post(choose_performer),
        )
        .route("/applications/mine", get(my_applications))
        .route("/applications/:id", delete(withdraw_application))
        .with_state(state)
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let id = parts
            .headers
            .get("x-actor-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Forbidden("Missing x-actor-id header".to_string()))?;
        let id = Uuid::parse_str(id)
            .map_err(|_| AppError::Forbidden("Invalid x-actor-id header".to_string()))?;

        let mut roles = RoleSet::new();
        if let Some(header) = parts.headers.get("x-actor-roles").and_then(|v| v.to_str().ok()) {
            for name in header.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                roles.add(name.parse().map_err(AppError::Forbidden)?);
            }
        }

        Ok(Actor { id, roles })
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn create_posting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CreatePostingRequest>,
) -> Result<(StatusCode, Json<Posting>)> {
    let posting = state.engine.create_posting(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(posting)))
}

async fn open_postings(State(state): State<Arc<AppState>>, _actor: Actor) -> Result<Json<Vec<Posting>>> {
    Ok(Json(state.engine.open_postings().await?))
}

async fn my_postings(State(state): State<Arc<AppState>>, actor: Actor) -> Result<Json<Vec<Posting>>> {
    Ok(Json(state.engine.my_postings(&actor).await?))
}

async fn get_posting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Posting>> {
    Ok(Json(state.engine.get_posting(&actor, id).await?))
}

async fn update_posting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePostingRequest>,
) -> Result<Json<Posting>> {
    Ok(Json(state.engine.update_posting(&actor, id, req).await?))
}

async fn cancel_posting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Posting>> {
    Ok(Json(state.engine.cancel_posting(&actor, id).await?))
}

async fn report_done(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Posting>> {
    Ok(Json(state.engine.report_done(&actor, id).await?))
}

async fn confirm_done(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Posting>> {
    Ok(Json(state.engine.confirm_done(&actor, id).await?))
}

async fn submit_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Application>)> {
    let application = state.engine.submit_application(&actor, id).await?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn applications_for_posting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Application>>> {
    Ok(Json(state.engine.applications_for_posting(&actor, id).await?))
}

async fn choose_performer(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, app_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Application>> {
    Ok(Json(state.engine.choose_performer(&actor, id, app_id).await?))
}

async fn my_applications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<Application>>> {
    Ok(Json(state.engine.my_applications(&actor).await?))
}

async fn withdraw_application(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.engine.withdraw_application(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
