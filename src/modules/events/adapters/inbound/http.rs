use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::modules::events::adapters::outbound::event_records::EventFilter;
use crate::modules::events::core::state::{EventRecord, EventStatus};
use crate::modules::events::use_cases::lifecycle::commands::{
    CreateDraft, DeleteEvent, RejectEdit, RejectEvent, RequestEdit, UpdateDraft,
};
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::TimeWindow;
use crate::shell::http_errors::json_body;
use crate::shell::identity::Caller;
use crate::shell::state::AppState;

type EventResult = Result<Json<EventRecord>, ApplicationError>;

#[derive(Debug, Default, Deserialize)]
pub struct ListEventsParams {
    pub status: Option<EventStatus>,
    pub is_deleted: Option<bool>,
    pub calendar_id: Option<String>,
    pub location_id: Option<String>,
    pub created_by: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ListEventsParams {
    fn into_filter(self) -> Result<EventFilter, ApplicationError> {
        let window = match (self.start, self.end) {
            (Some(start), Some(end)) => {
                Some(TimeWindow::new(start, end).map_err(ApplicationError::Validation)?)
            }
            (None, None) => None,
            _ => {
                return Err(ApplicationError::Validation(
                    "start and end must be given together".into(),
                ));
            }
        };
        Ok(EventFilter {
            status: self.status,
            is_deleted: self.is_deleted,
            window,
            calendar_id: self.calendar_id,
            location_id: self.location_id,
            created_by: self.created_by,
        })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_draft))
        .route("/events/{id}", get(get_event).patch(update_draft))
        .route("/events/{id}/submit", post(submit))
        .route("/events/{id}/approve", post(approve))
        .route("/events/{id}/reject", post(reject))
        .route("/events/{id}/delete", post(delete))
        .route("/events/{id}/delete-draft", post(delete_draft))
        .route("/events/{id}/restore", post(restore))
        .route("/events/{id}/edit-request", post(request_edit))
        .route("/events/{id}/edit-request/approve", post(approve_edit))
        .route("/events/{id}/edit-request/reject", post(reject_edit))
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<EventRecord>>, ApplicationError> {
    let filter = params.into_filter()?;
    Ok(Json(state.queries.list(&filter).await?))
}

pub async fn get_event(State(state): State<AppState>, Path(id): Path<String>) -> EventResult {
    Ok(Json(state.queries.get(&id).await?))
}

pub async fn create_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<CreateDraft>, JsonRejection>,
) -> Result<impl IntoResponse, ApplicationError> {
    let command = json_body(body)?;
    let record = state.lifecycle.create_draft(&actor, command).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateDraft>, JsonRejection>,
) -> EventResult {
    let command = json_body(body)?;
    Ok(Json(
        state
            .lifecycle
            .update_draft(&actor, &id, command.changes)
            .await?,
    ))
}

pub async fn submit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> EventResult {
    Ok(Json(state.lifecycle.submit(&actor, &id).await?))
}

pub async fn approve(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> EventResult {
    Ok(Json(state.lifecycle.approve(&actor, &id).await?))
}

pub async fn reject(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<RejectEvent>, JsonRejection>,
) -> EventResult {
    let command = json_body(body)?;
    Ok(Json(
        state.lifecycle.reject(&actor, &id, &command.reason).await?,
    ))
}

/// The body is optional; without one the delete carries no reason.
pub async fn delete(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Option<Json<DeleteEvent>>,
) -> EventResult {
    let reason = body.and_then(|Json(command)| command.reason);
    Ok(Json(state.lifecycle.delete(&actor, &id, reason).await?))
}

pub async fn delete_draft(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> EventResult {
    Ok(Json(state.lifecycle.delete_draft(&actor, &id).await?))
}

pub async fn restore(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> EventResult {
    Ok(Json(state.lifecycle.restore(&actor, &id).await?))
}

pub async fn request_edit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<RequestEdit>, JsonRejection>,
) -> EventResult {
    let command = json_body(body)?;
    Ok(Json(
        state.lifecycle.request_edit(&actor, &id, command).await?,
    ))
}

pub async fn approve_edit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> EventResult {
    Ok(Json(state.lifecycle.approve_edit(&actor, &id).await?))
}

pub async fn reject_edit(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<RejectEdit>, JsonRejection>,
) -> EventResult {
    let command = json_body(body)?;
    Ok(Json(
        state
            .lifecycle
            .reject_edit(&actor, &id, &command.reason)
            .await?,
    ))
}
