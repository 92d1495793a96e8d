use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use crate::modules::locations::core::location::{Location, LocationStatus};
use crate::modules::locations::core::resolver::{Suggestion, UnassignedLocationString};
use crate::modules::locations::use_cases::assign_string::AssignmentReport;
use crate::modules::locations::use_cases::merge_locations::{MergeLocations, MergeSummary};
use crate::modules::locations::use_cases::registry::{
    CreateLocation, LocationEventCount, UpdateLocation,
};
use crate::shared::core::errors::ApplicationError;
use crate::shared::infrastructure::progress::OperationProgress;
use crate::shell::http_errors::json_body;
use crate::shell::identity::Caller;
use crate::shell::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListLocationsParams {
    pub status: Option<LocationStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveLocationBody {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAliasesBody {
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignStringBody {
    pub raw: String,
    pub location_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    pub raw: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteAccepted {
    pub location_id: String,
    pub total: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/locations", get(list_locations).post(create_location))
        .route("/locations/pending", get(list_pending))
        .route("/locations/unassigned", get(list_unassigned))
        .route("/locations/suggestions", get(suggest))
        .route("/locations/assign", post(assign_string))
        .route("/locations/merge", post(merge_locations))
        .route(
            "/locations/{id}",
            get(get_location)
                .patch(update_location)
                .delete(delete_location),
        )
        .route("/locations/{id}/approve", post(approve_location))
        .route("/locations/{id}/aliases", put(update_aliases))
        .route("/locations/{id}/progress", get(delete_progress))
        .route("/locations/{id}/event-count", get(event_count))
}

pub async fn list_locations(
    State(state): State<AppState>,
    Query(params): Query<ListLocationsParams>,
) -> Result<Json<Vec<Location>>, ApplicationError> {
    Ok(Json(state.locations.list_locations(params.status).await?))
}

pub async fn list_pending(
    State(state): State<AppState>,
) -> Result<Json<Vec<Location>>, ApplicationError> {
    Ok(Json(state.locations.list_pending().await?))
}

pub async fn get_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Location>, ApplicationError> {
    Ok(Json(state.locations.get_location(&id).await?))
}

pub async fn create_location(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<CreateLocation>, JsonRejection>,
) -> Result<impl IntoResponse, ApplicationError> {
    let command = json_body(body)?;
    let location = state.locations.create_location(&actor, command).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

pub async fn update_location(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateLocation>, JsonRejection>,
) -> Result<Json<Location>, ApplicationError> {
    let command = json_body(body)?;
    Ok(Json(
        state.locations.update_location(&actor, &id, command).await?,
    ))
}

pub async fn approve_location(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Option<Json<ApproveLocationBody>>,
) -> Result<Json<Location>, ApplicationError> {
    let notes = body.and_then(|Json(body)| body.notes);
    Ok(Json(
        state.locations.approve_location(&actor, &id, notes).await?,
    ))
}

pub async fn update_aliases(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<UpdateAliasesBody>, JsonRejection>,
) -> Result<Json<Location>, ApplicationError> {
    let body = json_body(body)?;
    Ok(Json(
        state
            .locations
            .update_aliases(&actor, &id, body.aliases)
            .await?,
    ))
}

/// Marks the location deleted and rewrites its events in the background.
pub async fn delete_location(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApplicationError> {
    let total = state
        .locations
        .clone()
        .start_delete(&actor, &id, state.shutdown.child_token())
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DeleteAccepted {
            location_id: id,
            total,
        }),
    ))
}

pub async fn delete_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OperationProgress>, ApplicationError> {
    Ok(Json(state.locations.delete_progress(&id).await?))
}

pub async fn event_count(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LocationEventCount>, ApplicationError> {
    Ok(Json(state.locations.event_count(&id).await?))
}

pub async fn merge_locations(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<MergeLocations>, JsonRejection>,
) -> Result<Json<MergeSummary>, ApplicationError> {
    let command = json_body(body)?;
    let cancel = state.shutdown.child_token();
    Ok(Json(
        state
            .locations
            .merge_locations(&actor, command, &cancel)
            .await?,
    ))
}

pub async fn list_unassigned(
    State(state): State<AppState>,
) -> Result<Json<Vec<UnassignedLocationString>>, ApplicationError> {
    Ok(Json(state.locations.list_unassigned().await?))
}

pub async fn suggest(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<Vec<Suggestion>>, ApplicationError> {
    Ok(Json(state.locations.suggest(&params.raw).await?))
}

pub async fn assign_string(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<AssignStringBody>, JsonRejection>,
) -> Result<Json<AssignmentReport>, ApplicationError> {
    let body = json_body(body)?;
    Ok(Json(
        state
            .locations
            .assign_string(&actor, &body.raw, &body.location_id)
            .await?,
    ))
}
