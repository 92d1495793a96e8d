use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::modules::events::adapters::outbound::change_listener::ChangedEvent;
use crate::modules::sync::use_cases::load_events::handler::LoadResult;
use crate::modules::sync::use_cases::reconcile::report::SyncReport;
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::TimeWindow;
use crate::shell::http_errors::json_body;
use crate::shell::identity::Caller;
use crate::shell::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WindowBody {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Defaults to the configured calendars.
    #[serde(default)]
    pub calendar_ids: Vec<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

impl WindowBody {
    fn window(&self) -> Result<TimeWindow, ApplicationError> {
        TimeWindow::new(self.start, self.end).map_err(ApplicationError::Validation)
    }

    fn calendars(&self, state: &AppState) -> Vec<String> {
        if self.calendar_ids.is_empty() {
            state.calendar_ids.clone()
        } else {
            self.calendar_ids.clone()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateBody {
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub event_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Invalidated {
    pub snapshots: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/load", post(load))
        .route("/sync/reconcile", post(reconcile))
        .route("/sync/invalidate", post(invalidate))
}

/// Loads each calendar through the snapshot cache.
pub async fn load(
    State(state): State<AppState>,
    _caller: Caller,
    body: Result<Json<WindowBody>, JsonRejection>,
) -> Result<Json<Vec<LoadResult>>, ApplicationError> {
    let body = json_body(body)?;
    let window = body.window()?;
    let cancel = state.shutdown.child_token();
    let mut results = Vec::new();
    for calendar_id in body.calendars(&state) {
        results.push(
            state
                .loader
                .load(&calendar_id, &window, body.force_refresh, &cancel)
                .await?,
        );
    }
    Ok(Json(results))
}

/// Reconciles without consulting the cache.
pub async fn reconcile(
    State(state): State<AppState>,
    _caller: Caller,
    body: Result<Json<WindowBody>, JsonRejection>,
) -> Result<Json<SyncReport>, ApplicationError> {
    let body = json_body(body)?;
    let window = body.window()?;
    let cancel = state.shutdown.child_token();
    Ok(Json(
        state
            .reconciler
            .reconcile(&body.calendars(&state), &window, &cancel)
            .await?,
    ))
}

pub async fn invalidate(
    State(state): State<AppState>,
    _caller: Caller,
    body: Result<Json<InvalidateBody>, JsonRejection>,
) -> Result<Json<Invalidated>, ApplicationError> {
    let body = json_body(body)?;
    let mut snapshots = 0;
    if let Some(calendar_id) = &body.calendar_id {
        snapshots += state.cache.invalidate_calendar(calendar_id).await;
    }
    let mut changes = Vec::with_capacity(body.event_ids.len());
    for id in &body.event_ids {
        let record = state.queries.get(id).await?;
        changes.push(ChangedEvent::from(&record));
    }
    snapshots += state.cache.invalidate_events(&changes).await;
    Ok(Json(Invalidated { snapshots }))
}
