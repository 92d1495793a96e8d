use async_graphql::{
    Context, Enum, ErrorExtensions, InputObject, Object, Result as GqlResult, SimpleObject,
};
use chrono::{DateTime, Utc};

use crate::modules::events::adapters::outbound::event_records::EventFilter;
use crate::modules::events::core::state::{EventChanges, EventRecord, EventStatus, StatusHistoryEntry};
use crate::modules::events::use_cases::lifecycle::commands::{CreateDraft, RequestEdit};
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::Actor;
use crate::shell::state::AppState;

pub fn gql_error(error: ApplicationError) -> async_graphql::Error {
    let kind = error.kind();
    let current_status = match &error {
        ApplicationError::Conflict { current_status, .. } => current_status.clone(),
        _ => None,
    };
    async_graphql::Error::new(error.to_string()).extend_with(|_, extensions| {
        extensions.set("kind", kind);
        if let Some(status) = current_status {
            extensions.set("current_status", status);
        }
    })
}

/// The caller is attached to the request by the `/gql` route.
pub fn caller<'a>(context: &Context<'a>) -> GqlResult<&'a Actor> {
    context.data::<Actor>().map_err(|_| {
        async_graphql::Error::new("caller identity headers are required")
            .extend_with(|_, extensions| extensions.set("kind", "unauthenticated"))
    })
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
#[graphql(name = "EventStatus")]
pub enum EventStatusGql {
    Draft,
    Pending,
    Approved,
    Rejected,
    Deleted,
}

impl From<EventStatus> for EventStatusGql {
    fn from(status: EventStatus) -> Self {
        match status {
            EventStatus::Draft => Self::Draft,
            EventStatus::Pending => Self::Pending,
            EventStatus::Approved => Self::Approved,
            EventStatus::Rejected => Self::Rejected,
            EventStatus::Deleted => Self::Deleted,
        }
    }
}

impl From<EventStatusGql> for EventStatus {
    fn from(status: EventStatusGql) -> Self {
        match status {
            EventStatusGql::Draft => Self::Draft,
            EventStatusGql::Pending => Self::Pending,
            EventStatusGql::Approved => Self::Approved,
            EventStatusGql::Rejected => Self::Rejected,
            EventStatusGql::Deleted => Self::Deleted,
        }
    }
}

#[derive(SimpleObject)]
pub struct HistoryEntryView {
    pub status: EventStatusGql,
    pub action: String,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    pub reason: Option<String>,
}

impl From<&StatusHistoryEntry> for HistoryEntryView {
    fn from(entry: &StatusHistoryEntry) -> Self {
        Self {
            status: entry.status.into(),
            action: serde_json::to_value(entry.action)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_default(),
            changed_at: entry.changed_at,
            changed_by: entry.changed_by.clone(),
            reason: entry.reason.clone(),
        }
    }
}

#[derive(SimpleObject)]
pub struct EventView {
    pub id: String,
    pub event_id: String,
    pub external_id: Option<String>,
    pub calendar_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub utc_offset_minutes: i32,
    pub is_all_day: bool,
    pub location_text: Option<String>,
    pub location_ids: Vec<String>,
    pub unresolved_locations: Vec<String>,
    pub status: EventStatusGql,
    pub is_deleted: bool,
    pub previous_status: Option<EventStatusGql>,
    pub has_pending_edit: bool,
    pub setup_minutes: u32,
    pub teardown_minutes: u32,
    pub status_history: Vec<HistoryEntryView>,
    pub created_by: String,
}

impl From<EventRecord> for EventView {
    fn from(record: EventRecord) -> Self {
        Self {
            status_history: record.status_history.iter().map(Into::into).collect(),
            has_pending_edit: record.pending_edit_request.is_some(),
            setup_minutes: record.enrichment.setup_minutes,
            teardown_minutes: record.enrichment.teardown_minutes,
            status: record.status.into(),
            previous_status: record.previous_status.map(Into::into),
            id: record.id,
            event_id: record.event_id,
            external_id: record.external_id,
            calendar_id: record.calendar_id,
            title: record.title,
            description: record.description,
            category: record.category,
            start: record.start,
            end: record.end,
            utc_offset_minutes: record.utc_offset_minutes,
            is_all_day: record.is_all_day,
            location_text: record.location_text,
            location_ids: record.location_ids,
            unresolved_locations: record.unresolved_locations,
            is_deleted: record.is_deleted,
            created_by: record.created_by,
        }
    }
}

#[derive(InputObject)]
pub struct CreateDraftInput {
    pub title: String,
    #[graphql(default)]
    pub description: String,
    pub category: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[graphql(default)]
    pub utc_offset_minutes: i32,
    pub time_zone: Option<String>,
    #[graphql(default)]
    pub is_all_day: bool,
    #[graphql(default)]
    pub location_ids: Vec<String>,
    #[graphql(default)]
    pub setup_minutes: u32,
    #[graphql(default)]
    pub teardown_minutes: u32,
    pub internal_notes: Option<String>,
    pub calendar_id: Option<String>,
}

impl From<CreateDraftInput> for CreateDraft {
    fn from(input: CreateDraftInput) -> Self {
        Self {
            title: input.title,
            description: input.description,
            category: input.category,
            start: Some(input.start),
            end: Some(input.end),
            utc_offset_minutes: input.utc_offset_minutes,
            time_zone: input.time_zone,
            is_all_day: input.is_all_day,
            location_ids: input.location_ids,
            setup_minutes: input.setup_minutes,
            teardown_minutes: input.teardown_minutes,
            internal_notes: input.internal_notes,
            calendar_id: input.calendar_id,
        }
    }
}

#[derive(InputObject, Default)]
pub struct EventChangesInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub is_all_day: Option<bool>,
    pub location_ids: Option<Vec<String>>,
    pub setup_minutes: Option<u32>,
    pub teardown_minutes: Option<u32>,
    pub assigned_to: Option<String>,
    pub internal_notes: Option<String>,
}

impl From<EventChangesInput> for EventChanges {
    fn from(input: EventChangesInput) -> Self {
        Self {
            title: input.title,
            description: input.description,
            category: input.category,
            start: input.start,
            end: input.end,
            is_all_day: input.is_all_day,
            location_ids: input.location_ids,
            setup_minutes: input.setup_minutes,
            teardown_minutes: input.teardown_minutes,
            assigned_to: input.assigned_to,
            internal_notes: input.internal_notes,
        }
    }
}

#[derive(Default)]
pub struct EventQuery;

#[Object]
impl EventQuery {
    async fn event(&self, context: &Context<'_>, id: String) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let record = state.queries.get(&id).await.map_err(gql_error)?;
        Ok(record.into())
    }

    async fn events(
        &self,
        context: &Context<'_>,
        status: Option<EventStatusGql>,
        is_deleted: Option<bool>,
        calendar_id: Option<String>,
        location_id: Option<String>,
    ) -> GqlResult<Vec<EventView>> {
        let state = context.data_unchecked::<AppState>();
        let filter = EventFilter {
            status: status.map(Into::into),
            is_deleted,
            calendar_id,
            location_id,
            ..EventFilter::default()
        };
        let records = state.queries.list(&filter).await.map_err(gql_error)?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}

#[derive(Default)]
pub struct EventMutation;

#[Object]
impl EventMutation {
    async fn create_draft(
        &self,
        context: &Context<'_>,
        input: CreateDraftInput,
    ) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state
            .lifecycle
            .create_draft(actor, input.into())
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }

    async fn update_draft(
        &self,
        context: &Context<'_>,
        id: String,
        changes: EventChangesInput,
    ) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state
            .lifecycle
            .update_draft(actor, &id, changes.into())
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }

    async fn submit_draft(&self, context: &Context<'_>, id: String) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state.lifecycle.submit(actor, &id).await.map_err(gql_error)?;
        Ok(record.into())
    }

    async fn delete_draft(&self, context: &Context<'_>, id: String) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state
            .lifecycle
            .delete_draft(actor, &id)
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }

    async fn approve_event(&self, context: &Context<'_>, id: String) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state.lifecycle.approve(actor, &id).await.map_err(gql_error)?;
        Ok(record.into())
    }

    async fn reject_event(
        &self,
        context: &Context<'_>,
        id: String,
        reason: String,
    ) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state
            .lifecycle
            .reject(actor, &id, &reason)
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }

    async fn delete_event(
        &self,
        context: &Context<'_>,
        id: String,
        reason: Option<String>,
    ) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state
            .lifecycle
            .delete(actor, &id, reason)
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }

    async fn restore_event(&self, context: &Context<'_>, id: String) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state.lifecycle.restore(actor, &id).await.map_err(gql_error)?;
        Ok(record.into())
    }

    async fn request_edit(
        &self,
        context: &Context<'_>,
        id: String,
        changes: EventChangesInput,
        reason: String,
    ) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let command = RequestEdit {
            changes: changes.into(),
            reason,
        };
        let record = state
            .lifecycle
            .request_edit(actor, &id, command)
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }

    async fn approve_edit(&self, context: &Context<'_>, id: String) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state
            .lifecycle
            .approve_edit(actor, &id)
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }

    async fn reject_edit(
        &self,
        context: &Context<'_>,
        id: String,
        reason: String,
    ) -> GqlResult<EventView> {
        let state = context.data_unchecked::<AppState>();
        let actor = caller(context)?;
        let record = state
            .lifecycle
            .reject_edit(actor, &id, &reason)
            .await
            .map_err(gql_error)?;
        Ok(record.into())
    }
}

#[cfg(test)]
mod events_graphql_tests {
    use async_graphql::{Request, Value};

    use crate::shell::graphql::build_schema;
    use crate::tests::fixtures::{app_state, requester};

    #[tokio::test]
    async fn it_should_create_and_read_back_a_draft() {
        let (state, _) = app_state();
        let schema = build_schema(state);

        let created = schema
            .execute(
                Request::new(
                    r#"mutation {
                        createDraft(input: {
                            title: "Youth night",
                            start: "2024-03-08T18:00:00Z",
                            end: "2024-03-08T21:00:00Z"
                        }) { id status }
                    }"#,
                )
                .data(requester()),
            )
            .await;
        assert!(created.errors.is_empty(), "{:?}", created.errors);
        let json = created.data.into_json().unwrap();
        assert_eq!(json["createDraft"]["status"], "DRAFT");

        let id = json["createDraft"]["id"].as_str().unwrap().to_string();
        let read = schema
            .execute(format!(r#"{{ event(id: "{id}") {{ title statusHistory {{ action }} }} }}"#))
            .await;
        let json = read.data.into_json().unwrap();
        assert_eq!(json["event"]["title"], "Youth night");
        assert_eq!(json["event"]["statusHistory"][0]["action"], "created");
    }

    #[tokio::test]
    async fn it_should_refuse_mutations_without_a_caller() {
        let (state, _) = app_state();
        let schema = build_schema(state);
        let response = schema
            .execute(r#"mutation { submitDraft(id: "x") { id } }"#)
            .await;
        assert_eq!(response.data, Value::Null);
        assert_eq!(response.errors.len(), 1);
    }
}
