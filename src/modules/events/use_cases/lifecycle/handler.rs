// Lifecycle use case: load, decide, conditionally save.
//
// Responsibilities
// - Every transition is one conditional save keyed by record id and loaded version. A racing
//   writer gets a Conflict and nothing is half-applied.
// - Approval talks to the external calendar before the local save, never while holding a store
//   lock. An in-process claim per event keeps two approvals from both creating an external event.
//   If the local save fails after a create, the external event is deleted again.
// - After a committed write: usage counts are rebalanced and change listeners are notified.

use crate::modules::events::adapters::outbound::change_listener::{
    ChangedEvent, EventChangeListener,
};
use crate::modules::events::adapters::outbound::event_records::EventRecordStore;
use crate::modules::events::core::evolve::evolve;
use crate::modules::events::core::state::{EventChanges, EventRecord};
use crate::modules::events::use_cases::lifecycle::commands::{CreateDraft, RequestEdit};
use crate::modules::events::use_cases::lifecycle::decide::{
    decide_approve, decide_approve_edit, decide_create_draft, decide_delete, decide_delete_draft,
    decide_reject, decide_reject_edit, decide_request_edit, decide_restore, decide_submit,
    decide_update_draft, ensure_can_approve,
};
use crate::modules::events::use_cases::lifecycle::decision::Decision;
use crate::modules::locations::adapters::outbound::location_store::LocationStore;
use crate::modules::locations::core::usage::counted_locations;
use crate::modules::sync::adapters::outbound::calendar_source::{ExternalCalendar, OutboundEvent};
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::{Actor, Clock, LocationId, new_id};
use crate::shared::infrastructure::record_store::Versioned;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Event ids with an approval in flight in this process.
#[derive(Default)]
struct ApprovalClaims {
    in_flight: Mutex<HashSet<String>>,
}

struct ApprovalClaim<'a> {
    claims: &'a ApprovalClaims,
    id: String,
}

impl ApprovalClaims {
    fn claim(&self, id: &str) -> Option<ApprovalClaim<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.insert(id.to_string()).then(|| ApprovalClaim {
            claims: self,
            id: id.to_string(),
        })
    }
}

impl Drop for ApprovalClaim<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .claims
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.id);
    }
}

pub struct LifecycleHandler {
    records: Arc<dyn EventRecordStore>,
    calendar: Arc<dyn ExternalCalendar>,
    locations: Arc<dyn LocationStore>,
    listener: Arc<dyn EventChangeListener>,
    clock: Arc<dyn Clock>,
    default_calendar_id: String,
    approvals: ApprovalClaims,
}

impl LifecycleHandler {
    pub fn new(
        records: Arc<dyn EventRecordStore>,
        calendar: Arc<dyn ExternalCalendar>,
        locations: Arc<dyn LocationStore>,
        listener: Arc<dyn EventChangeListener>,
        clock: Arc<dyn Clock>,
        default_calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            records,
            calendar,
            locations,
            listener,
            clock,
            default_calendar_id: default_calendar_id.into(),
            approvals: ApprovalClaims::default(),
        }
    }

    async fn load(&self, id: &str) -> Result<Versioned<EventRecord>, ApplicationError> {
        self.records
            .load(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("event {id}")))
    }

    /// Referenced locations must exist and be selectable.
    async fn ensure_locations_selectable(&self, ids: &[LocationId]) -> Result<(), ApplicationError> {
        for id in ids {
            match self.locations.load(id).await? {
                Some(location) if location.record.is_active() => {}
                Some(location) => {
                    return Err(ApplicationError::Validation(format!(
                        "location {id} is {}",
                        location.record.status
                    )));
                }
                None => {
                    return Err(ApplicationError::Validation(format!("unknown location {id}")));
                }
            }
        }
        Ok(())
    }

    async fn after_commit(&self, before: Option<&EventRecord>, after: &EventRecord) {
        self.locations
            .rebalance_usage(counted_locations(before), counted_locations(Some(after)))
            .await;
        let mut changes = vec![ChangedEvent::from(after)];
        if let Some(before) = before {
            if before.start != after.start || before.end != after.end {
                changes.push(ChangedEvent::from(before));
            }
        }
        self.listener.events_changed(&changes).await;
    }

    async fn commit(
        &self,
        current: Versioned<EventRecord>,
        decision: Decision,
    ) -> Result<EventRecord, ApplicationError> {
        let event = match decision {
            Decision::Accepted { event } => event,
            Decision::Unchanged => return Ok(current.record),
            Decision::Rejected { reason } => return Err(reason.into()),
        };
        let transition = event.name();
        let after = evolve(Some(current.record.clone()), event)
            .ok_or_else(|| ApplicationError::Store(format!("{transition} produced no record")))?;
        self.records.save(after.clone(), current.version).await?;
        self.after_commit(Some(&current.record), &after).await;
        info!(
            id = %after.id,
            event_id = %after.event_id,
            transition,
            status = %after.status,
            "event transition committed"
        );
        Ok(after)
    }

    async fn transition<F>(&self, id: &str, decide: F) -> Result<EventRecord, ApplicationError>
    where
        F: FnOnce(&EventRecord, DateTime<Utc>) -> Decision,
    {
        let current = self.load(id).await?;
        let decision = decide(&current.record, self.clock.now());
        self.commit(current, decision).await
    }

    pub async fn create_draft(
        &self,
        actor: &Actor,
        mut command: CreateDraft,
    ) -> Result<EventRecord, ApplicationError> {
        if command.calendar_id.is_none() {
            command.calendar_id = Some(self.default_calendar_id.clone());
        }
        let location_ids = command.location_ids.clone();
        let event = match decide_create_draft(command, actor, new_id(), self.clock.now()) {
            Decision::Accepted { event } => event,
            Decision::Unchanged => {
                return Err(ApplicationError::Store("draft creation was a no-op".into()));
            }
            Decision::Rejected { reason } => return Err(reason.into()),
        };
        self.ensure_locations_selectable(&location_ids).await?;
        let record = evolve(None, event)
            .ok_or_else(|| ApplicationError::Store("draft creation produced no record".into()))?;
        self.records.insert(record.clone()).await?;
        self.after_commit(None, &record).await;
        info!(id = %record.id, event_id = %record.event_id, "draft created");
        Ok(record)
    }

    pub async fn update_draft(
        &self,
        actor: &Actor,
        id: &str,
        changes: EventChanges,
    ) -> Result<EventRecord, ApplicationError> {
        let current = self.load(id).await?;
        let decision = decide_update_draft(&current.record, changes.clone(), actor, self.clock.now());
        if matches!(decision, Decision::Accepted { .. }) {
            if let Some(location_ids) = &changes.location_ids {
                self.ensure_locations_selectable(location_ids).await?;
            }
        }
        self.commit(current, decision).await
    }

    pub async fn submit(&self, actor: &Actor, id: &str) -> Result<EventRecord, ApplicationError> {
        self.transition(id, |record, now| decide_submit(record, actor, now))
            .await
    }

    pub async fn approve(&self, actor: &Actor, id: &str) -> Result<EventRecord, ApplicationError> {
        let current = self.load(id).await?;
        ensure_can_approve(&current.record, actor)?;
        let Some(_claim) = self.approvals.claim(id) else {
            return Err(ApplicationError::conflict(
                "an approval for this event is already in progress",
                Some(current.record.status.as_str().to_string()),
            ));
        };

        let current = self.load(id).await?;
        ensure_can_approve(&current.record, actor)?;
        let calendar_id = current
            .record
            .calendar_id
            .clone()
            .unwrap_or_else(|| self.default_calendar_id.clone());
        let outbound = self.outbound_event(&current.record).await;
        let (external_id, created) = match &current.record.external_id {
            Some(existing) => {
                self.calendar
                    .update_event(&calendar_id, existing, &outbound)
                    .await?;
                (existing.clone(), false)
            }
            None => (
                self.calendar.create_event(&calendar_id, &outbound).await?,
                true,
            ),
        };

        let decision = decide_approve(
            &current.record,
            actor,
            external_id.clone(),
            calendar_id.clone(),
            self.clock.now(),
        );
        match self.commit(current, decision).await {
            Ok(record) => Ok(record),
            Err(error) => {
                if created {
                    self.compensate_created(&calendar_id, &external_id).await;
                }
                Err(error)
            }
        }
    }

    async fn compensate_created(&self, calendar_id: &str, external_id: &str) {
        match self.calendar.delete_event(calendar_id, external_id).await {
            Ok(()) => warn!(external_id, "approval not committed, external event removed"),
            Err(error) => warn!(
                external_id,
                error = %error,
                "approval not committed and the external event could not be removed"
            ),
        }
    }

    async fn outbound_event(&self, record: &EventRecord) -> OutboundEvent {
        let mut names: Vec<String> = Vec::with_capacity(record.location_ids.len());
        for id in &record.location_ids {
            if let Ok(Some(location)) = self.locations.load(id).await {
                names.push(location.record.name);
            }
        }
        let location = if names.is_empty() {
            record.location_text.clone()
        } else {
            Some(names.join(", "))
        };
        OutboundEvent {
            title: record.title.clone(),
            description: record.description.clone(),
            start: record.start,
            end: record.end,
            utc_offset_minutes: record.utc_offset_minutes,
            time_zone: record.time_zone.clone(),
            is_all_day: record.is_all_day,
            location,
            category: record.category.clone(),
            internal_event_id: record.event_id.clone(),
        }
    }

    pub async fn reject(
        &self,
        actor: &Actor,
        id: &str,
        reason: &str,
    ) -> Result<EventRecord, ApplicationError> {
        self.transition(id, |record, now| decide_reject(record, reason, actor, now))
            .await
    }

    /// Soft delete. Deleting a deleted event returns it unchanged.
    pub async fn delete(
        &self,
        actor: &Actor,
        id: &str,
        reason: Option<String>,
    ) -> Result<EventRecord, ApplicationError> {
        self.transition(id, |record, now| decide_delete(record, reason, actor, now))
            .await
    }

    pub async fn delete_draft(&self, actor: &Actor, id: &str) -> Result<EventRecord, ApplicationError> {
        self.transition(id, |record, now| decide_delete_draft(record, actor, now))
            .await
    }

    pub async fn restore(&self, actor: &Actor, id: &str) -> Result<EventRecord, ApplicationError> {
        self.transition(id, |record, now| decide_restore(record, actor, now))
            .await
    }

    pub async fn request_edit(
        &self,
        actor: &Actor,
        id: &str,
        command: RequestEdit,
    ) -> Result<EventRecord, ApplicationError> {
        let current = self.load(id).await?;
        let location_ids = command.changes.location_ids.clone();
        let decision = decide_request_edit(
            &current.record,
            command.changes,
            &command.reason,
            actor,
            self.clock.now(),
        );
        if let (Decision::Accepted { .. }, Some(location_ids)) = (&decision, &location_ids) {
            self.ensure_locations_selectable(location_ids).await?;
        }
        self.commit(current, decision).await
    }

    /// Applies the pending edit. Externally owned fields are pushed to the calendar first so the
    /// next reconciliation does not revert them. If the local save then fails, the calendar gets
    /// the unedited fields back.
    pub async fn approve_edit(&self, actor: &Actor, id: &str) -> Result<EventRecord, ApplicationError> {
        let current = self.load(id).await?;
        let decision = decide_approve_edit(&current.record, actor, self.clock.now());
        let mut pushed = None;
        if let Decision::Accepted { event } = &decision {
            if let (Some(external_id), Some(calendar_id)) =
                (&current.record.external_id, &current.record.calendar_id)
            {
                if let Some(edited) = evolve(Some(current.record.clone()), event.clone()) {
                    let outbound = self.outbound_event(&edited).await;
                    self.calendar
                        .update_event(calendar_id, external_id, &outbound)
                        .await?;
                    pushed = Some((calendar_id.clone(), external_id.clone(), current.record.clone()));
                }
            }
        }
        match self.commit(current, decision).await {
            Ok(record) => Ok(record),
            Err(error) => {
                if let Some((calendar_id, external_id, unedited)) = pushed {
                    self.compensate_edit(&calendar_id, &external_id, &unedited)
                        .await;
                }
                Err(error)
            }
        }
    }

    async fn compensate_edit(&self, calendar_id: &str, external_id: &str, unedited: &EventRecord) {
        let outbound = self.outbound_event(unedited).await;
        match self
            .calendar
            .update_event(calendar_id, external_id, &outbound)
            .await
        {
            Ok(()) => warn!(external_id, "edit approval not committed, external event reverted"),
            Err(error) => warn!(
                external_id,
                error = %error,
                "edit approval not committed and the external event could not be reverted"
            ),
        }
    }

    pub async fn reject_edit(
        &self,
        actor: &Actor,
        id: &str,
        reason: &str,
    ) -> Result<EventRecord, ApplicationError> {
        self.transition(id, |record, now| decide_reject_edit(record, reason, actor, now))
            .await
    }
}

#[cfg(test)]
mod lifecycle_handler_tests {
    use super::*;
    use crate::modules::events::adapters::outbound::change_listener::NoopListener;
    use crate::modules::events::adapters::outbound::event_records_in_memory::InMemoryEventRecords;
    use crate::modules::events::core::state::{EventStatus, HistoryAction};
    use crate::modules::locations::adapters::outbound::location_store_in_memory::InMemoryLocationStore;
    use crate::modules::sync::adapters::outbound::calendar_source_in_memory::InMemoryCalendar;
    use crate::shared::core::primitives::ManualClock;
    use crate::tests::fixtures::{
        LocationBuilder, approver, create_draft_command, other_requester, requester, t0,
    };
    use rstest::{fixture, rstest};
    use tokio::join;

    struct BeforeEach {
        records: Arc<InMemoryEventRecords>,
        calendar: Arc<InMemoryCalendar>,
        locations: Arc<InMemoryLocationStore>,
        handler: Arc<LifecycleHandler>,
    }

    #[fixture]
    fn before_each() -> BeforeEach {
        let records = Arc::new(InMemoryEventRecords::new());
        let calendar = Arc::new(InMemoryCalendar::new());
        let locations = Arc::new(InMemoryLocationStore::new());
        let handler = Arc::new(LifecycleHandler::new(
            records.clone(),
            calendar.clone(),
            locations.clone(),
            Arc::new(NoopListener),
            Arc::new(ManualClock::new(t0())),
            "primary",
        ));
        BeforeEach {
            records,
            calendar,
            locations,
            handler,
        }
    }

    async fn pending_event(ctx: &BeforeEach) -> EventRecord {
        let draft = ctx
            .handler
            .create_draft(&requester(), create_draft_command())
            .await
            .unwrap();
        ctx.handler.submit(&requester(), &draft.id).await.unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_create_a_draft_in_the_default_calendar(before_each: BeforeEach) {
        let draft = before_each
            .handler
            .create_draft(&requester(), create_draft_command())
            .await
            .unwrap();
        assert_eq!(draft.status, EventStatus::Draft);
        assert_eq!(draft.calendar_id.as_deref(), Some("primary"));
        let stored = before_each.records.load(&draft.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_reject_unknown_locations_on_create(before_each: BeforeEach) {
        let mut command = create_draft_command();
        command.location_ids = vec!["loc-missing".into()];
        let result = before_each.handler.create_draft(&requester(), command).await;
        assert_eq!(
            result.unwrap_err(),
            ApplicationError::Validation("unknown location loc-missing".into())
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_approve_and_store_the_external_id(before_each: BeforeEach) {
        let pending = pending_event(&before_each).await;
        let approved = before_each
            .handler
            .approve(&approver(), &pending.id)
            .await
            .unwrap();
        assert_eq!(approved.status, EventStatus::Approved);
        let external_id = approved.external_id.clone().unwrap();
        let external = before_each.calendar.get("primary", &external_id).await.unwrap();
        assert_eq!(external.internal_event_id.as_deref(), Some(pending.event_id.as_str()));
        assert!(approved.is_consistent());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_let_exactly_one_of_two_concurrent_approvals_succeed(
        before_each: BeforeEach,
    ) {
        let pending = pending_event(&before_each).await;
        before_each.calendar.set_delay_create_ms(20);
        let first = before_each.handler.clone();
        let second = before_each.handler.clone();
        let actor = approver();
        let (result1, result2) = join!(
            first.approve(&actor, &pending.id),
            second.approve(&actor, &pending.id)
        );
        assert!(
            result1.is_ok() ^ result2.is_ok(),
            "exactly one approval should succeed"
        );
        let error = result1.err().or(result2.err()).unwrap();
        assert_eq!(error.kind(), "conflict");
        assert_eq!(before_each.calendar.created_count(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_commit_an_approval_when_the_calendar_is_down(before_each: BeforeEach) {
        let pending = pending_event(&before_each).await;
        before_each.calendar.toggle_offline();
        let result = before_each.handler.approve(&approver(), &pending.id).await;
        assert_eq!(result.unwrap_err().kind(), "external");
        let stored = before_each.records.load(&pending.id).await.unwrap().unwrap();
        assert_eq!(stored.record.status, EventStatus::Pending);
        assert_eq!(stored.record.external_id, None);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_remove_the_external_event_when_the_local_commit_fails(
        before_each: BeforeEach,
    ) {
        let pending = pending_event(&before_each).await;
        before_each.records.toggle_failing_saves();
        let result = before_each.handler.approve(&approver(), &pending.id).await;
        assert_eq!(result.unwrap_err().kind(), "store");
        assert_eq!(before_each.calendar.created_count(), 1);
        assert_eq!(before_each.calendar.deleted_count(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_treat_a_second_delete_as_a_no_op(before_each: BeforeEach) {
        let pending = pending_event(&before_each).await;
        let deleted = before_each
            .handler
            .delete(&requester(), &pending.id, Some("cancelled".into()))
            .await
            .unwrap();
        let again = before_each
            .handler
            .delete(&approver(), &pending.id, None)
            .await
            .unwrap();
        assert_eq!(again.status_history.len(), deleted.status_history.len());
        let stored = before_each.records.load(&pending.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_let_a_stranger_delete(before_each: BeforeEach) {
        let pending = pending_event(&before_each).await;
        let result = before_each
            .handler
            .delete(&other_requester(), &pending.id, None)
            .await;
        assert_eq!(result.unwrap_err().kind(), "permission");
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_report_missing_events_as_not_found(before_each: BeforeEach) {
        let result = before_each.handler.submit(&requester(), "nope").await;
        assert_eq!(
            result.unwrap_err(),
            ApplicationError::NotFound("event nope".into())
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_track_usage_through_delete_and_restore(before_each: BeforeEach) {
        before_each
            .locations
            .insert(LocationBuilder::new().id("loc-chapel").build())
            .await
            .unwrap();
        let mut command = create_draft_command();
        command.location_ids = vec!["loc-chapel".into()];
        let draft = before_each
            .handler
            .create_draft(&requester(), command)
            .await
            .unwrap();
        let usage = |ctx: &BeforeEach| {
            let locations = ctx.locations.clone();
            async move {
                locations
                    .load("loc-chapel")
                    .await
                    .unwrap()
                    .unwrap()
                    .record
                    .usage_count
            }
        };
        assert_eq!(usage(&before_each).await, 1);
        before_each
            .handler
            .delete_draft(&requester(), &draft.id)
            .await
            .unwrap();
        assert_eq!(usage(&before_each).await, 0);
        let restored = before_each
            .handler
            .restore(&approver(), &draft.id)
            .await
            .unwrap();
        assert_eq!(restored.status, EventStatus::Draft);
        assert_eq!(usage(&before_each).await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_push_an_approved_edit_to_the_calendar(before_each: BeforeEach) {
        let pending = pending_event(&before_each).await;
        let approved = before_each
            .handler
            .approve(&approver(), &pending.id)
            .await
            .unwrap();
        before_each
            .handler
            .request_edit(
                &requester(),
                &approved.id,
                RequestEdit {
                    changes: EventChanges {
                        title: Some("Choir practice (moved)".into()),
                        ..EventChanges::default()
                    },
                    reason: "new title".into(),
                },
            )
            .await
            .unwrap();
        let edited = before_each
            .handler
            .approve_edit(&approver(), &approved.id)
            .await
            .unwrap();
        assert_eq!(edited.title, "Choir practice (moved)");
        assert_eq!(
            edited.status_history.last().unwrap().action,
            HistoryAction::EditApproved
        );
        let external = before_each
            .calendar
            .get("primary", approved.external_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(external.title, "Choir practice (moved)");
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_revert_the_calendar_when_an_edit_approval_is_not_committed(
        before_each: BeforeEach,
    ) {
        let pending = pending_event(&before_each).await;
        let approved = before_each
            .handler
            .approve(&approver(), &pending.id)
            .await
            .unwrap();
        before_each
            .handler
            .request_edit(
                &requester(),
                &approved.id,
                RequestEdit {
                    changes: EventChanges {
                        title: Some("Unapproved title".into()),
                        ..EventChanges::default()
                    },
                    reason: "new title".into(),
                },
            )
            .await
            .unwrap();

        before_each.records.toggle_failing_saves();
        let result = before_each
            .handler
            .approve_edit(&approver(), &approved.id)
            .await;
        assert_eq!(result.unwrap_err().kind(), "store");

        let external = before_each
            .calendar
            .get("primary", approved.external_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(external.title, "Choir practice");
        let stored = before_each.records.load(&approved.id).await.unwrap().unwrap();
        assert_eq!(stored.record.title, "Choir practice");
        assert!(stored.record.pending_edit_request.is_some());
    }
}
