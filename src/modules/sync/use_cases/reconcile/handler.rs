// External sync reconciler.
//
// Purpose
// - Mirror a calendar window into the event record store without losing local enrichment.
//
// Responsibilities
// - Follow page tokens until exhausted. Each page fetch is retried on its own; a page that keeps
//   failing ends pagination and is reported, upserts from earlier pages stay applied.
// - Match by external id, falling back to the internal event id stamped on approved drafts.
// - Write only when the calendar-owned fields actually differ.
// - Skip, log and report single events whose registration link cannot be read.
// - Never change a record's status and never resurrect a deleted record.
//
// Boundaries
// - No store lock is held across a calendar call.

use crate::modules::events::adapters::outbound::change_listener::{
    ChangedEvent, EventChangeListener,
};
use crate::modules::events::adapters::outbound::event_records::EventRecordStore;
use crate::modules::events::core::state::EventRecord;
use crate::modules::locations::adapters::outbound::location_store::LocationStore;
use crate::modules::locations::core::resolver::LocationIndex;
use crate::modules::locations::core::usage::counted_locations;
use crate::modules::sync::adapters::outbound::calendar_source::{
    CalendarError, EventPage, ExternalCalendar, ExternalEvent,
};
use crate::modules::sync::core::external_fields::{RegistrationTimes, SyncedFields};
use crate::modules::sync::use_cases::reconcile::report::{
    CalendarSyncReport, SkippedEvent, SyncReport,
};
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::{Clock, TimeWindow, new_id};
use crate::shared::infrastructure::record_store::{StoreError, Versioned};
use crate::shared::infrastructure::retry::RetryPolicy;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum Upsert {
    Created(EventRecord),
    Updated(EventRecord),
    Unchanged(EventRecord),
}

pub struct Reconciler {
    calendar: Arc<dyn ExternalCalendar>,
    records: Arc<dyn EventRecordStore>,
    locations: Arc<dyn LocationStore>,
    listener: Arc<dyn EventChangeListener>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

fn is_transient(error: &CalendarError) -> bool {
    matches!(error, CalendarError::Unavailable(_))
}

impl Reconciler {
    pub fn new(
        calendar: Arc<dyn ExternalCalendar>,
        records: Arc<dyn EventRecordStore>,
        locations: Arc<dyn LocationStore>,
        listener: Arc<dyn EventChangeListener>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            calendar,
            records,
            locations,
            listener,
            clock,
            retry,
        }
    }

    /// Reconciles each calendar in turn. Calendars are independent; one failing to paginate does
    /// not stop the others.
    pub async fn reconcile(
        &self,
        calendar_ids: &[String],
        window: &TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, ApplicationError> {
        let mut report = SyncReport::default();
        for calendar_id in calendar_ids {
            report
                .calendars
                .push(self.reconcile_calendar(calendar_id, window, cancel).await?);
        }
        Ok(report)
    }

    pub async fn reconcile_calendar(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<CalendarSyncReport, ApplicationError> {
        let locations = self.locations.list().await?;
        let index = LocationIndex::build(locations.iter().map(|v| &v.record));
        let mut report = CalendarSyncReport::new(calendar_id);
        let mut page_token: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ApplicationError::Cancelled {
                    processed: report.fetched,
                    total: report.fetched,
                });
            }
            let page = match self.fetch_page(calendar_id, window, page_token.as_deref()).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(calendar_id, pages = report.pages_fetched, error = %error, "pagination stopped");
                    report.fetch_error = Some(error.to_string());
                    break;
                }
            };
            report.pages_fetched += 1;
            let total_so_far = report.fetched + page.events.len();

            for event in &page.events {
                if cancel.is_cancelled() {
                    return Err(ApplicationError::Cancelled {
                        processed: report.fetched,
                        total: total_so_far,
                    });
                }
                report.fetched += 1;
                match self.upsert(&index, event).await {
                    Ok(Upsert::Created(record)) => {
                        report.created += 1;
                        report.records.push(record);
                    }
                    Ok(Upsert::Updated(record)) => {
                        report.updated += 1;
                        report.records.push(record);
                    }
                    Ok(Upsert::Unchanged(record)) => {
                        report.unchanged += 1;
                        report.records.push(record);
                    }
                    Err(reason) => {
                        warn!(calendar_id, external_id = %event.id, reason = %reason, "external event skipped");
                        report.skipped.push(SkippedEvent {
                            external_id: event.id.clone(),
                            reason,
                        });
                    }
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(
            calendar_id,
            pages = report.pages_fetched,
            fetched = report.fetched,
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            "calendar reconciled"
        );
        Ok(report)
    }

    async fn fetch_page(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventPage, CalendarError> {
        self.retry
            .run_if(
                "fetch calendar page",
                move |_| self.calendar.list_events(calendar_id, window, page_token),
                is_transient,
            )
            .await
    }

    async fn registration_times(
        &self,
        event: &ExternalEvent,
    ) -> Result<Option<RegistrationTimes>, String> {
        let Some(registration_id) = event.registration_event_id.as_deref() else {
            return Ok(None);
        };
        let shadow = self
            .retry
            .run_if(
                "fetch registration event",
                move |_| self.calendar.get_event(&event.calendar_id, registration_id),
                is_transient,
            )
            .await
            .map_err(|error| format!("registration event {registration_id}: {error}"))?;
        Ok(Some(RegistrationTimes::between(event, &shadow)))
    }

    async fn find_counterpart(
        &self,
        event: &ExternalEvent,
    ) -> Result<Option<Versioned<EventRecord>>, String> {
        let by_external = self
            .records
            .find_by_external_id(&event.id)
            .await
            .map_err(|error| error.to_string())?;
        if by_external.is_some() {
            return Ok(by_external);
        }
        let Some(event_id) = event.internal_event_id.as_deref() else {
            return Ok(None);
        };
        let by_event_id = self
            .records
            .find_by_event_id(event_id)
            .await
            .map_err(|error| error.to_string())?;
        match by_event_id {
            Some(found) => match found.record.external_id.as_deref() {
                Some(other) if other != event.id => Err(format!(
                    "event {event_id} is already linked to external event {other}"
                )),
                _ => Ok(Some(found)),
            },
            None => Ok(None),
        }
    }

    /// Errors are skip reasons; the caller logs them and moves on.
    async fn upsert(&self, index: &LocationIndex, event: &ExternalEvent) -> Result<Upsert, String> {
        let registration = self.registration_times(event).await?;
        let fields = SyncedFields::from_external(
            event,
            index.resolve(event.location.as_deref()),
            registration,
        );
        let now = self.clock.now();

        let Some(current) = self.find_counterpart(event).await? else {
            let record = fields.into_imported(new_id(), now);
            self.records
                .insert(record.clone())
                .await
                .map_err(|error| error.to_string())?;
            self.after_write(None, &record).await;
            debug!(external_id = %event.id, id = %record.id, "external event imported");
            return Ok(Upsert::Created(record));
        };

        let mut next = current.record.clone();
        if !fields.apply_to(&mut next) {
            return Ok(Upsert::Unchanged(current.record));
        }
        next.updated_at = now;
        match self.records.save(next.clone(), current.version).await {
            Ok(_) => {
                self.after_write(Some(&current.record), &next).await;
                debug!(external_id = %event.id, id = %next.id, "record refreshed from calendar");
                Ok(Upsert::Updated(next))
            }
            Err(StoreError::VersionMismatch { .. }) => {
                Err("record changed locally during sync, picked up next run".to_string())
            }
            Err(error) => Err(error.to_string()),
        }
    }

    async fn after_write(&self, before: Option<&EventRecord>, after: &EventRecord) {
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
}
