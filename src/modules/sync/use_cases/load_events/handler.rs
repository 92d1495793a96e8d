// Event loading through the snapshot cache.
//
// Purpose
// - Answer "events of this calendar in this window" from a fresh snapshot when possible,
//   otherwise reconcile and store the result as the new snapshot.
//
// Responsibilities
// - A reconcile whose pagination failed is retried and never cached. An empty calendar is
//   cached like any other result.
// - The snapshot is the store's view of the window after reconciling, so local drafts show too.
// - The cache epoch is read after reconciling and before listing. A write that commits while
//   the records are listed leaves the stored snapshot invalidated.

use crate::modules::events::adapters::outbound::event_records::{EventFilter, EventRecordStore};
use crate::modules::events::core::state::EventRecord;
use crate::modules::sync::use_cases::load_events::cache::{
    CacheLookup, EventCache, LoadSource, Snapshot,
};
use crate::modules::sync::use_cases::reconcile::handler::Reconciler;
use crate::modules::sync::use_cases::reconcile::report::CalendarSyncReport;
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::{Clock, TimeWindow};
use crate::shared::infrastructure::retry::{RetryPolicy, poll_until};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResult {
    pub calendar_id: String,
    pub source: LoadSource,
    pub events: Vec<EventRecord>,
    pub loaded_at: DateTime<Utc>,
    /// Present when the calendar was reconciled for this load.
    pub report: Option<CalendarSyncReport>,
}

pub struct EventLoader {
    cache: Arc<EventCache>,
    reconciler: Arc<Reconciler>,
    records: Arc<dyn EventRecordStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl EventLoader {
    pub fn new(
        cache: Arc<EventCache>,
        reconciler: Arc<Reconciler>,
        records: Arc<dyn EventRecordStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            reconciler,
            records,
            clock,
            retry,
        }
    }

    pub async fn load(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<LoadResult, ApplicationError> {
        let source = match self.cache.lookup(calendar_id, window).await {
            CacheLookup::Fresh(snapshot) if !force_refresh => {
                return Ok(LoadResult {
                    calendar_id: calendar_id.to_string(),
                    source: LoadSource::Cache,
                    events: snapshot.within(window),
                    loaded_at: snapshot.stored_at,
                    report: None,
                });
            }
            CacheLookup::Missing => LoadSource::RegularLoad,
            CacheLookup::Fresh(_) | CacheLookup::Stale => LoadSource::GraphFallback,
        };

        let report = self
            .retry
            .run_if(
                "reconcile calendar window",
                move |_| async move {
                    let report = self
                        .reconciler
                        .reconcile_calendar(calendar_id, window, cancel)
                        .await?;
                    match &report.fetch_error {
                        Some(error) => Err(ApplicationError::External(error.clone())),
                        None => Ok(report),
                    }
                },
                |error| matches!(error, ApplicationError::External(_)),
            )
            .await?;

        let observed = self.cache.epoch(calendar_id).await;
        let events: Vec<EventRecord> = self
            .records
            .list(&EventFilter {
                calendar_id: Some(calendar_id.to_string()),
                window: Some(*window),
                is_deleted: Some(false),
                ..EventFilter::default()
            })
            .await?
            .into_iter()
            .map(|versioned| versioned.record)
            .collect();
        let loaded_at = self.clock.now();
        self.cache
            .store(
                Snapshot {
                    calendar_id: calendar_id.to_string(),
                    window: *window,
                    events: events.clone(),
                    stored_at: loaded_at,
                },
                observed,
            )
            .await;
        info!(
            calendar_id,
            source = ?source,
            events = events.len(),
            changed = report.changed(),
            "calendar window loaded"
        );
        Ok(LoadResult {
            calendar_id: calendar_id.to_string(),
            source,
            events,
            loaded_at,
            report: Some(report),
        })
    }

    /// Waits until a fresh snapshot covers the window, for callers that triggered a load elsewhere.
    pub async fn wait_until_fresh(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        poll_until(timeout, interval, move || self.cache.is_fresh(calendar_id, window)).await
    }
}

#[cfg(test)]
mod load_events_tests {
    use super::*;
    use crate::modules::events::adapters::outbound::change_listener::{
        ChangedEvent, EventChangeListener,
    };
    use crate::modules::events::adapters::outbound::event_records_in_memory::InMemoryEventRecords;
    use crate::modules::events::core::state::EventStatus;
    use crate::modules::locations::adapters::outbound::location_store_in_memory::InMemoryLocationStore;
    use crate::modules::sync::adapters::outbound::calendar_source_in_memory::InMemoryCalendar;
    use crate::shared::core::primitives::ManualClock;
    use crate::tests::fixtures::{EventRecordBuilder, ExternalEventBuilder, march_window, t0};
    use rstest::{fixture, rstest};

    struct BeforeEach {
        loader: EventLoader,
        cache: Arc<EventCache>,
        calendar: Arc<InMemoryCalendar>,
        records: Arc<InMemoryEventRecords>,
        clock: Arc<ManualClock>,
    }

    #[fixture]
    fn before_each() -> BeforeEach {
        let clock = Arc::new(ManualClock::new(t0()));
        let calendar = Arc::new(InMemoryCalendar::new());
        let records = Arc::new(InMemoryEventRecords::new());
        let cache = Arc::new(EventCache::new(chrono::Duration::minutes(5), clock.clone()));
        let retry = RetryPolicy::exponential(2, Duration::from_millis(1));
        let reconciler = Arc::new(Reconciler::new(
            calendar.clone(),
            records.clone(),
            Arc::new(InMemoryLocationStore::new()),
            cache.clone(),
            clock.clone(),
            RetryPolicy::none(),
        ));
        let loader = EventLoader::new(cache.clone(), reconciler, records.clone(), clock.clone(), retry);
        BeforeEach {
            loader,
            cache,
            calendar,
            records,
            clock,
        }
    }

    async fn load(ctx: &BeforeEach, force_refresh: bool) -> Result<LoadResult, ApplicationError> {
        ctx.loader
            .load("primary", &march_window(), force_refresh, &CancellationToken::new())
            .await
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_serve_the_second_load_from_cache(before_each: BeforeEach) {
        before_each
            .calendar
            .seed(ExternalEventBuilder::new("ext-1").on_day(3).build())
            .await;

        let first = load(&before_each, false).await.unwrap();
        let second = load(&before_each, false).await.unwrap();

        assert_eq!(first.source, LoadSource::RegularLoad);
        assert_eq!(second.source, LoadSource::Cache);
        assert_eq!(second.events.len(), 1);
        assert_eq!(before_each.calendar.page_requests(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_fall_back_to_the_calendar_once_the_snapshot_expires(
        before_each: BeforeEach,
    ) {
        load(&before_each, false).await.unwrap();
        before_each.clock.advance(chrono::Duration::minutes(6));
        let reloaded = load(&before_each, false).await.unwrap();
        assert_eq!(reloaded.source, LoadSource::GraphFallback);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_bypass_a_fresh_snapshot_on_force_refresh(before_each: BeforeEach) {
        load(&before_each, false).await.unwrap();
        let forced = load(&before_each, true).await.unwrap();
        assert_eq!(forced.source, LoadSource::GraphFallback);
        assert_eq!(before_each.calendar.page_requests(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_cache_an_empty_calendar(before_each: BeforeEach) {
        let first = load(&before_each, false).await.unwrap();
        assert!(first.events.is_empty());
        assert!(
            before_each
                .cache
                .is_fresh("primary", &march_window())
                .await
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_cache_a_failed_fetch(before_each: BeforeEach) {
        before_each.calendar.toggle_offline();
        let result = load(&before_each, false).await;
        assert_eq!(result.unwrap_err().kind(), "external");
        assert_eq!(before_each.calendar.page_requests(), 0);
        assert!(
            !before_each
                .cache
                .is_fresh("primary", &march_window())
                .await
        );

        before_each.calendar.toggle_offline();
        let recovered = load(&before_each, false).await.unwrap();
        assert_eq!(recovered.source, LoadSource::RegularLoad);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_retry_a_failed_fetch_before_giving_up(before_each: BeforeEach) {
        before_each.calendar.fail_page(0, 1).await;
        let loaded = load(&before_each, false).await.unwrap();
        assert_eq!(loaded.source, LoadSource::RegularLoad);
        assert_eq!(before_each.calendar.page_requests(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_include_local_drafts_in_the_snapshot(before_each: BeforeEach) {
        before_each
            .records
            .insert(EventRecordBuilder::new().id("draft-1").build())
            .await
            .unwrap();
        let loaded = load(&before_each, false).await.unwrap();
        assert_eq!(loaded.events.len(), 1);
        assert_eq!(loaded.events[0].id, "draft-1");
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_report_freshness_while_polling(before_each: BeforeEach) {
        let window = march_window();
        assert!(
            !before_each
                .loader
                .wait_until_fresh("primary", &window, Duration::from_millis(5), Duration::from_millis(1))
                .await
        );
        load(&before_each, false).await.unwrap();
        assert!(
            before_each
                .loader
                .wait_until_fresh("primary", &window, Duration::from_millis(5), Duration::from_millis(1))
                .await
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_not_serve_a_snapshot_that_missed_a_concurrent_delete(
        before_each: BeforeEach,
    ) {
        before_each
            .records
            .insert(EventRecordBuilder::new().id("ev-1").build())
            .await
            .unwrap();
        before_each.records.set_delay_list_ms(50);

        let delete_while_listing = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let current = before_each.records.load("ev-1").await.unwrap().unwrap();
            let mut deleted = current.record.clone();
            deleted.status = EventStatus::Deleted;
            deleted.is_deleted = true;
            before_each
                .records
                .save(deleted.clone(), current.version)
                .await
                .unwrap();
            before_each
                .cache
                .events_changed(&[ChangedEvent::from(&deleted)])
                .await;
        };
        let (first, ()) = tokio::join!(load(&before_each, false), delete_while_listing);
        assert_eq!(first.unwrap().events.len(), 1);

        before_each.records.set_delay_list_ms(0);
        let second = load(&before_each, false).await.unwrap();
        assert_eq!(second.source, LoadSource::GraphFallback);
        assert!(second.events.is_empty());
    }
}
