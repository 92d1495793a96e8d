// In memory implementation of the ExternalCalendar port.
//
// Purpose
// - Stand in for the calendar service in tests and local development.
//
// Responsibilities
// - Serve events in pages of a configurable size, ordered by start.
// - Offer knobs for outages, flaky pages, failing single reads and slow creates.

use crate::modules::sync::adapters::outbound::calendar_source::{
    CalendarError, EventPage, ExternalCalendar, ExternalEvent, OutboundEvent,
};
use crate::shared::core::primitives::TimeWindow;
use chrono::{FixedOffset, Offset, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;

pub struct InMemoryCalendar {
    events: RwLock<BTreeMap<(String, String), ExternalEvent>>,
    page_size: AtomicUsize,
    offline: AtomicBool,
    failing_pages: Mutex<HashMap<usize, u32>>,
    failing_reads: Mutex<HashSet<String>>,
    delay_create_ms: AtomicU64,
    next_id: AtomicU64,
    created: AtomicUsize,
    deleted: AtomicUsize,
    page_requests: AtomicUsize,
}

impl Default for InMemoryCalendar {
    fn default() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
            page_size: AtomicUsize::new(50),
            offline: AtomicBool::new(false),
            failing_pages: Mutex::new(HashMap::new()),
            failing_reads: Mutex::new(HashSet::new()),
            delay_create_ms: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            created: AtomicUsize::new(0),
            deleted: AtomicUsize::new(0),
            page_requests: AtomicUsize::new(0),
        }
    }
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_page_size(&self, size: usize) {
        self.page_size.store(size.max(1), Ordering::SeqCst);
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    /// The zero-based page `index` fails `times` times before it is served.
    pub async fn fail_page(&self, index: usize, times: u32) {
        self.failing_pages.lock().await.insert(index, times);
    }

    pub async fn fail_reads_of(&self, external_id: &str) {
        self.failing_reads
            .lock()
            .await
            .insert(external_id.to_string());
    }

    pub fn set_delay_create_ms(&self, ms: u64) {
        self.delay_create_ms.store(ms, Ordering::SeqCst);
    }

    pub async fn seed(&self, event: ExternalEvent) {
        self.events
            .write()
            .await
            .insert((event.calendar_id.clone(), event.id.clone()), event);
    }

    pub async fn get(&self, calendar_id: &str, external_id: &str) -> Option<ExternalEvent> {
        self.events
            .read()
            .await
            .get(&(calendar_id.to_string(), external_id.to_string()))
            .cloned()
    }

    /// Applies `change` to a stored event, as if someone edited it in the calendar service.
    pub async fn edit<F>(&self, calendar_id: &str, external_id: &str, change: F) -> bool
    where
        F: FnOnce(&mut ExternalEvent),
    {
        let mut guard = self.events.write().await;
        match guard.get_mut(&(calendar_id.to_string(), external_id.to_string())) {
            Some(event) => {
                change(event);
                true
            }
            None => false,
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted.load(Ordering::SeqCst)
    }

    pub fn page_requests(&self) -> usize {
        self.page_requests.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> Result<(), CalendarError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CalendarError::Unavailable("calendar offline".into()));
        }
        Ok(())
    }

    fn to_external(
        calendar_id: &str,
        external_id: &str,
        event: &OutboundEvent,
    ) -> ExternalEvent {
        let offset = FixedOffset::east_opt(event.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        ExternalEvent {
            id: external_id.to_string(),
            calendar_id: calendar_id.to_string(),
            title: event.title.clone(),
            start: event.start.with_timezone(&offset),
            end: event.end.with_timezone(&offset),
            time_zone: event.time_zone.clone(),
            is_all_day: event.is_all_day,
            location: event.location.clone(),
            description: event.description.clone(),
            categories: event.category.clone().into_iter().collect(),
            registration_event_id: None,
            internal_event_id: Some(event.internal_event_id.clone()),
            extensions: BTreeMap::new(),
        }
    }
}

#[async_trait::async_trait]
impl ExternalCalendar for InMemoryCalendar {
    async fn list_events(
        &self,
        calendar_id: &str,
        window: &TimeWindow,
        page_token: Option<&str>,
    ) -> Result<EventPage, CalendarError> {
        self.ensure_online()?;
        self.page_requests.fetch_add(1, Ordering::SeqCst);
        let page_size = self.page_size.load(Ordering::SeqCst);
        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| CalendarError::Rejected(format!("invalid page token {token}")))?,
            None => 0,
        };
        let page_index = offset / page_size;
        {
            let mut failing = self.failing_pages.lock().await;
            if let Some(remaining) = failing.get_mut(&page_index) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CalendarError::Unavailable(format!(
                        "page {page_index} timed out"
                    )));
                }
            }
        }

        let guard = self.events.read().await;
        let mut matching: Vec<&ExternalEvent> = guard
            .values()
            .filter(|event| event.calendar_id == calendar_id)
            .filter(|event| {
                window.intersects(event.start.with_timezone(&Utc), event.end.with_timezone(&Utc))
            })
            .collect();
        matching.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));

        let events: Vec<ExternalEvent> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|event| (*event).clone())
            .collect();
        let next = offset + events.len();
        Ok(EventPage {
            events,
            next_page_token: (next < matching.len()).then(|| next.to_string()),
        })
    }

    async fn get_event(
        &self,
        calendar_id: &str,
        external_id: &str,
    ) -> Result<ExternalEvent, CalendarError> {
        self.ensure_online()?;
        if self.failing_reads.lock().await.contains(external_id) {
            return Err(CalendarError::Unavailable(format!(
                "reading {external_id} timed out"
            )));
        }
        self.get(calendar_id, external_id)
            .await
            .ok_or_else(|| CalendarError::NotFound(external_id.to_string()))
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &OutboundEvent,
    ) -> Result<String, CalendarError> {
        self.ensure_online()?;
        let delay = self.delay_create_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        let external_id = format!("ext-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.seed(Self::to_external(calendar_id, &external_id, event))
            .await;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(external_id)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        external_id: &str,
        event: &OutboundEvent,
    ) -> Result<(), CalendarError> {
        self.ensure_online()?;
        let mut guard = self.events.write().await;
        let key = (calendar_id.to_string(), external_id.to_string());
        let Some(current) = guard.get_mut(&key) else {
            return Err(CalendarError::NotFound(external_id.to_string()));
        };
        let mut updated = Self::to_external(calendar_id, external_id, event);
        updated.registration_event_id = current.registration_event_id.take();
        updated.extensions = std::mem::take(&mut current.extensions);
        *current = updated;
        Ok(())
    }

    async fn delete_event(
        &self,
        calendar_id: &str,
        external_id: &str,
    ) -> Result<(), CalendarError> {
        self.ensure_online()?;
        let removed = self
            .events
            .write()
            .await
            .remove(&(calendar_id.to_string(), external_id.to_string()));
        match removed {
            Some(_) => {
                self.deleted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(CalendarError::NotFound(external_id.to_string())),
        }
    }
}
