// Snapshot cache for reconciled calendar windows.
//
// Purpose
// - Serve a previously reconciled window without calling the calendar service again.
//
// Responsibilities
// - A snapshot is fresh until its TTL passes on the injected clock or it is invalidated.
// - A lookup is served from a fresh snapshot whose window covers the requested one.
// - Invalidation by calendar id, or by changed events (their id, or their calendar and span).
// - Snapshots are replaced whole under one write lock, so a reader never sees a torn one.
// - Every invalidation bumps an epoch per calendar. A snapshot built from reads that started
//   before the bump is stored already invalidated.
// - Stale entries are kept as markers for one more TTL, then dropped on the next store. A store
//   also drops stale entries its window covers.

use crate::modules::events::adapters::outbound::change_listener::{
    ChangedEvent, EventChangeListener,
};
use crate::modules::events::core::state::EventRecord;
use crate::shared::core::primitives::{Clock, TimeWindow};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Cache,
    GraphFallback,
    RegularLoad,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub calendar_id: String,
    pub window: TimeWindow,
    pub events: Vec<EventRecord>,
    pub stored_at: DateTime<Utc>,
}

impl Snapshot {
    fn contains_any(&self, changes: &[ChangedEvent]) -> bool {
        changes.iter().any(|change| {
            self.events.iter().any(|event| event.id == change.id)
                || (change.calendar_id.as_deref() == Some(self.calendar_id.as_str())
                    && self.window.intersects(change.start, change.end))
        })
    }

    /// The events of this snapshot that fall into `window`.
    pub fn within(&self, window: &TimeWindow) -> Vec<EventRecord> {
        self.events
            .iter()
            .filter(|event| window.intersects(event.start, event.end))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    snapshot: Arc<Snapshot>,
    invalidated_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Invalidated entries keep only their window and calendar.
    fn invalidate(&mut self, now: DateTime<Utc>) {
        self.invalidated_at = Some(now);
        if !self.snapshot.events.is_empty() {
            self.snapshot = Arc::new(Snapshot {
                events: Vec::new(),
                ..(*self.snapshot).clone()
            });
        }
    }
}

/// Invalidation counter read before a snapshot's records are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch {
    calendar: u64,
    unscoped: u64,
}

#[derive(Debug, Default)]
struct Epochs {
    per_calendar: HashMap<String, u64>,
    unscoped: u64,
}

impl Epochs {
    fn current(&self, calendar_id: &str) -> Epoch {
        Epoch {
            calendar: self.per_calendar.get(calendar_id).copied().unwrap_or(0),
            unscoped: self.unscoped,
        }
    }

    fn bump(&mut self, calendar_id: Option<&str>) {
        match calendar_id {
            Some(calendar_id) => *self.per_calendar.entry(calendar_id.to_string()).or_insert(0) += 1,
            None => self.unscoped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(Arc<Snapshot>),
    /// A snapshot existed for the calendar but has expired or was invalidated.
    Stale,
    Missing,
}

pub struct EventCache {
    entries: RwLock<HashMap<(String, TimeWindow), Entry>>,
    epochs: RwLock<Epochs>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl EventCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            epochs: RwLock::new(Epochs::default()),
            ttl,
            clock,
        }
    }

    fn stale_since(&self, entry: &Entry) -> DateTime<Utc> {
        let expires_at = entry.snapshot.stored_at + self.ttl;
        entry
            .invalidated_at
            .map_or(expires_at, |invalidated_at| invalidated_at.min(expires_at))
    }

    fn is_fresh_entry(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now < self.stale_since(entry)
    }

    pub async fn lookup(&self, calendar_id: &str, window: &TimeWindow) -> CacheLookup {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut seen = false;
        for ((calendar, _), entry) in entries.iter() {
            if calendar != calendar_id {
                continue;
            }
            let snapshot_window = &entry.snapshot.window;
            if !snapshot_window.intersects(window.start, window.end) {
                continue;
            }
            if snapshot_window.covers(window) && self.is_fresh_entry(entry, now) {
                debug!(calendar_id, "snapshot cache hit");
                return CacheLookup::Fresh(entry.snapshot.clone());
            }
            seen = true;
        }
        debug!(calendar_id, stale = seen, "snapshot cache miss");
        if seen {
            CacheLookup::Stale
        } else {
            CacheLookup::Missing
        }
    }

    pub async fn is_fresh(&self, calendar_id: &str, window: &TimeWindow) -> bool {
        matches!(self.lookup(calendar_id, window).await, CacheLookup::Fresh(_))
    }

    pub async fn epoch(&self, calendar_id: &str) -> Epoch {
        self.epochs.read().await.current(calendar_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Replaces the snapshot stored under the same calendar and window. The snapshot is stored
    /// invalidated when the calendar saw an invalidation since `observed` was read.
    pub async fn store(&self, snapshot: Snapshot, observed: Epoch) {
        let now = self.clock.now();
        let key = (snapshot.calendar_id.clone(), snapshot.window);
        let mut entries = self.entries.write().await;
        // Read under the entries lock so an invalidation cannot slip between check and insert.
        let moved = self.epochs.read().await.current(&snapshot.calendar_id) != observed;
        entries.retain(|(calendar, window), entry| {
            if self.is_fresh_entry(entry, now) {
                return true;
            }
            let superseded = *calendar == snapshot.calendar_id && snapshot.window.covers(window);
            !superseded && now < self.stale_since(entry) + self.ttl
        });
        let mut entry = Entry {
            snapshot: Arc::new(snapshot),
            invalidated_at: None,
        };
        if moved {
            debug!(
                calendar_id = entry.snapshot.calendar_id.as_str(),
                "snapshot stored invalidated, a write landed while it was built"
            );
            entry.invalidate(now);
        }
        entries.insert(key, entry);
    }

    pub async fn invalidate_calendar(&self, calendar_id: &str) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        self.epochs.write().await.bump(Some(calendar_id));
        let mut count = 0;
        for ((calendar, _), entry) in entries.iter_mut() {
            if calendar == calendar_id && entry.invalidated_at.is_none() {
                entry.invalidate(now);
                count += 1;
            }
        }
        count
    }

    pub async fn invalidate_events(&self, changes: &[ChangedEvent]) -> usize {
        if changes.is_empty() {
            return 0;
        }
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        {
            let mut epochs = self.epochs.write().await;
            for change in changes {
                epochs.bump(change.calendar_id.as_deref());
            }
        }
        let mut count = 0;
        for entry in entries.values_mut() {
            if entry.invalidated_at.is_none() && entry.snapshot.contains_any(changes) {
                entry.invalidate(now);
                count += 1;
            }
        }
        count
    }
}

#[async_trait::async_trait]
impl EventChangeListener for EventCache {
    async fn events_changed(&self, changes: &[ChangedEvent]) {
        let invalidated = self.invalidate_events(changes).await;
        if invalidated > 0 {
            debug!(events = changes.len(), invalidated, "snapshots invalidated");
        }
    }
}
