// In memory implementation of the EventRecordStore port.
//
// Purpose
// - Support handler tests and local development without a database.
//
// Responsibilities
// - Keep one versioned record per id.
// - Enforce optimistic concurrency by checking the expected version on save.
// - Offer failure and latency knobs for race and outage tests.

use crate::modules::events::adapters::outbound::event_records::{EventFilter, EventRecordStore};
use crate::modules::events::core::state::EventRecord;
use crate::shared::infrastructure::record_store::{StoreError, Versioned};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;

#[derive(Default)]
pub struct InMemoryEventRecords {
    inner: RwLock<HashMap<String, Versioned<EventRecord>>>,
    offline: AtomicBool,
    fail_saves: AtomicBool,
    delay_save_ms: AtomicU64,
    delay_list_ms: AtomicU64,
}

impl InMemoryEventRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    /// Reads keep working while saves fail. Used to exercise compensation paths.
    pub fn toggle_failing_saves(&self) {
        self.fail_saves.fetch_xor(true, Ordering::SeqCst);
    }

    pub fn set_delay_save_ms(&self, ms: u64) {
        self.delay_save_ms.store(ms, Ordering::SeqCst);
    }

    /// Delays `list` after the records were read, so writes can land behind the caller's view.
    pub fn set_delay_list_ms(&self, ms: u64) {
        self.delay_list_ms.store(ms, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("Event store offline".into()));
        }
        Ok(())
    }

    async fn find_where<F>(&self, predicate: F) -> Result<Option<Versioned<EventRecord>>, StoreError>
    where
        F: Fn(&EventRecord) -> bool + Send,
    {
        self.ensure_online()?;
        let guard = self.inner.read().await;
        Ok(guard.values().find(|v| predicate(&v.record)).cloned())
    }
}

#[async_trait::async_trait]
impl EventRecordStore for InMemoryEventRecords {
    async fn load(&self, id: &str) -> Result<Option<Versioned<EventRecord>>, StoreError> {
        self.ensure_online()?;
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Versioned<EventRecord>>, StoreError> {
        self.find_where(|record| record.external_id.as_deref() == Some(external_id))
            .await
    }

    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<Versioned<EventRecord>>, StoreError> {
        self.find_where(|record| record.event_id == event_id).await
    }

    async fn insert(&self, record: EventRecord) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let mut guard = self.inner.write().await;
        if guard.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        guard.insert(record.id.clone(), Versioned::new(record, 1));
        Ok(1)
    }

    async fn save(&self, record: EventRecord, expected_version: u64) -> Result<u64, StoreError> {
        self.ensure_online()?;
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("Event store rejected the write".into()));
        }
        let delay = self.delay_save_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        let mut guard = self.inner.write().await;
        let Some(current) = guard.get_mut(&record.id) else {
            return Err(StoreError::NotFound(record.id));
        };
        if current.version != expected_version {
            return Err(StoreError::VersionMismatch {
                id: record.id,
                expected: expected_version,
                actual: current.version,
            });
        }
        let version = current.version + 1;
        *current = Versioned::new(record, version);
        Ok(version)
    }

    async fn list(&self, filter: &EventFilter) -> Result<Vec<Versioned<EventRecord>>, StoreError> {
        self.ensure_online()?;
        let guard = self.inner.read().await;
        let mut records: Vec<Versioned<EventRecord>> = guard
            .values()
            .filter(|v| filter.matches(&v.record))
            .cloned()
            .collect();
        drop(guard);
        records.sort_by(|a, b| {
            a.record
                .start
                .cmp(&b.record.start)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        let delay = self.delay_list_ms.load(Ordering::SeqCst);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }
        Ok(records)
    }

    async fn ids_referencing_location(&self, location_id: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_online()?;
        let guard = self.inner.read().await;
        let mut ids: Vec<String> = guard
            .values()
            .filter(|v| v.record.references_location(location_id))
            .map(|v| v.record.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
