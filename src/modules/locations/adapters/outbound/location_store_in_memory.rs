// In memory implementation of the LocationStore port.

use crate::modules::locations::adapters::outbound::location_store::LocationStore;
use crate::modules::locations::core::location::Location;
use crate::shared::infrastructure::record_store::{StoreError, Versioned};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryLocationStore {
    inner: RwLock<HashMap<String, Versioned<Location>>>,
    offline: AtomicBool,
}

impl InMemoryLocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_offline(&self) {
        self.offline.fetch_xor(true, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("Location store offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LocationStore for InMemoryLocationStore {
    async fn load(&self, id: &str) -> Result<Option<Versioned<Location>>, StoreError> {
        self.ensure_online()?;
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn insert(&self, location: Location) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let mut guard = self.inner.write().await;
        if guard.contains_key(&location.id) {
            return Err(StoreError::Duplicate(location.id));
        }
        guard.insert(location.id.clone(), Versioned::new(location, 1));
        Ok(1)
    }

    async fn save(&self, location: Location, expected_version: u64) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let mut guard = self.inner.write().await;
        let Some(current) = guard.get_mut(&location.id) else {
            return Err(StoreError::NotFound(location.id));
        };
        if current.version != expected_version {
            return Err(StoreError::VersionMismatch {
                id: location.id,
                expected: expected_version,
                actual: current.version,
            });
        }
        let version = current.version + 1;
        *current = Versioned::new(location, version);
        Ok(version)
    }

    async fn list(&self) -> Result<Vec<Versioned<Location>>, StoreError> {
        self.ensure_online()?;
        let guard = self.inner.read().await;
        let mut locations: Vec<Versioned<Location>> = guard.values().cloned().collect();
        locations.sort_by(|a, b| {
            a.record
                .name
                .to_lowercase()
                .cmp(&b.record.name.to_lowercase())
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        Ok(locations)
    }

    async fn adjust_usage(&self, id: &str, delta: i64) -> Result<u64, StoreError> {
        self.ensure_online()?;
        let mut guard = self.inner.write().await;
        let Some(current) = guard.get_mut(id) else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        let count = current.record.usage_count;
        current.record.usage_count = if delta >= 0 {
            count.saturating_add(delta.unsigned_abs())
        } else {
            count.saturating_sub(delta.unsigned_abs())
        };
        current.version += 1;
        Ok(current.record.usage_count)
    }
}

#[cfg(test)]
mod in_memory_location_store_tests {
    use super::*;
    use crate::tests::fixtures::LocationBuilder;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn it_should_adjust_usage_without_going_below_zero() {
        let store = InMemoryLocationStore::new();
        store
            .insert(LocationBuilder::new().id("loc-1").usage_count(2).build())
            .await
            .unwrap();
        assert_eq!(store.adjust_usage("loc-1", 3).await, Ok(5));
        assert_eq!(store.adjust_usage("loc-1", -9).await, Ok(0));
        assert_eq!(
            store.adjust_usage("loc-9", 1).await,
            Err(StoreError::NotFound("loc-9".into()))
        );
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_bump_the_version_on_usage_changes() {
        let store = InMemoryLocationStore::new();
        let location = LocationBuilder::new().id("loc-1").build();
        store.insert(location.clone()).await.unwrap();
        store.adjust_usage("loc-1", 1).await.unwrap();
        assert!(matches!(
            store.save(location, 1).await,
            Err(StoreError::VersionMismatch { actual: 2, .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_list_locations_by_name() {
        let store = InMemoryLocationStore::new();
        store
            .insert(LocationBuilder::new().id("loc-2").name("kitchen").build())
            .await
            .unwrap();
        store
            .insert(LocationBuilder::new().id("loc-1").name("Chapel").build())
            .await
            .unwrap();
        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.record.name)
            .collect();
        assert_eq!(names, vec!["Chapel".to_string(), "kitchen".to_string()]);
    }
}
