//! Layered dataset loading.
//!
//! A load walks three tiers in order: the network, the persisted copy from a
//! previous run, and the embedded fallback compiled into the binary. Loading
//! never fails; it only degrades, and the caller learns which tier served it.

use chrono::Utc;
use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::fallback;
use super::types::{CacheRecord, SourceTier, VersionedDataset};
use crate::store::{keys, StateStore};

pub struct DatasetCache<S> {
  store: S,
  active: Option<(Arc<VersionedDataset>, SourceTier)>,
}

impl<S: StateStore> DatasetCache<S> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      active: None,
    }
  }

  /// Load a dataset through the tier chain. `fetch` performs the network
  /// request; on success the result is persisted for offline starts before
  /// it is returned.
  pub async fn load<F, Fut>(&mut self, fetch: F) -> (Arc<VersionedDataset>, SourceTier)
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<VersionedDataset>>,
  {
    match fetch().await {
      Ok(dataset) => {
        self.persist(&dataset);
        return self.activate(dataset, SourceTier::Network);
      }
      Err(e) => debug!("Network load failed, trying persisted copy: {}", e),
    }

    match self.persisted() {
      Ok(Some(dataset)) => return self.activate(dataset, SourceTier::PersistedCache),
      Ok(None) => debug!("No persisted dataset, using embedded fallback"),
      Err(e) => warn!("Failed to read persisted dataset: {}", e),
    }

    self.activate(fallback::dataset(), SourceTier::EmbeddedFallback)
  }

  /// The dataset most recently produced by `load`, if any.
  pub fn active(&self) -> Option<(Arc<VersionedDataset>, SourceTier)> {
    self.active.clone()
  }

  fn activate(
    &mut self,
    dataset: VersionedDataset,
    tier: SourceTier,
  ) -> (Arc<VersionedDataset>, SourceTier) {
    let entry = (Arc::new(dataset), tier);
    self.active = Some(entry.clone());
    entry
  }

  /// Persist a freshly fetched dataset. A storage failure costs us the
  /// offline copy, not the dataset we just fetched, so it is logged and
  /// swallowed.
  fn persist(&self, dataset: &VersionedDataset) {
    if let Err(e) = self.try_persist(dataset) {
      warn!("Failed to persist dataset: {}", e);
    }
  }

  fn try_persist(&self, dataset: &VersionedDataset) -> Result<()> {
    self
      .store
      .put_json(keys::WISDOM_DATA, &CacheRecord::from(dataset))?;
    self
      .store
      .put(keys::WISDOM_VERSION, &dataset.version().to_string())?;
    self.store.put(keys::LAST_UPDATE, &Utc::now().to_rfc3339())?;
    Ok(())
  }

  fn persisted(&self) -> Result<Option<VersionedDataset>> {
    let record = self.store.get_json::<CacheRecord>(keys::WISDOM_DATA)?;
    Ok(record.map(VersionedDataset::from))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dataset::types::WisdomEntry;
  use crate::dataset::Version;
  use crate::store::testing::BrokenStore;
  use crate::store::SqliteStore;
  use color_eyre::eyre::eyre;

  fn sample_dataset(version: &str) -> VersionedDataset {
    let entries = vec![
      WisdomEntry::new("First.", "Author A", None),
      WisdomEntry::new("Second.", "Author B", None),
    ];
    VersionedDataset::new(version.parse().unwrap(), Utc::now(), entries)
  }

  #[tokio::test]
  async fn test_network_load_persists_and_reports_online() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut cache = DatasetCache::new(store.clone());

    let (dataset, tier) = cache.load(|| async { Ok(sample_dataset("2.1.0")) }).await;

    assert_eq!(tier, SourceTier::Network);
    assert_eq!(dataset.version(), Version::new(2, 1, 0));
    assert_eq!(
      store.get(keys::WISDOM_VERSION).unwrap().as_deref(),
      Some("2.1.0")
    );
    assert!(store.get(keys::WISDOM_DATA).unwrap().is_some());
    let stamp = store.get(keys::LAST_UPDATE).unwrap().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
  }

  #[tokio::test]
  async fn test_offline_load_serves_persisted_copy() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut cache = DatasetCache::new(store.clone());
    cache.load(|| async { Ok(sample_dataset("3.0.0")) }).await;

    let (dataset, tier) = cache.load(|| async { Err(eyre!("network down")) }).await;

    assert_eq!(tier, SourceTier::PersistedCache);
    assert_eq!(dataset.version(), Version::new(3, 0, 0));
    assert_eq!(dataset.all().len(), 2);
  }

  #[tokio::test]
  async fn test_first_offline_run_serves_embedded_fallback() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut cache = DatasetCache::new(store);

    let (dataset, tier) = cache.load(|| async { Err(eyre!("network down")) }).await;

    assert_eq!(tier, SourceTier::EmbeddedFallback);
    assert_eq!(dataset.version(), fallback::FALLBACK_VERSION);
    assert!(!dataset.all().is_empty());
  }

  #[tokio::test]
  async fn test_corrupt_persisted_copy_falls_through_to_fallback() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.put(keys::WISDOM_DATA, "{not json").unwrap();
    let mut cache = DatasetCache::new(store);

    let (_, tier) = cache.load(|| async { Err(eyre!("network down")) }).await;

    assert_eq!(tier, SourceTier::EmbeddedFallback);
  }

  #[tokio::test]
  async fn test_storage_failure_does_not_cost_the_fetched_dataset() {
    let mut cache = DatasetCache::new(BrokenStore);

    let (dataset, tier) = cache.load(|| async { Ok(sample_dataset("1.2.3")) }).await;

    assert_eq!(tier, SourceTier::Network);
    assert_eq!(dataset.version(), Version::new(1, 2, 3));
  }

  #[tokio::test]
  async fn test_active_tracks_last_load() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let mut cache = DatasetCache::new(store);
    assert!(cache.active().is_none());

    cache.load(|| async { Ok(sample_dataset("2.0.0")) }).await;

    let (dataset, tier) = cache.active().unwrap();
    assert_eq!(tier, SourceTier::Network);
    assert_eq!(dataset.version(), Version::new(2, 0, 0));
  }
}
