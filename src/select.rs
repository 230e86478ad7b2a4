//! Random selection over the active dataset, plus the lifetime view counter.

use std::sync::Arc;
use tracing::warn;

use crate::dataset::{CategoryFilter, VersionedDataset, WisdomEntry};
use crate::store::{keys, StateStore};

pub struct SelectionEngine<S> {
  store: S,
  rng: fastrand::Rng,
  dataset: Option<Arc<VersionedDataset>>,
  filter: CategoryFilter,
  current: Option<WisdomEntry>,
  view_count: u64,
}

impl<S: StateStore> SelectionEngine<S> {
  pub fn new(store: S) -> Self {
    Self::with_rng(store, fastrand::Rng::new())
  }

  /// Construct with an explicit RNG. Tests pass a seeded one.
  pub fn with_rng(store: S, rng: fastrand::Rng) -> Self {
    let view_count = load_count(&store);
    Self {
      store,
      rng,
      dataset: None,
      filter: CategoryFilter::default(),
      current: None,
      view_count,
    }
  }

  /// Swap in a newly loaded dataset. The current entry and filter are kept;
  /// the next draw uses the new data.
  pub fn set_dataset(&mut self, dataset: Arc<VersionedDataset>) {
    self.dataset = Some(dataset);
  }

  pub fn filter(&self) -> CategoryFilter {
    self.filter
  }

  pub fn set_filter(&mut self, filter: CategoryFilter) {
    self.filter = filter;
  }

  /// The entry shown right now, if a draw has happened.
  pub fn current(&self) -> Option<&WisdomEntry> {
    self.current.as_ref()
  }

  pub fn view_count(&self) -> u64 {
    self.view_count
  }

  /// Draw an entry uniformly at random from the active bucket.
  ///
  /// An empty bucket degrades to the first entry of the full list, and an
  /// empty dataset to the sentinel entry. Every draw counts as a view and
  /// the counter is persisted as it moves.
  pub fn draw(&mut self) -> WisdomEntry {
    let entry = self.pick();
    self.current = Some(entry.clone());
    self.view_count += 1;
    if let Err(e) = self
      .store
      .put(keys::WISDOM_COUNT, &self.view_count.to_string())
    {
      warn!("Failed to persist view count: {}", e);
    }
    entry
  }

  fn pick(&mut self) -> WisdomEntry {
    let Some(dataset) = &self.dataset else {
      return WisdomEntry::sentinel();
    };

    let len = dataset.bucket_len(self.filter);
    if len > 0 {
      let i = self.rng.usize(..len);
      if let Some(entry) = dataset.bucket_get(self.filter, i) {
        return entry.clone();
      }
    }

    match dataset.all().first() {
      Some(entry) => entry.clone(),
      None => WisdomEntry::sentinel(),
    }
  }
}

fn load_count<S: StateStore>(store: &S) -> u64 {
  match store.get(keys::WISDOM_COUNT) {
    Ok(Some(raw)) => raw.trim().parse().unwrap_or_default(),
    Ok(None) => 0,
    Err(e) => {
      warn!("Failed to read view count: {}", e);
      0
    }
  }
}
