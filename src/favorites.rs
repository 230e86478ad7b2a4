//! The favorites ledger.
//!
//! Membership is keyed on the (text, author) pair, so the same quote stays a
//! single favorite even when it reappears under another category or in a new
//! dataset release. Order is insertion order, and every mutation is written
//! through to the store.

use tracing::warn;

use crate::dataset::WisdomEntry;
use crate::store::{keys, StateStore};

pub struct FavoritesLedger<S> {
  store: S,
  entries: Vec<WisdomEntry>,
}

impl<S: StateStore> FavoritesLedger<S> {
  /// Load the ledger from the store. A missing or unreadable ledger starts
  /// empty rather than failing the app.
  pub fn load(store: S) -> Self {
    let entries = match store.get_json::<Vec<WisdomEntry>>(keys::WISDOM_FAVORITES) {
      Ok(Some(entries)) => entries,
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!("Failed to read favorites, starting empty: {}", e);
        Vec::new()
      }
    };
    Self { store, entries }
  }

  /// Add the entry if absent, remove it if present. Returns `true` when the
  /// entry ended up in the ledger.
  pub fn toggle(&mut self, entry: &WisdomEntry) -> bool {
    let added = match self.position(entry) {
      Some(i) => {
        self.entries.remove(i);
        false
      }
      None => {
        self.entries.push(entry.clone());
        true
      }
    };
    self.persist();
    added
  }

  pub fn contains(&self, entry: &WisdomEntry) -> bool {
    self.position(entry).is_some()
  }

  /// Favorites in the order they were added.
  pub fn entries(&self) -> &[WisdomEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn position(&self, entry: &WisdomEntry) -> Option<usize> {
    self.entries.iter().position(|e| e.same_quote(entry))
  }

  fn persist(&self) {
    if let Err(e) = self.store.put_json(keys::WISDOM_FAVORITES, &self.entries) {
      warn!("Failed to persist favorites: {}", e);
    }
  }
}
