use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::version::Version;

/// The recognized wisdom categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Philosophy,
  Spiritual,
  Life,
  Motivational,
  Eastern,
}

impl Category {
  pub const ALL: [Category; 5] = [
    Category::Philosophy,
    Category::Spiritual,
    Category::Life,
    Category::Motivational,
    Category::Eastern,
  ];

  /// Parse the wire spelling. Anything unrecognized maps to `None`.
  pub fn parse(s: &str) -> Option<Category> {
    match s {
      "philosophy" => Some(Category::Philosophy),
      "spiritual" => Some(Category::Spiritual),
      "life" => Some(Category::Life),
      "motivational" => Some(Category::Motivational),
      "eastern" => Some(Category::Eastern),
      _ => None,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Category::Philosophy => "philosophy",
      Category::Spiritual => "spiritual",
      Category::Life => "life",
      Category::Motivational => "motivational",
      Category::Eastern => "eastern",
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// A category filter: either everything or one category bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
  #[default]
  All,
  Only(Category),
}

impl CategoryFilter {
  /// Parse "all" or a category name.
  pub fn parse(s: &str) -> Option<CategoryFilter> {
    if s == "all" {
      return Some(CategoryFilter::All);
    }
    Category::parse(s).map(CategoryFilter::Only)
  }

  pub fn name(&self) -> &'static str {
    match self {
      CategoryFilter::All => "all",
      CategoryFilter::Only(cat) => cat.name(),
    }
  }
}

impl fmt::Display for CategoryFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// A single wisdom entry.
///
/// Identity for favorites and membership tests is the (text, author) pair;
/// the category plays no part in it. `category` is `None` when the wire
/// document carried a spelling we do not recognize; such entries stay in
/// the flat list but join no category bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WisdomEntry {
  pub text: String,
  pub author: String,
  #[serde(default)]
  pub category: Option<Category>,
}

impl WisdomEntry {
  pub fn new(
    text: impl Into<String>,
    author: impl Into<String>,
    category: Option<Category>,
  ) -> Self {
    Self {
      text: text.into(),
      author: author.into(),
      category,
    }
  }

  /// The fixed placeholder served when no real entry is available.
  pub fn sentinel() -> Self {
    Self::new("No wisdom available.", "System", None)
  }

  /// Identity comparison on the (text, author) pair.
  pub fn same_quote(&self, other: &WisdomEntry) -> bool {
    self.text == other.text && self.author == other.author
  }
}

/// Which tier of the load chain produced the active dataset.
///
/// Displayed to the user as a status label rather than as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
  /// Fresh data from the network.
  Network,
  /// Adopted from the persisted cache record after a network failure.
  PersistedCache,
  /// The embedded dataset; nothing else was available.
  EmbeddedFallback,
}

impl SourceTier {
  pub fn status_label(&self) -> &'static str {
    match self {
      SourceTier::Network => "Online",
      SourceTier::PersistedCache => "Cached",
      SourceTier::EmbeddedFallback => "Offline",
    }
  }
}

impl fmt::Display for SourceTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.status_label())
  }
}

/// One fetched generation of the dataset.
///
/// The category index is derived from the flat list at construction and
/// stores positions into it, so a bucket can never hold an entry the flat
/// list lacks. Entries with an unrecognized category appear only in the
/// flat list.
#[derive(Debug, Clone)]
pub struct VersionedDataset {
  version: Version,
  fetched_at: DateTime<Utc>,
  entries: Vec<WisdomEntry>,
  buckets: HashMap<Category, Vec<usize>>,
}

impl VersionedDataset {
  pub fn new(version: Version, fetched_at: DateTime<Utc>, entries: Vec<WisdomEntry>) -> Self {
    let mut buckets: HashMap<Category, Vec<usize>> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
      if let Some(cat) = entry.category {
        buckets.entry(cat).or_default().push(i);
      }
    }
    Self {
      version,
      fetched_at,
      entries,
      buckets,
    }
  }

  pub fn version(&self) -> Version {
    self.version
  }

  pub fn fetched_at(&self) -> DateTime<Utc> {
    self.fetched_at
  }

  /// The flat "all" list, in wire order.
  pub fn all(&self) -> &[WisdomEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Number of entries under a filter.
  pub fn bucket_len(&self, filter: CategoryFilter) -> usize {
    match filter {
      CategoryFilter::All => self.entries.len(),
      CategoryFilter::Only(cat) => self.buckets.get(&cat).map_or(0, Vec::len),
    }
  }

  /// The i-th entry under a filter, in wire order.
  pub fn bucket_get(&self, filter: CategoryFilter, i: usize) -> Option<&WisdomEntry> {
    match filter {
      CategoryFilter::All => self.entries.get(i),
      CategoryFilter::Only(cat) => {
        let idx = *self.buckets.get(&cat)?.get(i)?;
        self.entries.get(idx)
      }
    }
  }
}

/// What an update check learns about the remote dataset: its version and
/// advertised entry count, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetSummary {
  pub version: Version,
  pub total: u64,
}

/// Wire form persisted under the `wisdomData` key.
///
/// Only the flat list is stored; the bucket index is rebuilt on load, which
/// is what keeps a reloaded dataset identical to the persisted one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
  pub version: Version,
  pub fetched_at: DateTime<Utc>,
  pub entries: Vec<WisdomEntry>,
}

impl From<&VersionedDataset> for CacheRecord {
  fn from(ds: &VersionedDataset) -> Self {
    Self {
      version: ds.version,
      fetched_at: ds.fetched_at,
      entries: ds.entries.clone(),
    }
  }
}

impl From<CacheRecord> for VersionedDataset {
  fn from(record: CacheRecord) -> Self {
    VersionedDataset::new(record.version, record.fetched_at, record.entries)
  }
}
