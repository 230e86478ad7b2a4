//! Serde-deserializable types matching the remote dataset document.
//!
//! These are separate from the domain types so deserialization can stay
//! permissive (unknown fields, missing counts) while the domain types keep
//! their invariants.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;

use super::types::{Category, DatasetSummary, VersionedDataset, WisdomEntry};
use super::version::Version;

/// The full dataset document.
#[derive(Debug, Deserialize)]
pub struct ApiDataset {
  pub version: String,
  #[serde(default)]
  pub total_wisdom: u64,
  #[serde(default)]
  pub wisdom_entries: Vec<ApiEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ApiEntry {
  pub text: String,
  pub author: String,
  #[serde(default)]
  pub category: String,
}

/// The subset of the document an update check needs. Leaves the entry list
/// untouched so version polls stay cheap to parse.
#[derive(Debug, Deserialize)]
pub struct ApiDatasetSummary {
  pub version: String,
  #[serde(default)]
  pub total_wisdom: u64,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl ApiDataset {
  /// Build the domain dataset, stamped with the fetch time.
  ///
  /// A malformed version string is a schema violation and fails the whole
  /// conversion. Unrecognized entry categories do not: those entries keep
  /// `category: None` and stay out of the buckets.
  pub fn into_dataset(self, fetched_at: DateTime<Utc>) -> Result<VersionedDataset> {
    let version: Version = self
      .version
      .parse()
      .map_err(|e| eyre!("Failed to parse dataset version: {}", e))?;

    let entries = self
      .wisdom_entries
      .into_iter()
      .map(|e| WisdomEntry::new(e.text, e.author, Category::parse(&e.category)))
      .collect();

    Ok(VersionedDataset::new(version, fetched_at, entries))
  }
}

impl ApiDatasetSummary {
  pub fn into_summary(self) -> Result<DatasetSummary> {
    let version: Version = self
      .version
      .parse()
      .map_err(|e| eyre!("Failed to parse dataset version: {}", e))?;
    Ok(DatasetSummary {
      version,
      total: self.total_wisdom,
    })
  }
}
