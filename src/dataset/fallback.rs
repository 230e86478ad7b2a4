//! The embedded fallback dataset.
//!
//! Served when the network fails and no persisted record exists. This path
//! must never fail, so the data lives in the binary.

use chrono::Utc;

use super::types::{Category, VersionedDataset, WisdomEntry};
use super::version::Version;

/// Version tag for the embedded data. Matches the baseline the update
/// checker assumes when no version was ever persisted, so any published
/// dataset newer than the baseline is offered as an update.
pub const FALLBACK_VERSION: Version = Version::new(1, 0, 0);

const ENTRIES: &[(&str, &str, Category)] = &[
  (
    "The only true wisdom is in knowing you know nothing.",
    "Socrates",
    Category::Philosophy,
  ),
  (
    "I think, therefore I am.",
    "René Descartes",
    Category::Philosophy,
  ),
  (
    "The journey of a thousand miles begins with one step.",
    "Lao Tzu",
    Category::Spiritual,
  ),
  (
    "The purpose of our lives is to be happy.",
    "Dalai Lama",
    Category::Spiritual,
  ),
  (
    "Be the change you wish to see in the world.",
    "Mahatma Gandhi",
    Category::Life,
  ),
  (
    "Life is what happens to you while you're busy making other plans.",
    "John Lennon",
    Category::Life,
  ),
  ("Turn your wounds into wisdom.", "Oprah Winfrey", Category::Life),
  (
    "In the middle of difficulty lies opportunity.",
    "Albert Einstein",
    Category::Motivational,
  ),
  (
    "The only way to do great work is to love what you do.",
    "Steve Jobs",
    Category::Motivational,
  ),
  ("What we think, we become.", "Buddha", Category::Eastern),
  (
    "The mind is everything. What you think you become.",
    "Buddha",
    Category::Eastern,
  ),
];

/// Build the embedded dataset, stamped with the current time.
pub fn dataset() -> VersionedDataset {
  let entries = ENTRIES
    .iter()
    .map(|(text, author, category)| WisdomEntry::new(*text, *author, Some(*category)))
    .collect();
  VersionedDataset::new(FALLBACK_VERSION, Utc::now(), entries)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dataset::types::CategoryFilter;

  #[test]
  fn test_at_least_ten_entries() {
    assert!(dataset().len() >= 10);
  }

  #[test]
  fn test_spans_every_category() {
    let ds = dataset();
    for cat in Category::ALL {
      assert!(
        ds.bucket_len(CategoryFilter::Only(cat)) > 0,
        "no fallback entries for {}",
        cat
      );
    }
  }

  #[test]
  fn test_no_duplicate_quotes() {
    let ds = dataset();
    for (i, a) in ds.all().iter().enumerate() {
      for b in ds.all().iter().skip(i + 1) {
        assert!(!a.same_quote(b), "duplicate fallback entry: {}", a.text);
      }
    }
  }
}
