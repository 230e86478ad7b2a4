//! Thin presentation layer: formats signals onto stdout.
//!
//! No decisions are made here. The app controller says what happened; this
//! module only chooses the words.

use crate::event::Signal;

pub fn emit(signal: &Signal) {
  println!("{}", render(signal));
}

fn render(signal: &Signal) -> String {
  match signal {
    Signal::EntryChanged(entry) => {
      let mut out = format!("\n  \"{}\"\n  - {}", entry.text, entry.author);
      if let Some(category) = entry.category {
        out.push_str(&format!("  [{}]", category.name()));
      }
      out
    }
    Signal::FavoritesChanged(count) => format!("favorites: {}", count),
    Signal::DbStatusChanged(tier) => format!("status: {}", tier.status_label()),
    Signal::Toast(message) => format!("* {}", message),
    Signal::UpdateAvailable { version, total } => format!(
      "Update available: dataset {} ({} entries). Type 'update' to apply or 'later' to dismiss.",
      version, total
    ),
    Signal::ClipboardPayload(text) => format!("[clipboard] {}", text),
    Signal::SpeechPayload(text) => format!("[speech] {}", text),
    Signal::SharePayload { title, text } => format!("[share] {}\n{}", title, text),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dataset::{Category, SourceTier, Version, WisdomEntry};

  #[test]
  fn test_render_entry_with_category() {
    let entry = WisdomEntry::new("Know thyself.", "Socrates", Some(Category::Philosophy));
    let out = render(&Signal::EntryChanged(entry));
    assert!(out.contains("\"Know thyself.\""));
    assert!(out.contains("- Socrates"));
    assert!(out.contains("[philosophy]"));
  }

  #[test]
  fn test_render_entry_without_category() {
    let entry = WisdomEntry::new("Plain.", "Nobody", None);
    let out = render(&Signal::EntryChanged(entry));
    assert!(!out.contains('['));
  }

  #[test]
  fn test_render_status_labels() {
    let out = render(&Signal::DbStatusChanged(SourceTier::PersistedCache));
    assert_eq!(out, "status: Cached");
  }

  #[test]
  fn test_render_update_notice_names_version() {
    let out = render(&Signal::UpdateAvailable {
      version: Version::new(2, 1, 0),
      total: 64,
    });
    assert!(out.contains("2.1.0"));
    assert!(out.contains("64"));
  }
}
