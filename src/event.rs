use std::io::BufRead;
use tokio::sync::mpsc;

use crate::dataset::{CategoryFilter, DatasetSummary, SourceTier, Version, WisdomEntry};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// A user intent, parsed from one line of input
  Intent(Intent),
  /// A result arriving from a background task
  Data(DataEvent),
}

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
  NewEntry,
  ChangeCategory(CategoryFilter),
  Copy,
  Speak,
  ToggleFavorite,
  ShareEntry,
  ShareApp,
  RefreshDataset,
  CheckUpdates,
  ApplyUpdate,
  DismissUpdate,
  Reset,
  Quit,
}

/// Results produced off the main loop
#[derive(Debug, Clone)]
pub enum DataEvent {
  /// An update check found a newer dataset release
  UpdateAvailable(DatasetSummary),
}

/// What the app tells the shell to present or perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
  EntryChanged(WisdomEntry),
  FavoritesChanged(usize),
  DbStatusChanged(SourceTier),
  Toast(String),
  UpdateAvailable { version: Version, total: u64 },
  /// Text the shell should place on the clipboard
  ClipboardPayload(String),
  /// Text the shell should speak aloud
  SpeechPayload(String),
  /// A share sheet payload
  SharePayload { title: String, text: String },
}

const USAGE: &str = "\
commands:
  <enter> | new      draw a new entry
  cat <name>         filter: all, motivational, philosophy, life, spiritual, eastern
  fav                toggle the current entry as a favorite
  copy               copy the current entry
  speak              speak the current entry
  share              share the current entry
  share app          share the app itself
  refresh            reload the dataset
  check              check for a dataset update
  update             apply a pending update (clears local state)
  later              dismiss the update notice
  reset              clear all local data
  quit               exit";

/// Parse one input line into an intent. An empty line draws a new entry,
/// matching the primary action. Help is handled by the reader itself.
pub fn parse_intent(line: &str) -> Option<Intent> {
  let line = line.trim().to_lowercase();
  if line.is_empty() {
    return Some(Intent::NewEntry);
  }

  let (head, rest) = match line.split_once(char::is_whitespace) {
    Some((head, rest)) => (head, rest.trim()),
    None => (line.as_str(), ""),
  };

  match (head, rest) {
    ("new" | "n", "") => Some(Intent::NewEntry),
    ("cat" | "category", name) => CategoryFilter::parse(name).map(Intent::ChangeCategory),
    ("copy", "") => Some(Intent::Copy),
    ("speak" | "say", "") => Some(Intent::Speak),
    ("fav" | "favorite", "") => Some(Intent::ToggleFavorite),
    ("share", "") => Some(Intent::ShareEntry),
    ("share", "app") => Some(Intent::ShareApp),
    ("refresh", "") => Some(Intent::RefreshDataset),
    ("check", "") => Some(Intent::CheckUpdates),
    ("update", "") => Some(Intent::ApplyUpdate),
    ("later" | "dismiss", "") => Some(Intent::DismissUpdate),
    ("reset", "") => Some(Intent::Reset),
    ("quit" | "q" | "exit", "") => Some(Intent::Quit),
    _ => None,
  }
}

/// Event handler that merges parsed input lines with background-task results
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler and spawn the input reader
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    spawn_stdin_reader(tx.clone());
    Self { tx, rx }
  }

  /// A sender for background tasks to report through
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Event>) {
  // Stdin has no async story worth the trouble; park a blocking task on it.
  tokio::task::spawn_blocking(move || {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
      let Ok(line) = line else { break };
      let trimmed = line.trim();

      if trimmed.eq_ignore_ascii_case("help") || trimmed == "?" {
        println!("{}", USAGE);
        continue;
      }

      match parse_intent(&line) {
        Some(intent) => {
          let quit = intent == Intent::Quit;
          if tx.send(Event::Intent(intent)).is_err() || quit {
            return;
          }
        }
        None => println!("Unrecognized command '{}' (try 'help')", trimmed),
      }
    }
    // Stdin closed: treat as quit
    let _ = tx.send(Event::Intent(Intent::Quit));
  });
}
