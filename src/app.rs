use crate::config::Config;
use crate::dataset::{DatasetCache, DatasetClient, DatasetSummary, SourceTier, WisdomEntry};
use crate::event::{DataEvent, Event, EventHandler, Intent, Signal};
use crate::favorites::FavoritesLedger;
use crate::select::SelectionEngine;
use crate::store::{SqliteStore, StateStore};
use crate::ui;
use crate::update::{spawn_poller, CheckReason, UpdatePoller};
use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

type Store = Arc<SqliteStore>;

/// Main application state
pub struct App {
  /// Application configuration
  config: Config,

  /// Store shared by every component
  store: Store,

  /// Remote dataset client
  client: DatasetClient,

  /// Tiered dataset loader
  cache: DatasetCache<Store>,

  /// Random draws and the view counter
  selection: SelectionEngine<Store>,

  /// Favorites ledger
  favorites: FavoritesLedger<Store>,

  /// Update checker
  poller: Arc<UpdatePoller<Store>>,

  /// Trigger line into the poll loop, once it runs
  poll_tx: Option<mpsc::UnboundedSender<CheckReason>>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Which tier served the active dataset
  tier: Option<SourceTier>,

  /// An update the poller found but the user has not acted on
  pending_update: Option<DatasetSummary>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let store = open_store(&config)?;
    Self::with_store(config, store)
  }

  fn with_store(config: Config, store: Store) -> Result<Self> {
    let http = crate::dataset::build_http_client(config.fetch_timeout())?;
    let client = DatasetClient::new(config.data_url()?, http);
    let poller = Arc::new(UpdatePoller::new(store.clone(), config.dismiss_window()));
    let (tx, _rx) = mpsc::unbounded_channel();

    Ok(Self {
      cache: DatasetCache::new(store.clone()),
      selection: SelectionEngine::new(store.clone()),
      favorites: FavoritesLedger::load(store.clone()),
      poller,
      store,
      config,
      client,
      poll_tx: None,
      event_tx: tx,
      tier: None,
      pending_update: None,
      should_quit: false,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new();
    self.event_tx = events.sender();

    self.startup().await;

    while !self.should_quit {
      match events.next().await {
        Some(event) => self.handle_event(event).await,
        None => break,
      }
    }

    Ok(())
  }

  /// First load, first draw, then the background poller. The load is
  /// awaited so there is always an active dataset before the first intent.
  async fn startup(&mut self) {
    info!("Loading dataset");
    self.refresh_dataset(false).await;
    self.emit(Signal::FavoritesChanged(self.favorites.len()));
    self.start_poller();
  }

  async fn handle_event(&mut self, event: Event) {
    match event {
      Event::Intent(intent) => self.handle_intent(intent).await,
      Event::Data(data) => self.handle_data(data),
    }
  }

  async fn handle_intent(&mut self, intent: Intent) {
    match intent {
      Intent::NewEntry => self.draw_entry(),
      Intent::ChangeCategory(filter) => {
        self.selection.set_filter(filter);
        self.emit(Signal::Toast(format!("Category: {}", filter.name())));
        self.draw_entry();
      }
      Intent::Copy => {
        if let Some(entry) = self.selection.current().cloned() {
          self.emit(Signal::ClipboardPayload(format_quote(&entry)));
          self.emit(Signal::Toast("Copied to clipboard".to_string()));
        }
      }
      Intent::Speak => {
        if let Some(entry) = self.selection.current() {
          let line = format!("{} by {}", entry.text, entry.author);
          self.emit(Signal::SpeechPayload(line));
        }
      }
      Intent::ToggleFavorite => self.toggle_favorite(),
      Intent::ShareEntry => {
        if let Some(entry) = self.selection.current().cloned() {
          self.emit(Signal::SharePayload {
            title: "Wisdom Cards".to_string(),
            text: format_quote(&entry),
          });
        }
      }
      Intent::ShareApp => {
        self.emit(Signal::SharePayload {
          title: "Wisdom Cards".to_string(),
          text: "Daily wisdom and inspiration.".to_string(),
        });
      }
      Intent::RefreshDataset => self.refresh_dataset(true).await,
      Intent::CheckUpdates => {
        self.emit(Signal::Toast("Checking for updates".to_string()));
        if let Some(tx) = &self.poll_tx {
          let _ = tx.send(CheckReason::Manual);
        }
      }
      Intent::ApplyUpdate => self.apply_update().await,
      Intent::DismissUpdate => {
        self.poller.dismiss();
        self.pending_update = None;
      }
      Intent::Reset => self.reset().await,
      Intent::Quit => self.should_quit = true,
    }
  }

  fn handle_data(&mut self, data: DataEvent) {
    match data {
      DataEvent::UpdateAvailable(summary) => {
        self.pending_update = Some(summary);
        self.emit(Signal::UpdateAvailable {
          version: summary.version,
          total: summary.total,
        });
      }
    }
  }

  /// Load through the tier chain, adopt the result, draw a fresh entry.
  async fn refresh_dataset(&mut self, announce: bool) {
    let (dataset, tier) = self.cache.load(|| self.client.fetch_dataset()).await;

    let came_back_online =
      matches!(self.tier, Some(prev) if prev != SourceTier::Network) && tier == SourceTier::Network;
    self.tier = Some(tier);
    self.selection.set_dataset(dataset);

    self.emit(Signal::DbStatusChanged(tier));
    match tier {
      SourceTier::Network => {}
      SourceTier::PersistedCache => {
        self.emit(Signal::Toast("Using cached wisdom data".to_string()))
      }
      SourceTier::EmbeddedFallback => {
        self.emit(Signal::Toast("Using offline wisdom data".to_string()))
      }
    }

    self.draw_entry();
    if announce {
      self.emit(Signal::Toast("Wisdom refreshed".to_string()));
    }

    // Connectivity came back; the dataset on disk may lag the release.
    if came_back_online {
      if let Some(tx) = &self.poll_tx {
        let _ = tx.send(CheckReason::BackOnline);
      }
    }
  }

  fn draw_entry(&mut self) {
    let entry = self.selection.draw();
    self.emit(Signal::EntryChanged(entry));
  }

  fn toggle_favorite(&mut self) {
    let Some(entry) = self.selection.current().cloned() else {
      return;
    };
    let added = self.favorites.toggle(&entry);
    self.emit(Signal::FavoritesChanged(self.favorites.len()));
    let note = if added {
      "Added to favorites"
    } else {
      "Removed from favorites"
    };
    self.emit(Signal::Toast(note.to_string()));
  }

  /// Apply a pending dataset update: clear everything local and load fresh,
  /// the way the original shipped updates by reloading from zero.
  async fn apply_update(&mut self) {
    if self.pending_update.is_none() {
      self.emit(Signal::Toast("No update is pending".to_string()));
      return;
    }

    info!("Applying dataset update");
    self.clear_local_state();
    self.pending_update = None;
    self.refresh_dataset(false).await;
    self.emit(Signal::Toast("Update applied".to_string()));
  }

  async fn reset(&mut self) {
    info!("Clearing all local data");
    self.clear_local_state();
    self.pending_update = None;
    self.emit(Signal::FavoritesChanged(0));
    self.emit(Signal::Toast("All data cleared".to_string()));
    self.refresh_dataset(false).await;
  }

  fn clear_local_state(&mut self) {
    if let Err(e) = self.store.clear() {
      warn!("Failed to clear local state: {}", e);
    }
    self.selection = SelectionEngine::new(self.store.clone());
    self.favorites = FavoritesLedger::load(self.store.clone());
  }

  fn start_poller(&mut self) {
    let client = self.client.clone();
    let fetch = move || {
      let client = client.clone();
      async move { client.fetch_summary().await }
    };
    let poll_tx = spawn_poller(
      self.poller.clone(),
      fetch,
      self.event_tx.clone(),
      self.config.poll_schedule(),
    );
    self.poll_tx = Some(poll_tx);
  }

  fn emit(&self, signal: Signal) {
    ui::emit(&signal);
  }
}

fn format_quote(entry: &WisdomEntry) -> String {
  format!("\"{}\" - {}", entry.text, entry.author)
}

fn open_store(config: &Config) -> Result<Store> {
  let opened = config
    .storage_dir()
    .and_then(|dir| SqliteStore::open(&dir.join("state.db")));

  match opened {
    Ok(store) => Ok(Arc::new(store)),
    Err(e) => {
      warn!("Opening the state store failed, state will not survive this run: {}", e);
      Ok(Arc::new(SqliteStore::open_in_memory()?))
    }
  }
}
