//! Background update polling.
//!
//! A check fetches the remote dataset summary and compares its version
//! against the locally persisted one. Checks run on a fixed schedule, once
//! shortly after startup, and on demand when connectivity returns or the
//! user asks. Only one check is ever in flight at a time.

use chrono::Utc;
use color_eyre::Result;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use crate::dataset::{DatasetSummary, Version};
use crate::event::{DataEvent, Event};
use crate::store::{keys, StateStore};

/// Version assumed for a store that has never seen a dataset. The embedded
/// fallback ships at this version, so any published release compares newer.
const DEFAULT_LOCAL_VERSION: Version = Version::new(1, 0, 0);

/// Why a check is running. Dismissal suppresses notices from automatic
/// checks, never from one the user requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckReason {
  Scheduled,
  BackOnline,
  Manual,
}

/// Timing knobs for the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
  /// Delay before the first check, so startup traffic settles first.
  pub startup_delay: Duration,
  /// Cadence of scheduled checks after the first.
  pub interval: Duration,
  /// Grace period after connectivity returns before checking.
  pub settle_delay: Duration,
}

impl Default for PollSchedule {
  fn default() -> Self {
    Self {
      startup_delay: Duration::from_secs(5),
      interval: Duration::from_secs(6 * 60 * 60),
      settle_delay: Duration::from_secs(2),
    }
  }
}

pub struct UpdatePoller<S> {
  store: S,
  dismiss_window: chrono::Duration,
  in_flight: AtomicBool,
}

impl<S: StateStore> UpdatePoller<S> {
  pub fn new(store: S, dismiss_window: chrono::Duration) -> Self {
    Self {
      store,
      dismiss_window,
      in_flight: AtomicBool::new(false),
    }
  }

  /// Run one update check through `fetch`. Returns the remote summary when
  /// it is strictly newer than the local version. If another check is
  /// already in flight this one is skipped.
  pub async fn check_with<F, Fut>(&self, fetch: F) -> Result<Option<DatasetSummary>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<DatasetSummary>>,
  {
    if self.in_flight.swap(true, Ordering::SeqCst) {
      debug!("Update check already in flight, skipping");
      return Ok(None);
    }
    let outcome = self.run_check(fetch).await;
    self.in_flight.store(false, Ordering::SeqCst);
    outcome
  }

  async fn run_check<F, Fut>(&self, fetch: F) -> Result<Option<DatasetSummary>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<DatasetSummary>>,
  {
    let summary = fetch().await?;
    let local = self.local_version();
    if summary.version > local {
      info!("Dataset update available: {} -> {}", local, summary.version);
      Ok(Some(summary))
    } else {
      debug!("Dataset is current at {}", local);
      Ok(None)
    }
  }

  /// Record that the user waved off the current update notice.
  pub fn dismiss(&self) {
    let stamp = Utc::now().timestamp_millis().to_string();
    if let Err(e) = self.store.put(keys::LAST_UPDATE_NOTIFICATION, &stamp) {
      warn!("Failed to record dismissed update notice: {}", e);
    }
  }

  /// Whether a notice was dismissed inside the dismissal window. An
  /// unreadable stamp counts as not dismissed, erring toward showing the
  /// notice again.
  pub fn recently_dismissed(&self) -> bool {
    let raw = match self.store.get(keys::LAST_UPDATE_NOTIFICATION) {
      Ok(Some(raw)) => raw,
      Ok(None) => return false,
      Err(e) => {
        warn!("Failed to read dismissed-notice stamp: {}", e);
        return false;
      }
    };
    match raw.trim().parse::<i64>() {
      Ok(millis) => {
        let age = Utc::now().timestamp_millis().saturating_sub(millis);
        age < self.dismiss_window.num_milliseconds()
      }
      Err(_) => false,
    }
  }

  fn local_version(&self) -> Version {
    match self.store.get(keys::WISDOM_VERSION) {
      Ok(Some(raw)) => raw.trim().parse().unwrap_or(DEFAULT_LOCAL_VERSION),
      Ok(None) => DEFAULT_LOCAL_VERSION,
      Err(e) => {
        warn!("Failed to read local dataset version: {}", e);
        DEFAULT_LOCAL_VERSION
      }
    }
  }
}

/// Spawn the poll loop. Checks fire on the schedule and on reasons sent
/// through the returned channel; newer versions are announced as
/// [`DataEvent::UpdateAvailable`]. The loop exits when the trigger channel
/// closes or the event receiver goes away.
pub fn spawn_poller<S, F, Fut>(
  poller: Arc<UpdatePoller<S>>,
  fetch: F,
  events: UnboundedSender<Event>,
  schedule: PollSchedule,
) -> UnboundedSender<CheckReason>
where
  S: StateStore + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<DatasetSummary>> + Send + 'static,
{
  let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();

  tokio::spawn(async move {
    let start = tokio::time::Instant::now() + schedule.startup_delay;
    // tokio panics on a zero timer period
    let period = schedule.interval.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(start, period);

    loop {
      let reason = tokio::select! {
        _ = interval.tick() => CheckReason::Scheduled,
        reason = trigger_rx.recv() => match reason {
          Some(reason) => reason,
          None => break,
        },
      };

      if reason == CheckReason::BackOnline {
        tokio::time::sleep(schedule.settle_delay).await;
      }

      match poller.check_with(|| fetch()).await {
        Ok(Some(summary)) => {
          if reason != CheckReason::Manual && poller.recently_dismissed() {
            debug!(
              "Update {} available but the notice was recently dismissed",
              summary.version
            );
          } else if events
            .send(Event::Data(DataEvent::UpdateAvailable(summary)))
            .is_err()
          {
            break;
          }
        }
        Ok(None) => {}
        // The next tick retries; a transient failure is not worth a notice.
        Err(e) => debug!("Update check failed: {}", e),
      }
    }
  });

  trigger_tx
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::SqliteStore;
  use color_eyre::eyre::eyre;
  use tokio::time::timeout;

  fn summary(version: &str) -> DatasetSummary {
    DatasetSummary {
      version: version.parse().unwrap(),
      total: 50,
    }
  }

  fn poller_with_version(version: Option<&str>) -> UpdatePoller<Arc<SqliteStore>> {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    if let Some(version) = version {
      store.put(keys::WISDOM_VERSION, version).unwrap();
    }
    UpdatePoller::new(store, chrono::Duration::hours(24))
  }

  #[tokio::test]
  async fn test_newer_remote_version_is_reported() {
    let poller = poller_with_version(Some("2.0.0"));
    let found = poller
      .check_with(|| async { Ok(summary("2.1.0")) })
      .await
      .unwrap();
    assert_eq!(found, Some(summary("2.1.0")));
  }

  #[tokio::test]
  async fn test_equal_and_older_versions_are_quiet() {
    let poller = poller_with_version(Some("2.1.0"));
    for remote in ["2.1.0", "2.1", "1.9.9"] {
      let found = poller
        .check_with(|| async { Ok(summary(remote)) })
        .await
        .unwrap();
      assert_eq!(found, None, "remote {} should not announce", remote);
    }
  }

  #[tokio::test]
  async fn test_missing_local_version_defaults_to_one() {
    let poller = poller_with_version(None);
    let found = poller
      .check_with(|| async { Ok(summary("1.0.1")) })
      .await
      .unwrap();
    assert!(found.is_some());

    let found = poller
      .check_with(|| async { Ok(summary("1.0.0")) })
      .await
      .unwrap();
    assert!(found.is_none());
  }

  #[tokio::test]
  async fn test_unparseable_local_version_defaults_to_one() {
    let poller = poller_with_version(Some("garbage"));
    let found = poller
      .check_with(|| async { Ok(summary("1.0.1")) })
      .await
      .unwrap();
    assert!(found.is_some());
  }

  #[tokio::test]
  async fn test_fetch_failure_propagates() {
    let poller = poller_with_version(Some("1.0.0"));
    let outcome = poller
      .check_with(|| async { Err(eyre!("offline")) })
      .await;
    assert!(outcome.is_err());
  }

  #[tokio::test]
  async fn test_concurrent_checks_collapse_into_one() {
    let poller = poller_with_version(Some("1.0.0"));

    let slow = poller.check_with(|| async {
      tokio::time::sleep(Duration::from_millis(50)).await;
      Ok(summary("2.0.0"))
    });
    let second = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      poller.check_with(|| async { Ok(summary("9.9.9")) }).await
    };

    let (first, second) = tokio::join!(slow, second);
    assert_eq!(first.unwrap(), Some(summary("2.0.0")));
    assert_eq!(second.unwrap(), None);
  }

  #[test]
  fn test_dismissal_window() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let poller = UpdatePoller::new(store.clone(), chrono::Duration::hours(24));

    assert!(!poller.recently_dismissed());

    poller.dismiss();
    assert!(poller.recently_dismissed());

    let stale = Utc::now().timestamp_millis() - chrono::Duration::hours(25).num_milliseconds();
    store
      .put(keys::LAST_UPDATE_NOTIFICATION, &stale.to_string())
      .unwrap();
    assert!(!poller.recently_dismissed());

    store.put(keys::LAST_UPDATE_NOTIFICATION, "garbage").unwrap();
    assert!(!poller.recently_dismissed());
  }

  #[tokio::test]
  async fn test_poll_loop_announces_then_honors_manual_trigger() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.put(keys::WISDOM_VERSION, "1.0.0").unwrap();
    let poller = Arc::new(UpdatePoller::new(store, chrono::Duration::hours(24)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let schedule = PollSchedule {
      startup_delay: Duration::from_millis(5),
      interval: Duration::from_secs(3600),
      settle_delay: Duration::from_millis(1),
    };

    let trigger = spawn_poller(poller, || async { Ok(summary("2.0.0")) }, tx, schedule);

    // Startup check.
    let event = timeout(Duration::from_millis(500), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(
      event,
      Event::Data(DataEvent::UpdateAvailable(s)) if s.version == Version::new(2, 0, 0)
    ));

    // Manual trigger fires well before the next scheduled tick.
    trigger.send(CheckReason::Manual).unwrap();
    let event = timeout(Duration::from_millis(500), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(event, Event::Data(DataEvent::UpdateAvailable(_))));
  }

  #[tokio::test]
  async fn test_zero_interval_schedule_does_not_kill_the_poll_loop() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.put(keys::WISDOM_VERSION, "1.0.0").unwrap();
    let poller = Arc::new(UpdatePoller::new(store, chrono::Duration::hours(24)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let schedule = PollSchedule {
      startup_delay: Duration::from_millis(5),
      interval: Duration::ZERO,
      settle_delay: Duration::from_millis(1),
    };

    let _trigger = spawn_poller(poller, || async { Ok(summary("2.0.0")) }, tx, schedule);

    // The startup check still lands instead of the task panicking.
    let event = timeout(Duration::from_millis(500), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(event, Event::Data(DataEvent::UpdateAvailable(_))));
  }

  #[tokio::test]
  async fn test_poll_loop_suppresses_dismissed_notice_except_for_manual() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.put(keys::WISDOM_VERSION, "1.0.0").unwrap();
    let poller = Arc::new(UpdatePoller::new(store, chrono::Duration::hours(24)));
    poller.dismiss();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let schedule = PollSchedule {
      startup_delay: Duration::from_millis(5),
      interval: Duration::from_secs(3600),
      settle_delay: Duration::from_millis(1),
    };
    let trigger = spawn_poller(
      poller,
      || async { Ok(summary("2.0.0")) },
      tx,
      schedule,
    );

    // The startup check finds the update but stays quiet.
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());

    // A user-requested check is never suppressed.
    trigger.send(CheckReason::Manual).unwrap();
    let event = timeout(Duration::from_millis(500), rx.recv())
      .await
      .unwrap()
      .unwrap();
    assert!(matches!(event, Event::Data(DataEvent::UpdateAvailable(_))));
  }
}
