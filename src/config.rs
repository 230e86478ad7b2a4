use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::update::PollSchedule;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub data: DataConfig,
  #[serde(default)]
  pub update: UpdateConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub shell: ShellConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
  /// URL of the versioned dataset document.
  pub url: String,
  #[serde(default = "default_fetch_timeout_secs")]
  pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConfig {
  #[serde(default = "default_check_interval_hours")]
  pub check_interval_hours: u64,
  #[serde(default = "default_startup_delay_secs")]
  pub startup_delay_secs: u64,
  /// How long a dismissed update notice stays quiet.
  #[serde(default = "default_dismiss_hours")]
  pub dismiss_hours: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Where databases and logs live (defaults to the platform data dir).
  pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellConfig {
  /// Install and activate the shell asset cache at startup.
  #[serde(default)]
  pub mirror: bool,
}

fn default_fetch_timeout_secs() -> u64 {
  10
}

fn default_check_interval_hours() -> u64 {
  6
}

fn default_startup_delay_secs() -> u64 {
  5
}

fn default_dismiss_hours() -> i64 {
  24
}

impl Default for UpdateConfig {
  fn default() -> Self {
    Self {
      check_interval_hours: default_check_interval_hours(),
      startup_delay_secs: default_startup_delay_secs(),
      dismiss_hours: default_dismiss_hours(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sage.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sage/config.yaml
  /// 4. ~/.config/sage/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/sage/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("sage.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sage").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  pub fn data_url(&self) -> Result<Url> {
    Url::parse(&self.data.url)
      .map_err(|e| eyre!("Invalid data.url '{}': {}", self.data.url, e))
  }

  /// The shell origin: the directory the dataset document sits in. Static
  /// assets are fetched relative to it.
  pub fn shell_origin(&self) -> Result<Url> {
    let url = self.data_url()?;
    url
      .join(".")
      .map_err(|e| eyre!("Cannot derive shell origin from '{}': {}", self.data.url, e))
  }

  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.data.fetch_timeout_secs)
  }

  pub fn poll_schedule(&self) -> PollSchedule {
    // One hour is the shortest cadence; zero would stall the poll timer.
    let hours = self.update.check_interval_hours.max(1);
    PollSchedule {
      startup_delay: Duration::from_secs(self.update.startup_delay_secs),
      interval: Duration::from_secs(hours * 60 * 60),
      ..PollSchedule::default()
    }
  }

  pub fn dismiss_window(&self) -> chrono::Duration {
    chrono::Duration::hours(self.update.dismiss_hours)
  }

  /// Directory for databases and logs.
  pub fn storage_dir(&self) -> Result<PathBuf> {
    match &self.storage.dir {
      Some(dir) => Ok(dir.clone()),
      None => crate::store::default_data_dir(),
    }
  }
}
