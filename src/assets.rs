//! Cache of the application shell's static assets.
//!
//! Assets are stored under a named generation so a shell release replaces
//! the previous one wholesale: installation fetches the entire manifest and
//! lands it in one transaction or not at all, and activation prunes every
//! generation but the current. Resolution is cache-first, with the cached
//! shell document standing in for any document request the network cannot
//! answer.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::dataset::FetchedAsset;

/// Current shell generation. Bump when the manifest below changes.
const GENERATION: &str = "wisdom-cards-v4";

/// The document served in place of any page the network cannot produce.
const SHELL_DOCUMENT: &str = "index.html";

/// Every asset the shell needs to run offline, relative to the shell origin.
const MANIFEST: &[&str] = &[
  "index.html",
  "style.css",
  "script.js",
  "update-checker.js",
  "manifest.json",
  "wisdom-data.json",
  "app-icons/icon-72x72.png",
  "app-icons/icon-192x192.png",
  "app-icons/icon-512x512.png",
];

/// Where a resolved asset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
  Cache,
  Network,
  /// The cached shell document, standing in for an unreachable page.
  ShellFallback,
}

/// An asset as handed to the serving layer.
#[derive(Debug)]
pub struct ResolvedAsset {
  pub body: Vec<u8>,
  pub content_type: Option<String>,
  pub status: u16,
  pub source: ResolveSource,
}

pub struct AssetCache {
  conn: Mutex<Connection>,
  origin: Url,
}

impl AssetCache {
  /// Open or create the asset cache at an explicit path.
  pub fn open(path: &Path, origin: Url) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create asset cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open asset cache at {}: {}", path.display(), e))?;
    Self::from_conn(conn, origin)
  }

  /// Open an asset cache that lives only for this process.
  pub fn open_in_memory(origin: Url) -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::from_conn(conn, origin)
  }

  fn from_conn(conn: Connection, origin: Url) -> Result<Self> {
    conn
      .execute_batch(ASSET_SCHEMA)
      .map_err(|e| eyre!("Failed to run asset cache migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
      origin,
    })
  }

  /// Fetch the whole manifest and install it as the current generation.
  ///
  /// Every asset must arrive with HTTP 200; any failure aborts the install
  /// and leaves the cache exactly as it was. `fetch` receives a path
  /// relative to the shell origin.
  pub async fn install_with<F, Fut>(&self, fetch: F) -> Result<()>
  where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<FetchedAsset>>,
  {
    let fetches = MANIFEST.iter().map(|&path| {
      let fut = fetch(path.to_string());
      async move {
        let asset = fut.await?;
        if asset.status != 200 {
          return Err(eyre!("Asset '{}' returned HTTP {}", path, asset.status));
        }
        Ok((path, asset))
      }
    });

    let assets = try_join_all(fetches).await?;
    self.store_generation(&assets)
  }

  /// Install over the network, relative to the shell origin.
  pub async fn install(&self, http: &reqwest::Client) -> Result<()> {
    let http = http.clone();
    let origin = self.origin.clone();
    self
      .install_with(move |path| crate::dataset::fetch_asset(http.clone(), origin.clone(), path))
      .await
  }

  /// Drop every generation except the current one. Returns how many assets
  /// were pruned.
  pub fn activate(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let pruned = conn
      .execute(
        "DELETE FROM asset_cache WHERE generation != ?",
        params![GENERATION],
      )
      .map_err(|e| eyre!("Failed to prune old shell generations: {}", e))?;

    if pruned > 0 {
      info!("Pruned {} assets from old shell generations", pruned);
    }
    Ok(pruned)
  }

  /// Resolve a request path, cache-first.
  ///
  /// A miss goes to the network; same-origin 200 responses are copied into
  /// the cache on the way through, anything else passes through uncached.
  /// When the network fails outright, a document request degrades to the
  /// cached shell document and anything else propagates the failure.
  pub async fn resolve_with<F, Fut>(&self, path: &str, fetch: F) -> Result<ResolvedAsset>
  where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<FetchedAsset>>,
  {
    let path = normalize(path);

    match self.lookup(path) {
      Ok(Some((body, content_type))) => {
        return Ok(ResolvedAsset {
          body,
          content_type,
          status: 200,
          source: ResolveSource::Cache,
        })
      }
      Ok(None) => {}
      Err(e) => warn!("Asset cache read failed for '{}': {}", path, e),
    }

    match fetch(path.to_string()).await {
      Ok(asset) => {
        if asset.status == 200 && self.same_origin(&asset.final_url) {
          // Keep a copy, but never at the cost of the response itself.
          if let Err(e) = self.store_one(path, &asset) {
            warn!("Failed to cache asset '{}': {}", path, e);
          }
        }
        Ok(ResolvedAsset {
          body: asset.body,
          content_type: asset.content_type,
          status: asset.status,
          source: ResolveSource::Network,
        })
      }
      Err(e) => {
        if is_document(path) {
          if let Ok(Some((body, content_type))) = self.lookup(SHELL_DOCUMENT) {
            debug!("Serving cached shell document for '{}' while offline", path);
            return Ok(ResolvedAsset {
              body,
              content_type,
              status: 200,
              source: ResolveSource::ShellFallback,
            });
          }
        }
        Err(e)
      }
    }
  }

  /// Resolve over the network, relative to the shell origin.
  pub async fn resolve(&self, http: &reqwest::Client, path: &str) -> Result<ResolvedAsset> {
    let http = http.clone();
    let origin = self.origin.clone();
    self
      .resolve_with(path, move |p| crate::dataset::fetch_asset(http, origin, p))
      .await
  }

  /// Whether the current generation holds this path.
  pub fn contains(&self, path: &str) -> Result<bool> {
    Ok(self.lookup(normalize(path))?.is_some())
  }

  fn same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  fn lookup(&self, path: &str) -> Result<Option<(Vec<u8>, Option<String>)>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT body, content_type FROM asset_cache WHERE generation = ? AND path = ?")
      .map_err(|e| eyre!("Failed to prepare asset read: {}", e))?;

    let row = stmt
      .query_row(params![GENERATION, path], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .ok();
    Ok(row)
  }

  fn store_generation(&self, assets: &[(&str, FetchedAsset)]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // All rows land or none do.
    if let Err(e) = insert_assets(&conn, assets) {
      let _ = conn.execute("ROLLBACK", []);
      return Err(e);
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    info!(
      "Installed shell generation '{}' ({} assets)",
      GENERATION,
      assets.len()
    );
    Ok(())
  }

  fn store_one(&self, path: &str, asset: &FetchedAsset) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    insert_asset(&conn, path, asset)
  }
}

fn insert_assets(conn: &Connection, assets: &[(&str, FetchedAsset)]) -> Result<()> {
  for (path, asset) in assets {
    insert_asset(conn, path, asset)?;
  }
  Ok(())
}

fn insert_asset(conn: &Connection, path: &str, asset: &FetchedAsset) -> Result<()> {
  let digest = hex::encode(Sha256::digest(&asset.body));
  conn
    .execute(
      "INSERT OR REPLACE INTO asset_cache (generation, path, content_type, digest, body, fetched_at)
       VALUES (?, ?, ?, ?, ?, datetime('now'))",
      params![GENERATION, path, asset.content_type, digest, asset.body],
    )
    .map_err(|e| eyre!("Failed to store asset '{}': {}", path, e))?;
  Ok(())
}

/// Strip query and fragment, leading slashes, and a `./` prefix; an empty
/// path means the shell document.
fn normalize(path: &str) -> &str {
  let path = match path.find(['?', '#']) {
    Some(i) => &path[..i],
    None => path,
  };
  let path = path.trim_start_matches('/');
  let path = path.strip_prefix("./").unwrap_or(path);
  if path.is_empty() {
    SHELL_DOCUMENT
  } else {
    path
  }
}

/// Requests for a page: explicit HTML files plus extensionless navigation
/// paths like `about`.
fn is_document(path: &str) -> bool {
  let name = path.rsplit('/').next().unwrap_or(path);
  path.ends_with(".html") || !name.contains('.')
}

const ASSET_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS asset_cache (
    generation TEXT NOT NULL,
    path TEXT NOT NULL,
    content_type TEXT,
    digest TEXT NOT NULL,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, path)
);
"#;

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;

  fn origin() -> Url {
    Url::parse("https://wisdom.example/app/").unwrap()
  }

  fn asset_from(origin: &Url, path: &str, body: &[u8], status: u16) -> FetchedAsset {
    FetchedAsset {
      body: body.to_vec(),
      content_type: Some("text/plain".to_string()),
      status,
      final_url: origin.join(path).unwrap(),
    }
  }

  async fn installed_cache() -> AssetCache {
    let cache = AssetCache::open_in_memory(origin()).unwrap();
    let base = origin();
    cache
      .install_with(move |path| {
        let base = base.clone();
        async move {
          let body = format!("body of {}", path);
          Ok(asset_from(&base, &path, body.as_bytes(), 200))
        }
      })
      .await
      .unwrap();
    cache
  }

  impl AssetCache {
    fn insert_raw(&self, generation: &str, path: &str) {
      let conn = self.conn.lock().unwrap();
      conn
        .execute(
          "INSERT INTO asset_cache (generation, path, content_type, digest, body)
           VALUES (?, ?, NULL, 'x', X'00')",
          params![generation, path],
        )
        .unwrap();
    }

    fn total_rows(&self) -> usize {
      let conn = self.conn.lock().unwrap();
      conn
        .query_row("SELECT COUNT(*) FROM asset_cache", [], |row| row.get(0))
        .unwrap()
    }

    fn digest_of(&self, path: &str) -> String {
      let conn = self.conn.lock().unwrap();
      conn
        .query_row(
          "SELECT digest FROM asset_cache WHERE generation = ? AND path = ?",
          params![GENERATION, path],
          |row| row.get(0),
        )
        .unwrap()
    }
  }

  #[test]
  fn test_normalize_paths() {
    assert_eq!(normalize("/"), "index.html");
    assert_eq!(normalize(""), "index.html");
    assert_eq!(normalize("/style.css?v=2"), "style.css");
    assert_eq!(normalize("./script.js"), "script.js");
    assert_eq!(normalize("/index.html#top"), "index.html");
    assert_eq!(
      normalize("app-icons/icon-72x72.png"),
      "app-icons/icon-72x72.png"
    );
  }

  #[tokio::test]
  async fn test_install_caches_whole_manifest() {
    let cache = installed_cache().await;
    for path in MANIFEST {
      assert!(cache.contains(path).unwrap(), "missing {}", path);
    }
    assert_eq!(cache.total_rows(), MANIFEST.len());
  }

  #[tokio::test]
  async fn test_install_records_content_digest() {
    let cache = installed_cache().await;
    let expected = hex::encode(Sha256::digest("body of style.css".as_bytes()));
    assert_eq!(cache.digest_of("style.css"), expected);
  }

  #[tokio::test]
  async fn test_failed_install_leaves_cache_untouched() {
    let cache = AssetCache::open_in_memory(origin()).unwrap();
    let base = origin();

    let outcome = cache
      .install_with(move |path| {
        let base = base.clone();
        async move {
          let status = if path == "manifest.json" { 404 } else { 200 };
          Ok(asset_from(&base, &path, b"body", status))
        }
      })
      .await;

    assert!(outcome.is_err());
    assert_eq!(cache.total_rows(), 0);
  }

  #[tokio::test]
  async fn test_fetch_error_aborts_install() {
    let cache = AssetCache::open_in_memory(origin()).unwrap();
    let base = origin();

    let outcome = cache
      .install_with(move |path| {
        let base = base.clone();
        async move {
          if path == "script.js" {
            return Err(eyre!("connection reset"));
          }
          Ok(asset_from(&base, &path, b"body", 200))
        }
      })
      .await;

    assert!(outcome.is_err());
    assert_eq!(cache.total_rows(), 0);
  }

  #[tokio::test]
  async fn test_activate_prunes_old_generations() {
    let cache = installed_cache().await;
    cache.insert_raw("wisdom-cards-v3", "index.html");
    cache.insert_raw("wisdom-cards-v3", "style.css");

    let pruned = cache.activate().unwrap();

    assert_eq!(pruned, 2);
    assert_eq!(cache.total_rows(), MANIFEST.len());
    assert!(cache.contains("index.html").unwrap());
  }

  #[tokio::test]
  async fn test_resolve_prefers_cache_over_network() {
    let cache = installed_cache().await;

    let resolved = cache
      .resolve_with("/style.css", |_| async { Err(eyre!("network down")) })
      .await
      .unwrap();

    assert_eq!(resolved.source, ResolveSource::Cache);
    assert_eq!(resolved.status, 200);
    assert_eq!(resolved.body, b"body of style.css");
  }

  #[tokio::test]
  async fn test_resolve_miss_stores_same_origin_copy() {
    let cache = AssetCache::open_in_memory(origin()).unwrap();
    let base = origin();

    let resolved = cache
      .resolve_with("extra.css", move |path| {
        let base = base.clone();
        async move { Ok(asset_from(&base, &path, b"fresh", 200)) }
      })
      .await
      .unwrap();
    assert_eq!(resolved.source, ResolveSource::Network);

    // The copy now answers without the network.
    let cached = cache
      .resolve_with("extra.css", |_| async { Err(eyre!("network down")) })
      .await
      .unwrap();
    assert_eq!(cached.source, ResolveSource::Cache);
    assert_eq!(cached.body, b"fresh");
  }

  #[tokio::test]
  async fn test_cross_origin_responses_pass_through_uncached() {
    let cache = AssetCache::open_in_memory(origin()).unwrap();
    let elsewhere = Url::parse("https://cdn.example/").unwrap();

    let resolved = cache
      .resolve_with("vendored.js", move |path| {
        let elsewhere = elsewhere.clone();
        async move { Ok(asset_from(&elsewhere, &path, b"cdn body", 200)) }
      })
      .await
      .unwrap();

    assert_eq!(resolved.source, ResolveSource::Network);
    assert!(!cache.contains("vendored.js").unwrap());
  }

  #[tokio::test]
  async fn test_non_200_responses_pass_through_uncached() {
    let cache = AssetCache::open_in_memory(origin()).unwrap();
    let base = origin();

    let resolved = cache
      .resolve_with("gone.css", move |path| {
        let base = base.clone();
        async move { Ok(asset_from(&base, &path, b"not found", 404)) }
      })
      .await
      .unwrap();

    assert_eq!(resolved.status, 404);
    assert!(!cache.contains("gone.css").unwrap());
  }

  #[tokio::test]
  async fn test_offline_document_falls_back_to_shell() {
    let cache = installed_cache().await;

    let resolved = cache
      .resolve_with("/deep/page.html", |_| async { Err(eyre!("offline")) })
      .await
      .unwrap();

    assert_eq!(resolved.source, ResolveSource::ShellFallback);
    assert_eq!(resolved.body, b"body of index.html");
  }

  #[tokio::test]
  async fn test_offline_navigation_path_falls_back_to_shell() {
    let cache = installed_cache().await;

    let resolved = cache
      .resolve_with("/about", |_| async { Err(eyre!("offline")) })
      .await
      .unwrap();

    assert_eq!(resolved.source, ResolveSource::ShellFallback);
    assert_eq!(resolved.body, b"body of index.html");
  }

  #[test]
  fn test_document_detection() {
    assert!(is_document("index.html"));
    assert!(is_document("deep/page.html"));
    assert!(is_document("about"));
    assert!(is_document("deep/about"));
    assert!(!is_document("style.css"));
    assert!(!is_document("app-icons/icon-72x72.png"));
  }

  #[tokio::test]
  async fn test_offline_non_document_propagates_failure() {
    let cache = installed_cache().await;

    let outcome = cache
      .resolve_with("/missing.png", |_| async { Err(eyre!("offline")) })
      .await;

    assert!(outcome.is_err());
  }
}
