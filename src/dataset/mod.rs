//! Versioned wisdom dataset: wire parsing, category index, and tiered loading.

pub mod api_types;
pub mod cache;
pub mod client;
pub mod fallback;
pub mod types;
pub mod version;

pub use cache::DatasetCache;
pub use client::{build_http_client, fetch_asset, DatasetClient, FetchedAsset};
pub use types::{
  CacheRecord, Category, CategoryFilter, DatasetSummary, SourceTier, VersionedDataset, WisdomEntry,
};
pub use version::Version;
