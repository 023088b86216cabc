//! Error types for the cache core.
//!
//! Failures that stop a request from being answered surface to the caller;
//! failures that only affect future cache fills are logged and swallowed by
//! the layer (see `CacheLayer::resolve`).

use thiserror::Error;

/// The outbound transport could not produce a response.
#[derive(Error, Debug)]
pub enum NetworkError {
  #[error("request to {url} failed: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("network unreachable for {url}: {reason}")]
  Unreachable { url: String, reason: String },
}

/// Failures of the backing response store.
#[derive(Error, Debug)]
pub enum StorageError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("failed to encode entry metadata: {0}")]
  Json(#[from] serde_json::Error),

  #[error("failed to create cache directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("store lock poisoned")]
  LockPoisoned,

  #[error("{0}")]
  Other(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
  /// A manifest entry was unreachable or answered with a non-success status.
  #[error("failed to fetch manifest entry {locator}: {reason}")]
  ManifestFetchFailure { locator: String, reason: String },

  /// A cache miss could not be answered by the network.
  #[error(transparent)]
  NetworkUnavailable(#[from] NetworkError),

  #[error("failed to store {locator}: {source}")]
  StoreWriteFailure {
    locator: String,
    #[source]
    source: StorageError,
  },

  #[error("cache storage error: {0}")]
  Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
