//! Activation: pre-populating a generation with the app-shell manifest.

use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::storage::CacheStorage;
use super::traits::{locator_for, Request, Response};
use crate::error::{CacheError, Result};
use crate::net::Network;

/// Owns installation of one cache generation.
pub struct StoreManager<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
  manifest: Vec<Url>,
}

impl<S: CacheStorage, N: Network> StoreManager<S, N> {
  /// Manifest entries that map to the same locator are fetched once.
  pub fn new(storage: Arc<S>, network: Arc<N>, manifest: Vec<Url>) -> Self {
    let mut seen = HashSet::new();
    let manifest = manifest
      .into_iter()
      .filter(|url| seen.insert(locator_for(url)))
      .collect();

    Self {
      storage,
      network,
      manifest,
    }
  }

  /// Fetch every manifest entry and install them into the generation.
  ///
  /// All entries are fetched before anything is written. A single failed
  /// fetch or non-2xx status fails the whole activation and leaves the
  /// generation uninstalled. Returns the number of entries installed.
  pub async fn activate(&self) -> Result<usize> {
    let generation = self.storage.generation();
    info!(
      generation,
      entries = self.manifest.len(),
      "activating cache generation"
    );

    let fetches = self.manifest.iter().map(|url| self.fetch_entry(url));
    let entries = match try_join_all(fetches).await {
      Ok(entries) => entries,
      Err(e) => {
        warn!(generation, error = %e, "activation failed");
        return Err(e);
      }
    };

    self.storage.install(&entries)?;

    info!(generation, entries = entries.len(), "cache generation installed");
    Ok(entries.len())
  }

  async fn fetch_entry(&self, url: &Url) -> Result<(String, Response)> {
    let request = Request::get(url.clone());
    let locator = request.locator();

    let response = match self.network.fetch(&request).await {
      Ok(response) => response,
      Err(e) => {
        return Err(CacheError::ManifestFetchFailure {
          locator,
          reason: e.to_string(),
        })
      }
    };

    if !response.is_success() {
      return Err(CacheError::ManifestFetchFailure {
        locator,
        reason: format!("status {}", response.status),
      });
    }

    Ok((locator, response))
  }
}
