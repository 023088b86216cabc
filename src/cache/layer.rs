//! Cache layer that answers requests cache-first with fill-on-miss.

use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheResult, DeliveryMode, Request, Response};
use crate::error::{CacheError, Result};
use crate::net::Network;

/// Interception layer between the application and the network.
///
/// Every request goes through [`CacheLayer::resolve`]. The layer assumes the
/// generation has already been installed; enforcing that ordering is up to
/// whoever drives it.
pub struct CacheLayer<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
}

impl<S: CacheStorage, N: Network> CacheLayer<S, N> {
  pub fn new(storage: Arc<S>, network: Arc<N>) -> Self {
    Self { storage, network }
  }

  /// Resolve a request with a cache-first strategy.
  ///
  /// 1. Check the store - on a hit, return it without touching the network
  /// 2. On a miss, fetch from the network; failures propagate unchanged
  /// 3. Store a copy of the response if it is eligible, return the other
  ///
  /// Store read and write failures never fail the request.
  pub async fn resolve(&self, request: &Request) -> Result<CacheResult<Response>> {
    if !request.is_storable_method() {
      debug!(method = %request.method, url = %request.url, "bypassing cache");
      let response = self.network.fetch(request).await?;
      return Ok(CacheResult::from_network(response, false));
    }

    let locator = request.locator();

    match self.storage.get(&locator) {
      Ok(Some(entry)) => {
        debug!(%locator, "cache hit");
        return Ok(CacheResult::from_cache(entry.response, entry.stored_at));
      }
      Ok(None) => debug!(%locator, "cache miss"),
      Err(e) => warn!(%locator, error = %e, "cache lookup failed, treating as miss"),
    }

    let response = self.network.fetch(request).await?;

    if !is_storable(&response) {
      debug!(
        %locator,
        status = response.status,
        delivery = %response.delivery,
        "response not eligible for storage"
      );
      return Ok(CacheResult::from_network(response, false));
    }

    let stored = match self.storage.put(&locator, response.duplicate()) {
      Ok(()) => {
        debug!(%locator, "stored network response");
        true
      }
      Err(source) => {
        let err = CacheError::StoreWriteFailure {
          locator: locator.clone(),
          source,
        };
        warn!(error = %err, "keeping response out of the cache");
        false
      }
    };

    Ok(CacheResult::from_network(response, stored))
  }
}

impl<S: CacheStorage, N: Network> Clone for CacheLayer<S, N> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
    }
  }
}

/// Whether a network response may be written to the store.
///
/// Only plain 200s delivered by the origin or shared through CORS qualify.
/// Redirects, errors and opaque cross-origin responses are passed through
/// without being stored.
pub fn is_storable(response: &Response) -> bool {
  response.status == 200 && matches!(response.delivery, DeliveryMode::Basic | DeliveryMode::Cors)
}
