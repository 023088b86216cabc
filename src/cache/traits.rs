//! Core types for the response cache: requests, responses and result metadata.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Method;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// An outgoing resource request. The cache never modifies it.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
  pub body: Option<Vec<u8>>,
}

impl Request {
  /// A plain `GET` with no headers.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: HeaderMap::new(),
      body: None,
    }
  }

  /// The store key for this request.
  pub fn locator(&self) -> String {
    locator_for(&self.url)
  }

  /// Only `GET` requests are looked up in or written to the store.
  pub fn is_storable_method(&self) -> bool {
    self.method == Method::GET
  }
}

/// Normalize a URL into a store key: the absolute URL without its fragment.
pub fn locator_for(url: &Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.into()
}

/// How a response was delivered relative to the configured origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
  /// Served by the origin itself
  Basic,
  /// Cross-origin, explicitly shared with the origin
  Cors,
  /// Cross-origin without sharing headers; contents can't be vouched for
  Opaque,
}

impl DeliveryMode {
  /// Classify a response fetched from `url` on behalf of `origin`.
  ///
  /// `allow_origin` is the value of the response's `Access-Control-Allow-Origin`
  /// header, if any.
  pub fn classify(origin: &Url, url: &Url, allow_origin: Option<&str>) -> Self {
    if url.origin() == origin.origin() {
      return Self::Basic;
    }

    match allow_origin.map(str::trim) {
      Some("*") => Self::Cors,
      Some(allowed) if allowed == origin.origin().ascii_serialization() => Self::Cors,
      _ => Self::Opaque,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
    }
  }
}

impl fmt::Display for DeliveryMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DeliveryMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "basic" => Ok(Self::Basic),
      "cors" => Ok(Self::Cors),
      "opaque" => Ok(Self::Opaque),
      other => Err(format!("unknown delivery mode '{}'", other)),
    }
  }
}

/// A retrieved representation of a resource.
///
/// A `Response` has exactly one consumer. It deliberately does not implement
/// `Clone`: anything that needs to both hand a response to a caller and keep
/// it (the store) must call [`Response::duplicate`] and use the two copies
/// independently.
#[derive(Debug, PartialEq, Eq)]
pub struct Response {
  /// Final URL the response came from
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub delivery: DeliveryMode,
  body: Vec<u8>,
}

impl Response {
  pub fn new(
    url: impl Into<String>,
    status: u16,
    headers: Vec<(String, String)>,
    delivery: DeliveryMode,
    body: Vec<u8>,
  ) -> Self {
    Self {
      url: url.into(),
      status,
      headers,
      delivery,
      body,
    }
  }

  pub fn body(&self) -> &[u8] {
    &self.body
  }

  /// Consume the response, yielding its body.
  pub fn into_body(self) -> Vec<u8> {
    self.body
  }

  /// Produce an independent copy with its own body buffer.
  pub fn duplicate(&self) -> Self {
    Self {
      url: self.url.clone(),
      status: self.status,
      headers: self.headers.clone(),
      delivery: self.delivery,
      body: self.body.clone(),
    }
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn content_type(&self) -> Option<&str> {
    self.header("content-type")
  }

  /// Any 2xx status.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Hex SHA-256 of the body.
  pub fn digest(&self) -> String {
    hex::encode(Sha256::digest(&self.body))
  }
}

/// Result of resolving one request, with metadata about where it came from.
#[derive(Debug)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the entry was stored (hits only)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  pub fn from_network(data: T, stored: bool) -> Self {
    Self {
      data,
      source: if stored {
        CacheSource::NetworkStored
      } else {
        CacheSource::NetworkUnstored
      },
      cached_at: None,
    }
  }
}

/// Terminal state of a resolved request. Network failures are the fourth
/// terminal state and surface as an error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Answered from the store, no network access
  Cache,
  /// Fetched from the network and written to the store
  NetworkStored,
  /// Fetched from the network, not eligible for (or failed) storage
  NetworkUnstored,
}

impl fmt::Display for CacheSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Self::Cache => "cache",
      Self::NetworkStored => "network (stored)",
      Self::NetworkUnstored => "network",
    };
    f.write_str(label)
  }
}
