//! Outbound transport used on cache misses and during activation.

mod client;

pub use client::HttpClient;

use std::future::Future;

use crate::cache::{Request, Response};
use crate::error::NetworkError;

/// The network collaborator. Implementations forward the request verbatim.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}
