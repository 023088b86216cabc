//! Offline response cache.
//!
//! This module provides the two halves of the cache:
//! - `StoreManager` pre-populates a generation with the app-shell manifest
//! - `CacheLayer` answers each request cache-first and fills the store on misses
//!
//! Both share a single `CacheStorage` handle bound to one generation.

mod install;
mod layer;
mod storage;
mod traits;

pub use install::StoreManager;
pub use layer::CacheLayer;
pub use storage::{CacheStorage, SqliteStorage};
pub use traits::{DeliveryMode, Request, Response};
