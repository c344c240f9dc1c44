//! Local caching module for offline statistics access.
//!
//! This module provides the `CacheStore` for persisting aggregated
//! statistics locally. Each table is cached as a JSON file and exposed to
//! readers through a `watch` channel: subscribers replay the latest
//! committed snapshot immediately, then receive a push on every commit.
//!
//! Cached tables:
//! - Species counts (the primary table, used for freshness checks)
//! - Treatment counts
//! - Vaccine rankings, grouped by ranked group

pub mod store;

pub use store::{CacheStore, StorageError};
