//! Pawcache - an offline-first statistics cache for pet records.
//!
//! The crate aggregates remote pet records into dashboard statistics,
//! persists them locally, and keeps observers informed of both cached and
//! freshly synchronized state:
//!
//! - [`cache::CacheStore`]: durable per-table persistence with live
//!   `watch`-channel reads and atomic whole-scope replaces
//! - [`aggregate`]: pure functions turning raw records into species
//!   counts, treatment counts, and ranked vaccine tables
//! - [`repository::StatsRepository`]: fetches, aggregates, replaces, and
//!   exposes the composite statistics stream plus a freshness check
//! - [`dashboard::DashboardController`]: coalesces everything into one
//!   UI-facing state with an independent refresh-in-flight flag
//!
//! Reads for display flow cache -> dashboard; writes flow remote ->
//! aggregate -> cache. The two paths never cross: aggregation consumes
//! remote data only, and observing the cache never triggers a fetch.

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod models;
pub mod repository;

pub use api::{ApiClient, ApiError, RecordSource};
pub use cache::{CacheStore, StorageError};
pub use config::Config;
pub use dashboard::{DashboardController, DashboardState};
pub use models::{PetRecord, SpeciesCount, StatsSnapshot, TreatmentCount, VaccineRank, Vaccination};
pub use repository::{StatsRepository, SyncError};
