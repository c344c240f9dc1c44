//! Raw pet records as returned by the remote API.
//!
//! These mirror the wire shape. Aggregation never reads from the cache;
//! it consumes these records straight off the network response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single pet record from the remote source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PetRecord {
    pub id: i64,
    /// Missing on malformed records; those aggregate into their own bucket
    /// instead of failing the sync.
    #[serde(rename = "speciesId", default)]
    pub species_id: Option<i64>,
    #[serde(default)]
    pub treated: bool,
    #[serde(default)]
    pub vaccinations: Vec<Vaccination>,
}

/// A typed sub-event attached to a pet record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vaccination {
    pub name: String,
    #[serde(rename = "administeredAt")]
    pub administered_at: DateTime<Utc>,
}
