//! Cached aggregate rows and the composite snapshot.
//!
//! These types are what the cache store persists and what observers read.
//! Rows are only ever written as part of a whole-scope replace; no row is
//! updated in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Count of pets per species label. At most one row per label within a
/// table snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesCount {
    pub label: String,
    pub count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Count of pets per treatment state. Zero-count states are never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentCount {
    pub label: String,
    pub count: u64,
    pub last_updated: DateTime<Utc>,
}

/// One vaccine's position in a ranked group (e.g. vaccines among dogs).
///
/// `rank` is 1-based and dense: vaccines with equal counts share a rank,
/// and the next distinct count gets the next rank number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccineRank {
    /// Deterministic composite id, `"{group_id}:{vaccine}"`. Reproducible
    /// across syncs for the same inputs, so a replace never depends on
    /// ids from a prior snapshot.
    pub id: String,
    pub group_id: String,
    pub group_label: String,
    pub vaccine: String,
    pub count: u64,
    pub rank: u32,
    pub last_updated: DateTime<Utc>,
}

impl VaccineRank {
    /// Synthesize the composite row id from group and vaccine name.
    pub fn make_id(group_id: &str, vaccine: &str) -> String {
        format!("{}:{}", group_id, vaccine)
    }
}

/// The composite read shape: one snapshot of all three cached tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub species: Vec<SpeciesCount>,
    pub treatments: Vec<TreatmentCount>,
    /// Ranked vaccine rows keyed by group id, each ordered by rank.
    pub vaccines: BTreeMap<String, Vec<VaccineRank>>,
}

impl StatsSnapshot {
    /// True before any sync has ever populated the cache.
    pub fn is_empty(&self) -> bool {
        self.species.is_empty() && self.treatments.is_empty() && self.vaccines.is_empty()
    }
}
