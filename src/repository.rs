//! Sync orchestration between the remote records API and the local cache.
//!
//! `StatsRepository` is the only writer of the cached tables and the only
//! read surface exposed upward: a composite `watch` stream folding the
//! three table channels into one snapshot. Reading the stream never
//! triggers a network call; writes flow remote -> aggregate -> cache and
//! nothing else.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::aggregate;
use crate::api::{ApiError, RecordSource};
use crate::cache::{CacheStore, StorageError};
use crate::models::{PetRecord, StatsSnapshot, Vaccination};

// ============================================================================
// Constants
// ============================================================================

/// Cached statistics are considered fresh for 5 minutes.
/// Short enough that the dashboard tracks the day's intake, long enough to
/// skip a network round-trip when the user bounces between screens.
const FRESHNESS_WINDOW_MINUTES: i64 = 5;

/// Ceiling on records fetched in one sync. The records endpoint is not
/// paginated by this subsystem; the ceiling just bounds one response.
const PAGE_SIZE_CEILING: u32 = 500;

/// One sync attempt's failure modes.
///
/// Transport failures happen before any cache write and self-heal on the
/// next attempt. Storage failures can leave earlier scopes replaced and
/// later scopes stale; each scope stays internally consistent either way.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Transport(#[from] ApiError),

    #[error("cache write failed: {0}")]
    Storage(#[from] StorageError),
}

/// Repository bridging the remote source and the cache store.
///
/// Construct inside a Tokio runtime; a background task folds the store's
/// table channels into the composite statistics stream for as long as the
/// repository lives.
pub struct StatsRepository {
    source: Arc<dyn RecordSource>,
    store: Arc<CacheStore>,
    species_labels: HashMap<i64, String>,
    stats_rx: watch::Receiver<StatsSnapshot>,
}

impl StatsRepository {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<CacheStore>,
        species_labels: HashMap<i64, String>,
    ) -> Self {
        let stats_rx = spawn_combiner(&store);
        Self {
            source,
            store,
            species_labels,
            stats_rx,
        }
    }

    /// Composite live view over all three cached tables.
    ///
    /// Subscribers replay the latest snapshot immediately, then receive a
    /// coalesced update whenever any constituent table commits. Delivery
    /// is in commit order per subscriber; no ordering is promised across
    /// scopes while a multi-scope sync is mid-flight.
    pub fn statistics(&self) -> watch::Receiver<StatsSnapshot> {
        self.stats_rx.clone()
    }

    /// Whether the last successful sync is recent enough to skip another
    /// round-trip. False when no sync ever succeeded.
    pub fn is_cache_fresh(&self) -> bool {
        match self.store.last_sync_timestamp() {
            Some(last) => Utc::now() - last < Duration::minutes(FRESHNESS_WINDOW_MINUTES),
            None => false,
        }
    }

    /// Fetch the full record set, aggregate it, and replace the cached
    /// tables scope by scope: species, then treatments, then one vaccine
    /// group per species bucket.
    ///
    /// A transport failure returns before any replace, leaving the whole
    /// cache as it was. A storage failure on a later scope keeps the
    /// scopes already replaced; there is no cross-table rollback.
    pub async fn synchronize(&self) -> Result<(), SyncError> {
        debug!("Starting statistics sync");
        let records = self.source.fetch_all_records(PAGE_SIZE_CEILING).await?;
        let now = Utc::now();
        let label_of = |id: i64| self.species_labels.get(&id).cloned();

        let species = aggregate::by_species(&records, label_of, now);
        self.store.replace_species_counts(species)?;

        let treatments = aggregate::by_treatment(&records, now);
        self.store.replace_treatment_counts(treatments)?;

        for group in vaccine_groups(&records, label_of) {
            let rows = aggregate::vaccine_ranking(&group.events, &group.id, &group.label, now);
            self.store.replace_vaccine_ranks(&group.id, rows)?;
        }

        debug!(records = records.len(), "Statistics sync complete");
        Ok(())
    }
}

struct VaccineGroup {
    id: String,
    label: String,
    events: Vec<Vaccination>,
}

/// Partition vaccination events into one ranked group per species bucket,
/// groups ordered by first appearance in the record set.
fn vaccine_groups(
    records: &[PetRecord],
    label_of: impl Fn(i64) -> Option<String> + Copy,
) -> Vec<VaccineGroup> {
    let mut groups: Vec<VaccineGroup> = Vec::new();
    let mut index: HashMap<Option<i64>, usize> = HashMap::new();

    for record in records {
        let at = *index.entry(record.species_id).or_insert_with(|| {
            groups.push(VaccineGroup {
                id: group_id(record.species_id),
                label: aggregate::species_label(record.species_id, label_of),
                events: Vec::new(),
            });
            groups.len() - 1
        });
        groups[at].events.extend(record.vaccinations.iter().cloned());
    }
    groups
}

/// Deterministic ranked-group id for a species bucket.
fn group_id(species_id: Option<i64>) -> String {
    match species_id {
        Some(id) => format!("species-{}", id),
        None => "species-unknown".to_string(),
    }
}

/// Fold the store's three table channels into one composite channel.
/// The task exits when the store is dropped or the last subscriber goes.
fn spawn_combiner(store: &CacheStore) -> watch::Receiver<StatsSnapshot> {
    let mut species_rx = store.species_counts();
    let mut treatments_rx = store.treatment_counts();
    let mut vaccines_rx = store.vaccine_tables();

    let initial = StatsSnapshot {
        species: species_rx.borrow_and_update().clone(),
        treatments: treatments_rx.borrow_and_update().clone(),
        vaccines: vaccines_rx.borrow_and_update().clone(),
    };
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        loop {
            let changed = tokio::select! {
                r = species_rx.changed() => r,
                r = treatments_rx.changed() => r,
                r = vaccines_rx.changed() => r,
            };
            if changed.is_err() {
                // Store dropped; composite stream closes behind us
                return;
            }

            let snapshot = StatsSnapshot {
                species: species_rx.borrow_and_update().clone(),
                treatments: treatments_rx.borrow_and_update().clone(),
                vaccines: vaccines_rx.borrow_and_update().clone(),
            };
            if tx.send(snapshot).is_err() {
                return;
            }
        }
    });

    rx
}

// ============================================================================
// Tests
// ============================================================================
