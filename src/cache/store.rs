use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::models::{SpeciesCount, TreatmentCount, VaccineRank};

/// On-disk file name per table.
const SPECIES_FILE: &str = "species_counts";
const TREATMENTS_FILE: &str = "treatment_counts";
const VACCINES_FILE: &str = "vaccine_ranks";

/// Errors from the local cache store.
///
/// These are the only errors that can invalidate cached reads; network
/// problems never reach this type.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cache I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache file corrupt: {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

type VaccineTables = BTreeMap<String, Vec<VaccineRank>>;

/// Disk-backed store for the three statistics tables.
///
/// The store is the sole owner of persisted rows. Writers go through the
/// `replace_*` operations, each of which swaps a whole scope (a table, or
/// one ranked group) in a single commit: the new snapshot is written to a
/// temp file, renamed over the old one, then published through the scope's
/// watch channel in one send. Readers can therefore never observe a mix of
/// old and new rows for a scope. A crash between rename and publish leaves
/// the scope old-or-empty, recovered by the next successful sync.
#[derive(Debug)]
pub struct CacheStore {
    cache_dir: PathBuf,
    species_tx: watch::Sender<Vec<SpeciesCount>>,
    treatments_tx: watch::Sender<Vec<TreatmentCount>>,
    vaccines_tx: watch::Sender<VaccineTables>,
    /// Lazily created per-group channels for `vaccine_ranks()` readers.
    group_channels: Mutex<HashMap<String, watch::Sender<Vec<VaccineRank>>>>,
    /// Serializes replace/clear commits so file writes and channel sends
    /// stay in step under concurrent syncs.
    write_lock: Mutex<()>,
}

impl CacheStore {
    /// Open the store, loading any previously persisted tables.
    ///
    /// A missing table file means "no data yet" and loads as empty; an
    /// unreadable or unparsable file is a `StorageError`, surfaced
    /// distinctly so callers never mistake corruption for a cold cache.
    pub fn open(cache_dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&cache_dir).map_err(|source| StorageError::Io {
            path: cache_dir.clone(),
            source,
        })?;

        let species: Vec<SpeciesCount> = load_table(&cache_dir, SPECIES_FILE)?.unwrap_or_default();
        let treatments: Vec<TreatmentCount> =
            load_table(&cache_dir, TREATMENTS_FILE)?.unwrap_or_default();
        let vaccines: VaccineTables = load_table(&cache_dir, VACCINES_FILE)?.unwrap_or_default();

        debug!(
            species = species.len(),
            treatments = treatments.len(),
            vaccine_groups = vaccines.len(),
            "Opened statistics cache"
        );

        let (species_tx, _) = watch::channel(species);
        let (treatments_tx, _) = watch::channel(treatments);
        let (vaccines_tx, _) = watch::channel(vaccines);

        Ok(Self {
            cache_dir,
            species_tx,
            treatments_tx,
            vaccines_tx,
            group_channels: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
        })
    }

    // ===== Live reads =====

    /// Live view of the species count table.
    pub fn species_counts(&self) -> watch::Receiver<Vec<SpeciesCount>> {
        self.species_tx.subscribe()
    }

    /// Live view of the treatment count table.
    pub fn treatment_counts(&self) -> watch::Receiver<Vec<TreatmentCount>> {
        self.treatments_tx.subscribe()
    }

    /// Live view of every ranked group at once, for composite readers.
    pub fn vaccine_tables(&self) -> watch::Receiver<VaccineTables> {
        self.vaccines_tx.subscribe()
    }

    /// Live view of one ranked group, rows ordered by rank ascending.
    ///
    /// Subscribing to a group that has never been written yields an empty
    /// snapshot until the group's first replace.
    pub fn vaccine_ranks(&self, group_id: &str) -> watch::Receiver<Vec<VaccineRank>> {
        let mut channels = self
            .group_channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels
            .entry(group_id.to_string())
            .or_insert_with(|| {
                let current = self
                    .vaccines_tx
                    .borrow()
                    .get(group_id)
                    .cloned()
                    .unwrap_or_default();
                watch::channel(current).0
            })
            .subscribe()
    }

    /// Newest `last_updated` across the primary (species) table, used for
    /// freshness checks. `None` before the first successful sync.
    pub fn last_sync_timestamp(&self) -> Option<DateTime<Utc>> {
        self.species_tx
            .borrow()
            .iter()
            .map(|row| row.last_updated)
            .max()
    }

    // ===== Replaces =====

    /// Atomically replace the species count table.
    pub fn replace_species_counts(&self, rows: Vec<SpeciesCount>) -> Result<(), StorageError> {
        let _guard = self.commit_guard();
        persist_table(&self.cache_dir, SPECIES_FILE, &rows)?;
        self.species_tx.send_replace(rows);
        Ok(())
    }

    /// Atomically replace the treatment count table.
    pub fn replace_treatment_counts(&self, rows: Vec<TreatmentCount>) -> Result<(), StorageError> {
        let _guard = self.commit_guard();
        persist_table(&self.cache_dir, TREATMENTS_FILE, &rows)?;
        self.treatments_tx.send_replace(rows);
        Ok(())
    }

    /// Atomically replace one ranked group. Other groups are untouched.
    pub fn replace_vaccine_ranks(
        &self,
        group_id: &str,
        rows: Vec<VaccineRank>,
    ) -> Result<(), StorageError> {
        let _guard = self.commit_guard();

        let mut tables = self.vaccines_tx.borrow().clone();
        if rows.is_empty() {
            tables.remove(group_id);
        } else {
            tables.insert(group_id.to_string(), rows.clone());
        }
        persist_table(&self.cache_dir, VACCINES_FILE, &tables)?;
        self.vaccines_tx.send_replace(tables);

        let channels = self
            .group_channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(tx) = channels.get(group_id) {
            tx.send_replace(rows);
        }
        Ok(())
    }

    /// Remove every row in all three tables (logout / account switch).
    pub fn clear_all(&self) -> Result<(), StorageError> {
        let _guard = self.commit_guard();

        for name in [SPECIES_FILE, TREATMENTS_FILE, VACCINES_FILE] {
            let path = table_path(&self.cache_dir, name);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::Io { path, source }),
            }
        }

        self.species_tx.send_replace(Vec::new());
        self.treatments_tx.send_replace(Vec::new());
        self.vaccines_tx.send_replace(VaccineTables::new());

        let channels = self
            .group_channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for tx in channels.values() {
            tx.send_replace(Vec::new());
        }

        debug!("Cleared statistics cache");
        Ok(())
    }

    fn commit_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn table_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", name))
}

fn load_table<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<Option<T>, StorageError> {
    let path = table_path(dir, name);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
        path: path.clone(),
        source,
    })?;
    let table = serde_json::from_str(&contents)
        .map_err(|source| StorageError::Corrupt { path, source })?;
    Ok(Some(table))
}

/// Write a table snapshot to a temp file, then rename it into place.
/// The rename keeps a crashed write from leaving a half-written file.
fn persist_table<T: Serialize>(dir: &Path, name: &str, table: &T) -> Result<(), StorageError> {
    let path = table_path(dir, name);
    let tmp = dir.join(format!("{}.json.tmp", name));

    let contents = serde_json::to_string_pretty(table).map_err(|source| StorageError::Corrupt {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&tmp, contents).map_err(|source| StorageError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, &path).map_err(|source| StorageError::Io { path, source })
}

// ============================================================================
// Tests
// ============================================================================
