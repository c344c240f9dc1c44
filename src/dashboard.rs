//! UI-facing state for the statistics dashboard.
//!
//! `DashboardController` turns the repository's composite stream and sync
//! outcomes into a single state variant plus an independent "manual
//! refresh in flight" flag. The UI layer only observes `ui_state()` and
//! fires `refresh()`; it never drives the fetch logic itself.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::StatsSnapshot;
use crate::repository::StatsRepository;

/// Dashboard state variants.
///
/// Network failures never produce `Error`; they are logged while the last
/// good snapshot keeps serving. `Error` means the composite stream itself
/// died, which only unrecoverable local storage can cause.
#[derive(Debug, Clone)]
pub enum DashboardState {
    /// Before the first composite snapshot arrives.
    Loading,
    /// Steady state; updates in place as snapshots arrive.
    Success {
        snapshot: StatsSnapshot,
        is_refreshing: bool,
    },
    /// Cached data can no longer be read.
    Error { message: String },
}

/// Coordinator between the repository and the UI layer.
///
/// On creation it subscribes to the composite stream and, when the cache
/// is stale, kicks off one background sync without delaying the first
/// `Success` emission. Dropping the controller cancels the subscription
/// immediately; an in-flight sync still runs to completion so the cache
/// is warm for the next observer, its result discarded.
pub struct DashboardController {
    repo: Arc<StatsRepository>,
    state_tx: Arc<watch::Sender<DashboardState>>,
    observer: JoinHandle<()>,
}

impl DashboardController {
    pub fn new(repo: Arc<StatsRepository>) -> Self {
        let (state_tx, _) = watch::channel(DashboardState::Loading);
        let state_tx = Arc::new(state_tx);

        let observer = tokio::spawn(observe(repo.statistics(), state_tx.clone()));

        if repo.is_cache_fresh() {
            debug!("Cache fresh, skipping startup sync");
        } else {
            let repo = repo.clone();
            tokio::spawn(async move {
                if let Err(e) = repo.synchronize().await {
                    warn!(error = %e, "Startup sync failed, serving cached data");
                }
            });
        }

        Self {
            repo,
            state_tx,
            observer,
        }
    }

    /// Live UI state. Subscribers replay the current variant immediately.
    pub fn ui_state(&self) -> watch::Receiver<DashboardState> {
        self.state_tx.subscribe()
    }

    /// Fire-and-forget manual refresh.
    ///
    /// Flips `is_refreshing` on, syncs, flips it off whatever the
    /// outcome. A failed sync is logged, not surfaced as an error state,
    /// because the cache-backed stream keeps serving the last good data.
    pub fn refresh(&self) {
        let repo = self.repo.clone();
        let state_tx = self.state_tx.clone();
        tokio::spawn(async move {
            set_refreshing(&state_tx, true);
            if let Err(e) = repo.synchronize().await {
                warn!(error = %e, "Manual refresh failed, keeping last good data");
            }
            set_refreshing(&state_tx, false);
        });
    }
}

impl Drop for DashboardController {
    fn drop(&mut self) {
        // Cancel the read subscription; sync tasks run to completion
        self.observer.abort();
    }
}

async fn observe(
    mut stats_rx: watch::Receiver<StatsSnapshot>,
    state_tx: Arc<watch::Sender<DashboardState>>,
) {
    loop {
        // The cache replays its latest snapshot on subscribe, so the
        // first Success (possibly with empty tables) emits right away
        let snapshot = stats_rx.borrow_and_update().clone();
        state_tx.send_modify(|state| match state {
            DashboardState::Success {
                snapshot: current, ..
            } => *current = snapshot.clone(),
            other => {
                *other = DashboardState::Success {
                    snapshot: snapshot.clone(),
                    is_refreshing: false,
                }
            }
        });

        if stats_rx.changed().await.is_err() {
            state_tx.send_replace(DashboardState::Error {
                message: "statistics stream closed, cached data unavailable".to_string(),
            });
            return;
        }
    }
}

fn set_refreshing(state_tx: &watch::Sender<DashboardState>, refreshing: bool) {
    state_tx.send_modify(|state| {
        if let DashboardState::Success { is_refreshing, .. } = state {
            *is_refreshing = refreshing;
        }
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::api::{ApiError, RecordSource};
    use crate::cache::CacheStore;
    use crate::models::PetRecord;

    struct SlowSource {
        records: Vec<PetRecord>,
        fail: AtomicBool,
        fetches: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl RecordSource for SlowSource {
        async fn fetch_all_records(&self, _ceiling: u32) -> Result<Vec<PetRecord>, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::InvalidResponse("remote down".to_string()));
            }
            Ok(self.records.clone())
        }
    }

    fn records() -> Vec<PetRecord> {
        vec![
            PetRecord {
                id: 1,
                species_id: Some(1),
                treated: true,
                vaccinations: Vec::new(),
            },
            PetRecord {
                id: 2,
                species_id: Some(1),
                treated: false,
                vaccinations: Vec::new(),
            },
        ]
    }

    fn setup(delay: Duration) -> (Arc<SlowSource>, Arc<StatsRepository>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CacheStore::open(dir.path().to_path_buf()).unwrap());
        let source = Arc::new(SlowSource {
            records: records(),
            fail: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            delay,
        });
        let labels = HashMap::from([(1, "Dog".to_string())]);
        let repo = Arc::new(StatsRepository::new(source.clone(), store, labels));
        (source, repo, dir)
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<DashboardState>,
        predicate: impl FnMut(&DashboardState) -> bool,
    ) -> DashboardState {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("state never arrived")
            .expect("state stream closed")
            .clone()
    }

    #[tokio::test]
    async fn test_startup_emits_success_and_syncs_in_background() {
        let (_source, repo, _dir) = setup(Duration::from_millis(20));
        let controller = DashboardController::new(repo);
        let mut rx = controller.ui_state();

        // First Success may carry the empty cache; data follows the sync
        let state = wait_for_state(&mut rx, |s| {
            matches!(s, DashboardState::Success { snapshot, .. } if !snapshot.is_empty())
        })
        .await;

        match state {
            DashboardState::Success { snapshot, .. } => {
                assert_eq!(snapshot.species[0].label, "Dog");
                assert_eq!(snapshot.species[0].count, 2);
            }
            other => panic!("expected Success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_startup_skips_sync_when_cache_fresh() {
        let (source, repo, _dir) = setup(Duration::ZERO);

        // Prime the cache so the controller finds it fresh
        repo.synchronize().await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let controller = DashboardController::new(repo);
        let mut rx = controller.ui_state();
        wait_for_state(&mut rx, |s| matches!(s, DashboardState::Success { .. })).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_toggles_flag_and_keeps_data_on_failure() {
        let (source, repo, _dir) = setup(Duration::from_millis(50));

        repo.synchronize().await.unwrap();
        let controller = DashboardController::new(repo);
        let mut rx = controller.ui_state();

        let before = wait_for_state(&mut rx, |s| {
            matches!(s, DashboardState::Success { snapshot, .. } if !snapshot.is_empty())
        })
        .await;

        // Refresh against a dead remote: flag goes up, comes back down,
        // and the last good snapshot survives
        source.fail.store(true, Ordering::SeqCst);
        controller.refresh();

        wait_for_state(&mut rx, |s| {
            matches!(s, DashboardState::Success { is_refreshing: true, .. })
        })
        .await;
        let after = wait_for_state(&mut rx, |s| {
            matches!(s, DashboardState::Success { is_refreshing: false, .. })
        })
        .await;

        match (before, after) {
            (
                DashboardState::Success { snapshot: b, .. },
                DashboardState::Success { snapshot: a, .. },
            ) => assert_eq!(a, b),
            _ => panic!("expected Success states"),
        }
    }

    #[tokio::test]
    async fn test_drop_cancels_subscription() {
        let (_source, repo, _dir) = setup(Duration::ZERO);
        let controller = DashboardController::new(repo);
        let mut rx = controller.ui_state();
        wait_for_state(&mut rx, |s| matches!(s, DashboardState::Success { .. })).await;

        drop(controller);

        // The state channel closes once the observer and controller go
        tokio::time::timeout(Duration::from_secs(2), async {
            while rx.changed().await.is_ok() {}
        })
        .await
        .expect("state channel never closed");
    }
}
