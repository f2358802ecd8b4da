use std::sync::Arc;
use std::time::Duration;

use flashcard_core::reconcile::{ReconcileReport, reconcile};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::set_cache::SetCache;
use crate::state_service::StateService;

/// Brings [`StateService`] and [`SetCache`] back in line.
///
/// Sets missing on one side are copied over, and when both sides hold a set
/// with different cards the primary's cards win. Edits made only to the
/// cached copy of such a set are dropped.
///
/// Sets removed through [`StateService`] since the last pass are evicted
/// from the cache first, and a replaced or reset state rebuilds the cache,
/// so neither is copied back into the primary state.
pub struct Reconciler {
    state: Arc<StateService>,
    cache: Arc<SetCache>,
}

impl Reconciler {
    #[must_use]
    pub fn new(state: Arc<StateService>, cache: Arc<SetCache>) -> Self {
        Self { state, cache }
    }

    /// Run a single pass. The primary state is only persisted when it changed.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the reconciled primary state cannot be
    /// persisted. The cache keeps its reconciled contents in that case.
    pub async fn run_once(&self) -> Result<ReconcileReport, StateError> {
        let mut report = ReconcileReport::default();
        self.state
            .modify_state(|state| {
                let evictions = self.state.take_cache_evictions();
                let mut cached = self.cache.write();
                if evictions.replaced {
                    *cached = state.flashcard_sets.clone();
                } else if !evictions.removed.is_empty() {
                    cached.retain(|s| !evictions.removed.contains(&s.id));
                }
                let outcome = reconcile(&mut state.flashcard_sets, &mut cached);
                report = outcome.report;

                let selection_lost = state
                    .current_set_id
                    .as_ref()
                    .is_some_and(|id| !state.contains_set(id));
                if selection_lost {
                    state.current_set_id = state.flashcard_sets.first().map(|s| s.id.clone());
                }
                outcome.primary_changed || selection_lost
            })
            .await?;

        if report.overwritten_in_cache > 0 {
            debug!(
                sets = report.overwritten_in_cache,
                "cached cards overwritten by primary"
            );
        }
        if !report.is_noop() {
            debug!(
                copied_to_primary = report.copied_to_primary,
                copied_to_cache = report.copied_to_cache,
                duplicates_removed = report.duplicates_removed,
                "reconciliation applied"
            );
        }
        Ok(report)
    }

    /// Run [`Reconciler::run_once`] every `period` on the tokio runtime.
    ///
    /// The first pass runs one full period after spawning. Failures are
    /// logged and the loop keeps going.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, period: Duration) -> ReconcileTask {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let reconciler = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(err) = reconciler.run_once().await {
                            warn!(error = %err, "periodic reconciliation failed");
                        }
                    }
                }
            }
            debug!("reconciliation task stopped");
        });

        debug!(period_secs = period.as_secs(), "reconciliation task spawned");
        ReconcileTask {
            stop: stop_tx,
            handle,
        }
    }
}

/// Handle to the periodic reconciliation task.
///
/// Dropping the handle without calling [`ReconcileTask::shutdown`] also stops
/// the loop, but does not wait for an in-flight pass.
pub struct ReconcileTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ReconcileTask {
    /// Stop the loop and wait for an in-flight pass to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.handle.await {
            warn!(error = %err, "reconciliation task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashcard_core::model::{AppState, CardId, Flashcard, FlashcardSet, SetId};
    use flashcard_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, StateRepository};

    fn set(id: &str, cards: &[&str]) -> FlashcardSet {
        FlashcardSet::new(SetId::new(id), format!("Set {id}"), None, fixed_now())
            .unwrap()
            .with_cards(cards.iter().map(|c| Flashcard::new(CardId::new(*c), "q", "a")))
    }

    async fn reconciler_with(primary: Vec<FlashcardSet>, cached: Vec<FlashcardSet>) -> Reconciler {
        let repo = InMemoryRepository::new();
        repo.save_state(&AppState {
            flashcard_sets: primary,
            ..AppState::default()
        })
        .await
        .unwrap();
        let state = StateService::load(fixed_clock(), Arc::new(repo)).await.unwrap();
        let cache = SetCache::new();
        cache.replace_all(cached);
        Reconciler::new(Arc::new(state), Arc::new(cache))
    }

    #[tokio::test]
    async fn cache_only_sets_reach_primary() {
        let reconciler = reconciler_with(vec![], vec![set("x", &["c1", "c2"])]).await;

        let report = reconciler.run_once().await.unwrap();

        assert_eq!(report.copied_to_primary, 1);
        let state = reconciler.state.get_state();
        assert!(state.is_normalized());
        assert_eq!(state.flashcard_sets, reconciler.cache.flashcard_sets());
    }

    #[tokio::test]
    async fn second_pass_is_a_noop() {
        let reconciler =
            reconciler_with(vec![set("a", &["c1"])], vec![set("b", &["c2"])]).await;

        assert!(!reconciler.run_once().await.unwrap().is_noop());
        assert!(reconciler.run_once().await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn removed_sets_are_evicted_from_cache() {
        let reconciler =
            reconciler_with(vec![set("a", &["c1"]), set("b", &["c2"])], vec![]).await;
        reconciler.run_once().await.unwrap();
        assert_eq!(reconciler.cache.len(), 2);

        reconciler.state.remove_set(&SetId::new("a")).await.unwrap();
        reconciler.run_once().await.unwrap();

        assert!(!reconciler.state.get_state().contains_set(&SetId::new("a")));
        assert!(reconciler.cache.get_flashcard_set(&SetId::new("a")).is_none());
        assert_eq!(reconciler.cache.len(), 1);
    }

    #[tokio::test]
    async fn replaced_sets_rebuild_the_cache() {
        let reconciler = reconciler_with(vec![set("a", &["c1"])], vec![set("old", &[])]).await;
        reconciler.run_once().await.unwrap();

        reconciler
            .state
            .replace_sets(vec![set("r1", &["c9"])])
            .await
            .unwrap();
        reconciler.run_once().await.unwrap();

        let ids: Vec<_> = reconciler
            .state
            .get_state()
            .flashcard_sets
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![SetId::new("r1")]);
        assert_eq!(reconciler.cache.flashcard_sets(), reconciler.state.get_state().flashcard_sets);
    }

    #[tokio::test]
    async fn reset_empties_both_stores() {
        let reconciler = reconciler_with(vec![set("a", &["c1"])], vec![]).await;
        reconciler.run_once().await.unwrap();

        reconciler.state.reset_state().await.unwrap();
        reconciler.run_once().await.unwrap();

        assert!(reconciler.state.get_state().flashcard_sets.is_empty());
        assert!(reconciler.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_reconciles_and_stops() {
        let reconciler =
            Arc::new(reconciler_with(vec![set("a", &["c1"])], vec![]).await);
        let task = reconciler.spawn(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        task.shutdown().await;

        assert_eq!(reconciler.cache.len(), 1);
    }
}
