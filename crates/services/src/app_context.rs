use std::sync::Arc;
use std::time::Duration;

use storage::repository::Storage;
use tracing::{info, warn};

use crate::Clock;
use crate::config::AppConfig;
use crate::error::AppContextError;
use crate::reconciler::{ReconcileTask, Reconciler};
use crate::remote::{HttpRemoteApi, RemoteApi};
use crate::set_cache::SetCache;
use crate::state_service::StateService;
use crate::sync_service::SyncService;

/// Owns every service of the state layer for the lifetime of the app.
///
/// Build it once at startup and hand clones of the services to whatever
/// needs them; call [`AppContext::shutdown`] on exit.
pub struct AppContext {
    state: Arc<StateService>,
    cache: Arc<SetCache>,
    reconciler: Arc<Reconciler>,
    sync: Arc<SyncService>,
    reconcile_task: Option<ReconcileTask>,
}

impl AppContext {
    /// Build services backed by `SQLite` storage and the configured remote.
    ///
    /// # Errors
    ///
    /// Returns `AppContextError` if storage initialization or state loading fails.
    pub async fn start(config: &AppConfig) -> Result<Self, AppContextError> {
        let storage = Storage::sqlite(&config.db_url).await?;
        let remote = config
            .remote
            .clone()
            .map(|remote| Arc::new(HttpRemoteApi::new(remote)) as Arc<dyn RemoteApi>);
        Self::with_parts(
            Clock::default_clock(),
            storage,
            remote,
            config.reconcile_interval,
        )
        .await
    }

    /// Build services from explicit parts.
    ///
    /// An empty local store is seeded from the remote when one is given; a
    /// failed pull is logged and startup continues offline. A default set is
    /// created if there is still nothing to show. Periodic reconciliation
    /// runs every `reconcile_interval` when set.
    ///
    /// # Errors
    ///
    /// Returns `AppContextError` if state loading or default set creation fails.
    pub async fn with_parts(
        clock: Clock,
        storage: Storage,
        remote: Option<Arc<dyn RemoteApi>>,
        reconcile_interval: Option<Duration>,
    ) -> Result<Self, AppContextError> {
        let state = Arc::new(StateService::load(clock, Arc::clone(&storage.state)).await?);
        let sync = Arc::new(SyncService::new(Arc::clone(&state), remote));

        if sync.enabled() && state.get_state().flashcard_sets.is_empty() {
            if let Err(err) = sync.pull().await {
                warn!(error = %err, "initial pull failed, starting offline");
            }
        }
        if let Some(id) = state.ensure_default_set().await? {
            info!(set_id = %id, "created default flashcard set");
        }

        let cache = Arc::new(SetCache::from_state(&state.get_state()));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&state), Arc::clone(&cache)));
        let reconcile_task = reconcile_interval.map(|period| reconciler.spawn(period));

        Ok(Self {
            state,
            cache,
            reconciler,
            sync,
            reconcile_task,
        })
    }

    #[must_use]
    pub fn state(&self) -> Arc<StateService> {
        Arc::clone(&self.state)
    }

    #[must_use]
    pub fn cache(&self) -> Arc<SetCache> {
        Arc::clone(&self.cache)
    }

    #[must_use]
    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    #[must_use]
    pub fn sync(&self) -> Arc<SyncService> {
        Arc::clone(&self.sync)
    }

    /// Stop periodic reconciliation and run one last pass.
    ///
    /// # Errors
    ///
    /// Returns `AppContextError::State` if the final pass cannot persist.
    pub async fn shutdown(mut self) -> Result<(), AppContextError> {
        if let Some(task) = self.reconcile_task.take() {
            task.shutdown().await;
        }
        self.reconciler.run_once().await?;
        info!("app context shut down");
        Ok(())
    }
}
