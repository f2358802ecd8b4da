use std::sync::Arc;

use flashcard_core::model::SetId;
use tracing::{info, warn};

use crate::error::{RemoteError, SyncError};
use crate::remote::RemoteApi;
use crate::state_service::StateService;

/// Result of a successful [`SyncService::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReport {
    NothingToSync,
    Synced { upserted: usize, deleted: usize },
}

/// Pushes dirty sets to the remote backend and pulls the remote copy.
pub struct SyncService {
    state: Arc<StateService>,
    remote: Option<Arc<dyn RemoteApi>>,
}

impl SyncService {
    #[must_use]
    pub fn new(state: Arc<StateService>, remote: Option<Arc<dyn RemoteApi>>) -> Self {
        Self { state, remote }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.remote.is_some()
    }

    fn remote(&self) -> Result<&dyn RemoteApi, RemoteError> {
        self.remote.as_deref().ok_or(RemoteError::Disabled)
    }

    /// Push every dirty set to the remote.
    ///
    /// Sets still present locally are upserted (metadata, then cards); ids
    /// with no local set are deleted remotely. Dirty markers are cleared only
    /// once the whole batch succeeded, and only for the ids in this batch.
    ///
    /// A batch set edited again while the push is in flight loses its marker
    /// too, although the pushed copy predates that edit. The next edit, or an
    /// explicit [`StateService::mark_dirty`], queues it again.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` on the first failed call, with every dirty
    /// marker left in place, or `SyncError::State` if the markers cannot be
    /// cleared afterwards.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let ids = self.state.dirty_set_ids();
        if ids.is_empty() {
            return Ok(SyncReport::NothingToSync);
        }

        let report = match self.push(&ids).await {
            Ok(report) => report,
            Err(err) => {
                warn!(sets = ids.len(), error = %err, "sync failed, dirty sets kept");
                return Err(err.into());
            }
        };

        self.state.clear_dirty_items(&ids).await?;
        self.state.clear_dirty_cards(&ids).await?;

        info!(?report, "sync complete");
        Ok(report)
    }

    async fn push(&self, ids: &[SetId]) -> Result<SyncReport, RemoteError> {
        let remote = self.remote()?;
        let state = self.state.get_state();
        let (mut upserted, mut deleted) = (0, 0);

        for id in ids {
            match state.set(id) {
                Some(set) => {
                    remote.upsert_set(set).await?;
                    remote.upsert_cards(id, &set.flashcards).await?;
                    upserted += 1;
                }
                None => {
                    remote.delete_set(id).await?;
                    deleted += 1;
                }
            }
        }

        Ok(SyncReport::Synced { upserted, deleted })
    }

    /// Replace the local sets with the remote copy. Returns the number of sets.
    ///
    /// The selection is kept if the selected set still exists, otherwise the
    /// first set is selected. See [`StateService::replace_sets`].
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the fetch fails, or `SyncError::State`
    /// if the new state cannot be persisted.
    pub async fn pull(&self) -> Result<usize, SyncError> {
        let sets = self.remote()?.fetch_sets().await?;
        let count = sets.len();

        self.state.replace_sets(sets).await?;

        info!(sets = count, "pulled sets from remote");
        Ok(count)
    }
}
