use async_trait::async_trait;
use flashcard_core::model::{AppState, DirtyCard, DirtyItem, SetId, UndoSnapshot};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Key under which the application state blob is stored.
pub const APP_STATE_KEY: &str = "flashcard_app_state";

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable home of the application state, dirty markers and undo history.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Load the state blob, or `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the blob cannot be read or decoded.
    async fn load_state(&self) -> Result<Option<AppState>, StorageError>;

    /// Replace the state blob.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the blob cannot be encoded or written.
    async fn save_state(&self, state: &AppState) -> Result<(), StorageError>;

    /// List dirty set markers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn dirty_items(&self) -> Result<Vec<DirtyItem>, StorageError>;

    /// Add a dirty set marker. Marking an already dirty id keeps the original record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn add_dirty_item(&self, item: DirtyItem) -> Result<(), StorageError>;

    /// Remove dirty markers for the given ids; unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn remove_dirty_items(&self, ids: &[SetId]) -> Result<(), StorageError>;

    /// List dirty card markers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read failures.
    async fn dirty_cards(&self) -> Result<Vec<DirtyCard>, StorageError>;

    /// Add a dirty card marker, deduplicated by `(set_id, card_id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn add_dirty_card(&self, card: DirtyCard) -> Result<(), StorageError>;

    /// Remove every dirty card marker belonging to the given sets.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn remove_dirty_cards(&self, set_ids: &[SetId]) -> Result<(), StorageError>;

    /// List undo snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failures.
    async fn undo_snapshots(&self) -> Result<Vec<UndoSnapshot>, StorageError>;

    /// Replace the persisted undo history with `snapshots` (newest first).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn save_undo_snapshots(&self, snapshots: &[UndoSnapshot]) -> Result<(), StorageError>;

    /// Remove everything this repository holds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn clear_all(&self) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryTables {
    state: Option<AppState>,
    dirty_items: Vec<DirtyItem>,
    dirty_cards: Vec<DirtyCard>,
    undo_snapshots: Vec<UndoSnapshot>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Mutex<MemoryTables>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryTables>, StorageError> {
        self.tables
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl StateRepository for InMemoryRepository {
    async fn load_state(&self) -> Result<Option<AppState>, StorageError> {
        Ok(self.lock()?.state.clone())
    }

    async fn save_state(&self, state: &AppState) -> Result<(), StorageError> {
        self.lock()?.state = Some(state.clone());
        Ok(())
    }

    async fn dirty_items(&self) -> Result<Vec<DirtyItem>, StorageError> {
        Ok(self.lock()?.dirty_items.clone())
    }

    async fn add_dirty_item(&self, item: DirtyItem) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.dirty_items.iter().any(|d| d.item_id == item.item_id) {
            guard.dirty_items.push(item);
        }
        Ok(())
    }

    async fn remove_dirty_items(&self, ids: &[SetId]) -> Result<(), StorageError> {
        let ids: HashSet<&SetId> = ids.iter().collect();
        self.lock()?
            .dirty_items
            .retain(|d| !ids.contains(&d.item_id));
        Ok(())
    }

    async fn dirty_cards(&self) -> Result<Vec<DirtyCard>, StorageError> {
        Ok(self.lock()?.dirty_cards.clone())
    }

    async fn add_dirty_card(&self, card: DirtyCard) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.dirty_cards.iter().any(|d| d.key() == card.key()) {
            guard.dirty_cards.push(card);
        }
        Ok(())
    }

    async fn remove_dirty_cards(&self, set_ids: &[SetId]) -> Result<(), StorageError> {
        let ids: HashSet<&SetId> = set_ids.iter().collect();
        self.lock()?.dirty_cards.retain(|d| !ids.contains(&d.set_id));
        Ok(())
    }

    async fn undo_snapshots(&self) -> Result<Vec<UndoSnapshot>, StorageError> {
        Ok(self.lock()?.undo_snapshots.clone())
    }

    async fn save_undo_snapshots(&self, snapshots: &[UndoSnapshot]) -> Result<(), StorageError> {
        self.lock()?.undo_snapshots = snapshots.to_vec();
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        *self.lock()? = MemoryTables::default();
        Ok(())
    }
}

/// Holds the state repository behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub state: Arc<dyn StateRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(InMemoryRepository::new()),
        }
    }

    #[must_use]
    pub fn from_repository(repo: Arc<dyn StateRepository>) -> Self {
        Self { state: repo }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashcard_core::model::{CardId, FlashcardSet};
    use flashcard_core::time::fixed_now;

    #[tokio::test]
    async fn dirty_items_are_deduplicated_by_id() {
        let repo = InMemoryRepository::new();
        let id = SetId::new("s1");
        repo.add_dirty_item(DirtyItem::set(id.clone(), fixed_now()))
            .await
            .unwrap();
        repo.add_dirty_item(DirtyItem::set(id.clone(), fixed_now() + chrono::Duration::hours(1)))
            .await
            .unwrap();

        let items = repo.dirty_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].marked_at, fixed_now());
    }

    #[tokio::test]
    async fn remove_dirty_cards_drops_all_pairs_for_set() {
        let repo = InMemoryRepository::new();
        for (set, card) in [("s1", "c1"), ("s1", "c2"), ("s2", "c3")] {
            repo.add_dirty_card(DirtyCard::new(SetId::new(set), CardId::new(card), fixed_now()))
                .await
                .unwrap();
        }

        repo.remove_dirty_cards(&[SetId::new("s1")]).await.unwrap();

        let left = repo.dirty_cards().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].set_id, SetId::new("s2"));
    }

    #[tokio::test]
    async fn clear_all_wipes_state_and_markers() {
        let repo = InMemoryRepository::new();
        let set = FlashcardSet::new(SetId::new("s1"), "Set", None, fixed_now()).unwrap();
        let state = AppState {
            flashcard_sets: vec![set],
            ..AppState::default()
        };
        repo.save_state(&state).await.unwrap();
        repo.add_dirty_item(DirtyItem::set(SetId::new("s1"), fixed_now()))
            .await
            .unwrap();

        repo.clear_all().await.unwrap();

        assert!(repo.load_state().await.unwrap().is_none());
        assert!(repo.dirty_items().await.unwrap().is_empty());
    }
}
