use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flashcard_core::model::{
    AppState, CardId, DEFAULT_SET_TITLE, DirtyCard, DirtyItem, FlashcardSet, SetId, UndoHistory,
    UndoOutcome, UndoSnapshot, UndoSnapshotId,
};
use storage::repository::StateRepository;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::Clock;
use crate::error::StateError;

#[derive(Default)]
struct Bookkeeping {
    dirty_items: Vec<DirtyItem>,
    dirty_cards: Vec<DirtyCard>,
    undo: UndoHistory,
    evictions: CacheEvictions,
}

/// Removals the secondary cache has not seen yet.
///
/// Without these, reconciliation would copy a removed set straight back
/// from the cache into the primary state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct CacheEvictions {
    /// The whole set list was replaced; the cache must be rebuilt.
    pub(crate) replaced: bool,
    pub(crate) removed: Vec<SetId>,
}

/// Sole owner of the in-memory [`AppState`].
///
/// Every mutation is normalized, written through to the repository and only
/// then published, so readers and subscribers never observe a state that
/// breaks the card position/link invariant. Mutations are serialized by an
/// async write gate.
pub struct StateService {
    clock: Clock,
    repo: Arc<dyn StateRepository>,
    state: watch::Sender<AppState>,
    bookkeeping: Mutex<Bookkeeping>,
    write_gate: tokio::sync::Mutex<()>,
}

impl StateService {
    /// Load persisted state, dirty markers and undo history.
    ///
    /// A missing state blob yields the default state. Failures reading the
    /// dirty markers or undo history are logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the state blob cannot be read.
    pub async fn load(clock: Clock, repo: Arc<dyn StateRepository>) -> Result<Self, StateError> {
        let state = repo.load_state().await?.unwrap_or_default().normalized();

        let dirty_items = repo.dirty_items().await.unwrap_or_else(|err| {
            warn!(error = %err, "failed to load dirty items");
            Vec::new()
        });
        let dirty_cards = repo.dirty_cards().await.unwrap_or_else(|err| {
            warn!(error = %err, "failed to load dirty cards");
            Vec::new()
        });
        let undo = repo.undo_snapshots().await.unwrap_or_else(|err| {
            warn!(error = %err, "failed to load undo history");
            Vec::new()
        });

        debug!(
            sets = state.flashcard_sets.len(),
            dirty = dirty_items.len(),
            snapshots = undo.len(),
            "state loaded"
        );

        let (state, _) = watch::channel(state);
        Ok(Self {
            clock,
            repo,
            state,
            bookkeeping: Mutex::new(Bookkeeping {
                dirty_items,
                dirty_cards,
                undo: UndoHistory::from_snapshots(undo),
                evictions: CacheEvictions::default(),
            }),
            write_gate: tokio::sync::Mutex::new(()),
        })
    }

    fn bookkeeping(&self) -> MutexGuard<'_, Bookkeeping> {
        self.bookkeeping
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    // ─── State ─────────────────────────────────────────────────────────────────

    /// Snapshot of the current state. Never waits on writers.
    #[must_use]
    pub fn get_state(&self) -> AppState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    /// Apply `updater` to the current state, normalize, persist and publish.
    ///
    /// Card positions and set links produced by `updater` are overwritten.
    /// On failure the in-memory state is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the new state cannot be persisted.
    pub async fn update_state<F>(&self, updater: F) -> Result<AppState, StateError>
    where
        F: FnOnce(AppState) -> AppState,
    {
        let _gate = self.write_gate.lock().await;
        self.apply_locked(updater).await
    }

    /// Like [`StateService::update_state`], but only persists when `change`
    /// reports that it modified the state.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the new state cannot be persisted.
    pub async fn modify_state<F>(&self, change: F) -> Result<bool, StateError>
    where
        F: FnOnce(&mut AppState) -> bool,
    {
        let _gate = self.write_gate.lock().await;
        let mut next = self.get_state();
        if !change(&mut next) {
            return Ok(false);
        }
        self.publish_locked(next).await?;
        Ok(true)
    }

    async fn apply_locked<F>(&self, updater: F) -> Result<AppState, StateError>
    where
        F: FnOnce(AppState) -> AppState,
    {
        let next = updater(self.get_state());
        self.publish_locked(next).await
    }

    async fn publish_locked(&self, next: AppState) -> Result<AppState, StateError> {
        let next = next.normalized();
        self.repo.save_state(&next).await?;
        self.state.send_replace(next.clone());
        Ok(next)
    }

    // ─── Sets ──────────────────────────────────────────────────────────────────

    /// Remove a set and mark its id dirty so the deletion reaches the backend.
    ///
    /// If the set was selected, selection moves to the first remaining set.
    /// Unknown ids still get marked dirty; the backend delete is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the new state cannot be persisted.
    pub async fn remove_set(&self, set_id: &SetId) -> Result<(), StateError> {
        let removed = self
            .modify_state(|state| {
                let before = state.flashcard_sets.len();
                state.flashcard_sets.retain(|s| &s.id != set_id);
                if state.flashcard_sets.len() == before {
                    return false;
                }
                if state.current_set_id.as_ref() == Some(set_id) {
                    state.current_set_id = state.flashcard_sets.first().map(|s| s.id.clone());
                }
                // Recorded under the write gate so no reconciliation pass can
                // run between the removal and the eviction.
                self.bookkeeping().evictions.removed.push(set_id.clone());
                true
            })
            .await?;

        if removed {
            info!(set_id = %set_id, "flashcard set removed");
        }
        self.mark_dirty(set_id).await;
        Ok(())
    }

    /// Create an empty set, select it and mark it dirty.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Set` for an empty title, or `StateError::Storage`
    /// if the new state cannot be persisted.
    pub async fn create_set(
        &self,
        title: &str,
        description: Option<String>,
    ) -> Result<SetId, StateError> {
        let set = FlashcardSet::new(SetId::generate(), title, description, self.clock.now())?;
        let id = set.id.clone();
        self.update_state(|mut state| {
            state.current_set_id = Some(set.id.clone());
            state.flashcard_sets.push(set);
            state
        })
        .await?;
        self.mark_dirty(&id).await;
        Ok(id)
    }

    /// Select an existing set. Returns `false` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the new state cannot be persisted.
    pub async fn select_set(&self, set_id: &SetId) -> Result<bool, StateError> {
        let mut found = false;
        self.modify_state(|state| {
            found = state.contains_set(set_id);
            if !found || state.current_set_id.as_ref() == Some(set_id) {
                return false;
            }
            state.current_set_id = Some(set_id.clone());
            true
        })
        .await?;
        Ok(found)
    }

    /// Create and select the default set when no sets exist.
    ///
    /// Returns the id of the created set, or `None` when sets already exist.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the new state cannot be persisted.
    pub async fn ensure_default_set(&self) -> Result<Option<SetId>, StateError> {
        let set = FlashcardSet::new(SetId::generate(), DEFAULT_SET_TITLE, None, self.clock.now())?;
        let id = set.id.clone();
        let created = self
            .modify_state(|state| {
                if !state.flashcard_sets.is_empty() {
                    return false;
                }
                state.current_set_id = Some(set.id.clone());
                state.flashcard_sets.push(set);
                true
            })
            .await?;

        if !created {
            return Ok(None);
        }
        self.mark_dirty(&id).await;
        Ok(Some(id))
    }

    /// Replace every set, keeping the selection if it still exists.
    ///
    /// The secondary cache is rebuilt from the new list on the next
    /// reconciliation pass instead of being merged back in.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the new state cannot be persisted.
    pub async fn replace_sets(&self, sets: Vec<FlashcardSet>) -> Result<AppState, StateError> {
        let _gate = self.write_gate.lock().await;
        let next = self
            .apply_locked(|mut state| {
                state.flashcard_sets = sets;
                let selected = state
                    .current_set_id
                    .as_ref()
                    .is_some_and(|id| state.contains_set(id));
                if !selected {
                    state.current_set_id = state.flashcard_sets.first().map(|s| s.id.clone());
                }
                state
            })
            .await?;
        self.bookkeeping().evictions.replaced = true;
        Ok(next)
    }

    /// Restore the default empty state and wipe the repository.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the repository cannot be cleared.
    pub async fn reset_state(&self) -> Result<(), StateError> {
        let _gate = self.write_gate.lock().await;
        self.repo.clear_all().await?;
        *self.bookkeeping() = Bookkeeping {
            evictions: CacheEvictions {
                replaced: true,
                removed: Vec::new(),
            },
            ..Bookkeeping::default()
        };
        self.state.send_replace(AppState::default());
        info!("state reset to defaults");
        Ok(())
    }

    // ─── Dirty tracking ────────────────────────────────────────────────────────

    /// Mark a set as having unsynced changes. Idempotent.
    ///
    /// Persistence failures are logged; the in-memory marker is kept so the
    /// next sync in this session still picks the set up.
    pub async fn mark_dirty(&self, set_id: &SetId) {
        let item = DirtyItem::set(set_id.clone(), self.clock.now());
        if let Err(err) = self.repo.add_dirty_item(item.clone()).await {
            warn!(set_id = %set_id, error = %err, "failed to persist dirty set");
        }

        let mut books = self.bookkeeping();
        if !books.dirty_items.iter().any(|d| &d.item_id == set_id) {
            books.dirty_items.push(item);
        }
    }

    /// Mark a card as having unsynced changes; its set is marked dirty too.
    pub async fn mark_card_dirty(&self, set_id: &SetId, card_id: &CardId) {
        let card = DirtyCard::new(set_id.clone(), card_id.clone(), self.clock.now());
        if let Err(err) = self.repo.add_dirty_card(card.clone()).await {
            warn!(set_id = %set_id, card_id = %card_id, error = %err, "failed to persist dirty card");
        }

        {
            let mut books = self.bookkeeping();
            if !books.dirty_cards.iter().any(|d| d.key() == card.key()) {
                books.dirty_cards.push(card);
            }
        }

        self.mark_dirty(set_id).await;
    }

    #[must_use]
    pub fn dirty_items(&self) -> Vec<DirtyItem> {
        self.bookkeeping().dirty_items.clone()
    }

    #[must_use]
    pub fn dirty_cards(&self) -> Vec<DirtyCard> {
        self.bookkeeping().dirty_cards.clone()
    }

    #[must_use]
    pub fn dirty_set_ids(&self) -> Vec<SetId> {
        self.bookkeeping()
            .dirty_items
            .iter()
            .map(|d| d.item_id.clone())
            .collect()
    }

    #[must_use]
    pub fn is_dirty(&self, set_id: &SetId) -> bool {
        self.bookkeeping()
            .dirty_items
            .iter()
            .any(|d| &d.item_id == set_id)
    }

    /// Forget dirty markers for the given sets.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the markers cannot be removed.
    pub async fn clear_dirty_items(&self, set_ids: &[SetId]) -> Result<(), StateError> {
        self.repo.remove_dirty_items(set_ids).await?;
        self.bookkeeping()
            .dirty_items
            .retain(|d| !set_ids.contains(&d.item_id));
        Ok(())
    }

    /// Forget dirty card markers belonging to the given sets.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the markers cannot be removed.
    pub async fn clear_dirty_cards(&self, set_ids: &[SetId]) -> Result<(), StateError> {
        self.repo.remove_dirty_cards(set_ids).await?;
        self.bookkeeping()
            .dirty_cards
            .retain(|d| !set_ids.contains(&d.set_id));
        Ok(())
    }

    // ─── Undo ──────────────────────────────────────────────────────────────────

    /// Capture the current value of a set before a bulk edit.
    ///
    /// The snapshot is kept in memory even if persisting the history fails;
    /// that failure is only logged.
    ///
    /// # Errors
    ///
    /// Returns `StateError::SetNotFound` if the set does not exist.
    pub async fn save_undo_snapshot(
        &self,
        set_id: &SetId,
        operation: &str,
        description: &str,
    ) -> Result<UndoSnapshotId, StateError> {
        let _gate = self.write_gate.lock().await;
        let snapshot = {
            let state = self.state.borrow();
            let set = state
                .set(set_id)
                .ok_or_else(|| StateError::SetNotFound(set_id.clone()))?;
            UndoSnapshot::capture(set, operation, description, self.clock.now())
        };
        let id = snapshot.id.clone();

        let history = {
            let mut books = self.bookkeeping();
            for evicted in books.undo.push(snapshot) {
                debug!(snapshot_id = %evicted.id, set_id = %evicted.set_id, "undo snapshot evicted");
            }
            books.undo.as_slice().to_vec()
        };
        self.persist_undo(&history).await;

        debug!(snapshot_id = %id, set_id = %set_id, operation, "undo snapshot saved");
        Ok(id)
    }

    /// Restore the most recent snapshot of a set and consume it.
    ///
    /// A set deleted after the snapshot was taken is re-inserted.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Storage` if the restored state cannot be persisted;
    /// the snapshot is kept in that case.
    pub async fn undo_last_change(&self, set_id: &SetId) -> Result<UndoOutcome, StateError> {
        let snapshot = {
            let _gate = self.write_gate.lock().await;

            let latest = self.bookkeeping().undo.latest_for(set_id).cloned();
            let Some(snapshot) = latest else {
                return Ok(UndoOutcome::nothing_to_undo());
            };

            let previous = snapshot.previous_state.clone();
            self.apply_locked(move |mut state| {
                match state.set_mut(&previous.id) {
                    Some(set) => *set = previous,
                    None => state.flashcard_sets.push(previous),
                }
                state
            })
            .await?;

            let history = {
                let mut books = self.bookkeeping();
                books.undo.take(&snapshot.id);
                books.undo.as_slice().to_vec()
            };
            self.persist_undo(&history).await;
            snapshot
        };
        self.mark_dirty(set_id).await;

        info!(set_id = %set_id, operation = %snapshot.operation, "undo applied");
        Ok(UndoOutcome::restored(&snapshot))
    }

    /// Snapshot, edit a set in place, then mark the set and every changed card dirty.
    ///
    /// # Errors
    ///
    /// Returns `StateError::SetNotFound` if the set does not exist, or
    /// `StateError::Storage` if the edited state cannot be persisted.
    pub async fn apply_ai_edit<F>(
        &self,
        set_id: &SetId,
        operation: &str,
        description: &str,
        edit: F,
    ) -> Result<UndoSnapshotId, StateError>
    where
        F: FnOnce(&mut FlashcardSet),
    {
        let snapshot_id = self.save_undo_snapshot(set_id, operation, description).await?;
        let now = self.clock.now();

        let mut before = None;
        let state = self
            .update_state(|mut state| {
                if let Some(set) = state.set_mut(set_id) {
                    before = Some(set.clone());
                    edit(set);
                    set.updated_at = now;
                }
                state
            })
            .await?;

        let (Some(before), Some(after)) = (before, state.set(set_id)) else {
            return Err(StateError::SetNotFound(set_id.clone()));
        };
        for card in &after.flashcards {
            let unchanged = before.card(&card.id).is_some_and(|old| old.same_content(card));
            if !unchanged && !card.id.is_placeholder() {
                self.mark_card_dirty(set_id, &card.id).await;
            }
        }
        self.mark_dirty(set_id).await;

        Ok(snapshot_id)
    }

    #[must_use]
    pub fn undo_history(&self) -> Vec<UndoSnapshot> {
        self.bookkeeping().undo.as_slice().to_vec()
    }

    #[must_use]
    pub fn can_undo(&self, set_id: &SetId) -> bool {
        self.bookkeeping().undo.latest_for(set_id).is_some()
    }

    /// Hand over and forget the removals recorded since the last call.
    ///
    /// Meant to be called while the write gate is held, from inside
    /// [`StateService::modify_state`].
    pub(crate) fn take_cache_evictions(&self) -> CacheEvictions {
        std::mem::take(&mut self.bookkeeping().evictions)
    }

    /// Persist the undo history. Callers hold the write gate so concurrent
    /// history copies reach the repository in the order they were made.
    async fn persist_undo(&self, history: &[UndoSnapshot]) {
        if let Err(err) = self.repo.save_undo_snapshots(history).await {
            warn!(error = %err, "failed to persist undo history");
        }
    }
}
