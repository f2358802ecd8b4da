use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use flashcard_core::model::{AppState, FlashcardSet, SetId};
use tracing::debug;

/// Secondary, independently writable copy of the flashcard sets.
///
/// Some read paths want a list they can query without going through
/// [`crate::StateService`]. Writers here do not touch the primary state;
/// [`crate::Reconciler`] brings the two back in line.
#[derive(Debug, Default)]
pub struct SetCache {
    sets: RwLock<Vec<FlashcardSet>>,
}

impl SetCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache seeded from the sets of `state`.
    #[must_use]
    pub fn from_state(state: &AppState) -> Self {
        Self {
            sets: RwLock::new(state.flashcard_sets.clone()),
        }
    }

    /// Append a set, replacing any cached set with the same id.
    pub fn add_flashcard_set(&self, set: FlashcardSet) {
        let mut sets = self.write();
        match sets.iter().position(|s| s.id == set.id) {
            Some(index) => sets[index] = set,
            None => sets.push(set),
        }
    }

    /// Replace the cached set with the same id. Returns `false` if none exists.
    pub fn update_flashcard_set(&self, set: FlashcardSet) -> bool {
        let mut sets = self.write();
        let Some(existing) = sets.iter_mut().find(|s| s.id == set.id) else {
            return false;
        };
        *existing = set;
        true
    }

    #[must_use]
    pub fn get_flashcard_set(&self, id: &SetId) -> Option<FlashcardSet> {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| &s.id == id)
            .cloned()
    }

    #[must_use]
    pub fn flashcard_sets(&self) -> Vec<FlashcardSet> {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns `true` if a set was removed.
    pub fn remove_flashcard_set(&self, id: &SetId) -> bool {
        let mut sets = self.write();
        let before = sets.len();
        sets.retain(|s| &s.id != id);
        sets.len() != before
    }

    pub fn replace_all(&self, sets: Vec<FlashcardSet>) {
        *self.write() = sets;
    }

    /// Discard the cached copy and derive it again from `state`.
    pub fn rebuild_from(&self, state: &AppState) {
        debug!(sets = state.flashcard_sets.len(), "set cache rebuilt");
        self.replace_all(state.flashcard_sets.clone());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<FlashcardSet>> {
        self.sets.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flashcard_core::time::fixed_now;

    fn set(id: &str, title: &str) -> FlashcardSet {
        FlashcardSet::new(SetId::new(id), title, None, fixed_now()).unwrap()
    }

    #[test]
    fn add_replaces_by_id() {
        let cache = SetCache::new();
        cache.add_flashcard_set(set("s1", "One"));
        cache.add_flashcard_set(set("s1", "Uno"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_flashcard_set(&SetId::new("s1")).unwrap().title, "Uno");
    }

    #[test]
    fn update_reports_missing_sets() {
        let cache = SetCache::new();
        assert!(!cache.update_flashcard_set(set("s1", "One")));
        assert!(cache.is_empty());

        cache.add_flashcard_set(set("s1", "One"));
        assert!(cache.update_flashcard_set(set("s1", "Eins")));
        assert_eq!(cache.flashcard_sets()[0].title, "Eins");
    }

    #[test]
    fn remove_and_rebuild() {
        let cache = SetCache::new();
        cache.add_flashcard_set(set("s1", "One"));
        assert!(cache.remove_flashcard_set(&SetId::new("s1")));
        assert!(!cache.remove_flashcard_set(&SetId::new("s1")));

        let state = AppState {
            flashcard_sets: vec![set("a", "A"), set("b", "B")],
            ..AppState::default()
        };
        cache.rebuild_from(&state);
        assert_eq!(cache.flashcard_sets(), state.flashcard_sets);
    }
}
