use serde::{Deserialize, Serialize};

use crate::model::ids::SetId;
use crate::model::set::FlashcardSet;

/// The whole persisted application state.
///
/// Stored as a single blob; every write replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub flashcard_sets: Vec<FlashcardSet>,
    #[serde(default)]
    pub current_set_id: Option<SetId>,
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub tutorial_completed: bool,
    #[serde(default = "default_first_visit")]
    pub first_visit: bool,
}

fn default_first_visit() -> bool {
    true
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            flashcard_sets: Vec::new(),
            current_set_id: None,
            dark_mode: false,
            tutorial_completed: false,
            first_visit: true,
        }
    }
}

impl AppState {
    /// Re-establishes the position/link invariant for every set.
    pub fn normalize(&mut self) {
        for set in &mut self.flashcard_sets {
            set.normalize_cards();
        }
    }

    /// Consuming variant of [`AppState::normalize`].
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.flashcard_sets.iter().all(FlashcardSet::is_normalized)
    }

    #[must_use]
    pub fn set(&self, id: &SetId) -> Option<&FlashcardSet> {
        self.flashcard_sets.iter().find(|s| &s.id == id)
    }

    #[must_use]
    pub fn set_mut(&mut self, id: &SetId) -> Option<&mut FlashcardSet> {
        self.flashcard_sets.iter_mut().find(|s| &s.id == id)
    }

    #[must_use]
    pub fn contains_set(&self, id: &SetId) -> bool {
        self.set(id).is_some()
    }

    /// The selected set, if the selection still points at an existing set.
    #[must_use]
    pub fn current_set(&self) -> Option<&FlashcardSet> {
        self.current_set_id.as_ref().and_then(|id| self.set(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CardId, Flashcard};
    use crate::time::fixed_now;

    #[test]
    fn default_state_is_first_visit() {
        let state = AppState::default();
        assert!(state.first_visit);
        assert!(state.flashcard_sets.is_empty());
        assert_eq!(state.current_set_id, None);
    }

    #[test]
    fn missing_flags_deserialize_to_defaults() {
        let state: AppState = serde_json::from_str(r#"{"flashcardSets": []}"#).unwrap();
        assert_eq!(state, AppState::default());
    }

    #[test]
    fn normalize_covers_every_set() {
        let mut a = FlashcardSet::new(SetId::new("a"), "A", None, fixed_now()).unwrap();
        a.flashcards.push(Flashcard::new(CardId::new("c1"), "Q", "A"));
        a.flashcards.push(Flashcard::new(CardId::new("c2"), "Q", "A"));
        let mut b = FlashcardSet::new(SetId::new("b"), "B", None, fixed_now()).unwrap();
        b.flashcards.push(Flashcard::new(CardId::new("c3"), "Q", "A"));

        let state = AppState {
            flashcard_sets: vec![a, b],
            ..AppState::default()
        }
        .normalized();

        assert!(state.is_normalized());
        assert_eq!(state.flashcard_sets[1].flashcards[0].flashcard_set_id, SetId::new("b"));
    }

    #[test]
    fn current_set_ignores_dangling_selection() {
        let state = AppState {
            current_set_id: Some(SetId::new("gone")),
            ..AppState::default()
        };
        assert!(state.current_set().is_none());
    }
}
