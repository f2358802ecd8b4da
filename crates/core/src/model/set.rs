use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::card::Flashcard;
use crate::model::ids::{CardId, SetId};

/// Title given to the set created for a first-time user.
///
/// Reconciliation also treats it as a sentinel: only one set with this title
/// is kept on each side.
pub const DEFAULT_SET_TITLE: &str = "My First Flashcard Set";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SetError {
    #[error("flashcard set title cannot be empty")]
    EmptyTitle,
}

//
// ─── FLASHCARD SET ─────────────────────────────────────────────────────────────
//

/// A titled, ordered collection of flashcards.
///
/// The set exclusively owns its cards. Every card's `position` equals its
/// index and its `flashcard_set_id` equals the set id once
/// [`FlashcardSet::normalize_cards`] has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSet {
    pub id: SetId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_id: Option<String>,
    #[serde(default)]
    pub flashcards: Vec<Flashcard>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlashcardSet {
    /// Creates an empty set.
    ///
    /// # Errors
    ///
    /// Returns `SetError::EmptyTitle` if the title is empty or whitespace-only.
    pub fn new(
        id: SetId,
        title: impl Into<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, SetError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(SetError::EmptyTitle);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            title: title.trim().to_owned(),
            description,
            icon_id: None,
            flashcards: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    #[must_use]
    pub fn with_icon(mut self, icon_id: impl Into<String>) -> Self {
        self.icon_id = Some(icon_id.into());
        self
    }

    /// Appends cards and re-establishes positions and set links.
    #[must_use]
    pub fn with_cards(mut self, cards: impl IntoIterator<Item = Flashcard>) -> Self {
        self.flashcards.extend(cards);
        self.normalize_cards();
        self
    }

    /// Rewrites each card's position to its index and its set link to this set.
    pub fn normalize_cards(&mut self) {
        for (index, card) in self.flashcards.iter_mut().enumerate() {
            card.position = u32::try_from(index).unwrap_or(u32::MAX);
            card.flashcard_set_id = self.id.clone();
        }
    }

    /// True when every card satisfies the position/link invariant.
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        self.flashcards.iter().enumerate().all(|(index, card)| {
            usize::try_from(card.position).is_ok_and(|p| p == index)
                && card.flashcard_set_id == self.id
        })
    }

    #[must_use]
    pub fn card(&self, id: &CardId) -> Option<&Flashcard> {
        self.flashcards.iter().find(|c| &c.id == id)
    }

    #[must_use]
    pub fn card_mut(&mut self, id: &CardId) -> Option<&mut Flashcard> {
        self.flashcards.iter_mut().find(|c| &c.id == id)
    }

    /// The set without its cards, as pushed to the remote set endpoint.
    #[must_use]
    pub fn metadata(&self) -> FlashcardSet {
        FlashcardSet {
            flashcards: Vec::new(),
            ..self.clone()
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn card(id: &str) -> Flashcard {
        Flashcard::new(CardId::new(id), format!("front {id}"), format!("back {id}"))
    }

    #[test]
    fn new_rejects_empty_title() {
        let err = FlashcardSet::new(SetId::new("s1"), "  ", None, fixed_now()).unwrap_err();
        assert_eq!(err, SetError::EmptyTitle);
    }

    #[test]
    fn new_trims_title_and_drops_blank_description() {
        let set = FlashcardSet::new(SetId::new("s1"), "  German  ", Some("   ".into()), fixed_now())
            .unwrap();
        assert_eq!(set.title, "German");
        assert_eq!(set.description, None);
    }

    #[test]
    fn normalize_rewrites_positions_and_links() {
        let mut set = FlashcardSet::new(SetId::new("s1"), "Set", None, fixed_now()).unwrap();
        let mut stray = card("c2");
        stray.position = 9;
        stray.flashcard_set_id = SetId::new("other");
        set.flashcards = vec![card("c1"), stray];
        assert!(!set.is_normalized());

        set.normalize_cards();

        assert!(set.is_normalized());
        assert_eq!(set.flashcards[1].position, 1);
        assert_eq!(set.flashcards[1].flashcard_set_id, SetId::new("s1"));
    }

    #[test]
    fn metadata_drops_cards() {
        let set = FlashcardSet::new(SetId::new("s1"), "Set", None, fixed_now())
            .unwrap()
            .with_cards([card("c1")]);
        let meta = set.metadata();
        assert!(meta.flashcards.is_empty());
        assert_eq!(meta.title, "Set");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let set = FlashcardSet::new(SetId::new("s1"), "Set", None, fixed_now())
            .unwrap()
            .with_icon("book");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["iconId"], "book");
        assert!(json.get("createdAt").is_some());
    }
}
