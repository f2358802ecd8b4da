use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::ids::{CardId, SetId};

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Author-assigned difficulty of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

//
// ─── FLASHCARD ─────────────────────────────────────────────────────────────────
//

/// A single front/back card owned by a flashcard set.
///
/// `position` and `flashcard_set_id` are derived from the owning set and are
/// rewritten whenever the set is normalized, so values assigned by callers do
/// not survive a state update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: CardId,
    pub front: String,
    pub back: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub flashcard_set_id: SetId,
}

impl Flashcard {
    /// Creates an ungrouped card; it picks up its position and set link when
    /// it is placed in a set.
    #[must_use]
    pub fn new(id: CardId, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            id,
            front: front.into(),
            back: back.into(),
            difficulty: None,
            tags: BTreeSet::new(),
            position: 0,
            flashcard_set_id: SetId::default(),
        }
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Replaces the tag set. Tags are trimmed and blank tags are dropped.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    /// True when front, back, difficulty and tags match, ignoring derived fields.
    #[must_use]
    pub fn same_content(&self, other: &Flashcard) -> bool {
        self.front == other.front
            && self.back == other.back
            && self.difficulty == other.difficulty
            && self.tags == other.tags
    }
}

fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
