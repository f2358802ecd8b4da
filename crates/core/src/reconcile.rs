//! Two-way diff between the primary set list and an independently written copy.
//!
//! The merge is last-writer-wins without timestamps: when both sides hold the
//! same set id with different cards, the primary's cards overwrite the copy's.
//! Edits made only on the copy side of such a set are lost.

use std::collections::HashSet;

use crate::model::{DEFAULT_SET_TITLE, FlashcardSet, SetId};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Sets that existed only in the copy and were added to the primary.
    pub copied_to_primary: usize,
    /// Sets that existed only in the primary and were added to the copy.
    pub copied_to_cache: usize,
    /// Sets present on both sides whose card lists were replaced in the copy.
    pub overwritten_in_cache: usize,
    /// Sets dropped from either side as duplicates.
    pub duplicates_removed: usize,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Runs one reconciliation pass over both lists in place.
///
/// 1. Sets only in `primary` are cloned into `cache` with normalized cards.
/// 2. Sets in both whose card lists differ get the primary's cards in `cache`.
/// 3. Sets only in `cache` are cloned into `primary` with normalized cards.
/// 4. Duplicates are dropped on both sides: repeated ids, and repeated sets
///    titled [`DEFAULT_SET_TITLE`]. First seen wins in `primary`; in `cache`
///    the primary's surviving default set wins so both sides converge.
pub fn reconcile(primary: &mut Vec<FlashcardSet>, cache: &mut Vec<FlashcardSet>) -> Reconciled {
    let mut report = ReconcileReport::default();
    let mut primary_changed = false;

    // Collapse pre-existing duplicates first so a repeated id cannot be
    // copied twice.
    let removed = dedupe(primary, None);
    primary_changed |= removed > 0;
    report.duplicates_removed += removed;
    let keep = default_set_id(primary);
    report.duplicates_removed += dedupe(cache, keep.as_ref());

    for set in primary.iter() {
        match cache.iter_mut().find(|c| c.id == set.id) {
            None => {
                let mut copy = set.clone();
                copy.normalize_cards();
                cache.push(copy);
                report.copied_to_cache += 1;
            }
            Some(existing) if existing.flashcards != set.flashcards => {
                existing.flashcards.clone_from(&set.flashcards);
                existing.normalize_cards();
                report.overwritten_in_cache += 1;
            }
            Some(_) => {}
        }
    }

    let known: HashSet<SetId> = primary.iter().map(|s| s.id.clone()).collect();
    for set in cache.iter() {
        if !known.contains(&set.id) {
            let mut copy = set.clone();
            copy.normalize_cards();
            primary.push(copy);
            report.copied_to_primary += 1;
            primary_changed = true;
        }
    }

    let removed = dedupe(primary, None);
    primary_changed |= removed > 0;
    report.duplicates_removed += removed;
    let keep = default_set_id(primary);
    report.duplicates_removed += dedupe(cache, keep.as_ref());

    Reconciled {
        report,
        primary_changed,
    }
}

/// Outcome of [`reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub report: ReconcileReport,
    /// Whether `primary` needs to be written back.
    pub primary_changed: bool,
}

fn default_set_id(sets: &[FlashcardSet]) -> Option<SetId> {
    sets.iter()
        .find(|s| s.title == DEFAULT_SET_TITLE)
        .map(|s| s.id.clone())
}

/// Drops later occurrences of an id and extra default-titled sets.
///
/// When `preferred_default` names a default-titled set in `sets`, that set
/// survives instead of the first one seen.
fn dedupe(sets: &mut Vec<FlashcardSet>, preferred_default: Option<&SetId>) -> usize {
    let before = sets.len();
    let preferred = preferred_default
        .filter(|id| sets.iter().any(|s| &s.id == *id && s.title == DEFAULT_SET_TITLE))
        .cloned();

    let mut seen_ids = HashSet::new();
    let mut seen_default = false;
    sets.retain(|set| {
        if !seen_ids.insert(set.id.clone()) {
            return false;
        }
        if set.title != DEFAULT_SET_TITLE {
            return true;
        }
        let keep = match &preferred {
            Some(id) => &set.id == id,
            None => !seen_default,
        };
        seen_default |= keep;
        keep
    });
    before - sets.len()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
