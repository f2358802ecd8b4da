use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{SetId, UndoSnapshotId};
use crate::model::set::FlashcardSet;

/// Maximum number of snapshots kept across all sets.
pub const MAX_UNDO_HISTORY: usize = 5;

/// A copy of a set taken right before a bulk edit was applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoSnapshot {
    pub id: UndoSnapshotId,
    pub timestamp: DateTime<Utc>,
    pub set_id: SetId,
    pub operation: String,
    pub description: String,
    pub previous_state: FlashcardSet,
}

impl UndoSnapshot {
    /// Captures `set` by value; later edits to the live set do not reach the snapshot.
    #[must_use]
    pub fn capture(
        set: &FlashcardSet,
        operation: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UndoSnapshotId::generate(),
            timestamp,
            set_id: set.id.clone(),
            operation: operation.into(),
            description: description.into(),
            previous_state: set.clone(),
        }
    }
}

/// Result of an undo request, shaped for display in a transient message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoOutcome {
    pub success: bool,
    pub message: String,
}

impl UndoOutcome {
    #[must_use]
    pub fn restored(snapshot: &UndoSnapshot) -> Self {
        Self {
            success: true,
            message: format!("Undid {}: {}", snapshot.operation, snapshot.description),
        }
    }

    #[must_use]
    pub fn nothing_to_undo() -> Self {
        Self {
            success: false,
            message: "Nothing to undo for this set".to_owned(),
        }
    }
}

/// Bounded snapshot list, newest first.
///
/// The cap is global: pushing past [`MAX_UNDO_HISTORY`] evicts the oldest
/// snapshot whichever set it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoHistory {
    snapshots: Vec<UndoSnapshot>,
}

impl UndoHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from persisted snapshots, enforcing the cap.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<UndoSnapshot>) -> Self {
        snapshots.truncate(MAX_UNDO_HISTORY);
        Self { snapshots }
    }

    /// Prepends a snapshot and returns whatever fell off the end.
    pub fn push(&mut self, snapshot: UndoSnapshot) -> Vec<UndoSnapshot> {
        self.snapshots.insert(0, snapshot);
        if self.snapshots.len() > MAX_UNDO_HISTORY {
            self.snapshots.split_off(MAX_UNDO_HISTORY)
        } else {
            Vec::new()
        }
    }

    /// Most recent snapshot for `set_id`, chosen by timestamp rather than list order.
    #[must_use]
    pub fn latest_for(&self, set_id: &SetId) -> Option<&UndoSnapshot> {
        self.snapshots
            .iter()
            .filter(|s| &s.set_id == set_id)
            .fold(None, |best: Option<&UndoSnapshot>, s| match best {
                Some(b) if b.timestamp >= s.timestamp => Some(b),
                _ => Some(s),
            })
    }

    /// Removes and returns the snapshot with the given id.
    pub fn take(&mut self, id: &UndoSnapshotId) -> Option<UndoSnapshot> {
        let index = self.snapshots.iter().position(|s| &s.id == id)?;
        Some(self.snapshots.remove(index))
    }

    #[must_use]
    pub fn contains(&self, id: &UndoSnapshotId) -> bool {
        self.snapshots.iter().any(|s| &s.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UndoSnapshot> {
        self.snapshots.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[UndoSnapshot] {
        &self.snapshots
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
