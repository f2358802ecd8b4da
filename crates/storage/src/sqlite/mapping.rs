use flashcard_core::model::{
    CardId, DirtyCard, DirtyItem, DirtyItemType, FlashcardSet, SetId, UndoSnapshot, UndoSnapshotId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn map_dirty_item_row(row: &SqliteRow) -> Result<DirtyItem, StorageError> {
    let raw_type: String = row.try_get("item_type").map_err(ser)?;
    let item_type = DirtyItemType::parse(&raw_type)
        .ok_or_else(|| StorageError::Serialization(format!("invalid dirty item type: {raw_type}")))?;

    Ok(DirtyItem {
        item_id: SetId::new(row.try_get::<String, _>("item_id").map_err(ser)?),
        item_type,
        marked_at: row.try_get("marked_at").map_err(ser)?,
    })
}

pub(crate) fn map_dirty_card_row(row: &SqliteRow) -> Result<DirtyCard, StorageError> {
    Ok(DirtyCard::new(
        SetId::new(row.try_get::<String, _>("set_id").map_err(ser)?),
        CardId::new(row.try_get::<String, _>("card_id").map_err(ser)?),
        row.try_get("marked_at").map_err(ser)?,
    ))
}

pub(crate) fn map_undo_snapshot_row(row: &SqliteRow) -> Result<UndoSnapshot, StorageError> {
    let raw_state: String = row.try_get("previous_state").map_err(ser)?;
    let previous_state: FlashcardSet = serde_json::from_str(&raw_state).map_err(ser)?;

    Ok(UndoSnapshot {
        id: UndoSnapshotId::new(row.try_get::<String, _>("id").map_err(ser)?),
        timestamp: row.try_get("created_at").map_err(ser)?,
        set_id: SetId::new(row.try_get::<String, _>("set_id").map_err(ser)?),
        operation: row.try_get("operation").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        previous_state,
    })
}

/// Builds `?{start}, ?{start+1}, ...` placeholders for an `IN (...)` clause.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_numbered_from_start() {
        assert_eq!(placeholders(1, 3), "?1, ?2, ?3");
        assert_eq!(placeholders(2, 1), "?2");
        assert_eq!(placeholders(1, 0), "");
    }
}
