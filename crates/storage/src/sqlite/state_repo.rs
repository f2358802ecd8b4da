use chrono::Utc;
use flashcard_core::model::{AppState, DirtyCard, DirtyItem, SetId, UndoSnapshot};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, map_dirty_card_row, map_dirty_item_row, map_undo_snapshot_row, placeholders, ser,
};
use crate::repository::{APP_STATE_KEY, StateRepository, StorageError};

#[async_trait::async_trait]
impl StateRepository for SqliteRepository {
    async fn load_state(&self) -> Result<Option<AppState>, StorageError> {
        let row = sqlx::query("SELECT value FROM app_state WHERE key = ?1")
            .bind(APP_STATE_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("value").map_err(ser)?;
        serde_json::from_str(&raw).map(Some).map_err(ser)
    }

    async fn save_state(&self, state: &AppState) -> Result<(), StorageError> {
        let value = serde_json::to_string(state).map_err(ser)?;
        sqlx::query(
            r"
            INSERT INTO app_state (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
        )
        .bind(APP_STATE_KEY)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn dirty_items(&self) -> Result<Vec<DirtyItem>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT item_id, item_type, marked_at
            FROM dirty_items
            ORDER BY marked_at ASC, item_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_dirty_item_row).collect()
    }

    async fn add_dirty_item(&self, item: DirtyItem) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO dirty_items (item_id, item_type, marked_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(item_id) DO NOTHING
            ",
        )
        .bind(item.item_id.as_str())
        .bind(item.item_type.as_str())
        .bind(item.marked_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn remove_dirty_items(&self, ids: &[SetId]) -> Result<(), StorageError> {
        if ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM dirty_items WHERE item_id IN ({})",
            placeholders(1, ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id.as_str());
        }
        q.execute(&self.pool).await.map_err(conn)?;
        Ok(())
    }

    async fn dirty_cards(&self) -> Result<Vec<DirtyCard>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT set_id, card_id, marked_at
            FROM dirty_cards
            ORDER BY marked_at ASC, set_id ASC, card_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_dirty_card_row).collect()
    }

    async fn add_dirty_card(&self, card: DirtyCard) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO dirty_cards (set_id, card_id, marked_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(set_id, card_id) DO NOTHING
            ",
        )
        .bind(card.set_id.as_str())
        .bind(card.card_id.as_str())
        .bind(card.marked_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn remove_dirty_cards(&self, set_ids: &[SetId]) -> Result<(), StorageError> {
        if set_ids.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "DELETE FROM dirty_cards WHERE set_id IN ({})",
            placeholders(1, set_ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in set_ids {
            q = q.bind(id.as_str());
        }
        q.execute(&self.pool).await.map_err(conn)?;
        Ok(())
    }

    async fn undo_snapshots(&self) -> Result<Vec<UndoSnapshot>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, created_at, set_id, operation, description, previous_state
            FROM undo_snapshots
            ORDER BY seq ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_undo_snapshot_row).collect()
    }

    async fn save_undo_snapshots(&self, snapshots: &[UndoSnapshot]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("DELETE FROM undo_snapshots")
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (seq, snapshot) in snapshots.iter().enumerate() {
            let previous_state = serde_json::to_string(&snapshot.previous_state).map_err(ser)?;
            let seq = i64::try_from(seq).map_err(|_| StorageError::Serialization("seq overflow".into()))?;
            sqlx::query(
                r"
                INSERT INTO undo_snapshots (id, seq, created_at, set_id, operation, description, previous_state)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )
            .bind(snapshot.id.as_str())
            .bind(seq)
            .bind(snapshot.timestamp)
            .bind(snapshot.set_id.as_str())
            .bind(snapshot.operation.as_str())
            .bind(snapshot.description.as_str())
            .bind(previous_state)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for table in ["app_state", "dirty_items", "dirty_cards", "undo_snapshots"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
