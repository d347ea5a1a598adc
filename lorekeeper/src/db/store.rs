use async_trait::async_trait;
use libsql::params;
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    now_rfc3339, BackupRecord, ChatMapping, Checkpoint, EntityKind, EntityStatus, QueuedEntity,
    ScanRecord, ScanStatus, UpdateAction,
};

use super::connection::Database;

/// Review queue operations.
#[async_trait]
pub trait EntityQueueStore: Send + Sync {
    async fn add_entity(
        &self,
        kind: EntityKind,
        name: &str,
        data: &Value,
        target_file: &str,
        source_context: Option<&str>,
        confidence: f64,
    ) -> Result<i64>;

    async fn get_entity(&self, id: i64) -> Result<Option<QueuedEntity>>;

    async fn pending_entities(
        &self,
        target_file: Option<&str>,
        kind: Option<EntityKind>,
    ) -> Result<Vec<QueuedEntity>>;

    /// Compare-and-set status transition. Returns false when the record's
    /// current status no longer matches `from`, so concurrent reviewers
    /// cannot both win.
    async fn transition_status(
        &self,
        id: i64,
        from: EntityStatus,
        to: EntityStatus,
        reviewed_by: Option<&str>,
    ) -> Result<bool>;

    async fn update_entity_data(&self, id: i64, data: &Value, confidence: f64) -> Result<()>;
}

/// Scan bookkeeping: history, checkpoints, chat-to-character mappings.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn checkpoint(&self, chat_file: &str) -> Result<Option<Checkpoint>>;
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;
    async fn reset_checkpoint(&self, chat_file: &str) -> Result<()>;

    async fn add_scan_record(&self, record: &ScanRecord) -> Result<i64>;
    async fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>>;

    async fn mapping(&self, chat_file: &str) -> Result<Option<ChatMapping>>;
    async fn set_mapping(
        &self,
        chat_file: &str,
        character_file: &str,
        persona_file: Option<&str>,
    ) -> Result<()>;
    async fn list_mappings(&self) -> Result<Vec<ChatMapping>>;

    async fn add_update_record(
        &self,
        entity_id: i64,
        target_file: &str,
        entry_id: Option<i64>,
        action: UpdateAction,
    ) -> Result<()>;
}

/// Backup ledger operations.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn add_backup_record(
        &self,
        source_path: &str,
        backup_path: &str,
        content_hash: &str,
    ) -> Result<i64>;

    async fn backups(&self, source_path: Option<&str>) -> Result<Vec<BackupRecord>>;

    async fn delete_backup_record(&self, id: i64) -> Result<()>;
}

#[async_trait]
impl EntityQueueStore for Database {
    async fn add_entity(
        &self,
        kind: EntityKind,
        name: &str,
        data: &Value,
        target_file: &str,
        source_context: Option<&str>,
        confidence: f64,
    ) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO entity_queue (
                entity_type, name, data, target_file, source_context,
                confidence, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)
            "#,
            params![
                kind.as_str(),
                name,
                serde_json::to_string(data)?,
                target_file,
                source_context,
                confidence,
                now_rfc3339(),
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn get_entity(&self, id: i64) -> Result<Option<QueuedEntity>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query("SELECT * FROM entity_queue WHERE id = ?1", params![id])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_entity(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn pending_entities(
        &self,
        target_file: Option<&str>,
        kind: Option<EntityKind>,
    ) -> Result<Vec<QueuedEntity>> {
        let conn = self.connect()?;

        let mut sql = "SELECT * FROM entity_queue WHERE status = 'pending'".to_string();
        let mut values: Vec<libsql::Value> = Vec::new();
        if let Some(target) = target_file {
            values.push(libsql::Value::from(target.to_string()));
            sql.push_str(&format!(" AND target_file = ?{}", values.len()));
        }
        if let Some(kind) = kind {
            values.push(libsql::Value::from(kind.as_str().to_string()));
            sql.push_str(&format!(" AND entity_type = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_entity(&row)?);
        }
        Ok(results)
    }

    async fn transition_status(
        &self,
        id: i64,
        from: EntityStatus,
        to: EntityStatus,
        reviewed_by: Option<&str>,
    ) -> Result<bool> {
        let conn = self.connect()?;
        let rows_affected = conn
            .execute(
                r#"
                UPDATE entity_queue
                SET status = ?3, reviewed_at = ?4, reviewed_by = ?5
                WHERE id = ?1 AND status = ?2
                "#,
                params![
                    id,
                    from.as_str(),
                    to.as_str(),
                    now_rfc3339(),
                    reviewed_by,
                ],
            )
            .await?;
        Ok(rows_affected > 0)
    }

    async fn update_entity_data(&self, id: i64, data: &Value, confidence: f64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE entity_queue SET data = ?2, confidence = ?3 WHERE id = ?1",
            params![id, serde_json::to_string(data)?, confidence],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ScanStore for Database {
    async fn checkpoint(&self, chat_file: &str) -> Result<Option<Checkpoint>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT chat_file, last_processed_index, last_processed_timestamp, total_turns
                 FROM processing_checkpoints WHERE chat_file = ?1",
                params![chat_file],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Checkpoint {
                chat_file: row.get(0)?,
                last_processed_index: row.get::<i64>(1)? as usize,
                last_processed_timestamp: row.get(2)?,
                total_turns: row.get::<i64>(3)? as usize,
            }))
        } else {
            Ok(None)
        }
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO processing_checkpoints (
                chat_file, last_processed_index, last_processed_timestamp, total_turns
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(chat_file) DO UPDATE SET
                last_processed_index = excluded.last_processed_index,
                last_processed_timestamp = excluded.last_processed_timestamp,
                total_turns = excluded.total_turns
            "#,
            params![
                checkpoint.chat_file.clone(),
                checkpoint.last_processed_index as i64,
                checkpoint.last_processed_timestamp.clone(),
                checkpoint.total_turns as i64,
            ],
        )
        .await?;
        Ok(())
    }

    async fn reset_checkpoint(&self, chat_file: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM processing_checkpoints WHERE chat_file = ?1",
            params![chat_file],
        )
        .await?;
        Ok(())
    }

    async fn add_scan_record(&self, record: &ScanRecord) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO scan_history (
                chat_file, character_file, turns_scanned, entities_found,
                status, error_message, scan_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.chat_file.clone(),
                record.character_file.clone(),
                record.turns_scanned as i64,
                record.entities_found as i64,
                record.status.as_str(),
                record.error_message.clone(),
                record.scan_date.clone(),
            ],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    async fn recent_scans(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT * FROM scan_history ORDER BY scan_date DESC, id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(ScanRecord {
                id: row.get(0)?,
                chat_file: row.get(1)?,
                character_file: row.get(2)?,
                turns_scanned: row.get::<i64>(3)? as usize,
                entities_found: row.get::<i64>(4)? as usize,
                status: match row.get::<String>(5)?.as_str() {
                    "completed" => ScanStatus::Completed,
                    "partial" => ScanStatus::Partial,
                    _ => ScanStatus::Failed,
                },
                error_message: row.get(6)?,
                scan_date: row.get(7)?,
            });
        }
        Ok(results)
    }

    async fn mapping(&self, chat_file: &str) -> Result<Option<ChatMapping>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT chat_file, character_file, persona_file
                 FROM chat_mappings WHERE chat_file = ?1",
                params![chat_file],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row_to_mapping(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn set_mapping(
        &self,
        chat_file: &str,
        character_file: &str,
        persona_file: Option<&str>,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO chat_mappings (chat_file, character_file, persona_file)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(chat_file) DO UPDATE SET
                character_file = excluded.character_file,
                persona_file = excluded.persona_file
            "#,
            params![chat_file, character_file, persona_file],
        )
        .await?;
        Ok(())
    }

    async fn list_mappings(&self) -> Result<Vec<ChatMapping>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT chat_file, character_file, persona_file
                 FROM chat_mappings ORDER BY chat_file",
                (),
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_mapping(&row)?);
        }
        Ok(results)
    }

    async fn add_update_record(
        &self,
        entity_id: i64,
        target_file: &str,
        entry_id: Option<i64>,
        action: UpdateAction,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO update_history (entity_id, target_file, entry_id, action, applied_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entity_id,
                target_file,
                entry_id,
                action.as_str(),
                now_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl BackupStore for Database {
    async fn add_backup_record(
        &self,
        source_path: &str,
        backup_path: &str,
        content_hash: &str,
    ) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO file_backups (source_path, backup_path, content_hash, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![source_path, backup_path, content_hash, now_rfc3339()],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    async fn backups(&self, source_path: Option<&str>) -> Result<Vec<BackupRecord>> {
        let conn = self.connect()?;

        let mut rows = match source_path {
            Some(source) => {
                conn.query(
                    "SELECT * FROM file_backups WHERE source_path = ?1
                     ORDER BY created_at DESC, id DESC",
                    params![source],
                )
                .await?
            }
            None => {
                conn.query(
                    "SELECT * FROM file_backups ORDER BY created_at DESC, id DESC",
                    (),
                )
                .await?
            }
        };

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(BackupRecord {
                id: row.get(0)?,
                source_path: row.get(1)?,
                backup_path: row.get(2)?,
                content_hash: row.get(3)?,
                created_at: row.get(4)?,
            });
        }
        Ok(results)
    }

    async fn delete_backup_record(&self, id: i64) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM file_backups WHERE id = ?1", params![id])
            .await?;
        Ok(())
    }
}

fn row_to_mapping(row: &libsql::Row) -> Result<ChatMapping> {
    Ok(ChatMapping {
        chat_file: row.get(0)?,
        character_file: row.get(1)?,
        persona_file: row.get(2)?,
    })
}

fn row_to_entity(row: &libsql::Row) -> Result<QueuedEntity> {
    Ok(QueuedEntity {
        id: row.get(0)?,
        kind: EntityKind::parse(&row.get::<String>(1)?).unwrap_or(EntityKind::Npc),
        name: row.get(2)?,
        data: serde_json::from_str(&row.get::<String>(3)?).unwrap_or_default(),
        target_file: row.get(4)?,
        source_context: row.get(5)?,
        confidence: row.get(6)?,
        status: EntityStatus::parse(&row.get::<String>(7)?).unwrap_or(EntityStatus::Pending),
        created_at: row.get(8)?,
        reviewed_at: row.get(9)?,
        reviewed_by: row.get(10)?,
    })
}
