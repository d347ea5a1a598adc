use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Entities awaiting (or past) human review
        CREATE TABLE IF NOT EXISTS entity_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            name TEXT NOT NULL,
            data TEXT NOT NULL,
            target_file TEXT NOT NULL,
            source_context TEXT,
            confidence REAL NOT NULL DEFAULT 0.5,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            reviewed_at TEXT,
            reviewed_by TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_entity_queue_status ON entity_queue(status);
        CREATE INDEX IF NOT EXISTS idx_entity_queue_target ON entity_queue(target_file);

        -- One row per scan attempt
        CREATE TABLE IF NOT EXISTS scan_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_file TEXT NOT NULL,
            character_file TEXT,
            turns_scanned INTEGER NOT NULL DEFAULT 0,
            entities_found INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error_message TEXT,
            scan_date TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_scan_history_chat ON scan_history(chat_file);

        -- Approved entities applied to lorebooks
        CREATE TABLE IF NOT EXISTS update_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER,
            target_file TEXT NOT NULL,
            entry_id INTEGER,
            action TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );

        -- Snapshots taken before each protected write
        CREATE TABLE IF NOT EXISTS file_backups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_path TEXT NOT NULL,
            backup_path TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_file_backups_source ON file_backups(source_path);

        -- Which files a chat's entities target
        CREATE TABLE IF NOT EXISTS chat_mappings (
            chat_file TEXT PRIMARY KEY,
            character_file TEXT NOT NULL,
            persona_file TEXT
        );

        -- Scan resumption state, one row per chat
        CREATE TABLE IF NOT EXISTS processing_checkpoints (
            chat_file TEXT PRIMARY KEY,
            last_processed_index INTEGER NOT NULL DEFAULT 0,
            last_processed_timestamp TEXT,
            total_turns INTEGER NOT NULL DEFAULT 0
        );
        "#,
    )
    .await?;

    Ok(())
}
