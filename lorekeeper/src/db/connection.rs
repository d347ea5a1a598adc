use std::sync::Arc;

use libsql::{Builder, Connection};

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

/// Handle to the local SQLite database. Cheap to clone; every clone
/// shares the connection opened at startup, so a `:memory:` database
/// keeps its schema for the life of the handle instead of each
/// operation seeing a fresh empty one.
pub struct Database {
    db: Arc<libsql::Database>,
    conn: Connection,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let busy_timeout_ms = std::env::var("DATABASE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5000);

        let db = if config.url == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        let conn = db.connect()?;
        configure(&conn, busy_timeout_ms).await;
        schema::init_schema(&conn).await?;

        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::new(&DatabaseConfig {
            url: ":memory:".to_string(),
        })
        .await
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.conn.clone())
    }
}

async fn configure(conn: &Connection, busy_timeout_ms: u64) {
    let busy_timeout_sql = format!("PRAGMA busy_timeout = {busy_timeout_ms}");
    if let Err(error) = conn.execute_batch(&busy_timeout_sql).await {
        tracing::warn!(
            busy_timeout_ms,
            error = %error,
            "Failed to set SQLite busy_timeout"
        );
    }

    if let Err(error) = conn.execute_batch("PRAGMA journal_mode = WAL").await {
        tracing::warn!(error = %error, "Failed to set SQLite journal_mode");
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            conn: self.conn.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EntityQueueStore;
    use crate::models::EntityKind;
    use serde_json::json;

    #[tokio::test]
    async fn schema_is_visible_on_later_connections() {
        let db = Database::in_memory().await.unwrap();

        let conn = db.connect().unwrap();
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                (),
            )
            .await
            .unwrap();

        let mut tables = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            tables.push(row.get::<String>(0).unwrap());
        }
        assert!(tables.contains(&"entity_queue".to_string()), "{tables:?}");
        assert!(tables.contains(&"file_backups".to_string()));
    }

    #[tokio::test]
    async fn clones_share_state() {
        let db = Database::in_memory().await.unwrap();
        let other = db.clone();

        let id = db
            .add_entity(EntityKind::Npc, "Sevika", &json!({}), "Jinx.json", None, 0.8)
            .await
            .unwrap();

        let entity = other.get_entity(id).await.unwrap().unwrap();
        assert_eq!(entity.name, "Sevika");
    }
}
