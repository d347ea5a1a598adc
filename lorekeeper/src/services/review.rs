use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;

use crate::db::{BackupStore, Database, EntityQueueStore, ScanStore};
use crate::error::{LoreError, Result};
use crate::lorebook::{CharacterCard, MergeEngine, PersonaEngine};
use crate::models::{EntityKind, EntityStatus, QueuedEntity, UpdateAction};
use crate::storage::WriteGuard;

/// Result of an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveOutcome {
    Applied(UpdateAction),
    /// The entity was approved earlier; nothing was written.
    AlreadyApproved,
}

/// Human review path: list, approve, reject, edit.
///
/// Approval is the only place queue entities reach a character file, and
/// it goes through the write guard without exception. The status flip is
/// a compare-and-set so two reviewers (or a reviewer racing a scan)
/// cannot both apply the same entity.
pub struct ReviewService {
    db: Database,
    guard: WriteGuard,
    characters_dir: PathBuf,
    personas_dir: PathBuf,
}

impl ReviewService {
    pub fn new(
        db: Database,
        guard: WriteGuard,
        characters_dir: impl Into<PathBuf>,
        personas_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            db,
            guard,
            characters_dir: characters_dir.into(),
            personas_dir: personas_dir.into(),
        }
    }

    pub async fn pending(
        &self,
        target_file: Option<&str>,
        kind: Option<EntityKind>,
    ) -> Result<Vec<QueuedEntity>> {
        self.db.pending_entities(target_file, kind).await
    }

    /// Approve a queued entity and merge it into its target lorebook.
    ///
    /// Idempotent: approving an approved entity is a no-op. If the file
    /// write fails the status rolls back to pending so the entity can be
    /// retried after the underlying problem is fixed.
    pub async fn approve(&self, id: i64, reviewed_by: Option<&str>) -> Result<ApproveOutcome> {
        let entity = self
            .db
            .get_entity(id)
            .await?
            .ok_or_else(|| LoreError::NotFound(format!("queue entity {id}")))?;

        match entity.status {
            EntityStatus::Approved => return Ok(ApproveOutcome::AlreadyApproved),
            EntityStatus::Rejected => {
                return Err(LoreError::Validation(format!(
                    "entity {id} was rejected; edit and re-queue it instead"
                )));
            }
            EntityStatus::Pending => {}
        }

        let won = self
            .db
            .transition_status(id, EntityStatus::Pending, EntityStatus::Approved, reviewed_by)
            .await?;
        if !won {
            // Someone else reviewed it between our read and the CAS.
            let current = self.db.get_entity(id).await?;
            return match current.map(|e| e.status) {
                Some(EntityStatus::Approved) => Ok(ApproveOutcome::AlreadyApproved),
                other => Err(LoreError::Validation(format!(
                    "entity {id} changed status during approval: {other:?}"
                ))),
            };
        }

        match self.apply_to_lorebook(&entity).await {
            Ok(action) => Ok(ApproveOutcome::Applied(action)),
            Err(e) => {
                // Roll back so the queue still shows the entity.
                if let Err(rollback_err) = self
                    .db
                    .transition_status(id, EntityStatus::Approved, EntityStatus::Pending, None)
                    .await
                {
                    tracing::error!(
                        id,
                        error = %rollback_err,
                        "Failed to roll back approval after write failure"
                    );
                }
                Err(e)
            }
        }
    }

    pub async fn reject(&self, id: i64, reviewed_by: Option<&str>) -> Result<()> {
        let won = self
            .db
            .transition_status(id, EntityStatus::Pending, EntityStatus::Rejected, reviewed_by)
            .await?;
        if won {
            return Ok(());
        }

        match self.db.get_entity(id).await? {
            None => Err(LoreError::NotFound(format!("queue entity {id}"))),
            Some(entity) if entity.status == EntityStatus::Rejected => Ok(()),
            Some(entity) => Err(LoreError::Validation(format!(
                "entity {id} is {} and cannot be rejected",
                entity.status.as_str()
            ))),
        }
    }

    /// Replace a pending entity's payload before approval.
    pub async fn edit(&self, id: i64, data: Value) -> Result<()> {
        let entity = self
            .db
            .get_entity(id)
            .await?
            .ok_or_else(|| LoreError::NotFound(format!("queue entity {id}")))?;
        if entity.status != EntityStatus::Pending {
            return Err(LoreError::Validation(format!(
                "entity {id} is {} and cannot be edited",
                entity.status.as_str()
            )));
        }

        let confidence = data
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(entity.confidence);
        self.db.update_entity_data(id, &data, confidence).await
    }

    async fn apply_to_lorebook(&self, entity: &QueuedEntity) -> Result<UpdateAction> {
        let path = self.target_path(&entity.target_file);

        let mut applied: Option<(UpdateAction, Option<i64>)> = None;
        let receipt = self.guard.write_protected(&path, |current| {
            let root: serde_json::Value = serde_json::from_str(current)?;
            if PersonaEngine::is_persona(&root) {
                let mut root = root;
                let action =
                    PersonaEngine::apply(&mut root, entity.kind, &entity.name, &entity.data)?;
                applied = Some((action, None));
                Ok(serde_json::to_string_pretty(&root)?)
            } else {
                let mut card = CharacterCard::parse(current)?;
                let (action, entry_id) =
                    MergeEngine::apply(&mut card, entity.kind, &entity.name, &entity.data);
                applied = Some((action, Some(entry_id)));
                card.to_json_string()
            }
        })?;

        self.db
            .add_backup_record(
                &path.display().to_string(),
                &receipt.backup_path.display().to_string(),
                &receipt.content_hash,
            )
            .await?;

        let (action, entry_id) = applied.unwrap_or((UpdateAction::Added, None));
        self.db
            .add_update_record(entity.id, &entity.target_file, entry_id, action)
            .await?;

        Ok(action)
    }

    /// Absolute paths pass through; relative targets resolve against the
    /// characters directory first, then the personas directory.
    fn target_path(&self, target_file: &str) -> PathBuf {
        let path = Path::new(target_file);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        let character = self.characters_dir.join(path);
        if character.exists() {
            return character;
        }
        let persona = self.personas_dir.join(path);
        if persona.exists() {
            return persona;
        }
        character
    }

    /// Roll a target file back to a recorded backup, verifying the
    /// backup's content hash before touching the target.
    pub async fn restore_backup(&self, backup_id: i64) -> Result<()> {
        let backup = self
            .db
            .backups(None)
            .await?
            .into_iter()
            .find(|b| b.id == backup_id)
            .ok_or_else(|| LoreError::NotFound(format!("backup {backup_id}")))?;

        self.guard.restore(
            Path::new(&backup.source_path),
            Path::new(&backup.backup_path),
            &backup.content_hash,
        )?;
        tracing::info!(
            source = %backup.source_path,
            backup = %backup.backup_path,
            "Restored file from backup"
        );
        Ok(())
    }

    /// Drop backups past the retention window, then trim each source file
    /// to its newest `max_per_file`. Returns how many were removed.
    pub async fn cleanup_backups(&self, retention_days: i64, max_per_file: usize) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(retention_days);
        let mut removed = 0usize;

        let mut survivors: Vec<crate::models::BackupRecord> = Vec::new();
        for backup in self.db.backups(None).await? {
            let created = DateTime::parse_from_rfc3339(&backup.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            if created < cutoff {
                self.remove_backup(&backup).await?;
                removed += 1;
            } else {
                survivors.push(backup);
            }
        }

        let mut by_source: std::collections::HashMap<String, Vec<crate::models::BackupRecord>> =
            std::collections::HashMap::new();
        for backup in survivors {
            by_source
                .entry(backup.source_path.clone())
                .or_default()
                .push(backup);
        }

        // backups() returns newest first, so everything past the cap goes.
        for (_, backups) in by_source {
            for backup in backups.into_iter().skip(max_per_file) {
                self.remove_backup(&backup).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Cleaned up old backups");
        }
        Ok(removed)
    }

    async fn remove_backup(&self, backup: &crate::models::BackupRecord) -> Result<()> {
        let path = Path::new(&backup.backup_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        self.db.delete_backup_record(backup.id).await
    }
}
