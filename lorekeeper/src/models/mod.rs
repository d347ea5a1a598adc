//! Records shared between the pipeline and the persistence store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entity categories the extraction pipeline recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Npc,
    Faction,
    Location,
    Item,
    Alias,
    StatChange,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Npc,
        EntityKind::Faction,
        EntityKind::Location,
        EntityKind::Item,
        EntityKind::Alias,
        EntityKind::StatChange,
    ];

    /// Singular form stored in the queue.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Npc => "npc",
            EntityKind::Faction => "faction",
            EntityKind::Location => "location",
            EntityKind::Item => "item",
            EntityKind::Alias => "alias",
            EntityKind::StatChange => "stat_change",
        }
    }

    /// Plural key used in the LLM response document.
    pub fn response_key(&self) -> &'static str {
        match self {
            EntityKind::Npc => "npcs",
            EntityKind::Faction => "factions",
            EntityKind::Location => "locations",
            EntityKind::Item => "items",
            EntityKind::Alias => "aliases",
            EntityKind::StatChange => "stat_changes",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "npc" | "npcs" => Some(EntityKind::Npc),
            "faction" | "factions" => Some(EntityKind::Faction),
            "location" | "locations" => Some(EntityKind::Location),
            "item" | "items" => Some(EntityKind::Item),
            "alias" | "aliases" => Some(EntityKind::Alias),
            "stat_change" | "stat_changes" | "stat" | "stats" => Some(EntityKind::StatChange),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review lifecycle of a queued entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Pending,
    Approved,
    Rejected,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Pending => "pending",
            EntityStatus::Approved => "approved",
            EntityStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntityStatus::Pending),
            "approved" => Some(EntityStatus::Approved),
            "rejected" => Some(EntityStatus::Rejected),
            _ => None,
        }
    }
}

/// An entity waiting for (or past) human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEntity {
    pub id: i64,
    pub kind: EntityKind,
    pub name: String,
    /// Full entity payload: attributes, mention_count, confidence,
    /// risk_flags, source_context.
    pub data: serde_json::Value,
    pub target_file: String,
    pub source_context: Option<String>,
    pub confidence: f64,
    pub status: EntityStatus,
    pub created_at: String,
    pub reviewed_at: Option<String>,
    pub reviewed_by: Option<String>,
}

/// Scan progress for one chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub chat_file: String,
    pub last_processed_index: usize,
    pub last_processed_timestamp: Option<String>,
    pub total_turns: usize,
}

/// Snapshot taken before a target file mutation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: i64,
    pub source_path: String,
    pub backup_path: String,
    pub content_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    Partial,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Completed => "completed",
            ScanStatus::Partial => "partial",
            ScanStatus::Failed => "failed",
        }
    }
}

/// One row of scan history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: i64,
    pub chat_file: String,
    pub character_file: Option<String>,
    pub turns_scanned: usize,
    pub entities_found: usize,
    pub status: ScanStatus,
    pub error_message: Option<String>,
    pub scan_date: String,
}

/// Action recorded in update history when an approval lands in a lorebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Added,
    Updated,
}

impl UpdateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateAction::Added => "added",
            UpdateAction::Updated => "updated",
        }
    }
}

/// Maps a chat transcript to the files its entities target. The persona
/// file is optional; without one, alias and stat-change entities fall
/// back to the character lorebook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMapping {
    pub chat_file: String,
    pub character_file: String,
    pub persona_file: Option<String>,
}

/// Summary returned by the orchestrator after a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub chat_file: String,
    pub status: ScanStatus,
    pub chunks_processed: usize,
    pub chunks_failed: usize,
    pub entities_queued: usize,
    pub entities_merged: usize,
    pub entities_suppressed: usize,
    pub turns_scanned: usize,
    pub error_message: Option<String>,
}

pub fn now_rfc3339() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_roundtrip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
            assert_eq!(EntityKind::parse(kind.response_key()), Some(kind));
        }
        assert_eq!(EntityKind::parse("dragon"), None);
    }

    #[test]
    fn entity_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&EntityKind::StatChange).unwrap();
        assert_eq!(json, "\"stat_change\"");
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert_eq!(EntityStatus::parse("pending"), Some(EntityStatus::Pending));
        assert_eq!(EntityStatus::parse("archived"), None);
    }
}
