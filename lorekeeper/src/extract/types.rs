use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::EntityKind;

/// Keys the pipeline adds to an entity payload alongside the LLM-reported
/// attributes.
pub const PAYLOAD_META_KEYS: [&str; 5] = [
    "confidence",
    "mention_count",
    "risk_flags",
    "source_context",
    "existing_entry_id",
];

/// One entity record as the LLM reported it, before scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Everything recovered from one LLM response, grouped by category.
#[derive(Debug, Clone, Default)]
pub struct ExtractionDraft {
    pub entities: Vec<(EntityKind, RawEntity)>,
}

impl ExtractionDraft {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// What the parser managed to salvage from a response.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    /// The whole document parsed.
    Recovered(ExtractionDraft),
    /// The document parsed but some records did not.
    PartialRecovered {
        draft: ExtractionDraft,
        skipped: usize,
    },
    /// Nothing entity-shaped could be found.
    Unrecoverable(String),
}

/// A scored entity ready for deduplication and queueing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub kind: EntityKind,
    pub name: String,
    pub attributes: Map<String, Value>,
    pub confidence: f64,
    pub mention_count: usize,
    pub risk_flags: Vec<String>,
    pub requires_review: bool,
    pub source_context: Option<String>,
}

impl ExtractedEntity {
    /// JSON payload stored in the queue's `data` column.
    pub fn queue_payload(&self) -> Value {
        let mut obj = self.attributes.clone();
        obj.insert("confidence".to_string(), json!(self.confidence));
        obj.insert("mention_count".to_string(), json!(self.mention_count));
        if !self.risk_flags.is_empty() {
            obj.insert("risk_flags".to_string(), json!(self.risk_flags));
        }
        if let Some(ctx) = &self.source_context {
            obj.insert("source_context".to_string(), json!(ctx));
        }
        Value::Object(obj)
    }
}

/// The LLM-reported attributes inside a stored queue payload, with the
/// pipeline's bookkeeping keys removed.
pub fn payload_attributes(data: &Value) -> Map<String, Value> {
    match data.as_object() {
        Some(obj) => obj
            .iter()
            .filter(|(key, _)| !PAYLOAD_META_KEYS.contains(&key.as_str()) && key.as_str() != "name")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        None => Map::new(),
    }
}
