use serde_json::{json, Value};
use strsim::normalized_levenshtein;

use crate::config::ValidationConfig;
use crate::models::QueuedEntity;

use super::types::{payload_attributes, ExtractedEntity};

/// Title prefixes stripped during name normalization so "Lady Marcelline"
/// and "Marcelline" compare equal.
const HONORIFICS: [&str; 10] = [
    "mr", "mrs", "ms", "miss", "dr", "sir", "lady", "lord", "master", "captain",
];

/// What to do with a freshly scored entity.
#[derive(Debug, Clone)]
pub enum MatchDecision {
    /// No match anywhere; queue as a new pending record.
    Insert,
    /// Fuzzy match against a pending record; update it in place.
    MergePending {
        id: i64,
        data: Value,
        confidence: f64,
        conflicts: Vec<String>,
    },
    /// Matches an entity already present in the target lorebook; queue as
    /// an update candidate for that entry.
    MergeEntry { entry_id: i64 },
    /// Exact duplicate of a pending record with nothing new to add.
    Suppress,
}

/// A lorebook entry reduced to what matching needs.
#[derive(Debug, Clone)]
pub struct EntryRef {
    pub entry_id: i64,
    /// Entry comment plus keys; any of them matching counts.
    pub names: Vec<String>,
}

/// Deduplicates new entities against the pending queue and the target
/// lorebook. Scope is always a single target file; entities bound for
/// different lorebooks never merge.
pub struct EntityValidator {
    fuzzy_threshold: f64,
}

impl EntityValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            fuzzy_threshold: config.fuzzy_threshold,
        }
    }

    pub fn decide(
        &self,
        new: &ExtractedEntity,
        pending_for_target: &[QueuedEntity],
        lorebook_entries: &[EntryRef],
    ) -> MatchDecision {
        let new_norm = normalize_name(&new.name);

        for pending in pending_for_target {
            if pending.kind != new.kind {
                continue;
            }
            if !self.names_match(&new_norm, &normalize_name(&pending.name)) {
                continue;
            }

            let existing_attrs = payload_attributes(&pending.data);
            let mut is_subset = true;
            for (key, value) in &new.attributes {
                if existing_attrs.get(key) != Some(value) {
                    is_subset = false;
                    break;
                }
            }
            if is_subset && new_norm == normalize_name(&pending.name) {
                tracing::debug!(
                    name = %new.name,
                    pending_id = pending.id,
                    "Suppressing exact duplicate of pending entity"
                );
                return MatchDecision::Suppress;
            }

            let (data, confidence, conflicts) = merge_into_pending(new, pending);
            return MatchDecision::MergePending {
                id: pending.id,
                data,
                confidence,
                conflicts,
            };
        }

        for entry in lorebook_entries {
            if entry
                .names
                .iter()
                .any(|candidate| self.names_match(&new_norm, &normalize_name(candidate)))
            {
                return MatchDecision::MergeEntry {
                    entry_id: entry.entry_id,
                };
            }
        }

        MatchDecision::Insert
    }

    /// Normalized equality, word containment, or edit-distance similarity
    /// at or above the threshold.
    fn names_match(&self, a: &str, b: &str) -> bool {
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a == b {
            return true;
        }
        if word_subset(a, b) || word_subset(b, a) {
            return true;
        }
        normalized_levenshtein(a, b) >= self.fuzzy_threshold
    }
}

/// Lowercase, punctuation stripped, honorific prefix dropped, whitespace
/// collapsed.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 && HONORIFICS.contains(&words[0]) {
        words.remove(0);
    }
    words.join(" ")
}

/// Every word of `a` appears in `b`. Catches "marcus" against "marcus the
/// smuggler" without letting single stop-words match.
fn word_subset(a: &str, b: &str) -> bool {
    let b_words: Vec<&str> = b.split_whitespace().collect();
    let a_words: Vec<&str> = a.split_whitespace().collect();
    if a_words.is_empty() || a_words.len() >= b_words.len() {
        return false;
    }
    a_words.iter().all(|w| b_words.contains(w) && w.len() > 3)
}

/// Union of attributes, max confidence, summed mention counts. Conflicting
/// scalar values keep the pending side and are reported, never overwritten.
fn merge_into_pending(new: &ExtractedEntity, pending: &QueuedEntity) -> (Value, f64, Vec<String>) {
    let mut merged = pending
        .data
        .as_object()
        .cloned()
        .unwrap_or_default();
    let mut conflicts = Vec::new();

    for (key, value) in &new.attributes {
        match merged.get(key) {
            None => {
                merged.insert(key.clone(), value.clone());
            }
            Some(existing) if existing == value => {}
            Some(Value::Null) => {
                merged.insert(key.clone(), value.clone());
            }
            Some(existing) => {
                conflicts.push(format!("{key}: {existing} vs {value}"));
            }
        }
    }

    let confidence = pending.confidence.max(new.confidence);
    merged.insert("confidence".to_string(), json!(confidence));

    let prior_mentions = pending
        .data
        .get("mention_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    merged.insert(
        "mention_count".to_string(),
        json!(prior_mentions + new.mention_count),
    );

    if !conflicts.is_empty() {
        merged.insert("conflicts".to_string(), json!(conflicts));
    }

    (Value::Object(merged), confidence, conflicts)
}
