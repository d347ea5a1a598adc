use regex::Regex;
use serde_json::Value;

use crate::models::EntityKind;

use super::types::{ExtractionDraft, ParseOutcome, RawEntity};

/// Recovers an entity document from raw LLM output.
///
/// Local models rarely return clean JSON. The parser works down a ladder:
/// direct parse, fenced ```json block, balanced-brace scan over the whole
/// response. Within a parsed document, records that fail to deserialize
/// are skipped and counted rather than failing the chunk.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    fence: Regex,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            // Unwraps a ```json ... ``` (or bare ```) code fence.
            fence: Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
                .unwrap_or_else(|_| unreachable!("static regex")),
        }
    }

    pub fn parse(&self, response: &str) -> ParseOutcome {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return ParseOutcome::Unrecoverable("empty response".to_string());
        }

        if let Ok(doc) = serde_json::from_str::<Value>(trimmed) {
            if let Some(outcome) = draft_from_document(&doc) {
                return outcome;
            }
        }

        if let Some(caps) = self.fence.captures(response) {
            if let Ok(doc) = serde_json::from_str::<Value>(&caps[1]) {
                if let Some(outcome) = draft_from_document(&doc) {
                    return outcome;
                }
            }
        }

        for span in balanced_object_spans(response) {
            if let Ok(doc) = serde_json::from_str::<Value>(span) {
                if let Some(outcome) = draft_from_document(&doc) {
                    return outcome;
                }
            }
        }

        ParseOutcome::Unrecoverable(format!(
            "no entity document found in {} bytes of response",
            response.len()
        ))
    }
}

/// Builds a draft from a parsed JSON document. `None` when the document
/// has no recognized entity-type key at all, so the ladder can continue.
fn draft_from_document(doc: &Value) -> Option<ParseOutcome> {
    let obj = doc.as_object()?;

    let mut draft = ExtractionDraft::default();
    let mut skipped = 0usize;
    let mut recognized = false;

    for (key, value) in obj {
        let Some(kind) = EntityKind::parse(key) else {
            continue;
        };
        recognized = true;

        let Some(records) = value.as_array() else {
            skipped += 1;
            tracing::debug!(key = %key, "Entity category is not an array, skipping");
            continue;
        };

        for record in records {
            match serde_json::from_value::<RawEntity>(record.clone()) {
                Ok(raw) if !raw.name.trim().is_empty() => {
                    draft.entities.push((kind, raw));
                }
                Ok(_) => {
                    skipped += 1;
                    tracing::debug!(kind = %kind, "Dropping entity record without a name");
                }
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(kind = %kind, error = %e, "Dropping malformed entity record");
                }
            }
        }
    }

    if !recognized {
        return None;
    }

    if skipped > 0 {
        Some(ParseOutcome::PartialRecovered { draft, skipped })
    } else {
        Some(ParseOutcome::Recovered(draft))
    }
}

/// Top-level `{...}` spans in `text`, honoring JSON string and escape
/// rules so braces inside values do not break the scan.
fn balanced_object_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = matching_brace(bytes, i) {
                spans.push(&text[i..=end]);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    spans
}

fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}
