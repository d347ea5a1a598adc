use serde_json::{json, Map, Value};

use crate::extract::payload_attributes;
use crate::models::{EntityKind, UpdateAction};

use super::document::{CharacterCard, LorebookEntry};

/// Turns approved queue entities into lorebook entries.
///
/// An entity whose name matches an existing entry's keys or content is
/// merged into that entry instead of duplicated: new information is
/// appended under an `[Updated]` marker and the key sets are unioned,
/// leaving manually edited fields alone.
pub struct MergeEngine;

impl MergeEngine {
    /// Apply one approved entity to a card. Returns what happened and the
    /// id of the entry touched, for the update history.
    pub fn apply(
        card: &mut CharacterCard,
        kind: EntityKind,
        name: &str,
        data: &Value,
    ) -> (UpdateAction, i64) {
        let attributes = payload_attributes(data);
        let source_context = data.get("source_context").and_then(Value::as_str);
        let content = render_content(kind, name, &attributes, source_context);
        let keys = generate_keys(name, &attributes);

        let book = card.book_mut();

        if let Some(entry) = find_existing_mut(&mut book.entries, name) {
            if !entry.content.contains(&content) {
                entry.content = format!("{}\n\n[Updated]\n{}", entry.content, content);
            }
            for key in keys {
                if !entry.keys.contains(&key) {
                    entry.keys.push(key);
                }
            }
            tracing::info!(entry_id = entry.id, name = %name, "Updated existing lorebook entry");
            return (UpdateAction::Updated, entry.id);
        }

        let id = next_entry_id(&book.entries);
        book.entries.push(LorebookEntry {
            id,
            keys,
            secondary_keys: Vec::new(),
            comment: format!("{} - Auto-generated", kind.as_str().to_uppercase()),
            content,
            constant: false,
            selective: true,
            enabled: true,
            insertion_order: 100,
            position: Some("before_char".to_string()),
            extensions: default_extensions(id),
            rest: Map::new(),
        });
        tracing::info!(entry_id = id, name = %name, "Added lorebook entry");
        (UpdateAction::Added, id)
    }
}

/// Smallest id strictly greater than every existing one.
pub fn next_entry_id(entries: &[LorebookEntry]) -> i64 {
    entries.iter().map(|e| e.id).max().unwrap_or(0) + 1
}

/// Search keys: lowercase name, first/last words of multi-word names, and
/// the punctuation-stripped form when it differs.
pub fn generate_keys(name: &str, attributes: &Map<String, Value>) -> Vec<String> {
    let mut keys = vec![name.to_lowercase()];

    let parts: Vec<&str> = name.split_whitespace().collect();
    if parts.len() > 1 {
        keys.push(parts[0].to_lowercase());
        keys.push(parts[parts.len() - 1].to_lowercase());
    }

    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if cleaned != name.to_lowercase() {
        keys.push(cleaned);
    }

    if let Some(alias) = attributes.get("alias").and_then(Value::as_str) {
        keys.push(alias.to_lowercase());
    }

    let mut seen = std::collections::HashSet::new();
    keys.retain(|key| !key.trim().is_empty() && seen.insert(key.clone()));
    keys
}

fn find_existing_mut<'a>(
    entries: &'a mut [LorebookEntry],
    name: &str,
) -> Option<&'a mut LorebookEntry> {
    let name_lower = name.to_lowercase();
    entries.iter_mut().find(|entry| {
        entry
            .keys
            .iter()
            .any(|key| key.to_lowercase() == name_lower)
            || entry.content.to_lowercase().contains(&name_lower)
    })
}

fn attr<'a>(attributes: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Entry content rendered from the entity's attributes, one template per
/// category (matches the format entries already in the wild use).
pub fn render_content(
    kind: EntityKind,
    name: &str,
    attributes: &Map<String, Value>,
    source_context: Option<&str>,
) -> String {
    let mut content = name.to_string();

    match kind {
        EntityKind::Npc => {
            if let Some(description) = attr(attributes, "description") {
                content.push_str(&format!(" is {description}."));
            }
            if let Some(relationship) = attr(attributes, "relationship") {
                content.push_str(&format!("\n\nRelationship to {{{{user}}}}: {relationship}"));
            }
            if let Some(ctx) = source_context {
                content.push_str(&format!("\n\n[Context: {ctx}]"));
            }
        }
        EntityKind::Faction => {
            if let Some(description) = attr(attributes, "description") {
                content.push_str(&format!(" is {description}."));
            }
            if let Some(goals) = attr(attributes, "goals") {
                content.push_str(&format!("\n\nGoals: {goals}"));
            }
            if let Some(leadership) = attr(attributes, "leadership") {
                content.push_str(&format!("\nLeadership: {leadership}"));
            }
            if let Some(territory) = attr(attributes, "territory") {
                content.push_str(&format!("\nTerritory: {territory}"));
            }
            if let Some(relationship) = attr(attributes, "relationship") {
                content.push_str(&format!("\n\nRelationship to {{{{user}}}}: {relationship}"));
            }
        }
        EntityKind::Location => {
            if let Some(description) = attr(attributes, "description") {
                content.push_str(&format!(" - {description}."));
            }
            if let Some(significance) = attr(attributes, "significance") {
                content.push_str(&format!("\n\nSignificance: {significance}"));
            }
        }
        EntityKind::Item => {
            if let Some(description) = attr(attributes, "description") {
                content.push_str(&format!(" - {description}."));
            }
            if let Some(properties) = attr(attributes, "properties") {
                content.push_str(&format!("\n\nProperties: {properties}"));
            }
        }
        EntityKind::Alias => {
            if let Some(alias) = attr(attributes, "alias") {
                content.push_str(&format!(" is also known as {alias}."));
            } else if let Some(description) = attr(attributes, "description") {
                content.push_str(&format!(" - {description}"));
            }
        }
        EntityKind::StatChange => {
            if let (Some(stat), Some(change)) =
                (attr(attributes, "stat"), attr(attributes, "change"))
            {
                content.push_str(&format!(": {stat} {change}"));
            } else if let Some(description) = attr(attributes, "description") {
                content.push_str(&format!(" - {description}"));
            }
        }
    }

    content
}

fn default_extensions(entry_id: i64) -> Map<String, Value> {
    json!({
        "position": 0,
        "exclude_recursion": false,
        "display_index": entry_id,
        "probability": 100,
        "useProbability": true,
        "depth": 4,
        "selectiveLogic": 0,
        "prevent_recursion": false,
        "delay_until_recursion": false,
        "scan_depth": null,
        "match_whole_words": null,
        "use_group_scoring": false,
        "case_sensitive": false,
        "automation_id": "",
        "role": 0,
        "vectorized": false,
        "sticky": 0,
        "cooldown": 0,
        "delay": 0
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}
