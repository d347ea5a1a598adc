use regex::Regex;
use serde_json::Value;

use crate::error::{LoreError, Result};
use crate::extract::payload_attributes;
use crate::models::{EntityKind, UpdateAction};

const IDENTITIES_HEADER: &str = "=== CRITICAL: SECRET IDENTITIES ===";

/// Applies approved alias and stat-change entities to SillyTavern
/// persona files.
///
/// Personas keep their world state inside a free-text description, so
/// updates are text surgery: aliases go into a numbered secret-identities
/// section, stat changes rewrite the matching stat line in place.
pub struct PersonaEngine;

impl PersonaEngine {
    /// A persona file carries a `persona_descriptions` object; character
    /// cards do not.
    pub fn is_persona(root: &Value) -> bool {
        root.get("persona_descriptions")
            .map(Value::is_object)
            .unwrap_or(false)
    }

    pub fn apply(
        root: &mut Value,
        kind: EntityKind,
        name: &str,
        data: &Value,
    ) -> Result<UpdateAction> {
        let key = persona_key(root)?;
        if !root["persona_descriptions"][&key].is_object() {
            return Err(LoreError::Validation(format!(
                "persona description '{key}' is not an object"
            )));
        }
        let description = root["persona_descriptions"][&key]["description"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let (updated, action) = match kind {
            EntityKind::Alias => add_alias(&description, name, data),
            EntityKind::StatChange => (update_stat(&description, name, data), UpdateAction::Updated),
            other => {
                return Err(LoreError::Validation(format!(
                    "{} entities cannot target a persona file",
                    other.as_str()
                )));
            }
        };

        root["persona_descriptions"][&key]["description"] = Value::String(updated);
        Ok(action)
    }
}

/// The description to edit: `default_persona` when set, otherwise the
/// first available key.
fn persona_key(root: &Value) -> Result<String> {
    let descriptions = root["persona_descriptions"]
        .as_object()
        .ok_or_else(|| LoreError::Validation("persona file has no persona_descriptions".into()))?;

    if let Some(default) = root.get("default_persona").and_then(Value::as_str) {
        if descriptions.contains_key(default) {
            return Ok(default.to_string());
        }
    }

    descriptions
        .keys()
        .next()
        .cloned()
        .ok_or_else(|| LoreError::Validation("persona file has no persona descriptions".into()))
}

fn add_alias(description: &str, name: &str, data: &Value) -> (String, UpdateAction) {
    let attributes = payload_attributes(data);
    let purpose = attributes
        .get("purpose")
        .and_then(Value::as_str)
        .unwrap_or("Disguise");
    let appearance = attributes
        .get("appearance")
        .and_then(Value::as_str)
        .unwrap_or("Appearance varies");
    let detail = attributes
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let marker = format!("**{name}**");

    if let Some((section_start, section_end)) = identities_section(description) {
        let section = &description[section_start..section_end];
        if section.contains(&marker) {
            return (description.to_string(), UpdateAction::Updated);
        }

        let numbering = Regex::new(r"(?m)^\s*\d+\.\s+\*\*")
            .unwrap_or_else(|_| unreachable!("static regex"));
        let next_number = numbering.find_iter(section).count() + 1;
        let entry = format!("{next_number}. {marker} ({purpose}): {appearance}. {detail}");

        let updated_section = format!("{}\n{entry}\n\n", section.trim_end());
        let mut updated = String::with_capacity(description.len() + entry.len());
        updated.push_str(&description[..section_start]);
        updated.push_str(&updated_section);
        updated.push_str(&description[section_end..]);
        return (updated, UpdateAction::Updated);
    }

    let new_section =
        format!("\n{IDENTITIES_HEADER}\n1. {marker} ({purpose}): {appearance}. {detail}\n\n");

    // No identities section yet: slot it in after the first section
    // heading's block, or at the end when there are no sections at all.
    let first_heading = Regex::new(r"===[^=\n]+===[^\n]*\n")
        .unwrap_or_else(|_| unreachable!("static regex"));
    let updated = match first_heading.find(description) {
        Some(m) => {
            let insert_at = description[m.end()..]
                .find("\n=== ")
                .map(|i| m.end() + i + 1)
                .unwrap_or(description.len());
            format!(
                "{}{}{}",
                &description[..insert_at],
                new_section,
                &description[insert_at..]
            )
        }
        None => format!("{}{}", description, new_section),
    };
    (updated, UpdateAction::Added)
}

/// Section bounds: from the header to the next `=== ` heading or the end
/// of the description.
fn identities_section(description: &str) -> Option<(usize, usize)> {
    let header = Regex::new(r"=== CRITICAL: SECRET IDENTITIES? ===")
        .unwrap_or_else(|_| unreachable!("static regex"));
    let m = header.find(description)?;
    let end = description[m.end()..]
        .find("=== ")
        .map(|i| m.end() + i)
        .unwrap_or(description.len());
    Some((m.start(), end))
}

fn update_stat(description: &str, name: &str, data: &Value) -> String {
    let attributes = payload_attributes(data);
    let stat = attributes
        .get("stat_name")
        .or_else(|| attributes.get("stat"))
        .and_then(Value::as_str)
        .unwrap_or(name)
        .to_uppercase();
    let value = attributes
        .get("new_value")
        .or_else(|| attributes.get("value"))
        .or_else(|| attributes.get("change"))
        .map(render_value)
        .unwrap_or_default();

    let (pattern, replacement) = if stat.contains("HP") || stat.contains("HEALTH") {
        (r"Hit Points:\s*\d+", format!("Hit Points: {value}"))
    } else if stat.contains("GOLD") || stat.contains("GP") {
        (r"Gold:\s*[\d,]+\s*GP", format!("Gold: {value} GP"))
    } else if stat.contains("LEVEL") {
        (r"(?i)level\s+\d+", format!("level {value}"))
    } else {
        tracing::warn!(stat = %stat, "No persona stat line matches this stat change");
        return description.to_string();
    };

    let re = Regex::new(pattern).unwrap_or_else(|_| unreachable!("static regex"));
    if !re.is_match(description) {
        tracing::warn!(stat = %stat, "Persona description has no line for this stat");
        return description.to_string();
    }
    re.replace(description, replacement.as_str()).into_owned()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
