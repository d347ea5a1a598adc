use regex::Regex;
use serde_json::Value;

use crate::config::ValidationConfig;
use crate::models::EntityKind;

use super::types::{ExtractedEntity, ExtractionDraft, RawEntity};

/// Characters of surrounding transcript kept on each side of the first
/// mention when building the source context snippet.
const CONTEXT_RADIUS: usize = 100;

/// Scores extracted entities against the transcript chunk they came from.
///
/// A confidence the model did not supply is estimated from field richness
/// and mention count. Hallucination risk accumulates from name absence,
/// suspicious name patterns, and detail disproportionate to how often the
/// transcript actually mentions the entity. High risk flags the entity for
/// review and caps its confidence; confidence below the floor discards it.
pub struct EntityScorer {
    confidence_floor: f64,
    suspicious_patterns: Vec<Regex>,
}

impl EntityScorer {
    pub fn new(config: &ValidationConfig) -> Self {
        let suspicious_patterns = config
            .suspicious_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Skipping invalid suspicious-name pattern");
                    None
                }
            })
            .collect();

        Self {
            confidence_floor: config.confidence_floor,
            suspicious_patterns,
        }
    }

    /// Score every entity in a draft. Discarded entities are logged at
    /// debug and silently dropped.
    pub fn score_draft(&self, draft: ExtractionDraft, source_text: &str) -> Vec<ExtractedEntity> {
        draft
            .entities
            .into_iter()
            .filter_map(|(kind, raw)| self.score(kind, raw, source_text))
            .collect()
    }

    pub fn score(
        &self,
        kind: EntityKind,
        raw: RawEntity,
        source_text: &str,
    ) -> Option<ExtractedEntity> {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return None;
        }

        let name_lower = name.to_lowercase();
        let matcher = Regex::new(&format!("(?i){}", regex::escape(&name))).ok();
        let mention_count = matcher
            .as_ref()
            .map(|re| re.find_iter(source_text).count())
            .unwrap_or(0);

        let description = raw
            .attributes
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");

        let mut risk = 0.0f64;
        let mut risk_flags = Vec::new();

        if !name_in_source(&name_lower, &source_text.to_lowercase()) {
            risk += 0.5;
            risk_flags.push("name not found in source text".to_string());
        }

        for pattern in &self.suspicious_patterns {
            if pattern.is_match(&name_lower) {
                risk += 0.3;
                risk_flags.push(format!("suspicious name pattern: {}", pattern.as_str()));
            }
        }

        if mention_count == 0 {
            risk += 0.4;
            risk_flags.push("entity never mentioned in source".to_string());
        } else if mention_count == 1 && description.len() > 200 {
            risk += 0.2;
            risk_flags.push("detailed description despite a single mention".to_string());
        }

        let mut confidence = raw
            .confidence
            .unwrap_or_else(|| estimate_confidence(&raw, description, mention_count))
            .clamp(0.0, 1.0);

        if confidence > 0.9 && description.len() > 300 && mention_count < 3 {
            risk += 0.2;
            risk_flags.push("suspiciously detailed for mention count".to_string());
        }

        let requires_review = risk > 0.5;
        if requires_review {
            confidence = confidence.min(0.6);
        }

        if confidence < self.confidence_floor {
            tracing::debug!(
                kind = %kind,
                name = %name,
                confidence,
                risk,
                "Discarding entity below confidence floor"
            );
            return None;
        }

        let source_context = matcher
            .as_ref()
            .and_then(|re| context_snippet(re, source_text));

        Some(ExtractedEntity {
            kind,
            name,
            attributes: raw.attributes,
            confidence,
            mention_count,
            risk_flags,
            requires_review,
            source_context,
        })
    }
}

/// Confidence estimate when the model omitted one: field richness plus
/// mention count on a 0.5 base.
fn estimate_confidence(raw: &RawEntity, description: &str, mention_count: usize) -> f64 {
    let mut score = 0.5;

    if description.len() > 20 {
        score += 0.2;
    }

    let filled_fields = raw
        .attributes
        .values()
        .filter(|v| match v {
            Value::String(s) => !s.trim().is_empty(),
            Value::Null => false,
            _ => true,
        })
        .count();
    score += (filled_fields as f64 * 0.05).min(0.2);

    score += (mention_count as f64 * 0.03).min(0.1);

    score.min(1.0)
}

/// Exact substring match, or at least half the significant words of the
/// name appearing somewhere in the source.
fn name_in_source(name_lower: &str, source_lower: &str) -> bool {
    if source_lower.contains(name_lower) {
        return true;
    }

    let significant: Vec<&str> = name_lower
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .collect();
    if significant.is_empty() {
        return false;
    }

    let found = significant
        .iter()
        .filter(|w| source_lower.contains(**w))
        .count();
    found * 2 >= significant.len()
}

fn context_snippet(matcher: &Regex, source: &str) -> Option<String> {
    let m = matcher.find(source)?;

    let mut start = m.start().saturating_sub(CONTEXT_RADIUS);
    while start > 0 && !source.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (m.end() + CONTEXT_RADIUS).min(source.len());
    while end < source.len() && !source.is_char_boundary(end) {
        end += 1;
    }

    let mut snippet = source[start..end].trim().replace('\n', " ");
    if start > 0 {
        snippet = format!("...{snippet}");
    }
    if end < source.len() {
        snippet = format!("{snippet}...");
    }

    Some(snippet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scorer() -> EntityScorer {
        EntityScorer::new(&ValidationConfig {
            confidence_floor: 0.3,
            fuzzy_threshold: 0.85,
            suspicious_patterns: crate::config::default_suspicious_patterns(),
        })
    }

    fn raw(name: &str, attrs: serde_json::Value) -> RawEntity {
        let mut value = attrs;
        value["name"] = json!(name);
        serde_json::from_value(value).unwrap()
    }

    const SOURCE: &str = "User: Have you met Marcellous yet?\n\nJinx: Marcellous? The Black Crows lieutenant? He shook down half the docks last week. Marcellous doesn't forgive debts.";

    #[test]
    fn mentioned_entity_keeps_model_confidence() {
        let entity = scorer()
            .score(
                EntityKind::Npc,
                raw(
                    "Marcellous",
                    json!({"description": "A Black Crows lieutenant", "confidence": 0.9}),
                ),
                SOURCE,
            )
            .unwrap();

        assert_eq!(entity.mention_count, 3);
        assert_eq!(entity.confidence, 0.9);
        assert!(!entity.requires_review);
        assert!(entity.risk_flags.is_empty());
        assert!(entity.source_context.unwrap().contains("Marcellous"));
    }

    #[test]
    fn absent_name_is_flagged_and_capped() {
        let entity = scorer()
            .score(
                EntityKind::Npc,
                raw(
                    "Vorthag",
                    json!({"description": "A mysterious stranger", "confidence": 0.95}),
                ),
                SOURCE,
            )
            .unwrap();

        // Absent name (+0.5) and zero mentions (+0.4) push risk past 0.5.
        assert!(entity.requires_review);
        assert!(entity.confidence <= 0.6);
        assert_eq!(entity.mention_count, 0);
        assert_eq!(entity.risk_flags.len(), 2);
    }

    #[test]
    fn suspicious_epithet_adds_risk() {
        let source = "Jinx: They call him Borin the Great around here. Borin the Great runs the forge. Everyone owes Borin the Great something.";
        let entity = scorer()
            .score(
                EntityKind::Npc,
                raw("Borin the Great", json!({"confidence": 0.9})),
                source,
            )
            .unwrap();

        assert!(entity
            .risk_flags
            .iter()
            .any(|f| f.contains("suspicious name pattern")));
        // Pattern risk alone (0.3) does not force review.
        assert!(!entity.requires_review);
    }

    #[test]
    fn below_floor_is_discarded() {
        let result = scorer().score(
            EntityKind::Item,
            raw("Dagger", json!({"confidence": 0.1})),
            "User: He drew a dagger.",
        );
        assert!(result.is_none());
    }

    #[test]
    fn missing_confidence_is_estimated() {
        let entity = scorer()
            .score(
                EntityKind::Npc,
                raw(
                    "Marcellous",
                    json!({"description": "A Black Crows lieutenant who runs the docks", "role": "enforcer"}),
                ),
                SOURCE,
            )
            .unwrap();

        // 0.5 base + 0.2 description + 0.1 fields + 0.09 mentions.
        assert!(entity.confidence > 0.8);
        assert!(entity.confidence <= 1.0);
    }

    #[test]
    fn nameless_record_is_dropped() {
        let result = scorer().score(EntityKind::Npc, raw("   ", json!({})), SOURCE);
        assert!(result.is_none());
    }

    #[test]
    fn partial_name_match_counts_as_present() {
        let source = "User: Lady Marcelline of the docks sent a letter. Marcelline wants payment.";
        let entity = scorer()
            .score(
                EntityKind::Npc,
                raw("Marcelline of the Docks", json!({"confidence": 0.8})),
                source,
            )
            .unwrap();

        // Half the significant words appear, so the name counts as present
        // even though the exact phrase never does.
        assert!(!entity
            .risk_flags
            .iter()
            .any(|f| f.contains("name not found")));
    }

    #[test]
    fn case_insensitive_mention_counting() {
        let entity = scorer()
            .score(
                EntityKind::Faction,
                raw("black crows", json!({"confidence": 0.8})),
                "User: The Black Crows run the docks. Nobody crosses the BLACK CROWS.",
            )
            .unwrap();
        assert_eq!(entity.mention_count, 2);
    }
}
