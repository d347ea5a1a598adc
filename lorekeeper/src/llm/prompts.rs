//! Prompt templates for entity extraction
//!
//! Templates use `format!()` interpolation so a missing variable is a
//! compile-time error rather than a runtime surprise.

/// System prompt for the extraction call. Keeps the model on task and on
/// format.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a meticulous archivist for a role-play campaign. \
You read chat transcripts and extract world-building facts. \
You only report entities that are explicitly present in the transcript. \
You never invent names, and you always respond with valid JSON and nothing else.";

/// Generate a prompt for extracting lore entities from a transcript chunk.
///
/// The model is asked for a single JSON object keyed by entity category,
/// matching the shape the response parser expects.
///
/// # Example
/// ```
/// use lorekeeper::llm::prompts::entity_extraction_prompt;
///
/// let prompt = entity_extraction_prompt("Jinx: Marcellous runs the Black Crows.");
/// assert!(prompt.contains("Marcellous"));
/// assert!(prompt.contains("\"npcs\""));
/// ```
pub fn entity_extraction_prompt(chat_text: &str) -> String {
    format!(
        r#"Analyze the following role-play chat transcript and extract world-building entities.

Extract only entities that are explicitly named in the transcript. Do not invent,
embellish, or infer entities that are not directly mentioned. If a category has no
entities, return an empty array for it.

Categories:
- npcs: Named characters other than the user (description, role, relationship to the speakers)
- factions: Organizations, gangs, guilds, houses (description, goals, leadership, territory)
- locations: Named places (description, significance)
- items: Notable named objects (description, properties)
- aliases: Alternate names or titles for known characters (original_name, alias)
- stat_changes: Explicit changes to character stats, skills, or conditions (character, stat, change)

Each entity needs a "name" field and a "confidence" field from 0.0 to 1.0 reflecting
how clearly the transcript establishes it.

Transcript:
{chat_text}

Respond with valid JSON only, in exactly this shape:
{{
  "npcs": [
    {{"name": "Marcellous", "description": "A lieutenant of the Black Crows", "relationship": "rival", "confidence": 0.9}}
  ],
  "factions": [
    {{"name": "Black Crows", "description": "A smuggling gang", "territory": "the docks", "confidence": 0.85}}
  ],
  "locations": [],
  "items": [],
  "aliases": [],
  "stat_changes": []
}}"#
    )
}
