use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::extract::EntryRef;

/// A SillyTavern character card. Only the lorebook path is modeled;
/// everything else round-trips untouched through the flattened maps so a
/// rewrite never loses fields this tool does not understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterCard {
    #[serde(default)]
    pub data: CardData,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_book: Option<CharacterBook>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharacterBook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub entries: Vec<LorebookEntry>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LorebookEntry {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub secondary_keys: Vec<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub constant: bool,
    #[serde(default = "default_true")]
    pub selective: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_insertion_order")]
    pub insertion_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default)]
    pub extensions: Map<String, Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_insertion_order() -> i64 {
    100
}

impl CharacterCard {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Entries in the card's lorebook, empty when no book exists yet.
    pub fn entries(&self) -> &[LorebookEntry] {
        self.data
            .character_book
            .as_ref()
            .map(|book| book.entries.as_slice())
            .unwrap_or(&[])
    }

    /// The lorebook, created on first use.
    pub fn book_mut(&mut self) -> &mut CharacterBook {
        self.data.character_book.get_or_insert_with(|| CharacterBook {
            name: Some("Campaign Lorebook".to_string()),
            entries: Vec::new(),
            rest: Map::new(),
        })
    }

    /// Matching view of the entries for the deduplicator.
    pub fn entry_refs(&self) -> Vec<EntryRef> {
        self.entries()
            .iter()
            .map(|entry| EntryRef {
                entry_id: entry.id,
                names: entry.keys.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let original = json!({
            "name": "Jinx",
            "spec": "chara_card_v2",
            "data": {
                "first_mes": "Hey!",
                "character_book": {
                    "name": "Campaign Lorebook",
                    "scan_depth": 50,
                    "entries": [{
                        "id": 1,
                        "keys": ["silco"],
                        "content": "Silco runs the undercity.",
                        "custom_field": "hand-edited"
                    }]
                }
            }
        });

        let card = CharacterCard::parse(&original.to_string()).unwrap();
        let reserialized: Value =
            serde_json::from_str(&card.to_json_string().unwrap()).unwrap();

        assert_eq!(reserialized["spec"], json!("chara_card_v2"));
        assert_eq!(reserialized["data"]["first_mes"], json!("Hey!"));
        assert_eq!(
            reserialized["data"]["character_book"]["scan_depth"],
            json!(50)
        );
        assert_eq!(
            reserialized["data"]["character_book"]["entries"][0]["custom_field"],
            json!("hand-edited")
        );
    }

    #[test]
    fn card_without_book_has_no_entries() {
        let card = CharacterCard::parse(r#"{"name": "Vi", "data": {}}"#).unwrap();
        assert!(card.entries().is_empty());
        assert!(card.entry_refs().is_empty());
    }

    #[test]
    fn book_mut_creates_default_book() {
        let mut card = CharacterCard::parse(r#"{"data": {}}"#).unwrap();
        let book = card.book_mut();
        assert_eq!(book.name.as_deref(), Some("Campaign Lorebook"));
        assert!(book.entries.is_empty());
    }

    #[test]
    fn entry_defaults_match_sillytavern_expectations() {
        let entry: LorebookEntry =
            serde_json::from_value(json!({"id": 3, "keys": ["vander"], "content": "x"})).unwrap();
        assert!(entry.enabled);
        assert!(entry.selective);
        assert!(!entry.constant);
        assert_eq!(entry.insertion_order, 100);
    }
}
