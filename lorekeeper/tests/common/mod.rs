#![allow(dead_code)]

use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

use lorekeeper::config::{
    default_suspicious_patterns, Config, DatabaseConfig, LlmConfig, PathsConfig, ScanningConfig,
    ValidationConfig,
};

pub fn test_config(dir: &TempDir, llm_url: &str) -> Config {
    Config {
        llm: LlmConfig {
            base_url: llm_url.to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            timeout_secs: 5,
            max_retries: 0,
            temperature: 0.3,
        },
        scanning: ScanningConfig {
            chunk_size: 20,
            chunk_overlap: 5,
            max_chunks_per_scan: 10,
            batch_size: 5,
            cooldown_secs: 0,
            lock_stale_secs: 1800,
            incremental: true,
        },
        validation: ValidationConfig {
            confidence_floor: 0.3,
            fuzzy_threshold: 0.85,
            suspicious_patterns: default_suspicious_patterns(),
        },
        paths: PathsConfig {
            chats_dir: dir.path().join("chats").display().to_string(),
            characters_dir: dir.path().join("characters").display().to_string(),
            personas_dir: dir.path().join("personas").display().to_string(),
            backups_dir: dir.path().join("backups").display().to_string(),
        },
        database: DatabaseConfig {
            url: ":memory:".to_string(),
        },
    }
}

pub fn write_chat(config: &Config, name: &str, turns: &[(String, String)]) {
    let dir = Path::new(&config.paths.chats_dir);
    std::fs::create_dir_all(dir).unwrap();
    let lines: Vec<String> = turns
        .iter()
        .map(|(speaker, text)| {
            json!({"name": speaker, "is_user": speaker == "User", "mes": text}).to_string()
        })
        .collect();
    std::fs::write(dir.join(name), lines.join("\n")).unwrap();
}

pub fn write_character(config: &Config, file_name: &str, character_name: &str) {
    let dir = Path::new(&config.paths.characters_dir);
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(file_name),
        json!({"name": character_name, "spec": "chara_card_v2", "data": {}}).to_string(),
    )
    .unwrap();
}

/// A 50-turn transcript that mentions Marcellous in every chunk window.
pub fn marcellous_transcript() -> Vec<(String, String)> {
    (0..50)
        .map(|i| {
            let speaker = if i % 2 == 0 { "User" } else { "Jinx" };
            let text = if i % 10 == 0 {
                format!("Marcellous and the Black Crows were at the docks again (turn {i}).")
            } else {
                format!("Nothing much happened this turn ({i}).")
            };
            (speaker.to_string(), text)
        })
        .collect()
}

/// Ollama-shaped response whose generated text is an extraction document.
pub fn extraction_response(document: serde_json::Value) -> serde_json::Value {
    json!({"response": document.to_string()})
}

pub fn marcellous_document() -> serde_json::Value {
    json!({
        "npcs": [{
            "name": "Marcellous",
            "description": "a Black Crows lieutenant who runs the docks",
            "relationship": "rival",
            "confidence": 0.9
        }],
        "factions": [],
        "locations": [],
        "items": [],
        "aliases": [],
        "stat_changes": []
    })
}
