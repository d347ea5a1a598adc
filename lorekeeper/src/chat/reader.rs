use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoreError, Result};

/// A normalized transcript turn. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub index: usize,
    pub speaker: String,
    pub is_user: bool,
    pub text: String,
    pub timestamp: Option<String>,
}

impl ChatTurn {
    /// Renders "Speaker: text" the way chunks present turns to the LLM.
    pub fn render(&self) -> String {
        format!("{}: {}", self.speaker, self.text)
    }
}

/// Raw shape of one SillyTavern .jsonl record.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_user: bool,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    mes: Option<String>,
    #[serde(default)]
    send_date: Option<serde_json::Value>,
    #[serde(default)]
    chat_metadata: Option<serde_json::Value>,
}

/// Reads SillyTavern chat logs: newline-delimited JSON, one message per
/// line, with an optional metadata header line.
#[derive(Debug, Clone)]
pub struct ChatReader {
    chats_dir: PathBuf,
}

impl ChatReader {
    pub fn new(chats_dir: impl Into<PathBuf>) -> Self {
        Self {
            chats_dir: chats_dir.into(),
        }
    }

    /// All .jsonl files under the chats directory, relative paths,
    /// recursive.
    pub fn list_chat_files(&self) -> Result<Vec<String>> {
        let mut found = Vec::new();
        if !self.chats_dir.exists() {
            return Ok(found);
        }
        collect_jsonl(&self.chats_dir, &self.chats_dir, &mut found)?;
        found.sort();
        Ok(found)
    }

    /// Read a chat log, returning the last `last_n` turns in chronological
    /// order (all turns when `last_n` is `None`).
    ///
    /// Malformed lines are skipped with a warning; the read fails with
    /// `Parse` only when the file contains lines but none of them parse.
    pub fn read_chat(&self, chat_file: &str, last_n: Option<usize>) -> Result<Vec<ChatTurn>> {
        let path = self.chats_dir.join(chat_file);
        if !path.exists() {
            return Err(LoreError::SourceNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(&path)?;
        let mut turns = Vec::new();
        let mut candidate_lines = 0usize;
        let mut bad_lines = 0usize;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            candidate_lines += 1;

            match serde_json::from_str::<RawMessage>(line) {
                Ok(raw) => {
                    // Metadata header carries no turn.
                    if raw.chat_metadata.is_some() {
                        candidate_lines -= 1;
                        continue;
                    }
                    if raw.is_system {
                        continue;
                    }
                    let text = raw.mes.unwrap_or_default();
                    if text.trim().is_empty() {
                        continue;
                    }
                    turns.push(ChatTurn {
                        index: turns.len(),
                        speaker: raw.name.unwrap_or_else(|| "Unknown".to_string()),
                        is_user: raw.is_user,
                        text,
                        timestamp: raw.send_date.map(timestamp_string),
                    });
                }
                Err(e) => {
                    bad_lines += 1;
                    tracing::warn!(
                        chat_file = %chat_file,
                        line = line_num + 1,
                        error = %e,
                        "Skipping malformed chat line"
                    );
                }
            }
        }

        if candidate_lines > 0 && bad_lines == candidate_lines {
            return Err(LoreError::Parse(format!(
                "no parseable messages in {chat_file}"
            )));
        }

        if let Some(n) = last_n {
            if n > 0 && turns.len() > n {
                let skip = turns.len() - n;
                turns.drain(..skip);
                // Indices stay chronological within the returned window.
                for (i, turn) in turns.iter_mut().enumerate() {
                    turn.index = skip + i;
                }
            }
        }

        Ok(turns)
    }

    /// Best-effort character name from a chat filename
    /// (`CharacterName_-_date.jsonl` or `CharacterName.jsonl`).
    pub fn character_from_chat(chat_file: &str) -> String {
        let stem = Path::new(chat_file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(chat_file);

        let name = if let Some((name, _)) = stem.split_once("_-_") {
            name
        } else if let Some((name, _)) = stem.split_once('-') {
            name
        } else {
            stem
        };

        name.trim().to_string()
    }
}

fn collect_jsonl(root: &Path, dir: &Path, found: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_jsonl(root, &path, found)?;
        } else if path.extension().is_some_and(|ext| ext == "jsonl") {
            if let Ok(rel) = path.strip_prefix(root) {
                found.push(rel.to_string_lossy().to_string());
            }
        }
    }
    Ok(())
}

fn timestamp_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_chat(dir: &TempDir, name: &str, lines: &[&str]) {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut file = std::fs::File::create(path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    #[test]
    fn reads_turns_in_order() {
        let dir = TempDir::new().unwrap();
        write_chat(
            &dir,
            "jinx.jsonl",
            &[
                r#"{"chat_metadata": {"note": "header"}}"#,
                r#"{"name": "User", "is_user": true, "mes": "Hello there", "send_date": "2026-01-01T00:00:00Z"}"#,
                r#"{"name": "Jinx", "is_user": false, "mes": "Hey!", "send_date": "2026-01-01T00:01:00Z"}"#,
            ],
        );

        let reader = ChatReader::new(dir.path());
        let turns = reader.read_chat("jinx.jsonl", None).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, "User");
        assert!(turns[0].is_user);
        assert_eq!(turns[1].render(), "Jinx: Hey!");
        assert_eq!(turns[0].index, 0);
        assert_eq!(turns[1].index, 1);
    }

    #[test]
    fn skips_malformed_trailing_line() {
        let dir = TempDir::new().unwrap();
        write_chat(
            &dir,
            "chat.jsonl",
            &[
                r#"{"name": "User", "is_user": true, "mes": "First"}"#,
                r#"{"name": "Char", "mes": "Second"}"#,
                r#"{"name": "Char", "mes": "trunca"#,
            ],
        );

        let reader = ChatReader::new(dir.path());
        let turns = reader.read_chat("chat.jsonl", None).unwrap();
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn fails_when_entire_file_is_garbage() {
        let dir = TempDir::new().unwrap();
        write_chat(&dir, "bad.jsonl", &["not json at all", "also not json"]);

        let reader = ChatReader::new(dir.path());
        let err = reader.read_chat("bad.jsonl", None).unwrap_err();
        assert!(matches!(err, LoreError::Parse(_)));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = TempDir::new().unwrap();
        let reader = ChatReader::new(dir.path());
        let err = reader.read_chat("ghost.jsonl", None).unwrap_err();
        assert!(matches!(err, LoreError::SourceNotFound(_)));
    }

    #[test]
    fn last_n_returns_tail_with_original_indices() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (0..10)
            .map(|i| format!(r#"{{"name": "User", "mes": "msg {i}"}}"#))
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        write_chat(&dir, "long.jsonl", &refs);

        let reader = ChatReader::new(dir.path());
        let turns = reader.read_chat("long.jsonl", Some(3)).unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text, "msg 7");
        assert_eq!(turns[0].index, 7);
        assert_eq!(turns[2].index, 9);
    }

    #[test]
    fn lists_chat_files_recursively() {
        let dir = TempDir::new().unwrap();
        write_chat(&dir, "a.jsonl", &[r#"{"name":"U","mes":"x"}"#]);
        write_chat(&dir, "sub/b.jsonl", &[r#"{"name":"U","mes":"y"}"#]);
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let reader = ChatReader::new(dir.path());
        let files = reader.list_chat_files().unwrap();
        assert_eq!(files, vec!["a.jsonl".to_string(), "sub/b.jsonl".to_string()]);
    }

    #[test]
    fn character_name_from_filename() {
        assert_eq!(
            ChatReader::character_from_chat("Jinx_-_2026-01-01.jsonl"),
            "Jinx"
        );
        assert_eq!(ChatReader::character_from_chat("sub/Vi_-_x.jsonl"), "Vi");
        assert_eq!(ChatReader::character_from_chat("Caitlyn.jsonl"), "Caitlyn");
    }

    #[test]
    fn skips_system_and_empty_messages() {
        let dir = TempDir::new().unwrap();
        write_chat(
            &dir,
            "sys.jsonl",
            &[
                r#"{"name": "System", "is_system": true, "mes": "narration"}"#,
                r#"{"name": "User", "mes": "   "}"#,
                r#"{"name": "User", "mes": "real"}"#,
            ],
        );

        let reader = ChatReader::new(dir.path());
        let turns = reader.read_chat("sys.jsonl", None).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "real");
    }
}
