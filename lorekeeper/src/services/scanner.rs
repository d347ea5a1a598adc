use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chat::ChatReader;
use crate::config::Config;
use crate::db::{Database, EntityQueueStore, ScanStore};
use crate::error::{LoreError, Result};
use crate::extract::{
    EntityScorer, EntityValidator, EntryRef, ExtractedEntity, MatchDecision, ParseOutcome,
    ResponseParser,
};
use crate::llm::prompts::{entity_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use crate::llm::OllamaClient;
use crate::lorebook::CharacterCard;
use crate::models::{
    now_rfc3339, Checkpoint, EntityKind, EntityStatus, QueuedEntity, ScanRecord, ScanReport,
    ScanStatus,
};
use crate::processing::TurnChunker;

use super::scan_lock::ScanLockManager;

const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Where a chat's entities go: lorebook entities to the character file,
/// aliases and stat changes to the persona file when one is mapped.
struct ScanTargets {
    character: String,
    persona: Option<String>,
}

impl ScanTargets {
    fn for_kind(&self, kind: EntityKind) -> &str {
        match (&self.persona, kind) {
            (Some(persona), EntityKind::Alias | EntityKind::StatChange) => persona,
            _ => &self.character,
        }
    }
}

/// Drives a scan end to end: read, chunk, extract, score, deduplicate,
/// queue. One scan per chat file at a time; chunks are processed strictly
/// in order so the checkpoint always describes a clean prefix.
pub struct ScanOrchestrator {
    config: Config,
    db: Database,
    reader: ChatReader,
    chunker: TurnChunker,
    llm: OllamaClient,
    parser: ResponseParser,
    scorer: EntityScorer,
    validator: EntityValidator,
    locks: ScanLockManager,
}

impl ScanOrchestrator {
    pub fn new(config: Config, db: Database, llm: OllamaClient) -> Self {
        let reader = ChatReader::new(&config.paths.chats_dir);
        let chunker = TurnChunker::new(&config.scanning);
        let scorer = EntityScorer::new(&config.validation);
        let validator = EntityValidator::new(&config.validation);
        let locks = ScanLockManager::new(Duration::from_secs(config.scanning.lock_stale_secs));

        Self {
            config,
            db,
            reader,
            chunker,
            llm,
            parser: ResponseParser::new(),
            scorer,
            validator,
            locks,
        }
    }

    pub fn lock_manager(&self) -> &ScanLockManager {
        &self.locks
    }

    /// Scan one chat file. `force` ignores the stored checkpoint and
    /// rescans from the beginning.
    pub async fn scan(&self, chat_file: &str, force: bool) -> Result<ScanReport> {
        if !self.locks.acquire(chat_file).await {
            return Err(LoreError::ScanInProgress(chat_file.to_string()));
        }

        let result = self.scan_locked(chat_file, force).await;
        self.locks.release(chat_file).await;

        if let Err(e) = &result {
            let record = ScanRecord {
                id: 0,
                chat_file: chat_file.to_string(),
                character_file: None,
                turns_scanned: 0,
                entities_found: 0,
                status: ScanStatus::Failed,
                error_message: Some(e.to_string()),
                scan_date: now_rfc3339(),
            };
            if let Err(db_err) = self.db.add_scan_record(&record).await {
                tracing::warn!(error = %db_err, "Failed to record failed scan");
            }
        }

        result
    }

    /// Scan every chat file under the chats directory. Failures are
    /// logged and skipped so one broken chat cannot stop the sweep.
    pub async fn scan_all(&self, force: bool) -> Result<Vec<ScanReport>> {
        let mut reports = Vec::new();
        for chat_file in self.reader.list_chat_files()? {
            match self.scan(&chat_file, force).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::warn!(chat_file = %chat_file, error = %e, "Scan failed, continuing");
                }
            }
        }
        Ok(reports)
    }

    async fn scan_locked(&self, chat_file: &str, force: bool) -> Result<ScanReport> {
        let targets = self.resolve_targets(chat_file).await?;
        let turns = self.reader.read_chat(chat_file, None)?;
        let total_turns = turns.len();

        let start_index = self.resume_index(chat_file, total_turns, force).await?;
        let window = &turns[start_index..];

        if window.is_empty() {
            tracing::info!(chat_file = %chat_file, "Nothing new to scan");
            let report = ScanReport {
                chat_file: chat_file.to_string(),
                status: ScanStatus::Completed,
                chunks_processed: 0,
                chunks_failed: 0,
                entities_queued: 0,
                entities_merged: 0,
                entities_suppressed: 0,
                turns_scanned: 0,
                error_message: None,
            };
            self.record_scan(&report, &targets.character).await;
            return Ok(report);
        }

        let chunks: Vec<_> = self
            .chunker
            .chunks(window)
            .take(self.config.scanning.max_chunks_per_scan)
            .collect();
        let entry_refs = self.load_entry_refs(&targets.character);

        let mut report = ScanReport {
            chat_file: chat_file.to_string(),
            status: ScanStatus::Completed,
            chunks_processed: 0,
            chunks_failed: 0,
            entities_queued: 0,
            entities_merged: 0,
            entities_suppressed: 0,
            turns_scanned: 0,
            error_message: None,
        };
        let mut first_failed_start: Option<usize> = None;
        let mut last_end = start_index;

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 && i % self.config.scanning.batch_size == 0 {
                tokio::time::sleep(Duration::from_secs(self.config.scanning.cooldown_secs)).await;
            }

            let chunk_text = chunk.text();
            match self.process_chunk(&chunk_text, &targets, &entry_refs, &mut report).await {
                Ok(()) => {
                    report.chunks_processed += 1;
                    last_end = chunk.end_index;
                }
                Err(e) => {
                    tracing::warn!(
                        chat_file = %chat_file,
                        chunk_start = chunk.start_index,
                        error = %e,
                        "Chunk failed, continuing with the next one"
                    );
                    report.chunks_failed += 1;
                    first_failed_start.get_or_insert(chunk.start_index);
                }
            }
        }

        // The checkpoint never skips past a failed chunk: a partial scan
        // resumes from the first failure.
        let checkpoint_index = match first_failed_start {
            None => last_end,
            Some(failed_start) => failed_start.max(start_index),
        };
        report.turns_scanned = checkpoint_index.saturating_sub(start_index);
        report.status = if report.chunks_failed == 0 {
            ScanStatus::Completed
        } else if report.chunks_processed > 0 {
            ScanStatus::Partial
        } else {
            ScanStatus::Failed
        };
        if report.chunks_failed > 0 {
            report.error_message = Some(format!("{} chunk(s) failed", report.chunks_failed));
        }

        self.db
            .save_checkpoint(&Checkpoint {
                chat_file: chat_file.to_string(),
                last_processed_index: checkpoint_index,
                last_processed_timestamp: Some(now_rfc3339()),
                total_turns,
            })
            .await?;

        self.record_scan(&report, &targets.character).await;

        tracing::info!(
            chat_file = %chat_file,
            status = ?report.status,
            queued = report.entities_queued,
            merged = report.entities_merged,
            suppressed = report.entities_suppressed,
            "Scan finished"
        );

        Ok(report)
    }

    async fn process_chunk(
        &self,
        chunk_text: &str,
        targets: &ScanTargets,
        entry_refs: &[EntryRef],
        report: &mut ScanReport,
    ) -> Result<()> {
        let prompt = entity_extraction_prompt(chunk_text);
        let response = self.generate_with_retry(&prompt).await?;

        let draft = match self.parser.parse(&response) {
            ParseOutcome::Recovered(draft) => draft,
            ParseOutcome::PartialRecovered { draft, skipped } => {
                tracing::warn!(skipped, "Some entity records in the response were unreadable");
                draft
            }
            ParseOutcome::Unrecoverable(reason) => {
                return Err(LoreError::UnrecoverableResponse(reason));
            }
        };

        let scored = self.scorer.score_draft(draft, chunk_text);
        if scored.is_empty() {
            return Ok(());
        }

        let mut pending_character = self
            .db
            .pending_entities(Some(&targets.character), None)
            .await?;
        let mut pending_persona = match &targets.persona {
            Some(persona) => self.db.pending_entities(Some(persona), None).await?,
            None => Vec::new(),
        };

        for entity in scored {
            let target_file = targets.for_kind(entity.kind).to_string();
            // Lorebook entry matching only applies to the character file.
            let (pending, refs) = if target_file == targets.character {
                (&mut pending_character, entry_refs)
            } else {
                (&mut pending_persona, &[][..])
            };
            let target_file = target_file.as_str();

            match self.validator.decide(&entity, pending, refs) {
                MatchDecision::Insert => {
                    let id = self.queue_entity(&entity, target_file, None).await?;
                    pending.push(queued_copy(id, &entity, target_file));
                    report.entities_queued += 1;
                }
                MatchDecision::MergeEntry { entry_id } => {
                    let id = self.queue_entity(&entity, target_file, Some(entry_id)).await?;
                    pending.push(queued_copy(id, &entity, target_file));
                    report.entities_queued += 1;
                }
                MatchDecision::MergePending {
                    id,
                    data,
                    confidence,
                    conflicts,
                } => {
                    if !conflicts.is_empty() {
                        tracing::warn!(
                            name = %entity.name,
                            pending_id = id,
                            conflicts = ?conflicts,
                            "Conflicting attributes kept for manual resolution"
                        );
                    }
                    self.db.update_entity_data(id, &data, confidence).await?;
                    if let Some(existing) = pending.iter_mut().find(|p| p.id == id) {
                        existing.data = data;
                        existing.confidence = confidence;
                    }
                    report.entities_merged += 1;
                }
                MatchDecision::Suppress => {
                    report.entities_suppressed += 1;
                }
            }
        }

        Ok(())
    }

    async fn queue_entity(
        &self,
        entity: &ExtractedEntity,
        target_file: &str,
        existing_entry_id: Option<i64>,
    ) -> Result<i64> {
        let mut payload = entity.queue_payload();
        if let Some(entry_id) = existing_entry_id {
            payload["existing_entry_id"] = serde_json::json!(entry_id);
        }

        self.db
            .add_entity(
                entity.kind,
                &entity.name,
                &payload,
                target_file,
                entity.source_context.as_deref(),
                entity.confidence,
            )
            .await
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self
                .llm
                .generate(prompt, Some(EXTRACTION_SYSTEM_PROMPT), self.config.llm.temperature)
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.config.llm.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "LLM call failed, retrying");
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Where a scan should start: the stored checkpoint unless forced or
    /// incremental mode is off. A checkpoint pointing past the end of the
    /// file means the chat shrank (edited or replaced); start over.
    async fn resume_index(&self, chat_file: &str, total_turns: usize, force: bool) -> Result<usize> {
        if force || !self.config.scanning.incremental {
            return Ok(0);
        }

        match self.db.checkpoint(chat_file).await? {
            Some(checkpoint) if checkpoint.last_processed_index > total_turns => {
                tracing::warn!(
                    chat_file = %chat_file,
                    checkpoint = checkpoint.last_processed_index,
                    total_turns,
                    "Checkpoint is beyond the end of the chat; resetting"
                );
                self.db.reset_checkpoint(chat_file).await?;
                Ok(0)
            }
            Some(checkpoint) => Ok(checkpoint.last_processed_index),
            None => Ok(0),
        }
    }

    /// The files this chat's entities target: explicit mapping first,
    /// then the filename heuristic. Only a mapping can name a persona
    /// file.
    async fn resolve_targets(&self, chat_file: &str) -> Result<ScanTargets> {
        if let Some(mapping) = self.db.mapping(chat_file).await? {
            return Ok(ScanTargets {
                character: mapping.character_file,
                persona: mapping.persona_file,
            });
        }

        let character = ChatReader::character_from_chat(chat_file);
        if character.is_empty() {
            return Err(LoreError::Validation(format!(
                "cannot derive a character file for {chat_file}; add a mapping"
            )));
        }
        Ok(ScanTargets {
            character: format!("{character}.json"),
            persona: None,
        })
    }

    fn character_path(&self, target_file: &str) -> PathBuf {
        let path = Path::new(target_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config.paths.characters_dir).join(path)
        }
    }

    fn load_entry_refs(&self, target_file: &str) -> Vec<EntryRef> {
        let path = self.character_path(target_file);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        match CharacterCard::parse(&content) {
            Ok(card) => card.entry_refs(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Character file is not valid JSON; matching against an empty lorebook"
                );
                Vec::new()
            }
        }
    }

    async fn record_scan(&self, report: &ScanReport, target_file: &str) {
        let record = ScanRecord {
            id: 0,
            chat_file: report.chat_file.clone(),
            character_file: Some(target_file.to_string()),
            turns_scanned: report.turns_scanned,
            entities_found: report.entities_queued + report.entities_merged,
            status: report.status,
            error_message: report.error_message.clone(),
            scan_date: now_rfc3339(),
        };
        if let Err(e) = self.db.add_scan_record(&record).await {
            tracing::warn!(error = %e, "Failed to record scan history");
        }
    }
}

fn queued_copy(id: i64, entity: &ExtractedEntity, target_file: &str) -> QueuedEntity {
    QueuedEntity {
        id,
        kind: entity.kind,
        name: entity.name.clone(),
        data: entity.queue_payload(),
        target_file: target_file.to_string(),
        source_context: entity.source_context.clone(),
        confidence: entity.confidence,
        status: EntityStatus::Pending,
        created_at: now_rfc3339(),
        reviewed_at: None,
        reviewed_by: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        default_suspicious_patterns, DatabaseConfig, LlmConfig, PathsConfig, ScanningConfig,
        ValidationConfig,
    };
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(dir: &TempDir, llm_url: String) -> Config {
        Config {
            llm: LlmConfig {
                base_url: llm_url,
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

    fn write_chat(config: &Config, name: &str, turns: &[(&str, &str)]) {
        let dir = Path::new(&config.paths.chats_dir);
        std::fs::create_dir_all(dir).unwrap();
        let lines: Vec<String> = turns
            .iter()
            .map(|(speaker, text)| {
                json!({"name": speaker, "is_user": *speaker == "User", "mes": text}).to_string()
            })
            .collect();
        std::fs::write(dir.join(name), lines.join("\n")).unwrap();
    }

    async fn orchestrator(config: Config) -> ScanOrchestrator {
        let db = Database::in_memory().await.unwrap();
        let llm = OllamaClient::new(&config.llm).unwrap();
        ScanOrchestrator::new(config, db, llm)
    }

    fn extraction_body(npcs: serde_json::Value) -> serde_json::Value {
        json!({
            "response": json!({
                "npcs": npcs,
                "factions": [],
                "locations": [],
                "items": [],
                "aliases": [],
                "stat_changes": []
            })
            .to_string()
        })
    }

    #[tokio::test]
    async fn scan_queues_extracted_entities() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(extraction_body(json!([
                {"name": "Marcellous", "description": "A Black Crows lieutenant", "confidence": 0.9}
            ]))))
            .mount(&server)
            .await;

        let config = test_config(&dir, server.uri());
        write_chat(
            &config,
            "Jinx_-_2026.jsonl",
            &[
                ("User", "Have you met Marcellous yet?"),
                ("Jinx", "Marcellous runs the Black Crows down at the docks."),
                ("User", "Marcellous sounds dangerous."),
            ],
        );

        let orch = orchestrator(config).await;
        let report = orch.scan("Jinx_-_2026.jsonl", false).await.unwrap();

        assert_eq!(report.status, ScanStatus::Completed);
        assert_eq!(report.entities_queued, 1);
        assert_eq!(report.chunks_failed, 0);

        let pending = orch.db.pending_entities(None, None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "Marcellous");
        assert_eq!(pending[0].target_file, "Jinx.json");

        // Checkpoint covers the whole chat.
        let checkpoint = orch.db.checkpoint("Jinx_-_2026.jsonl").await.unwrap().unwrap();
        assert_eq!(checkpoint.last_processed_index, 3);
    }

    #[tokio::test]
    async fn concurrent_scan_of_same_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, "http://localhost:11434".to_string());
        write_chat(&config, "chat.jsonl", &[("User", "hello")]);

        let orch = orchestrator(config).await;
        assert!(orch.lock_manager().acquire("chat.jsonl").await);

        let err = orch.scan("chat.jsonl", false).await.unwrap_err();
        assert!(matches!(err, LoreError::ScanInProgress(_)));
    }

    #[tokio::test]
    async fn checkpoint_beyond_eof_resets_to_zero() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(extraction_body(json!([]))),
            )
            .mount(&server)
            .await;

        let config = test_config(&dir, server.uri());
        write_chat(&config, "chat.jsonl", &[("User", "a"), ("Char", "b")]);

        let orch = orchestrator(config).await;
        orch.db
            .save_checkpoint(&Checkpoint {
                chat_file: "chat.jsonl".to_string(),
                last_processed_index: 50,
                last_processed_timestamp: None,
                total_turns: 50,
            })
            .await
            .unwrap();

        let report = orch.scan("chat.jsonl", false).await.unwrap();
        assert_eq!(report.status, ScanStatus::Completed);

        let checkpoint = orch.db.checkpoint("chat.jsonl").await.unwrap().unwrap();
        assert_eq!(checkpoint.last_processed_index, 2);
        assert_eq!(checkpoint.total_turns, 2);
    }

    #[tokio::test]
    async fn failed_chunk_marks_scan_partial_and_holds_checkpoint() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        // First chunk parses; second chunk is prose with no JSON.
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(extraction_body(json!([]))))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "I found nothing of note."})),
            )
            .mount(&server)
            .await;

        let mut config = test_config(&dir, server.uri());
        config.scanning.chunk_size = 5;
        config.scanning.chunk_overlap = 1;

        let turns: Vec<(String, String)> = (0..9)
            .map(|i| ("User".to_string(), format!("turn number {i}")))
            .collect();
        let turns_ref: Vec<(&str, &str)> =
            turns.iter().map(|(s, t)| (s.as_str(), t.as_str())).collect();
        write_chat(&config, "chat.jsonl", &turns_ref);

        let orch = orchestrator(config).await;
        let report = orch.scan("chat.jsonl", false).await.unwrap();

        assert_eq!(report.status, ScanStatus::Partial);
        assert_eq!(report.chunks_processed, 1);
        assert_eq!(report.chunks_failed, 1);

        // Resumes from the failed chunk's start, not past it.
        let checkpoint = orch.db.checkpoint("chat.jsonl").await.unwrap().unwrap();
        assert_eq!(checkpoint.last_processed_index, 4);
    }

    #[tokio::test]
    async fn mapping_overrides_filename_heuristic() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(extraction_body(json!([
                {"name": "Sevika", "description": "An enforcer", "confidence": 0.9}
            ]))))
            .mount(&server)
            .await;

        let config = test_config(&dir, server.uri());
        write_chat(&config, "session-42.jsonl", &[("User", "Sevika was there.")]);

        let orch = orchestrator(config).await;
        orch.db
            .set_mapping("session-42.jsonl", "Jinx.json", None)
            .await
            .unwrap();

        orch.scan("session-42.jsonl", false).await.unwrap();
        let pending = orch.db.pending_entities(None, None).await.unwrap();
        assert_eq!(pending[0].target_file, "Jinx.json");
    }

    #[tokio::test]
    async fn aliases_route_to_mapped_persona_file() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": json!({
                    "npcs": [
                        {"name": "Sevika", "description": "An enforcer", "confidence": 0.9}
                    ],
                    "aliases": [
                        {"name": "Silver Fox", "purpose": "Infiltration", "confidence": 0.9}
                    ]
                })
                .to_string()
            })))
            .mount(&server)
            .await;

        let config = test_config(&dir, server.uri());
        write_chat(
            &config,
            "chat.jsonl",
            &[("User", "Sevika saw through the Silver Fox disguise.")],
        );

        let orch = orchestrator(config).await;
        orch.db
            .set_mapping("chat.jsonl", "Jinx.json", Some("Hero.json"))
            .await
            .unwrap();

        orch.scan("chat.jsonl", false).await.unwrap();

        let pending = orch.db.pending_entities(None, None).await.unwrap();
        assert_eq!(pending.len(), 2);
        let npc = pending.iter().find(|e| e.name == "Sevika").unwrap();
        assert_eq!(npc.target_file, "Jinx.json");
        let alias = pending.iter().find(|e| e.name == "Silver Fox").unwrap();
        assert_eq!(alias.target_file, "Hero.json");
    }

    #[tokio::test]
    async fn rescan_suppresses_known_duplicates() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(extraction_body(json!([
                {"name": "Marcellous", "description": "A Black Crows lieutenant", "confidence": 0.9}
            ]))))
            .mount(&server)
            .await;

        let config = test_config(&dir, server.uri());
        write_chat(
            &config,
            "chat.jsonl",
            &[("User", "Marcellous again. Marcellous never stops.")],
        );

        let orch = orchestrator(config).await;
        let first = orch.scan("chat.jsonl", true).await.unwrap();
        assert_eq!(first.entities_queued, 1);

        let second = orch.scan("chat.jsonl", true).await.unwrap();
        assert_eq!(second.entities_queued, 0);
        assert_eq!(second.entities_suppressed, 1);

        assert_eq!(orch.db.pending_entities(None, None).await.unwrap().len(), 1);
    }
}
