use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse `SUSPICIOUS_NAME_PATTERNS` env var: `|||`-separated regex list.
/// The default list targets invented epithets and honorific pile-ups the
/// extraction model is prone to fabricating.
fn parse_suspicious_patterns() -> Vec<String> {
    match env::var("SUSPICIOUS_NAME_PATTERNS") {
        Ok(val) if !val.trim().is_empty() => val
            .split("|||")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => default_suspicious_patterns(),
    }
}

pub fn default_suspicious_patterns() -> Vec<String> {
    vec![
        // Superlative honorifics ("the Great", "the Dread")
        r"\bthe (great|mighty|terrible|magnificent|dread)\b".to_string(),
        // Stacked titles ("King Lord X of ...")
        r"\b(king|queen|lord|duke|baron)\s+\w+\s+(the|of)\b".to_string(),
        // Very long names (5+ words)
        r"^\w+(\s+\w+){4,}$".to_string(),
    ]
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub scanning: ScanningConfig,
    pub validation: ValidationConfig,
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
}

/// Ollama backend settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    /// Bounded retry attempts per chunk, applied by the orchestrator.
    pub max_retries: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct ScanningConfig {
    /// Turns per chunk sent to the LLM in one call.
    pub chunk_size: usize,
    /// Turns shared between consecutive chunks.
    pub chunk_overlap: usize,
    /// Cap on chunks processed in a single scan.
    pub max_chunks_per_scan: usize,
    /// LLM calls between cooldown pauses.
    pub batch_size: usize,
    /// Cooldown between chunk batches, in seconds.
    pub cooldown_secs: u64,
    /// Scan locks older than this are considered stale and taken over.
    pub lock_stale_secs: u64,
    /// Resume from the stored checkpoint instead of rescanning.
    pub incremental: bool,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Entities scoring below this are discarded before queueing.
    pub confidence_floor: f64,
    /// Normalized edit-distance similarity above which two names are
    /// treated as the same entity.
    pub fuzzy_threshold: f64,
    /// Regexes matched against entity names during hallucination scoring.
    pub suspicious_patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub chats_dir: String,
    pub characters_dir: String,
    /// Persona JSON files; alias and stat-change entities land here when
    /// a chat mapping names a persona file.
    pub personas_dir: String,
    pub backups_dir: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
                api_key: env::var("OLLAMA_API_KEY").ok(),
                timeout_secs: parse_env_or("LLM_TIMEOUT", 120),
                max_retries: parse_env_or("LLM_MAX_RETRIES", 2),
                temperature: parse_env_or("LLM_TEMPERATURE", 0.3),
            },
            scanning: ScanningConfig {
                chunk_size: parse_env_or("CHUNK_SIZE", 20),
                chunk_overlap: parse_env_or("CHUNK_OVERLAP", 5),
                max_chunks_per_scan: parse_env_or("MAX_CHUNKS_PER_SCAN", 10),
                batch_size: parse_env_or("SCAN_BATCH_SIZE", 5),
                cooldown_secs: parse_env_or("SCAN_COOLDOWN_SECS", 2),
                lock_stale_secs: parse_env_or("SCAN_LOCK_STALE_SECS", 1800),
                incremental: parse_env_or("INCREMENTAL_MODE", true),
            },
            validation: ValidationConfig {
                confidence_floor: parse_env_or("CONFIDENCE_FLOOR", 0.3),
                fuzzy_threshold: parse_env_or("FUZZY_MATCH_THRESHOLD", 0.85),
                suspicious_patterns: parse_suspicious_patterns(),
            },
            paths: PathsConfig {
                chats_dir: env::var("CHATS_DIR").unwrap_or_else(|_| "data/chats".to_string()),
                characters_dir: env::var("CHARACTERS_DIR")
                    .unwrap_or_else(|_| "data/characters".to_string()),
                personas_dir: env::var("PERSONAS_DIR")
                    .unwrap_or_else(|_| "data/personas".to_string()),
                backups_dir: env::var("BACKUPS_DIR")
                    .unwrap_or_else(|_| "data/backups".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:lorekeeper.db".to_string()),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let config = Self::default();
        config.validate();
        config
    }

    /// Clamp values that would break chunk arithmetic rather than failing
    /// startup: overlap must stay below chunk_size.
    fn validate(&self) {
        if self.scanning.chunk_overlap >= self.scanning.chunk_size {
            tracing::warn!(
                chunk_size = self.scanning.chunk_size,
                chunk_overlap = self.scanning.chunk_overlap,
                "CHUNK_OVERLAP must be smaller than CHUNK_SIZE; scans will fail until fixed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_without_env() {
        for var in [
            "OLLAMA_URL",
            "OLLAMA_MODEL",
            "CHUNK_SIZE",
            "CHUNK_OVERLAP",
            "CONFIDENCE_FLOOR",
            "SUSPICIOUS_NAME_PATTERNS",
        ] {
            std::env::remove_var(var);
        }

        let config = Config::default();
        assert_eq!(config.llm.base_url, "http://localhost:11434");
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.scanning.chunk_size, 20);
        assert_eq!(config.scanning.chunk_overlap, 5);
        assert_eq!(config.validation.confidence_floor, 0.3);
        assert_eq!(config.validation.suspicious_patterns.len(), 3);
    }

    #[test]
    #[serial]
    fn scanning_config_from_env() {
        std::env::set_var("CHUNK_SIZE", "40");
        std::env::set_var("CHUNK_OVERLAP", "10");
        std::env::set_var("SCAN_COOLDOWN_SECS", "7");

        let config = Config::default();
        assert_eq!(config.scanning.chunk_size, 40);
        assert_eq!(config.scanning.chunk_overlap, 10);
        assert_eq!(config.scanning.cooldown_secs, 7);

        std::env::remove_var("CHUNK_SIZE");
        std::env::remove_var("CHUNK_OVERLAP");
        std::env::remove_var("SCAN_COOLDOWN_SECS");
    }

    #[test]
    #[serial]
    fn invalid_env_falls_back_to_default() {
        std::env::set_var("CHUNK_SIZE", "not-a-number");
        let config = Config::default();
        assert_eq!(config.scanning.chunk_size, 20);
        std::env::remove_var("CHUNK_SIZE");
    }

    #[test]
    #[serial]
    fn suspicious_patterns_from_env() {
        std::env::set_var("SUSPICIOUS_NAME_PATTERNS", r"\bfoo\b|||\bbar\b");
        let config = Config::default();
        assert_eq!(
            config.validation.suspicious_patterns,
            vec![r"\bfoo\b".to_string(), r"\bbar\b".to_string()]
        );
        std::env::remove_var("SUSPICIOUS_NAME_PATTERNS");
    }
}
