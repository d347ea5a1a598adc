use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::error::{LoreError, Result};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Protects character files against corruption.
///
/// Every mutation takes an exclusive advisory lock on a sidecar `.lock`
/// file, snapshots the current content into a timestamped backup, applies
/// the mutation to a temp file in the same directory, verifies the temp
/// file still parses as JSON, and only then renames it over the original.
/// Nothing short of the final rename ever touches the target.
#[derive(Debug, Clone)]
pub struct WriteGuard {
    backups_dir: PathBuf,
    lock_timeout: Duration,
}

/// Proof of a completed protected write, for the backup ledger.
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub backup_path: PathBuf,
    /// sha256 of the pre-mutation content.
    pub content_hash: String,
}

impl WriteGuard {
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
            lock_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Replace the content of `path` with `mutator(current_content)`.
    ///
    /// On any failure the original file is untouched and the error
    /// surfaces as `WriteAborted`. The backup taken before the mutation is
    /// kept even on failure.
    pub fn write_protected<F>(&self, path: &Path, mutator: F) -> Result<WriteReceipt>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        if !path.exists() {
            return Err(LoreError::SourceNotFound(path.display().to_string()));
        }

        let _lock = FileLock::acquire(path, self.lock_timeout)?;

        let current = fs::read_to_string(path)?;
        let content_hash = sha256_hex(current.as_bytes());
        let backup_path = self.create_backup(path, &current)?;

        let new_content = mutator(&current)
            .map_err(|e| LoreError::WriteAborted(format!("mutation failed: {e}")))?;

        let temp_path = sibling_path(path, ".tmp");
        let write_result = (|| -> Result<()> {
            fs::write(&temp_path, &new_content)?;

            // Verify the temp file before it can replace anything.
            let written = fs::read_to_string(&temp_path)?;
            serde_json::from_str::<serde_json::Value>(&written).map_err(|e| {
                LoreError::WriteAborted(format!("refusing to write invalid JSON: {e}"))
            })?;
            if written != new_content {
                return Err(LoreError::WriteAborted(
                    "temp file verification failed".to_string(),
                ));
            }

            fs::rename(&temp_path, path)?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&temp_path);
            return Err(match e {
                LoreError::WriteAborted(_) => e,
                other => LoreError::WriteAborted(other.to_string()),
            });
        }

        tracing::info!(
            path = %path.display(),
            backup = %backup_path.display(),
            "Protected write committed"
        );

        Ok(WriteReceipt {
            backup_path,
            content_hash,
        })
    }

    /// Put a backup's content back into place. The backup is verified
    /// against its recorded hash first; a corrupted backup never replaces
    /// a live file.
    pub fn restore(&self, source_path: &Path, backup_path: &Path, expected_hash: &str) -> Result<()> {
        let backup_content = fs::read_to_string(backup_path)
            .map_err(|_| LoreError::SourceNotFound(backup_path.display().to_string()))?;

        let actual = sha256_hex(backup_content.as_bytes());
        if actual != expected_hash {
            return Err(LoreError::WriteAborted(format!(
                "backup hash mismatch for {}: recorded {expected_hash}, found {actual}",
                backup_path.display()
            )));
        }

        let _lock = FileLock::acquire(source_path, self.lock_timeout)?;

        let temp_path = sibling_path(source_path, ".tmp");
        let result = (|| -> Result<()> {
            fs::write(&temp_path, &backup_content)?;
            fs::rename(&temp_path, source_path)?;
            Ok(())
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(LoreError::WriteAborted(e.to_string()));
        }

        tracing::info!(
            path = %source_path.display(),
            backup = %backup_path.display(),
            "Restored from backup"
        );
        Ok(())
    }

    fn create_backup(&self, path: &Path, content: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.backups_dir)?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("backup");
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        let timestamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");

        let mut backup_path = self
            .backups_dir
            .join(format!("{stem}.{timestamp}.backup{ext}"));
        let mut counter = 1;
        while backup_path.exists() {
            backup_path = self
                .backups_dir
                .join(format!("{stem}.{timestamp}-{counter}.backup{ext}"));
            counter += 1;
        }

        fs::write(&backup_path, content)?;
        Ok(backup_path)
    }
}

/// Scoped exclusive lock on a target's sidecar `.lock` file. Released on
/// drop, so every exit path unlocks. The sidecar itself is never deleted.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(target: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = sibling_path(target, ".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match fs2::FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(Self { file }),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(LoreError::WriteAborted(format!(
                        "could not lock {}: {e}",
                        lock_path.display()
                    )));
                }
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    name.push_str(suffix);
    path.with_file_name(name)
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WriteGuard, PathBuf) {
        let dir = TempDir::new().unwrap();
        let guard = WriteGuard::new(dir.path().join("backups"));
        let target = dir.path().join("Jinx.json");
        fs::write(&target, r#"{"name": "Jinx"}"#).unwrap();
        (dir, guard, target)
    }

    #[test]
    fn successful_write_replaces_content_and_keeps_backup() {
        let (_dir, guard, target) = setup();

        let receipt = guard
            .write_protected(&target, |current| {
                let mut value: serde_json::Value = serde_json::from_str(current)?;
                value["updated"] = serde_json::json!(true);
                Ok(value.to_string())
            })
            .unwrap();

        let after: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(after["updated"], serde_json::json!(true));

        let backup = fs::read_to_string(&receipt.backup_path).unwrap();
        assert_eq!(backup, r#"{"name": "Jinx"}"#);
        assert_eq!(receipt.content_hash, sha256_hex(backup.as_bytes()));
    }

    #[test]
    fn failing_mutator_leaves_target_untouched() {
        let (_dir, guard, target) = setup();

        let err = guard
            .write_protected(&target, |_| {
                Err(LoreError::Validation("cannot merge".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, LoreError::WriteAborted(_)));
        assert_eq!(fs::read_to_string(&target).unwrap(), r#"{"name": "Jinx"}"#);
    }

    #[test]
    fn invalid_json_output_is_rejected() {
        let (dir, guard, target) = setup();

        let err = guard
            .write_protected(&target, |_| Ok("{not valid json".to_string()))
            .unwrap_err();

        assert!(matches!(err, LoreError::WriteAborted(_)));
        assert_eq!(fs::read_to_string(&target).unwrap(), r#"{"name": "Jinx"}"#);
        // No temp file left behind.
        assert!(!dir.path().join("Jinx.json.tmp").exists());
    }

    #[test]
    fn missing_target_is_source_not_found() {
        let dir = TempDir::new().unwrap();
        let guard = WriteGuard::new(dir.path().join("backups"));
        let err = guard
            .write_protected(&dir.path().join("ghost.json"), |c| Ok(c.to_string()))
            .unwrap_err();
        assert!(matches!(err, LoreError::SourceNotFound(_)));
    }

    #[test]
    fn restore_verifies_hash_before_replacing() {
        let (_dir, guard, target) = setup();

        let receipt = guard
            .write_protected(&target, |_| Ok(r#"{"name": "Jinx", "v": 2}"#.to_string()))
            .unwrap();

        // Wrong hash refuses to restore.
        let err = guard
            .restore(&target, &receipt.backup_path, "deadbeef")
            .unwrap_err();
        assert!(matches!(err, LoreError::WriteAborted(_)));
        assert!(fs::read_to_string(&target).unwrap().contains("\"v\""));

        // Correct hash restores the pre-mutation content.
        guard
            .restore(&target, &receipt.backup_path, &receipt.content_hash)
            .unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), r#"{"name": "Jinx"}"#);
    }

    #[test]
    fn contended_lock_aborts_after_timeout() {
        let (_dir, guard, target) = setup();
        let guard = guard.with_lock_timeout(Duration::from_millis(200));

        let lock_path = sibling_path(&target, ".lock");
        let holder = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .unwrap();
        fs2::FileExt::lock_exclusive(&holder).unwrap();

        let err = guard
            .write_protected(&target, |c| Ok(c.to_string()))
            .unwrap_err();
        assert!(matches!(err, LoreError::WriteAborted(_)));

        fs2::FileExt::unlock(&holder).unwrap();
    }

    #[test]
    fn second_backup_in_same_second_gets_unique_name() {
        let (_dir, guard, target) = setup();
        let first = guard
            .write_protected(&target, |c| Ok(c.to_string()))
            .unwrap();
        let second = guard
            .write_protected(&target, |c| Ok(c.to_string()))
            .unwrap();
        assert_ne!(first.backup_path, second.backup_path);
        assert!(second.backup_path.exists());
    }
}
