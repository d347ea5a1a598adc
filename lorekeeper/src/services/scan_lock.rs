use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Prevents concurrent scans of the same chat file.
///
/// In-process only: the tool is single-process by design, so a named
/// mutex in memory is the whole story. Locks older than the staleness
/// window are assumed abandoned (a crashed scan) and taken over.
pub struct ScanLockManager {
    active_scans: Mutex<HashMap<String, Instant>>,
    stale_after: Duration,
}

impl ScanLockManager {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            active_scans: Mutex::new(HashMap::new()),
            stale_after,
        }
    }

    /// Try to take the lock for `chat_file`. False means a scan is
    /// already running and the caller should give up, not wait.
    pub async fn acquire(&self, chat_file: &str) -> bool {
        let mut scans = self.active_scans.lock().await;

        if let Some(started) = scans.get(chat_file) {
            if started.elapsed() < self.stale_after {
                return false;
            }
            tracing::warn!(chat_file = %chat_file, "Taking over stale scan lock");
        }

        scans.insert(chat_file.to_string(), Instant::now());
        true
    }

    pub async fn release(&self, chat_file: &str) {
        self.active_scans.lock().await.remove(chat_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let locks = ScanLockManager::new(Duration::from_secs(1800));

        assert!(locks.acquire("chat.jsonl").await);
        assert!(!locks.acquire("chat.jsonl").await);

        locks.release("chat.jsonl").await;
        assert!(locks.acquire("chat.jsonl").await);
    }

    #[tokio::test]
    async fn distinct_files_lock_independently() {
        let locks = ScanLockManager::new(Duration::from_secs(1800));
        assert!(locks.acquire("a.jsonl").await);
        assert!(locks.acquire("b.jsonl").await);
    }

    #[tokio::test]
    async fn stale_lock_is_taken_over() {
        let locks = ScanLockManager::new(Duration::from_millis(10));
        assert!(locks.acquire("chat.jsonl").await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(locks.acquire("chat.jsonl").await);
    }
}
