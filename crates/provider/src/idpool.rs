//! Pre-declared identity pool loaded from the identity-source file.
//!
//! The file is a flat list of unsigned 64-bit integers, one per line.
//! Entries are consumed exactly once, in file order, and never returned.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Mutex;

use crossbeam::queue::SegQueue;
use decoy_host::Identity;

/// FIFO pool of pre-declared identities.
///
/// The dequeue itself is lock-free and safe from any context; the side table
/// of unconsumed values only backs the free-identity scan.
pub struct IdentityPool {
    queue: SegQueue<u64>,
    /// Unconsumed value -> occurrence count. Duplicates in the source file are
    /// preserved, not deduplicated.
    remaining: Mutex<HashMap<u64, usize>>,
}

impl IdentityPool {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            remaining: Mutex::new(HashMap::new()),
        }
    }

    /// Loads the pool from `path`.
    ///
    /// Malformed lines are skipped with a warning; a missing file degrades to
    /// an empty pool with a warning. Neither aborts startup.
    pub fn load(path: &Path) -> Self {
        let pool = Self::new();

        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(error) => {
                tracing::warn!(
                    target: "decoy::idpool",
                    path = %path.display(),
                    %error,
                    "identity file not readable, starting with an empty pool"
                );
                return pool;
            }
        };

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    tracing::error!(target: "decoy::idpool", %error, "error reading identity file");
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match trimmed.parse::<u64>() {
                Ok(raw) => pool.push(raw),
                Err(_) => {
                    tracing::warn!(target: "decoy::idpool", line = trimmed, "invalid identity in file, skipped");
                }
            }
        }

        pool
    }

    pub fn push(&self, raw: u64) {
        self.queue.push(raw);
        let mut remaining = self.remaining.lock().expect("identity pool table poisoned");
        *remaining.entry(raw).or_insert(0) += 1;
    }

    /// Dequeues the next pre-declared identity.
    ///
    /// On exhaustion this logs a warning and returns [`Identity::SENTINEL`]
    /// as a bounded degradation. The sentinel may collide; callers
    /// preferring a hard failure must check [`IdentityPool::is_empty`] first.
    pub fn next_identity(&self) -> Identity {
        match self.queue.pop() {
            Some(raw) => {
                let mut remaining = self.remaining.lock().expect("identity pool table poisoned");
                if let Some(count) = remaining.get_mut(&raw) {
                    *count -= 1;
                    if *count == 0 {
                        remaining.remove(&raw);
                    }
                }
                Identity::new(raw)
            }
            None => {
                tracing::warn!(
                    target: "decoy::idpool",
                    "identity pool exhausted, falling back to sentinel {}",
                    Identity::SENTINEL
                );
                Identity::SENTINEL
            }
        }
    }

    /// Whether `raw` is still among the unconsumed pool contents.
    pub fn remaining_contains(&self, raw: u64) -> bool {
        self.remaining
            .lock()
            .expect("identity pool table poisoned")
            .contains_key(&raw)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pool_from(lines: &str) -> IdentityPool {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        IdentityPool::load(file.path())
    }

    #[test]
    fn dequeues_in_file_order_then_degrades_to_sentinel() {
        let pool = pool_from("5\n7\n7\n");
        assert_eq!(pool.next_identity(), Identity::new(5));
        assert_eq!(pool.next_identity(), Identity::new(7));
        // Duplicate entries are preserved at load time.
        assert_eq!(pool.next_identity(), Identity::new(7));
        assert_eq!(pool.next_identity(), Identity::SENTINEL);
        assert_eq!(pool.next_identity(), Identity::SENTINEL);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let pool = pool_from("5\nnot-a-number\n9\n");
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.next_identity(), Identity::new(5));
        assert_eq!(pool.next_identity(), Identity::new(9));
    }

    #[test]
    fn missing_file_yields_empty_pool() {
        let dir = tempfile::tempdir().unwrap();
        let pool = IdentityPool::load(&dir.path().join("does-not-exist.txt"));
        assert!(pool.is_empty());
        assert_eq!(pool.next_identity(), Identity::SENTINEL);
    }

    #[test]
    fn remaining_tracks_unconsumed_duplicates() {
        let pool = pool_from("7\n7\n");
        assert!(pool.remaining_contains(7));
        pool.next_identity();
        // One occurrence consumed, one still pooled.
        assert!(pool.remaining_contains(7));
        pool.next_identity();
        assert!(!pool.remaining_contains(7));
    }
}
