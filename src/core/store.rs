//! Security state store
//!
//! [`SecurityStore`] is the only owner of the [`SecurityState`] and the only
//! writer of its document on disk. It is constructed once by the process's
//! composition root and shared by `Arc`.
//!
//! # Concurrency
//!
//! The state sits behind a single `tokio::sync::RwLock` holding an
//! `Arc<SecurityState>`:
//! - [`SecurityStore::read`] clones the `Arc`, so readers hold the lock only
//!   for a pointer copy and never block each other.
//! - [`SecurityStore::mutate`] takes the write lock, applies the transition
//!   copy-on-write and keeps the lock through the disk write, so mutations
//!   are serialized and persisted in commit order.
//!
//! Tokio's lock is write-preferring: a queued writer is not starved by a
//! stream of readers.
//!
//! # Persistence
//!
//! The whole aggregate is written as one pretty-printed JSON document on
//! every mutation: temp file (mode 0o600) → `sync_all` → rename, followed by
//! a SHA-256 sidecar. A checksum mismatch on load only warns, since the file
//! may have been edited by hand.

use crate::core::error::{Error, Result};
use crate::core::state::SecurityState;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// File name of the state document inside the data directory
pub const STATE_FILE_NAME: &str = "security.json";

/// Outcome of a mutation.
///
/// The value is always committed to memory. `persisted` reports whether the
/// document on disk caught up; when it did not, memory and disk disagree
/// until the next successful write.
#[must_use = "a commit may carry a persistence failure"]
#[derive(Debug)]
pub struct Commit<T> {
    value: T,
    persisted: Result<()>,
}

impl<T> Commit<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn persist_error(&self) -> Option<&Error> {
        self.persisted.as_ref().err()
    }

    /// Strict view: a persistence failure becomes the error
    pub fn into_result(self) -> Result<T> {
        self.persisted.map(|()| self.value)
    }

    /// Lenient view: the in-memory effect counts as success.
    /// The store has already logged any persistence failure.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, Result<()>) {
        (self.value, self.persisted)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Commit<U> {
        Commit {
            value: f(self.value),
            persisted: self.persisted,
        }
    }
}

impl<T> Commit<Result<T>> {
    /// Surfaces an error returned by the mutation closure itself
    pub fn transpose(self) -> Result<Commit<T>> {
        let value = self.value?;
        Ok(Commit {
            value,
            persisted: self.persisted,
        })
    }
}

/// Process-wide owner of the security state
#[derive(Debug)]
pub struct SecurityStore {
    path: PathBuf,
    state: RwLock<Arc<SecurityState>>,
}

impl SecurityStore {
    /// Loads the state document at `path`, or creates it with defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Persistence`] if no document exists and the defaults cannot
    ///   be written (unwritable location)
    /// - [`Error::Deserialization`] if the document exists but is corrupt.
    ///   The file is left untouched for the operator to inspect.
    /// - [`Error::Io`] if the document exists but cannot be read
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                verify_checksum(&path, &json).await;

                let mut state: SecurityState =
                    serde_json::from_str(&json).map_err(|source| Error::Deserialization {
                        path: path.clone(),
                        source,
                    })?;
                state.normalize();

                // Relative times and missing ids are resolved during the load
                // above. Save them so the next load sees the same values.
                if serde_json::to_string_pretty(&state).is_ok_and(|migrated| migrated != json) {
                    match write_document(&path, &state).await {
                        Ok(()) => info!("Migrated security state at {}", path.display()),
                        Err(e) => warn!(
                            "Failed to save migrated security state to {}: {}",
                            path.display(),
                            e
                        ),
                    }
                }

                info!(
                    "Loaded security state from {} ({} rules, {} audit entries)",
                    path.display(),
                    state.firewall_rules.len(),
                    state.audit_log.len()
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No security state at {}, initializing defaults",
                    path.display()
                );
                let state = SecurityState::default();

                if let Some(parent) = path.parent() {
                    ensure_dir(parent)
                        .await
                        .map_err(|source| Error::Persistence {
                            path: path.clone(),
                            source,
                        })?;
                }
                write_document(&path, &state)
                    .await
                    .map_err(|source| Error::Persistence {
                        path: path.clone(),
                        source,
                    })?;
                state
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: RwLock::new(Arc::new(state)),
        })
    }

    /// Loads `security.json` inside `data_dir`
    pub async fn open_in(data_dir: &Path) -> Result<Self> {
        Self::load(data_dir.join(STATE_FILE_NAME)).await
    }

    /// Path of the state document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns an immutable snapshot of the current state
    pub async fn read(&self) -> Arc<SecurityState> {
        Arc::clone(&*self.state.read().await)
    }

    /// Applies `f` under exclusive access, then persists the result.
    ///
    /// The write lock is held until the document is on disk. If the write
    /// fails the mutation stays committed in memory and the commit carries
    /// [`Error::Persistence`].
    pub async fn mutate<T, F>(&self, f: F) -> Commit<T>
    where
        F: FnOnce(&mut SecurityState) -> T,
    {
        let mut guard = self.state.write().await;
        let value = f(Arc::make_mut(&mut guard));

        let persisted = write_document(&self.path, &guard)
            .await
            .map_err(|source| {
                warn!(
                    "Security state committed in memory but not persisted to {}: {}",
                    self.path.display(),
                    source
                );
                Error::Persistence {
                    path: self.path.clone(),
                    source,
                }
            });

        Commit { value, persisted }
    }
}

/// SHA-256 of the serialized document, lowercase hex
pub fn checksum(json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn checksum_path(path: &Path) -> PathBuf {
    let mut sidecar = path.as_os_str().to_owned();
    sidecar.push(".sha256");
    PathBuf::from(sidecar)
}

/// Warns (never fails) when the sidecar checksum does not match
async fn verify_checksum(path: &Path, json: &str) {
    if let Ok(expected) = tokio::fs::read_to_string(checksum_path(path)).await {
        let actual = checksum(json);
        if expected.trim() != actual {
            warn!(
                "Security state {} checksum mismatch (expected: {}, got: {})",
                path.display(),
                expected.trim(),
                actual
            );
        }
    }
}

async fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700); // User read/write/execute only
    builder.create(dir).await
}

/// Writes the document atomically.
/// Uses a temporary file + rename so a crash or full disk mid-write never
/// leaves a truncated document behind.
async fn write_document(path: &Path, state: &SecurityState) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(state)?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        // Restrictive permissions BEFORE any data is written
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save security state. Free up space and try again.",
            )
        } else {
            e
        }
    })?;

    tokio::fs::write(checksum_path(path), checksum(&json)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::firewall::{NewRule, RuleAction};
    use chrono::Utc;

    #[tokio::test]
    async fn test_load_creates_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(STATE_FILE_NAME);

        let store = SecurityStore::load(&path).await.unwrap();

        assert!(path.exists());
        assert!(checksum_path(&path).exists());
        let state = store.read().await;
        assert!(state.config.enabled);
        assert_eq!(state.config.ports, vec!["80", "443", "22", "8888"]);
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = SecurityStore::load(&path).await.unwrap_err();

        assert!(matches!(err, Error::Deserialization { .. }));
        // User data is never overwritten
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "{ not json");
    }

    #[tokio::test]
    async fn test_load_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, "file, not dir").await.unwrap();

        let err = SecurityStore::load(blocker.join(STATE_FILE_NAME))
            .await
            .unwrap_err();

        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn test_mutate_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        let store = SecurityStore::load(&path).await.unwrap();

        let commit = store
            .mutate(|state| {
                state.config.enabled = false;
                state.config.enabled
            })
            .await;
        assert!(commit.persist_error().is_none());
        assert!(!commit.into_value());

        let on_disk: SecurityState =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert!(!on_disk.config.enabled);
    }

    #[tokio::test]
    async fn test_mutate_keeps_memory_when_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let store = SecurityStore::open_in(&data_dir).await.unwrap();

        tokio::fs::remove_dir_all(&data_dir).await.unwrap();

        let commit = store
            .mutate(|state| state.insert_rule(NewRule::new("10.0.0.1", RuleAction::Blocked), Utc::now()))
            .await;

        assert!(commit.persist_error().is_some_and(Error::is_persistence));
        assert!(store.read().await.blocked_ips.contains("10.0.0.1"));
        assert!(commit.into_result().is_err());
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SecurityStore::open_in(dir.path()).await.unwrap();

        let before = store.read().await;
        let _ = store.mutate(|state| state.config.enabled = false).await;

        assert!(before.config.enabled);
        assert!(!store.read().await.config.enabled);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        drop(SecurityStore::load(&path).await.unwrap());

        tokio::fs::write(checksum_path(&path), "deadbeef").await.unwrap();

        assert!(SecurityStore::load(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_legacy_relative_time_is_pinned_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        let legacy = r#"{
  "firewall": [
    {"id": 3, "ip": "192.0.2.44", "action": "Blocked", "reason": "SSH Brute Force", "target": "Port 22", "time": "2 mins ago"}
  ],
  "audit_logs": [
    {"id": 4, "time": "Just now", "user": "Admin", "action": "Add Firewall Rule", "target": "Blocked 192.0.2.44"}
  ]
}"#;
        tokio::fs::write(&path, legacy).await.unwrap();

        let first = SecurityStore::load(&path).await.unwrap().read().await;
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let second = SecurityStore::load(&path).await.unwrap().read().await;

        assert_eq!(
            first.firewall_rules[0].observed_at,
            second.firewall_rules[0].observed_at
        );
        assert_eq!(first.audit_log[0].observed_at, second.audit_log[0].observed_at);
        assert_eq!(second.next_id, 5);

        let on_disk = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!on_disk.contains("mins ago"));
        assert!(!on_disk.contains("Just now"));
        assert_eq!(
            tokio::fs::read_to_string(checksum_path(&path)).await.unwrap(),
            checksum(&on_disk)
        );
    }

    #[tokio::test]
    async fn test_current_document_is_not_rewritten_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE_NAME);
        let store = SecurityStore::load(&path).await.unwrap();
        let _ = store
            .mutate(|state| state.insert_rule(NewRule::new("10.0.0.1", RuleAction::Blocked), Utc::now()))
            .await;
        drop(store);
        let written = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(SecurityStore::load(&path).await.unwrap());

        let after = tokio::fs::metadata(&path).await.unwrap().modified().unwrap();
        assert_eq!(written, after);
    }

    #[test]
    fn test_checksum_path() {
        assert_eq!(
            checksum_path(Path::new("/data/security.json")),
            PathBuf::from("/data/security.json.sha256")
        );
    }
}
