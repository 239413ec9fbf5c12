//! services/clinic/src/adapters/file_store.rs
//!
//! A `KeyValueStore` backed by a directory with one `<key>.json` file per key.
//! Single writes go to a temporary file that is renamed over the target, so a
//! reader never sees a half-written value.
//!
//! Batches are guarded by an undo journal. Before the first key is replaced,
//! the previous value of every key in the batch is published to
//! `batch.journal`; deleting the journal is the commit point. A failed batch
//! is rolled back in place, and a journal left behind by a crash is rolled
//! back the next time the directory is accessed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clinic_core::ports::{KeyValueStore, PortError, PortResult};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, warn};

const JOURNAL: &str = "batch.journal";

/// The value a key held before the batch in progress touched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct UndoEntry {
    key: String,
    previous: Option<String>,
}

#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
    /// Makes publishing this file name fail, to exercise rollback.
    #[cfg(test)]
    fail_publish_to: Option<String>,
}

impl FileStore {
    /// Opens (and creates if needed) the storage directory, rolling back any
    /// batch that was interrupted before its commit point.
    pub async fn open(dir: impl AsRef<Path>) -> PortResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|e| {
            PortError::Unexpected(format!("Cannot create {}: {}", dir.display(), e))
        })?;
        let store = Self {
            dir,
            #[cfg(test)]
            fail_publish_to: None,
        };
        store.recover().await?;
        Ok(store)
    }

    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PortError::Unexpected(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL)
    }

    async fn stage(&self, target: &Path, value: &str) -> PortResult<PathBuf> {
        let mut name = target.as_os_str().to_owned();
        name.push(".tmp");
        let staging = PathBuf::from(name);
        fs::write(&staging, value).await.map_err(|e| io_error(&staging, e))?;
        Ok(staging)
    }

    async fn publish(&self, staging: &Path, target: &Path) -> PortResult<()> {
        #[cfg(test)]
        if let Some(name) = &self.fail_publish_to {
            if target.ends_with(name) {
                discard(staging).await;
                return Err(PortError::Unexpected(format!(
                    "{}: simulated rename failure",
                    target.display()
                )));
            }
        }
        if let Err(e) = fs::rename(staging, target).await {
            discard(staging).await;
            return Err(io_error(target, e));
        }
        Ok(())
    }

    /// Writes `value` to `target` through a temporary file.
    async fn write_file(&self, target: &Path, value: &str) -> PortResult<()> {
        let staging = self.stage(target, value).await?;
        self.publish(&staging, target).await
    }

    async fn read_key(&self, key: &str) -> PortResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn delete_key(&self, key: &str) -> PortResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Puts every key back to the value recorded in `undo`.
    async fn restore(&self, undo: &[UndoEntry]) -> PortResult<()> {
        for entry in undo {
            match &entry.previous {
                Some(value) => self.write_file(&self.path_for(&entry.key)?, value).await?,
                None => self.delete_key(&entry.key).await?,
            }
        }
        Ok(())
    }

    async fn remove_journal(&self) -> PortResult<()> {
        let path = self.journal_path();
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Rolls back a batch that never reached its commit point.
    async fn recover(&self) -> PortResult<()> {
        let path = self.journal_path();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(io_error(&path, e)),
        };
        let undo: Vec<UndoEntry> = serde_json::from_str(&raw).map_err(|e| PortError::Corrupt {
            key: JOURNAL.to_string(),
            reason: e.to_string(),
        })?;
        warn!(keys = undo.len(), "Rolling back an unfinished batch write");
        self.restore(&undo).await?;
        self.remove_journal().await
    }

    /// Undoes the keys of a failed batch that were already replaced and
    /// returns `cause`. If the rollback itself fails the journal stays, and
    /// the next access retries it.
    async fn roll_back(&self, applied: &[UndoEntry], cause: PortError) -> PortError {
        match self.restore(applied).await {
            Ok(()) => {
                if let Err(e) = self.remove_journal().await {
                    warn!(error = %e, "Rolled back batch but could not remove its journal");
                }
            }
            Err(e) => {
                error!(error = %e, "Batch rollback failed, it will be retried on next access");
            }
        }
        cause
    }
}

fn io_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("{}: {}", path.display(), e))
}

async fn discard(staging: &Path) {
    if let Err(e) = fs::remove_file(staging).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %staging.display(), error = %e, "Failed to clean up staged file");
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        self.recover().await?;
        self.read_key(key).await
    }

    async fn put(&self, key: &str, value: String) -> PortResult<()> {
        self.recover().await?;
        self.write_file(&self.path_for(key)?, &value).await?;
        debug!(key, bytes = value.len(), "Wrote key");
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(String, String)>) -> PortResult<()> {
        self.recover().await?;

        let mut undo = Vec::with_capacity(entries.len());
        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            let target = self.path_for(key)?;
            let previous = match self.read_key(key).await {
                Ok(previous) => previous,
                Err(e) => {
                    for (staging, _) in &staged {
                        discard(staging).await;
                    }
                    return Err(e);
                }
            };
            undo.push(UndoEntry {
                key: key.clone(),
                previous,
            });
            match self.stage(&target, value).await {
                Ok(staging) => staged.push((staging, target)),
                Err(e) => {
                    for (staging, _) in &staged {
                        discard(staging).await;
                    }
                    return Err(e);
                }
            }
        }

        let journal = serde_json::to_string(&undo)
            .map_err(|e| PortError::Unexpected(format!("Cannot serialize journal: {}", e)))?;
        if let Err(e) = self.write_file(&self.journal_path(), &journal).await {
            for (staging, _) in &staged {
                discard(staging).await;
            }
            return Err(e);
        }

        for (applied, (staging, target)) in staged.iter().enumerate() {
            if let Err(e) = self.publish(staging, target).await {
                for (rest, _) in &staged[applied + 1..] {
                    discard(rest).await;
                }
                return Err(self.roll_back(&undo[..applied], e).await);
            }
        }

        if let Err(e) = self.remove_journal().await {
            return Err(self.roll_back(&undo, e).await);
        }
        debug!(count = entries.len(), "Committed batched key writes");
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.recover().await?;
        self.delete_key(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<(String, String)> {
        vec![
            ("ma_sessions".to_string(), "[\"new\"]".to_string()),
            ("ma_appointments".to_string(), "[]".to_string()),
        ]
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp") || name == JOURNAL)
            .collect()
    }

    #[tokio::test]
    async fn values_survive_reopening_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("ma_users").await.unwrap(), None);

        store.put("ma_users", "[]".to_string()).await.unwrap();
        store
            .put_many(vec![
                ("ma_sessions".to_string(), "[1]".to_string()),
                ("ma_appointments".to_string(), "[2]".to_string()),
            ])
            .await
            .unwrap();

        let reopened = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get("ma_users").await.unwrap().as_deref(), Some("[]"));
        assert_eq!(reopened.get("ma_sessions").await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(
            reopened.get("ma_appointments").await.unwrap().as_deref(),
            Some("[2]")
        );
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn failed_second_rename_rolls_back_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).await.unwrap();
        store.put("ma_sessions", "[\"old\"]".to_string()).await.unwrap();
        store.put("ma_appointments", "[\"a1\"]".to_string()).await.unwrap();

        store.fail_publish_to = Some("ma_appointments.json".to_string());
        assert!(store.put_many(batch()).await.is_err());

        store.fail_publish_to = None;
        assert_eq!(store.get("ma_sessions").await.unwrap().as_deref(), Some("[\"old\"]"));
        assert_eq!(
            store.get("ma_appointments").await.unwrap().as_deref(),
            Some("[\"a1\"]")
        );
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn keys_created_by_a_failed_batch_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path()).await.unwrap();
        store.fail_publish_to = Some("ma_appointments.json".to_string());
        assert!(store.put_many(batch()).await.is_err());

        store.fail_publish_to = None;
        assert_eq!(store.get("ma_sessions").await.unwrap(), None);
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn interrupted_batch_is_rolled_back_on_open() {
        let dir = tempfile::tempdir().unwrap();
        // On-disk state of a crash after the first of two renames.
        let undo = vec![
            UndoEntry {
                key: "ma_sessions".to_string(),
                previous: Some("[\"old\"]".to_string()),
            },
            UndoEntry {
                key: "ma_appointments".to_string(),
                previous: Some("[\"a1\"]".to_string()),
            },
        ];
        std::fs::write(dir.path().join(JOURNAL), serde_json::to_string(&undo).unwrap()).unwrap();
        std::fs::write(dir.path().join("ma_sessions.json"), "[\"new\"]").unwrap();
        std::fs::write(dir.path().join("ma_appointments.json"), "[\"a1\"]").unwrap();

        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("ma_sessions").await.unwrap().as_deref(), Some("[\"old\"]"));
        assert_eq!(
            store.get("ma_appointments").await.unwrap().as_deref(),
            Some("[\"a1\"]")
        );
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn unreadable_key_aborts_the_batch_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.put("ma_sessions", "[\"old\"]".to_string()).await.unwrap();
        std::fs::create_dir(dir.path().join("ma_appointments.json")).unwrap();
        std::fs::write(dir.path().join("ma_appointments.json").join("x"), "").unwrap();

        assert!(store.put_many(batch()).await.is_err());
        assert_eq!(store.get("ma_sessions").await.unwrap().as_deref(), Some("[\"old\"]"));
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.put("ma_currentUser", "{}".to_string()).await.unwrap();
        store.remove("ma_currentUser").await.unwrap();
        store.remove("ma_currentUser").await.unwrap();
        assert_eq!(store.get("ma_currentUser").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert!(store.get("../etc/passwd").await.is_err());
        assert!(store.put("", "x".to_string()).await.is_err());
    }
}
