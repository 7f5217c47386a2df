//! Single JSON document on disk holding every key.
//!
//! Several processes may share one document (the daemon and CLI edits), so
//! nothing is cached: every `get` reads the file, and every `set_many`
//! re-reads it under an exclusive lock file, applies only its own keys and
//! writes the result to a sibling temp file that is renamed over the
//! original. A crash mid-write leaves either the old or the new document.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use serde_json::Value;
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::logging::{self, LogSource};
use crate::model::StoreError;

type Document = BTreeMap<String, Value>;

const LOCK_RETRY: Duration = Duration::from_millis(20);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
/// A lock file older than this was left behind by a crashed writer.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

pub struct FileStore {
    path: PathBuf,
    /// Serializes writers within this process; the lock file covers others.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens the document at `path`, starting empty if it does not exist.
    /// A document that exists but is not valid JSON is rejected.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            parse_document(&path, &contents)?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }

    async fn read_document(&self) -> Result<Document, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => parse_document(&self.path, &contents),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, data: &Document) -> Result<(), StoreError> {
        let serialized = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Creates the lock file, waiting for other writers to release it.
    async fn acquire_file_lock(&self) -> Result<LockFile, StoreError> {
        let lock_path = self.lock_path();
        let started = Instant::now();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .await
            {
                Ok(_) => return Ok(LockFile(lock_path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            if lock_is_stale(&lock_path).await {
                logging::warn(
                    LogSource::Store,
                    None,
                    &format!("removing stale lock file {}", lock_path.display()),
                );
                let _ = tokio::fs::remove_file(&lock_path).await;
                continue;
            }
            if started.elapsed() >= LOCK_TIMEOUT {
                return Err(StoreError::Task(format!(
                    "timed out waiting for lock file {}",
                    lock_path.display()
                )));
            }
            tokio::time::sleep(LOCK_RETRY).await;
        }
    }
}

fn parse_document(path: &Path, contents: &str) -> Result<Document, StoreError> {
    if contents.trim().is_empty() {
        return Ok(Document::new());
    }
    serde_json::from_str(contents).map_err(|e| StoreError::Corrupt {
        key: path.display().to_string(),
        reason: e.to_string(),
    })
}

async fn lock_is_stale(lock_path: &Path) -> bool {
    let Ok(meta) = tokio::fs::metadata(lock_path).await else {
        return false;
    };
    meta.modified()
        .ok()
        .and_then(|at| SystemTime::now().duration_since(at).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

/// Removes the lock file when dropped.
struct LockFile(PathBuf);

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_document().await?.remove(key))
    }

    async fn set_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let _local = self.write_lock.lock().await;
        let _file = self.acquire_file_lock().await?;
        let mut document = self.read_document().await?;
        document.extend(entries);
        self.persist(&document).await
    }
}
