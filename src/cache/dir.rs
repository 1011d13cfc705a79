//! Filesystem-backed cache store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<sha256(path, key)>/entry.json   {"key": "...", "input_path": "...", "saved_at_ms": ...}
//! <root>/<sha256(path, key)>/data/...     snapshot of the input path
//! ```
//!
//! An entry belongs to one input path, so two caches sharing a key (the
//! `cache-key` override) never overwrite or restore each other.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{Error, Result};

use super::{CacheDescriptor, CacheRestore, CacheSave, CacheStore, MissReason};

const ENTRY_FILE: &str = "entry.json";
const DATA_DIR: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    key: String,
    input_path: PathBuf,
    saved_at_ms: u128,
}

/// Cache store keeping entries as directories on local disk.
#[derive(Debug, Clone)]
pub struct DirCacheStore {
    root: PathBuf,
}

impl DirCacheStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// save.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_dir(&self, input_path: &Path, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(input_path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        self.root.join(hex::encode(hasher.finalize()))
    }

    fn restore_blocking(&self, descriptor: &CacheDescriptor) -> Result<Option<(String, bool)>> {
        let exact = self.entry_dir(&descriptor.input_path, &descriptor.primary_key);
        if exact.join(ENTRY_FILE).is_file() {
            copy_tree(&exact.join(DATA_DIR), &descriptor.input_path)?;
            return Ok(Some((descriptor.primary_key.clone(), true)));
        }

        for prefix in &descriptor.restore_keys {
            if let Some((key, dir)) = self.newest_with_prefix(prefix, &descriptor.input_path)? {
                copy_tree(&dir.join(DATA_DIR), &descriptor.input_path)?;
                return Ok(Some((key, false)));
            }
        }

        Ok(None)
    }

    fn newest_with_prefix(
        &self,
        prefix: &str,
        input_path: &Path,
    ) -> Result<Option<(String, PathBuf)>> {
        if !self.root.is_dir() {
            return Ok(None);
        }

        let mut best: Option<(EntryMeta, PathBuf)> = None;
        for entry in std::fs::read_dir(&self.root)? {
            let dir = entry?.path();
            let meta_path = dir.join(ENTRY_FILE);
            let Ok(content) = std::fs::read_to_string(&meta_path) else {
                continue;
            };
            let meta: EntryMeta = match serde_json::from_str(&content) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!(path = ?meta_path, error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            if meta.input_path != input_path || !meta.key.starts_with(prefix) {
                continue;
            }
            let newer = best
                .as_ref()
                .map_or(true, |(current, _)| meta.saved_at_ms > current.saved_at_ms);
            if newer {
                best = Some((meta, dir));
            }
        }

        Ok(best.map(|(meta, dir)| (meta.key, dir)))
    }

    fn save_blocking(&self, descriptor: &CacheDescriptor) -> Result<Option<String>> {
        if !descriptor.input_path.exists() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.root)?;
        let staging = self
            .root
            .join(format!(".staging-{}", uuid::Uuid::new_v4()));

        let written = (|| -> Result<()> {
            copy_tree(&descriptor.input_path, &staging.join(DATA_DIR))?;
            let meta = EntryMeta {
                key: descriptor.primary_key.clone(),
                input_path: descriptor.input_path.clone(),
                saved_at_ms: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or_default(),
            };
            std::fs::write(staging.join(ENTRY_FILE), serde_json::to_vec(&meta)?)?;

            let target = self.entry_dir(&descriptor.input_path, &descriptor.primary_key);
            if target.exists() {
                std::fs::remove_dir_all(&target)?;
            }
            std::fs::rename(&staging, &target)?;
            Ok(())
        })();

        if written.is_err() && staging.exists() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        written.map(|()| Some(descriptor.primary_key.clone()))
    }
}

#[async_trait]
impl CacheStore for DirCacheStore {
    async fn restore(&self, descriptor: &CacheDescriptor) -> CacheRestore {
        let store = self.clone();
        let owned = descriptor.clone();
        let result = tokio::task::spawn_blocking(move || store.restore_blocking(&owned))
            .await
            .map_err(|e| Error::Cache(format!("restore task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(Some((key, exact))) => {
                tracing::info!(key = %key, exact, path = ?descriptor.input_path, "cache restored");
                CacheRestore::Hit { key, exact }
            }
            Ok(None) => {
                tracing::info!(key = %descriptor.primary_key, "cache miss");
                CacheRestore::Miss {
                    reason: MissReason::NotFound,
                }
            }
            Err(e) => {
                tracing::warn!(key = %descriptor.primary_key, error = %e, "cache restore failed");
                CacheRestore::Miss {
                    reason: MissReason::Failed(e.to_string()),
                }
            }
        }
    }

    async fn save(&self, descriptor: &CacheDescriptor) -> CacheSave {
        let store = self.clone();
        let owned = descriptor.clone();
        let result = tokio::task::spawn_blocking(move || store.save_blocking(&owned))
            .await
            .map_err(|e| Error::Cache(format!("save task failed: {}", e)))
            .and_then(|r| r);

        match result {
            Ok(Some(key)) => {
                tracing::info!(key = %key, path = ?descriptor.input_path, "cache saved");
                CacheSave::Saved { key }
            }
            Ok(None) => {
                let reason = format!("{} does not exist", descriptor.input_path.display());
                tracing::info!(key = %descriptor.primary_key, reason = %reason, "cache save skipped");
                CacheSave::Skipped { reason }
            }
            Err(e) => {
                tracing::warn!(key = %descriptor.primary_key, error = %e, "cache save failed");
                CacheSave::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn name(&self) -> &str {
        "dir"
    }
}

/// Copies `from` into `to`, merging with existing content.
fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| Error::Cache(format!("cannot walk {}: {}", from.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Cache(e.to_string()))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
