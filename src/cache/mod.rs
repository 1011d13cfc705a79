//! Dependency and binary caches.
//!
//! A cache entry is a directory snapshot addressed by a primary key, with
//! restore-key prefixes as fallbacks. Restore and save never fail the
//! pipeline: problems come back as a typed miss or skip.

mod dir;
pub mod keys;

pub use dir::DirCacheStore;
pub use keys::{derive_key, hash_lockfile, CacheDomain, CacheKeyDeriver, Lockfile, ToolKind};

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

/// What to cache and under which keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDescriptor {
    /// Directory snapshotted by save and populated by restore.
    pub input_path: PathBuf,
    /// Exact key.
    pub primary_key: String,
    /// Prefixes tried in order when the exact key is absent.
    pub restore_keys: Vec<String>,
}

/// Why a restore found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// No entry matched the primary key or any restore key.
    NotFound,
    /// The backend failed; the message is kept for diagnostics.
    Failed(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NotFound => write!(f, "no matching entry"),
            MissReason::Failed(message) => write!(f, "{}", message),
        }
    }
}

/// Outcome of a restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRestore {
    /// An entry was restored.
    Hit {
        /// Key of the restored entry.
        key: String,
        /// Whether it was the primary key rather than a restore-key prefix.
        exact: bool,
    },
    /// Nothing was restored.
    Miss { reason: MissReason },
}

impl CacheRestore {
    /// True for both exact and prefix hits.
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheRestore::Hit { .. })
    }
}

/// Outcome of a save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSave {
    /// The entry was written.
    Saved { key: String },
    /// Nothing was written.
    Skipped { reason: String },
}

/// Trait for cache backends.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Restores the best matching entry into `descriptor.input_path`.
    async fn restore(&self, descriptor: &CacheDescriptor) -> CacheRestore;

    /// Saves `descriptor.input_path` under the primary key.
    async fn save(&self, descriptor: &CacheDescriptor) -> CacheSave;

    /// Returns the name of this backend.
    fn name(&self) -> &str;
}
