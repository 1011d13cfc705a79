//! Cache key derivation.
//!
//! Keys are `<prefix>-<platform-arch>-<sha256 of lockfile>`, so identical
//! lockfile bytes on the same platform always map to the same entry and any
//! byte change produces a new one.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::context::CachePaths;
use crate::error::{Error, Result};

use super::CacheDescriptor;

/// Prefix of binary cache keys.
pub const BINARY_PREFIX: &str = "cypress";

/// Package manager in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Yarn,
    Npm,
}

impl ToolKind {
    /// Key prefix and executable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Yarn => "yarn",
            ToolKind::Npm => "npm",
        }
    }

    /// Default install arguments.
    pub fn install_args(&self) -> &'static [&'static str] {
        match self {
            ToolKind::Yarn => &["--frozen-lockfile"],
            ToolKind::Npm => &["ci"],
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cache a key is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDomain {
    /// Package manager download cache.
    Dependencies(ToolKind),
    /// Test runner binary cache.
    Binary,
}

impl CacheDomain {
    fn prefix(&self) -> &'static str {
        match self {
            CacheDomain::Dependencies(tool) => tool.as_str(),
            CacheDomain::Binary => BINARY_PREFIX,
        }
    }
}

/// A located lockfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lockfile {
    /// Package manager owning the lockfile.
    pub tool: ToolKind,
    /// Path to the lockfile.
    pub path: PathBuf,
}

impl Lockfile {
    /// Finds the lockfile for `working_dir`.
    ///
    /// A `yarn.lock` in the yarn workspace root (or in `working_dir` when it
    /// is not inside a workspace) wins over a local `package-lock.json`.
    pub fn detect(working_dir: &Path) -> Option<Self> {
        let yarn_root = find_workspace_root(working_dir).unwrap_or_else(|| working_dir.to_path_buf());
        let yarn_lock = yarn_root.join("yarn.lock");
        if yarn_lock.is_file() {
            return Some(Self {
                tool: ToolKind::Yarn,
                path: yarn_lock,
            });
        }

        let package_lock = working_dir.join("package-lock.json");
        if package_lock.is_file() {
            return Some(Self {
                tool: ToolKind::Npm,
                path: package_lock,
            });
        }

        None
    }

    /// Reads and hashes the lockfile.
    pub fn hash(&self) -> Result<String> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            Error::Config(format!("cannot read lockfile {}: {}", self.path.display(), e))
        })?;
        Ok(hash_lockfile(&bytes))
    }
}

/// Walks up from `start` to the nearest `package.json` declaring
/// `workspaces`.
fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        let manifest = dir.join("package.json");
        let content = std::fs::read_to_string(&manifest).ok()?;
        let json: serde_json::Value = serde_json::from_str(&content).ok()?;
        json.get("workspaces").map(|_| dir.to_path_buf())
    })
}

/// Lowercase hex SHA-256 of the lockfile contents.
pub fn hash_lockfile(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

/// Derives the primary key for `domain`.
///
/// `override_key` is returned verbatim when present.
pub fn derive_key(
    domain: CacheDomain,
    lockfile_hash: &str,
    platform_arch: &str,
    override_key: Option<&str>,
) -> String {
    match override_key {
        Some(key) => key.to_string(),
        None => format!("{}-{}-{}", domain.prefix(), platform_arch, lockfile_hash),
    }
}

/// Restore-key prefixes for `domain`.
///
/// Only the binary cache falls back: any binary for the same platform is a
/// useful starting point, whereas a stale dependency cache is not.
pub fn restore_keys(domain: CacheDomain, platform_arch: &str) -> Vec<String> {
    match domain {
        CacheDomain::Binary => vec![format!("{}-{}-", BINARY_PREFIX, platform_arch)],
        CacheDomain::Dependencies(_) => Vec::new(),
    }
}

/// Builds the two cache descriptors for a run.
#[derive(Debug, Clone)]
pub struct CacheKeyDeriver {
    platform_arch: String,
    override_key: Option<String>,
    paths: CachePaths,
}

impl CacheKeyDeriver {
    /// Creates a deriver for the given platform and cache folders.
    pub fn new(platform_arch: impl Into<String>, paths: CachePaths) -> Self {
        Self {
            platform_arch: platform_arch.into(),
            override_key: None,
            paths,
        }
    }

    /// Sets the verbatim key override.
    pub fn with_override(mut self, key: Option<String>) -> Self {
        self.override_key = key;
        self
    }

    /// Descriptor for the package manager cache.
    pub fn dependency_cache(&self, tool: ToolKind, lockfile_hash: &str) -> CacheDescriptor {
        let domain = CacheDomain::Dependencies(tool);
        let input_path = match tool {
            ToolKind::Yarn => self.paths.yarn.clone(),
            ToolKind::Npm => self.paths.npm.clone(),
        };
        CacheDescriptor {
            input_path,
            primary_key: derive_key(
                domain,
                lockfile_hash,
                &self.platform_arch,
                self.override_key.as_deref(),
            ),
            restore_keys: restore_keys(domain, &self.platform_arch),
        }
    }

    /// Descriptor for the test runner binary cache.
    pub fn binary_cache(&self, lockfile_hash: &str) -> CacheDescriptor {
        let domain = CacheDomain::Binary;
        CacheDescriptor {
            input_path: self.paths.cypress.clone(),
            primary_key: derive_key(
                domain,
                lockfile_hash,
                &self.platform_arch,
                self.override_key.as_deref(),
            ),
            restore_keys: restore_keys(domain, &self.platform_arch),
        }
    }
}
