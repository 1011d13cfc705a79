//! Scoped change of the process working directory.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Switches the process working directory and switches back on drop.
///
/// The working directory is process-wide state; the previous directory is
/// restored on every exit path of the scope holding the guard.
#[derive(Debug)]
pub struct WorkingDirGuard {
    previous: PathBuf,
}

impl WorkingDirGuard {
    /// Changes into `dir`, remembering the current directory.
    pub fn enter(dir: &Path) -> Result<Self> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        tracing::debug!(from = ?previous, to = ?dir, "changed working directory");
        Ok(Self { previous })
    }

    /// Directory that will be restored.
    pub fn previous(&self) -> &Path {
        &self.previous
    }
}

impl Drop for WorkingDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            tracing::warn!(dir = ?self.previous, error = %e, "failed to restore working directory");
        }
    }
}
