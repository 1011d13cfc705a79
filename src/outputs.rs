//! Step outputs, exported variables, and error annotations.
//!
//! Values are written using the runner's file protocol: `name=value` lines
//! appended to the files named by `GITHUB_OUTPUT` and `GITHUB_ENV`. When a
//! file is not configured the value is only kept in memory.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Collects step outputs and environment exported to later commands.
#[derive(Debug, Clone, Default)]
pub struct ActionOutputs {
    output_file: Option<PathBuf>,
    env_file: Option<PathBuf>,
    outputs: BTreeMap<String, String>,
    exported: Vec<(String, String)>,
}

impl ActionOutputs {
    /// Creates outputs backed by the given runner files.
    pub fn new(output_file: Option<PathBuf>, env_file: Option<PathBuf>) -> Self {
        Self {
            output_file,
            env_file,
            ..Default::default()
        }
    }

    /// Sets a step output.
    pub fn set_output(&mut self, name: &str, value: &str) -> Result<()> {
        tracing::info!(name = %name, value = %value, "setting output");
        if let Some(path) = &self.output_file {
            append_line(path, name, value)?;
        }
        self.outputs.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Exports an environment variable to commands started by this process
    /// and to later workflow steps.
    pub fn export_variable(&mut self, name: &str, value: &str) -> Result<()> {
        tracing::debug!(name = %name, value = %value, "exporting variable");
        if let Some(path) = &self.env_file {
            append_line(path, name, value)?;
        }
        self.exported.retain(|(k, _)| k != name);
        self.exported.push((name.to_string(), value.to_string()));
        Ok(())
    }

    /// Returns a step output previously set.
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    /// Variables exported so far, in export order.
    pub fn exported(&self) -> &[(String, String)] {
        &self.exported
    }
}

fn append_line(path: &Path, name: &str, value: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}={}", name, value)?;
    Ok(())
}

/// Formats an error annotation the runner surfaces on the job summary.
pub fn error_annotation(message: &str) -> String {
    let escaped = message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A");
    format!("::error::{}", escaped)
}
