//! Resumable progress state.
//!
//! `ProgressState` is the only state that survives between runs. It is loaded
//! once, appended to while lines resolve, and flushed at checkpoints and at
//! run end. The two output lists are rendered straight from it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::models::Bucket;
use crate::safety::validate_output_paths;

/// Lines already handled, plus the two lists a human reviews afterwards.
///
/// Invariants: a line is in `processed` at most once; `local` and `classical`
/// are disjoint subsets of `processed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    pub processed: BTreeSet<String>,
    pub local: Vec<String>,
    pub classical: Vec<String>,
}

impl ProgressState {
    pub fn is_processed(&self, line: &str) -> bool {
        self.processed.contains(line)
    }

    /// File a resolved line. Returns false (and changes nothing) if the line
    /// was already processed.
    pub fn record(&mut self, line: &str, bucket: Bucket) -> bool {
        if !self.processed.insert(line.to_string()) {
            return false;
        }
        match bucket {
            Bucket::LocalOnly => self.local.push(line.to_string()),
            Bucket::Classical => self.classical.push(line.to_string()),
            Bucket::Matched => {}
        }
        true
    }
}

/// Durable home of the progress state.
pub trait ProgressStore {
    fn load(&self) -> Result<ProgressState>;
    fn save(&self, state: &ProgressState) -> Result<()>;
}

/// Progress kept as a JSON document on disk.
pub struct JsonProgressStore {
    path: PathBuf,
}

impl JsonProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ProgressStore for JsonProgressStore {
    /// A missing file is a fresh start.
    fn load(&self) -> Result<ProgressState> {
        if !self.path.exists() {
            return Ok(ProgressState::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read progress file: {:?}", self.path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse progress file: {:?}", self.path))
    }

    /// Write to a sibling temp file, then rename over the target, so a crash
    /// mid-write never leaves a truncated progress file.
    fn save(&self, state: &ProgressState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write progress file: {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace progress file: {:?}", self.path))
    }
}

/// Where the human-readable lists go.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub local: PathBuf,
    pub classical: PathBuf,
}

/// Write the local-only and classical lists, newline-delimited, in
/// processing order.
pub fn write_outputs(
    state: &ProgressState,
    outputs: &OutputPaths,
    progress_file: &Path,
) -> Result<()> {
    validate_output_paths(
        &[outputs.local.as_path(), outputs.classical.as_path()],
        &[progress_file],
    )?;

    std::fs::write(&outputs.local, state.local.join("\n"))
        .with_context(|| format!("Failed to write {:?}", outputs.local))?;
    std::fs::write(&outputs.classical, state.classical.join("\n"))
        .with_context(|| format!("Failed to write {:?}", outputs.classical))?;
    Ok(())
}
