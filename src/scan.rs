//! Input scanning: collect raw lines from a music folder or a text list.

use anyhow::{Context, Result};
use log::{debug, info};
use rustc_hash::FxHashSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::state::ProgressState;

const AUDIO_EXTENSION: &str = "mp3";

/// Lines still to resolve after dropping processed and repeated ones.
#[derive(Debug, Default)]
pub struct PendingLines {
    pub lines: Vec<String>,
    pub input_lines: usize,
    pub skipped_processed: usize,
    pub duplicates: usize,
}

/// File names of every `.mp3` under `dir` (case-insensitive extension),
/// sorted by name within each directory for a stable order across runs.
pub fn collect_folder(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        anyhow::bail!("Music directory not found: {:?}", dir);
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let is_audio = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(AUDIO_EXTENSION))
            .unwrap_or(false);
        if !is_audio {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        } else {
            debug!("Skipping non-UTF-8 file name: {:?}", entry.path());
        }
    }

    info!("Found {} audio files under {:?}", names.len(), dir);
    Ok(names)
}

/// Newline-delimited list, trimmed, blank lines skipped.
pub fn read_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input list: {:?}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Drop lines already in `state` and repeats within the input, keeping the
/// first occurrence in input order.
pub fn pending_lines(lines: Vec<String>, state: &ProgressState) -> PendingLines {
    let mut pending = PendingLines {
        input_lines: lines.len(),
        ..PendingLines::default()
    };
    let mut seen = FxHashSet::default();

    for line in lines {
        if state.is_processed(&line) {
            pending.skipped_processed += 1;
        } else if !seen.insert(line.clone()) {
            pending.duplicates += 1;
        } else {
            pending.lines.push(line);
        }
    }

    info!(
        "{} lines to resolve ({} already processed, {} duplicates)",
        pending.lines.len(),
        pending.skipped_processed,
        pending.duplicates
    );
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bucket;
    use tempfile::TempDir;

    #[test]
    fn test_collect_folder_filters_and_recurses() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("zz_album");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("a.MP3"), b"").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"").unwrap();
        std::fs::write(nested.join("c.mp3"), b"").unwrap();

        let names = collect_folder(dir.path()).unwrap();
        assert_eq!(names, vec!["a.MP3", "b.mp3", "c.mp3"]);
    }

    #[test]
    fn test_collect_folder_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(collect_folder(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_read_list_trims_and_skips_blank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("songs.txt");
        std::fs::write(&path, "  one.mp3 \n\n\t\ntwo.mp3\r\n").unwrap();
        assert_eq!(read_list(&path).unwrap(), vec!["one.mp3", "two.mp3"]);
    }

    #[test]
    fn test_pending_lines_filters_processed_and_duplicates() {
        let mut state = ProgressState::default();
        state.record("done.mp3", Bucket::Matched);
        let input = vec!["a.mp3", "done.mp3", "b.mp3", "a.mp3"]
            .into_iter()
            .map(String::from)
            .collect();

        let pending = pending_lines(input, &state);
        assert_eq!(pending.lines, vec!["a.mp3", "b.mp3"]);
        assert_eq!(pending.input_lines, 4);
        assert_eq!(pending.skipped_processed, 1);
        assert_eq!(pending.duplicates, 1);
    }
}
