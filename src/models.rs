//! Core data models for local-to-catalog reconciliation.
//!
//! This module contains the struct definitions and enums shared by the
//! resolution pipeline, the catalog client and the driver.

use serde::Serialize;

// ============================================================================
// Local Models
// ============================================================================

/// Artist/title pair recovered from a raw line. `artist` may be empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedInfo {
    pub artist: String,
    pub title: String,
}

impl ParsedInfo {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }

    pub fn has_artist(&self) -> bool {
        !self.artist.is_empty()
    }
}

/// The two cleaned renditions of a title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TitleVariants {
    /// Junk stripped, flavor tags ("remix", "slowed") kept. Queried first.
    pub flavored: String,
    /// Junk and flavor tags stripped. Query fallback and verification input.
    pub stripped: String,
}

// ============================================================================
// Catalog Models
// ============================================================================

/// Kind of item a catalog search returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Track,
    Episode,
    Other,
}

impl From<&str> for ItemKind {
    fn from(s: &str) -> Self {
        match s {
            "track" => ItemKind::Track,
            "episode" => ItemKind::Episode,
            _ => ItemKind::Other,
        }
    }
}

/// Search hit from the remote catalog.
#[derive(Clone, Debug)]
pub struct CandidateTrack {
    pub name: String,
    pub artists: Vec<String>, // Credited order
    pub uri: String,
    pub kind: ItemKind,
}

impl CandidateTrack {
    pub fn first_artist(&self) -> &str {
        self.artists.first().map(String::as_str).unwrap_or("")
    }
}

/// Snapshot row of the target collection. `name` and `artist` are lowercased.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryEntry {
    pub name: String,
    pub artist: String,
    pub uri: String,
}

impl InventoryEntry {
    pub fn new(name: &str, artist: &str, uri: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            artist: artist.to_lowercase(),
            uri: uri.to_string(),
        }
    }
}

impl From<&CandidateTrack> for InventoryEntry {
    fn from(track: &CandidateTrack) -> Self {
        InventoryEntry::new(&track.name, track.first_artist(), &track.uri)
    }
}

// ============================================================================
// Resolution Outcomes
// ============================================================================

/// Terminal state of one raw line.
#[derive(Clone, Debug)]
pub enum Resolution {
    /// Known unreleased track; never searched.
    Leak,
    /// Orchestral repertoire; never searched.
    Classical,
    /// A verified catalog track. `already_present` is true when the target
    /// collection holds it already and nothing needs adding.
    Found {
        track: CandidateTrack,
        query: String,
        already_present: bool,
    },
    /// Every query ran without a verified hit.
    Exhausted,
}

/// Output list a raw line is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Matched,
    LocalOnly,
    Classical,
}

impl Resolution {
    pub fn bucket(&self) -> Bucket {
        match self {
            Resolution::Leak | Resolution::Exhausted => Bucket::LocalOnly,
            Resolution::Classical => Bucket::Classical,
            Resolution::Found { .. } => Bucket::Matched,
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-run counters, logged as JSON at the end of a run.
#[derive(Default, Debug, Clone, Serialize)]
pub struct RunStats {
    // Input
    pub input_lines: usize,
    pub skipped_processed: usize,
    pub pending_lines: usize,

    // Short-circuits
    pub leaks: usize,
    pub classical: usize,

    // Query waterfall
    pub queries_issued: usize,
    pub query_errors: usize,
    pub rejected_candidates: usize,

    // Outcomes
    pub found_new: usize,
    pub found_existing: usize,
    pub exhausted: usize,

    // Collection writes
    pub inventory_size: usize,
    pub tracks_submitted: usize,
    pub add_errors: usize,
    pub checkpoints: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl RunStats {
    /// Share of searched lines (excluding leaks and classical) that matched.
    pub fn match_rate(&self) -> f64 {
        let searched = self.found_new + self.found_existing + self.exhausted;
        if searched == 0 {
            0.0
        } else {
            100.0 * (self.found_new + self.found_existing) as f64 / searched as f64
        }
    }

    /// Log stats in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            log::info!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn record(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Leak => self.leaks += 1,
            Resolution::Classical => self.classical += 1,
            Resolution::Found { already_present: true, .. } => self.found_existing += 1,
            Resolution::Found { already_present: false, .. } => self.found_new += 1,
            Resolution::Exhausted => self.exhausted += 1,
        }
    }
}
