//! Scoring functions for candidate verification.
//!
//! This module contains:
//! - Fuzzy similarity primitives (ratio, token-set, partial)
//! - The tiered accept/reject policy for search hits
//! - Inventory duplicate detection

use rustc_hash::FxHashSet;

use crate::lexicon::Lexicon;
use crate::models::{CandidateTrack, InventoryEntry, ItemKind};
use crate::normalize::{clean_title, extract_feat_artist};
use crate::parse::parse_file_info;

// ============================================================================
// Score Thresholds
// ============================================================================

/// Partial similarity an artist needs to corroborate a title match
pub const ARTIST_MATCH_THRESHOLD: u8 = 80;

/// Title similarity accepted with artist corroboration (strong tier)
pub const TITLE_STRONG_WITH_ARTIST: u8 = 90;

/// Title similarity accepted with artist corroboration (weak tier)
pub const TITLE_WEAK_WITH_ARTIST: u8 = 80;

/// Title similarity accepted when the local line never named an artist
pub const TITLE_UNATTRIBUTED: u8 = 95;

/// Name and first-artist similarity above which two tracks are the same entry
pub const INVENTORY_DUPLICATE_THRESHOLD: u8 = 90;

// ============================================================================
// Fuzzy Similarity
// ============================================================================

/// Lowercase, replace anything that is not alphanumeric with a space, trim.
pub fn full_process(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Indel similarity, 0–100: `2 * LCS / (len_a + len_b)`. A substitution
/// costs a deletion plus an insertion, so a length difference alone costs
/// less than under plain Levenshtein ("abc" vs "abcd" scores 86, not 75).
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }
    (200.0 * lcs_len(&a, &b) as f64 / total as f64).round() as u8
}

/// Longest common subsequence length, single-row DP.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        let mut diag = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb { diag + 1 } else { above.max(row[j]) };
            diag = above;
        }
    }
    row[b.len()]
}

/// Order- and duplicate-insensitive word-set similarity, 0–100.
///
/// Compares the shared tokens against each side's shared-plus-remaining
/// tokens, so a title whose words are a subset of the other scores 100.
/// Either side empty after processing scores 0.
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let a = full_process(a);
    let b = full_process(b);
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let tokens_a: FxHashSet<&str> = a.split_whitespace().collect();
    let tokens_b: FxHashSet<&str> = b.split_whitespace().collect();

    let mut intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let mut only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let mut only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();
    intersection.sort_unstable();
    only_a.sort_unstable();
    only_b.sort_unstable();

    let base = intersection.join(" ");
    let combined_a = join_nonempty(&base, &only_a.join(" "));
    let combined_b = join_nonempty(&base, &only_b.join(" "));

    ratio(&base, &combined_a)
        .max(ratio(&base, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn join_nonempty(left: &str, right: &str) -> String {
    match (left.is_empty(), right.is_empty()) {
        (true, _) => right.to_string(),
        (_, true) => left.to_string(),
        _ => format!("{} {}", left, right),
    }
}

/// Best similarity of the shorter string against any equal-length window of
/// the longer one, 0–100. "kanye" vs "kanye west" scores 100.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let (short, long) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    let short_len = short.chars().count();
    if short_len == 0 {
        return 0;
    }

    let long_chars: Vec<char> = long.chars().collect();
    long_chars
        .windows(short_len)
        .map(|w| ratio(short, &w.iter().collect::<String>()))
        .max()
        .unwrap_or(0)
}

// ============================================================================
// Match Verification
// ============================================================================

fn any_artist_matches(local: &str, found_artists: &[String]) -> bool {
    found_artists
        .iter()
        .any(|found| partial_ratio(local, found) > ARTIST_MATCH_THRESHOLD)
}

/// Decide whether a search hit is the song a raw line names.
///
/// Tiers are OR'd: a perfect title always wins, a good title needs artist
/// corroboration, and a line without a parsed artist needs a near-perfect
/// title.
pub fn verify_match(raw_line: &str, track: &CandidateTrack, lexicon: &Lexicon) -> bool {
    if track.kind != ItemKind::Track {
        return false;
    }

    let found_name = track.name.to_lowercase();
    let found_artists: Vec<String> = track.artists.iter().map(|a| a.to_lowercase()).collect();

    let local = parse_file_info(raw_line, lexicon);
    let local_title = clean_title(&local.title, false, lexicon).to_lowercase();

    let title_score = token_set_ratio(&local_title, &found_name);

    let artist_match = if local.has_artist() {
        let local_artist = local.artist.to_lowercase().replace('$', "s");
        any_artist_matches(&local_artist, &found_artists)
    } else if let Some(feat) = extract_feat_artist(&local.title, lexicon) {
        any_artist_matches(&feat.to_lowercase(), &found_artists)
    } else if let Some(default_artist) = lexicon.orphan_default(&local_title) {
        any_artist_matches(&default_artist.to_lowercase(), &found_artists)
    } else {
        false
    };

    (title_score > TITLE_STRONG_WITH_ARTIST && artist_match)
        || title_score == 100
        || (title_score > TITLE_WEAK_WITH_ARTIST && artist_match)
        || (title_score > TITLE_UNATTRIBUTED && !local.has_artist())
}

// ============================================================================
// Inventory Deduplication
// ============================================================================

/// True if the collection already holds this track: same identifier, or the
/// same name and first artist under a different identifier (re-uploads).
pub fn is_in_inventory(track: &CandidateTrack, inventory: &[InventoryEntry]) -> bool {
    if inventory.iter().any(|item| item.uri == track.uri) {
        return true;
    }

    let found_name = track.name.to_lowercase();
    let found_artist = track.first_artist().to_lowercase();
    inventory.iter().any(|item| {
        token_set_ratio(&found_name, &item.name) > INVENTORY_DUPLICATE_THRESHOLD
            && token_set_ratio(&found_artist, &item.artist) > INVENTORY_DUPLICATE_THRESHOLD
    })
}

// ============================================================================
// TESTS
// ============================================================================
