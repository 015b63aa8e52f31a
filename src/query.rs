//! Query waterfall generation.
//!
//! Queries are emitted most-specific first (artist + flavored title) down to
//! the bare stripped title, so the driver can stop at the first verified hit.

use rustc_hash::FxHashSet;

use crate::lexicon::Lexicon;
use crate::models::ParsedInfo;
use crate::normalize::{extract_feat_artist, title_variants};
use crate::parse::parse_file_info;

/// Separators that join collaborating artists in one field.
pub const ARTIST_SEPARATORS: &[&str] = &["&", ",", " x "];

/// Artists worth pairing with the title, in priority order.
///
/// With a parsed artist: the full field, then every piece of it split on each
/// separator. Without one: the featured artist, then the orphan default.
pub fn artist_candidates(
    info: &ParsedInfo,
    stripped_title: &str,
    lexicon: &Lexicon,
) -> Vec<String> {
    let mut artists = Vec::new();

    if info.has_artist() {
        artists.push(info.artist.clone());
        for sep in ARTIST_SEPARATORS {
            if info.artist.contains(sep) {
                artists.extend(info.artist.split(sep).map(|a| a.trim().to_string()));
            }
        }
    } else {
        if let Some(feat) = extract_feat_artist(&info.title, lexicon) {
            artists.push(feat);
        }
        if let Some(default_artist) = lexicon.orphan_default(stripped_title) {
            artists.push(default_artist.to_string());
        }
    }

    artists.retain(|a| !a.is_empty());
    artists
}

/// Build the ordered, deduplicated query list for a raw line.
pub fn generate_queries(raw_line: &str, lexicon: &Lexicon) -> Vec<String> {
    let info = parse_file_info(raw_line, lexicon);
    let titles = title_variants(&info.title, lexicon);
    let artists = artist_candidates(&info, &titles.stripped, lexicon);

    let mut queries = Vec::new();

    for artist in &artists {
        queries.push(format!("{} {}", artist, titles.flavored));
    }
    for artist in &artists {
        queries.push(format!("{} {}", artist, titles.stripped));
    }

    // Reversed form helps when the remote index weights leading words
    if info.has_artist() {
        queries.push(format!("{} {}", titles.stripped, info.artist));
    }

    if raw_line.to_lowercase().contains("remix") {
        queries.push(format!("{} remix", titles.stripped));
        for artist in &artists {
            queries.push(format!("{} {} remix", artist, titles.stripped));
        }
    }

    queries.push(titles.flavored);
    queries.push(titles.stripped);

    dedup_queries(queries)
}

/// Trim, drop entries of one character or less, keep first occurrences.
pub fn dedup_queries(queries: Vec<String>) -> Vec<String> {
    let mut seen = FxHashSet::default();
    queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| q.chars().count() > 1)
        .filter(|q| seen.insert(q.clone()))
        .collect()
}
