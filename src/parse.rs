//! Filename parsing: raw line → (artist, title).
//!
//! Parsing is a priority cascade. Each matcher is a pure function that either
//! claims the line or declines; the first claim wins. A matcher that would
//! leave the title empty declines so a later branch gets a chance.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::lexicon::Lexicon;
use crate::models::ParsedInfo;
use crate::normalize::normalize_line;

type Matcher = fn(&str, &Lexicon) -> Option<ParsedInfo>;

/// Branch order matters: "Title by Artist" beats "Artist - Title".
pub const MATCHERS: &[(&str, Matcher)] = &[
    ("by_clause", match_by_clause),
    ("hyphen", match_hyphen),
    ("track_number", match_track_number),
    ("title_only", match_title_only),
];

pub static BY_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i) by ").unwrap());

/// Leading track number: "07 Song Name"
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\s+(.*)").unwrap());

/// Parse a raw line. Normalizes first, then drops the literal `.mp3`.
/// Lines that normalize to nothing ("[Tag]") come back as `("", raw)`.
pub fn parse_file_info(raw: &str, lexicon: &Lexicon) -> ParsedInfo {
    let line = normalize_line(raw).replace(".mp3", "");
    parse_normalized(line.trim(), lexicon).unwrap_or_else(|| ParsedInfo::new("", raw.trim()))
}

/// Run the matcher cascade over an already-normalized line.
pub fn parse_normalized(line: &str, lexicon: &Lexicon) -> Option<ParsedInfo> {
    MATCHERS.iter().find_map(|(_, matcher)| matcher(line, lexicon))
}

fn non_empty_title(artist: &str, title: &str) -> Option<ParsedInfo> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    Some(ParsedInfo::new(artist.trim(), title))
}

/// "A Sleeping Giant by The Quiet Ones" → ("The Quiet Ones", "A Sleeping Giant")
pub fn match_by_clause(line: &str, _lexicon: &Lexicon) -> Option<ParsedInfo> {
    let mut parts = BY_DELIMITER.splitn(line, 2);
    let title = parts.next()?;
    let artist = parts.next()?;
    non_empty_title(artist, title)
}

/// "Artist - Title", with alias substitution and fake-artist rejection.
pub fn match_hyphen(line: &str, lexicon: &Lexicon) -> Option<ParsedInfo> {
    let (artist, title) = line.split_once(" - ")?;
    let mut artist = artist.trim();
    if let Some(canonical) = lexicon.alias(artist) {
        artist = canonical;
    }
    if lexicon.is_fake_artist(artist) {
        artist = "";
    }
    non_empty_title(artist, title)
}

/// "07 Song Name" → ("", "Song Name")
pub fn match_track_number(line: &str, _lexicon: &Lexicon) -> Option<ParsedInfo> {
    let caps = TRACK_NUMBER_PREFIX.captures(line)?;
    non_empty_title("", caps.get(2)?.as_str())
}

pub fn match_title_only(line: &str, _lexicon: &Lexicon) -> Option<ParsedInfo> {
    non_empty_title("", line)
}
