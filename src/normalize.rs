//! Text normalization for raw local filenames.
//!
//! Everything here is a pure function of its input plus the lexicon. The
//! normalizer never rejects input; the worst case is an unchanged string.
//!
//! CRITICAL: `normalize_line` feeds both query generation and verification.
//! A change here shifts what both sides see. Run tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::lexicon::Lexicon;
use crate::models::TitleVariants;

/// Artist substituted for the `¥$` stylization.
pub const YEN_DOLLAR_ARTIST: &str = "Kanye West";

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// "SongTitle" → "Song Title". `$` counts as lowercase so that "Travi$Scott"
/// splits here rather than surfacing a new boundary after `$` → `s`.
pub static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z$])([A-Z])").unwrap());

/// "ASleeping" → "A Sleeping": an uppercase run followed by a capitalized word.
pub static ACRONYM_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z])([A-Z][a-z])").unwrap());

/// "word- next" → "word - next"
pub static SNUG_HYPHEN_LEFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\S)-\s+").unwrap());

/// "word -next" → "word - next"
pub static SNUG_HYPHEN_RIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+-(\S)").unwrap());

/// Duplicate-file markers: "Song-1.mp3", "Song-1-2.mp3"
pub static DUPLICATE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:-\d+)+\.mp3$").unwrap());

/// Year-led parentheticals: "(2019 Remaster)", "(1997)"
pub static YEAR_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d{4}[^)]*\)").unwrap());

/// Leading bracket tags: "[Official] Song", "[HD][2012] Song"
pub static LEADING_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\[[^\]]*\]\s*)+").unwrap());

pub static MP3_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.mp3$").unwrap());

/// Producer credits: "[prod. X]", "(Prod. by X)"
pub static PROD_CREDIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[prod\..*?\]|\(prod\..*?\)").unwrap());

/// Movement numbering: "II. Allegro"
pub static ROMAN_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[IVX]+\.\s*").unwrap());

/// Featured artist inside a parenthetical: "(feat. X)", "(ft X)", "(w/ X)", "(with X)"
pub static FEAT_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\((?:feat|ft|w/|with)\.?\s+(.*?)\)").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Upper bound on normalization passes. Real filenames settle in one or two.
const MAX_NORMALIZE_PASSES: usize = 4;

/// Canonicalize a raw line. Passes repeat until the line stops changing, so
/// `normalize_line(normalize_line(x)) == normalize_line(x)`.
pub fn normalize_line(raw: &str) -> String {
    let mut result = normalize_pass(raw);
    for _ in 1..MAX_NORMALIZE_PASSES {
        let next = normalize_pass(&result);
        if next == result {
            break;
        }
        result = next;
    }
    result
}

/// One pass. Removals run before the case split so that text brought
/// together by a removal ("ab(2019)Cd") still gets split.
fn normalize_pass(raw: &str) -> String {
    // Dash variants (en dash, em dash, minus sign) and underscores
    let mut result = raw
        .replace(['\u{2013}', '\u{2014}', '\u{2212}'], "-")
        .replace('_', " ")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace("¥$", YEN_DOLLAR_ARTIST);

    result = YEAR_PAREN.replace_all(&result, "").into_owned();
    result = LEADING_BRACKETS.replace(&result, "").into_owned();

    result = ACRONYM_BOUNDARY.replace_all(&result, "$1 $2").into_owned();
    result = CAMEL_BOUNDARY.replace_all(&result, "$1 $2").into_owned();
    result = result.replace('$', "s");

    result = SNUG_HYPHEN_LEFT.replace_all(&result, "$1 - ").into_owned();
    result = SNUG_HYPHEN_RIGHT.replace_all(&result, " - $1").into_owned();

    DUPLICATE_MARKER.replace(&result, ".mp3").into_owned()
}

/// Collapse runs of whitespace and trim.
pub fn squash_whitespace(s: &str) -> String {
    MULTI_SPACE.replace_all(s, " ").trim().to_string()
}

/// Strip noise from a title. With `keep_flavor` the lexicon's keep-tags
/// survive; without it they are removed along with the junk.
pub fn clean_title(title: &str, keep_flavor: bool, lexicon: &Lexicon) -> String {
    let mut result = MP3_SUFFIX.replace(title, "").into_owned();
    result = PROD_CREDIT.replace_all(&result, "").into_owned();

    for tag in &lexicon.junk_tags {
        result = tag.strip(&result);
    }

    if !keep_flavor {
        for tag in &lexicon.keep_tags {
            result = tag.strip(&result);
        }
    }

    result = ROMAN_PREFIX.replace(&result, "").into_owned();
    squash_whitespace(result.trim_start_matches(['.', ' ']))
}

/// Both cleaned renditions of a title.
pub fn title_variants(title: &str, lexicon: &Lexicon) -> TitleVariants {
    TitleVariants {
        flavored: clean_title(title, true, lexicon),
        stripped: clean_title(title, false, lexicon),
    }
}

/// Pull a featured artist out of an uncleaned title.
/// e.g., "Song (feat. Some_Body & Other)" → Some("Some Body Other")
///       "Song (with crowd chatter)" → None
pub fn extract_feat_artist(title: &str, lexicon: &Lexicon) -> Option<String> {
    let caps = FEAT_CLAUSE.captures(title)?;
    let raw = caps.get(1)?.as_str().replace(['_', '&'], " ");

    let lower = raw.to_lowercase();
    if lexicon.feat_noise().iter().any(|n| lower.contains(n.as_str())) {
        return None;
    }

    let name = squash_whitespace(&raw);
    (!name.is_empty()).then_some(name)
}

/// Orchestral/classical repertoire check. Carve-out artists win over any
/// trigger word ("minor" shows up in plenty of rap titles).
pub fn is_classical(line: &str, lexicon: &Lexicon) -> bool {
    let lower = line.to_lowercase();
    if lexicon.classical_carve_outs().iter().any(|g| lower.contains(g.as_str())) {
        return false;
    }
    lexicon.classical_triggers().iter().any(|t| lower.contains(t.as_str()))
}

// ============================================================================
// TESTS
// ============================================================================
