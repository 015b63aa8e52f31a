//! Curated matching vocabulary.
//!
//! Tag lists, alias tables and guard words live in a TOML file so operators can
//! extend them without touching matching logic. The built-in table ships as
//! `assets/lexicon.toml`; `--lexicon <path>` replaces it wholesale.

use anyhow::{Context, Result};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

const BUILTIN_LEXICON: &str = include_str!("../assets/lexicon.toml");

/// On-disk shape of the lexicon file. Missing tables default to empty.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LexiconFile {
    keep_tags: Vec<String>,
    junk_tags: Vec<String>,
    fake_artists: Vec<String>,
    leaks: Vec<String>,
    classical_triggers: Vec<String>,
    classical_carve_outs: Vec<String>,
    feat_noise: Vec<String>,
    artist_aliases: BTreeMap<String, String>,
    orphan_defaults: BTreeMap<String, String>,
}

// ============================================================================
// Tag Patterns
// ============================================================================

/// One title tag compiled into the three shapes it is stripped in:
/// `(tag ...)`, `[tag ...]` and a bare whole-word occurrence.
#[derive(Debug, Clone)]
pub struct TagPattern {
    pub tag: String,
    paren: Regex,
    bracket: Regex,
    bare: Regex,
}

impl TagPattern {
    pub fn new(tag: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(tag);
        // Word boundaries only make sense next to word characters ("prod." ends in a dot)
        let lead = if tag.chars().next().is_some_and(is_word_char) { r"\b" } else { "" };
        let trail = if tag.chars().last().is_some_and(is_word_char) { r"\b" } else { "" };

        Ok(Self {
            tag: tag.to_string(),
            paren: Regex::new(&format!(r"(?i)\({}.*?\)", escaped))?,
            bracket: Regex::new(&format!(r"(?i)\[{}.*?\]", escaped))?,
            bare: Regex::new(&format!(r"(?i){}{}{}", lead, escaped, trail))?,
        })
    }

    /// Remove every occurrence of this tag from `text`.
    pub fn strip(&self, text: &str) -> String {
        let result = self.paren.replace_all(text, "");
        let result = self.bracket.replace_all(&result, "");
        self.bare.replace_all(&result, "").into_owned()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn compile_tags(tags: &[String]) -> Result<Vec<TagPattern>> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .map(|t| TagPattern::new(&t).with_context(|| format!("Invalid tag pattern: {:?}", t)))
        .collect()
}

/// Lookup keys are compared after the same `$` → `s` folding the normalizer
/// applies to lines, so entries like "travi$ scott" still hit.
fn lookup_key(s: &str) -> String {
    s.trim().to_lowercase().replace('$', "s")
}

fn lowered(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Lexicon
// ============================================================================

/// Immutable vocabulary shared by every pipeline stage.
#[derive(Debug, Clone)]
pub struct Lexicon {
    pub keep_tags: Vec<TagPattern>,
    pub junk_tags: Vec<TagPattern>,
    artist_aliases: FxHashMap<String, String>,
    orphan_defaults: FxHashMap<String, String>,
    fake_artists: FxHashSet<String>,
    leaks: Vec<String>,
    classical_triggers: Vec<String>,
    classical_carve_outs: Vec<String>,
    feat_noise: Vec<String>,
}

impl Lexicon {
    /// The vocabulary compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_LEXICON).context("Failed to parse built-in lexicon")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lexicon file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse lexicon file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: LexiconFile = toml::from_str(content)?;

        Ok(Self {
            keep_tags: compile_tags(&file.keep_tags)?,
            junk_tags: compile_tags(&file.junk_tags)?,
            artist_aliases: file
                .artist_aliases
                .into_iter()
                .map(|(k, v)| (lookup_key(&k), v.trim().to_string()))
                .collect(),
            orphan_defaults: file
                .orphan_defaults
                .into_iter()
                .map(|(k, v)| (lookup_key(&k), v.trim().to_string()))
                .collect(),
            fake_artists: file.fake_artists.iter().map(|s| lookup_key(s)).collect(),
            leaks: lowered(file.leaks),
            classical_triggers: lowered(file.classical_triggers),
            classical_carve_outs: lowered(file.classical_carve_outs),
            feat_noise: lowered(file.feat_noise),
        })
    }

    /// Canonical spelling for an artist candidate, if the alias table knows it.
    /// An empty canonical name means "not an artist".
    pub fn alias(&self, artist: &str) -> Option<&str> {
        self.artist_aliases.get(&lookup_key(artist)).map(String::as_str)
    }

    pub fn is_fake_artist(&self, artist: &str) -> bool {
        self.fake_artists.contains(&lookup_key(artist))
    }

    /// Default artist for a title that arrived without one.
    pub fn orphan_default(&self, title: &str) -> Option<&str> {
        self.orphan_defaults.get(&lookup_key(title)).map(String::as_str)
    }

    pub fn is_leak(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.leaks.iter().any(|l| lower.contains(l.as_str()))
    }

    pub fn classical_triggers(&self) -> &[String] {
        &self.classical_triggers
    }

    pub fn classical_carve_outs(&self) -> &[String] {
        &self.classical_carve_outs
    }

    pub fn feat_noise(&self) -> &[String] {
        &self.feat_noise
    }
}
