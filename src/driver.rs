//! Resolution driver.
//!
//! Walks pending lines one at a time: leak and classical short-circuits first,
//! then the query waterfall until the first verified hit. Accepted tracks are
//! queued for addition and flushed together with the progress state every
//! `checkpoint_every` queued additions.

use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::catalog::{Catalog, CatalogError};
use crate::lexicon::Lexicon;
use crate::models::{
    CandidateTrack, InventoryEntry, ParsedInfo, Resolution, RunStats, TitleVariants,
};
use crate::normalize::{is_classical, normalize_line, title_variants};
use crate::parse::parse_file_info;
use crate::progress::{create_progress_bar, log_progress};
use crate::query::generate_queries;
use crate::scoring::{is_in_inventory, verify_match};
use crate::state::{ProgressState, ProgressStore};

/// Default number of queued additions between checkpoints
pub const DEFAULT_CHECKPOINT_EVERY: usize = 20;

/// Default pause after a failed search
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Log a progress line every N resolved lines in log-only mode
const PROGRESS_LOG_INTERVAL: u64 = 25;

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub checkpoint_every: usize,
    pub retry_delay: Duration,
    pub dry_run: bool,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
            retry_delay: DEFAULT_RETRY_DELAY,
            dry_run: false,
        }
    }
}

/// Drives raw lines to a terminal `Resolution` against one catalog.
pub struct Resolver<'a> {
    lexicon: &'a Lexicon,
    catalog: &'a dyn Catalog,
    settings: ResolverSettings,
    inventory: Vec<InventoryEntry>,
    pending: Vec<String>,
    stats: RunStats,
}

impl<'a> Resolver<'a> {
    pub fn new(lexicon: &'a Lexicon, catalog: &'a dyn Catalog, settings: ResolverSettings) -> Self {
        Self {
            lexicon,
            catalog,
            settings,
            inventory: Vec::new(),
            pending: Vec::new(),
            stats: RunStats::default(),
        }
    }

    pub fn inventory(&self) -> &[InventoryEntry] {
        &self.inventory
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Snapshot the target collection. A failure part way keeps the pages
    /// already fetched.
    pub fn load_inventory(&mut self) {
        self.inventory.clear();
        if let Err(e) = self.catalog.current_inventory(&mut self.inventory) {
            warn!(
                "Inventory fetch failed, continuing with {} entries: {}",
                self.inventory.len(),
                e
            );
        }
        self.stats.inventory_size = self.inventory.len();
        info!("Target collection holds {} tracks", self.inventory.len());
    }

    /// Resolve one raw line. Never fails: search errors skip to the next query.
    pub fn resolve_line(&mut self, raw_line: &str) -> Resolution {
        if self.lexicon.is_leak(raw_line) {
            debug!("[LEAK] {}", raw_line);
            return Resolution::Leak;
        }
        if is_classical(raw_line, self.lexicon) {
            debug!("[CLASSICAL] {}", raw_line);
            return Resolution::Classical;
        }

        let queries = generate_queries(raw_line, self.lexicon);
        let hit = queries
            .iter()
            .find_map(|query| self.try_query(raw_line, query).map(|track| (track, query.clone())));

        match hit {
            Some((track, query)) => {
                let already_present = is_in_inventory(&track, &self.inventory);
                if already_present {
                    debug!("[PRESENT] {} -> {}", raw_line, track.name);
                } else {
                    info!("[FOUND] {} -> {} by {}", raw_line, track.name, track.first_artist());
                    self.pending.push(track.uri.clone());
                    self.inventory.push(InventoryEntry::from(&track));
                }
                Resolution::Found {
                    track,
                    query,
                    already_present,
                }
            }
            None => {
                debug!("[LOCAL] {} ({} queries)", raw_line, queries.len());
                Resolution::Exhausted
            }
        }
    }

    /// Top-1 search for one query, verified against the raw line.
    fn try_query(&mut self, raw_line: &str, query: &str) -> Option<CandidateTrack> {
        self.stats.queries_issued += 1;
        match self.catalog.search(query) {
            Ok(results) => {
                let top = results.into_iter().next()?;
                if verify_match(raw_line, &top, self.lexicon) {
                    Some(top)
                } else {
                    self.stats.rejected_candidates += 1;
                    None
                }
            }
            Err(e) => {
                warn!("Search failed for {:?}: {}", query, e);
                self.stats.query_errors += 1;
                let delay = match e {
                    CatalogError::RateLimited { retry_after: Some(secs) } => {
                        Duration::from_secs(secs).max(self.settings.retry_delay)
                    }
                    _ => self.settings.retry_delay,
                };
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                None
            }
        }
    }

    /// Submit queued additions. Failures are logged and the batch dropped.
    fn flush_additions(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);

        if self.settings.dry_run {
            info!("Dry run: would add {} tracks", batch.len());
            return;
        }

        match self.catalog.add_items(&batch) {
            Ok(()) => self.stats.tracks_submitted += batch.len(),
            Err(e) => {
                error!("Failed to add {} tracks: {}", batch.len(), e);
                self.stats.add_errors += 1;
            }
        }
    }

    /// Flush additions and persist `state`. A dry run persists nothing, so a
    /// later real run still sees every line as pending.
    fn checkpoint(&mut self, state: &ProgressState, store: &dyn ProgressStore) -> Result<()> {
        self.flush_additions();
        if self.settings.dry_run {
            return Ok(());
        }
        store.save(state)?;
        self.stats.checkpoints += 1;
        debug!("Checkpoint saved ({} processed)", state.processed.len());
        Ok(())
    }

    /// Resolve every pending line, recording each outcome in `state`.
    ///
    /// Only a failure to persist progress aborts the run.
    pub fn run(
        &mut self,
        lines: &[String],
        state: &mut ProgressState,
        store: &dyn ProgressStore,
    ) -> Result<RunStats> {
        let start = Instant::now();
        let checkpoint_every = self.settings.checkpoint_every.max(1);

        self.load_inventory();
        self.stats.pending_lines = lines.len();

        let total = lines.len() as u64;
        let pb = create_progress_bar(total, "Resolving");

        for (i, line) in lines.iter().enumerate() {
            if !state.is_processed(line) {
                let resolution = self.resolve_line(line);
                self.stats.record(&resolution);
                state.record(line, resolution.bucket());

                if self.pending.len() >= checkpoint_every {
                    self.checkpoint(state, store)?;
                }
            } else {
                self.stats.skipped_processed += 1;
            }

            pb.inc(1);
            log_progress("resolve", i as u64 + 1, total, PROGRESS_LOG_INTERVAL);
        }
        pb.finish_and_clear();

        self.checkpoint(state, store)?;

        self.stats.inventory_size = self.inventory.len();
        self.stats.elapsed_seconds = start.elapsed().as_secs_f64();
        Ok(self.stats.clone())
    }
}

// ============================================================================
// Offline inspection
// ============================================================================

/// Everything the pipeline derives from a line before touching the network.
#[derive(Debug, Serialize)]
pub struct LineReport {
    pub raw: String,
    pub normalized: String,
    pub artist: String,
    pub title: String,
    pub flavored_title: String,
    pub stripped_title: String,
    pub leak: bool,
    pub classical: bool,
    pub queries: Vec<String>,
}

pub fn explain_line(raw_line: &str, lexicon: &Lexicon) -> LineReport {
    let ParsedInfo { artist, title } = parse_file_info(raw_line, lexicon);
    let TitleVariants { flavored, stripped } = title_variants(&title, lexicon);
    LineReport {
        raw: raw_line.to_string(),
        normalized: normalize_line(raw_line),
        artist,
        title,
        flavored_title: flavored,
        stripped_title: stripped,
        leak: lexicon.is_leak(raw_line),
        classical: is_classical(raw_line, lexicon),
        queries: generate_queries(raw_line, lexicon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bucket, ItemKind};
    use crate::state::JsonProgressStore;
    use rustc_hash::{FxHashMap, FxHashSet};
    use tempfile::TempDir;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeCatalog {
        results: FxHashMap<String, Vec<CandidateTrack>>,
        failing: FxHashSet<String>,
        inventory: Vec<InventoryEntry>,
        inventory_fails: bool,
        fail_adds: bool,
        searches: RefCell<Vec<String>>,
        added: RefCell<Vec<Vec<String>>>,
    }

    impl FakeCatalog {
        fn answer(mut self, query: &str, track: CandidateTrack) -> Self {
            self.results.insert(query.to_string(), vec![track]);
            self
        }
    }

    impl Catalog for FakeCatalog {
        fn search(&self, query: &str) -> Result<Vec<CandidateTrack>, CatalogError> {
            self.searches.borrow_mut().push(query.to_string());
            if self.failing.contains(query) {
                return Err(CatalogError::Network("connection reset".to_string()));
            }
            Ok(self.results.get(query).cloned().unwrap_or_default())
        }

        fn current_inventory(&self, into: &mut Vec<InventoryEntry>) -> Result<(), CatalogError> {
            into.extend(self.inventory.iter().cloned());
            if self.inventory_fails {
                return Err(CatalogError::Network("connection reset".to_string()));
            }
            Ok(())
        }

        fn add_items(&self, ids: &[String]) -> Result<(), CatalogError> {
            if self.fail_adds {
                return Err(CatalogError::Api(500, "boom".to_string()));
            }
            self.added.borrow_mut().push(ids.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saves: Cell<usize>,
        broken: bool,
    }

    impl ProgressStore for MemoryStore {
        fn load(&self) -> Result<ProgressState> {
            Ok(ProgressState::default())
        }

        fn save(&self, _state: &ProgressState) -> Result<()> {
            if self.broken {
                anyhow::bail!("disk full");
            }
            self.saves.set(self.saves.get() + 1);
            Ok(())
        }
    }

    fn track(name: &str, artist: &str, uri: &str) -> CandidateTrack {
        CandidateTrack {
            name: name.to_string(),
            artists: vec![artist.to_string()],
            uri: uri.to_string(),
            kind: ItemKind::Track,
        }
    }

    fn settings() -> ResolverSettings {
        ResolverSettings {
            retry_delay: Duration::ZERO,
            ..ResolverSettings::default()
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_query_hit_stops_waterfall() {
        let lex = Lexicon::builtin().unwrap();
        let catalog = FakeCatalog::default().answer(
            "Kanye West Black Skinhead",
            track("Black Skinhead", "Kanye West", "spotify:track:bs"),
        );
        let mut resolver = Resolver::new(&lex, &catalog, settings());

        let resolution = resolver.resolve_line("Kanye West - Black Skinhead (Official Video).mp3");
        assert!(matches!(resolution, Resolution::Found { already_present: false, .. }));
        assert_eq!(catalog.searches.borrow().len(), 1);
        assert_eq!(resolver.pending(), &["spotify:track:bs".to_string()]);
        assert_eq!(resolver.inventory().len(), 1);
    }

    #[test]
    fn test_short_circuits_issue_no_queries() {
        let lex = Lexicon::builtin().unwrap();
        let catalog = FakeCatalog::default();
        let mut resolver = Resolver::new(&lex, &catalog, settings());

        assert!(matches!(
            resolver.resolve_line("Beethoven - Symphony No. 5 in C Minor.mp3"),
            Resolution::Classical
        ));
        assert!(matches!(resolver.resolve_line("Kanye West - Yeezus Intro.mp3"), Resolution::Leak));
        assert!(catalog.searches.borrow().is_empty());
    }

    #[test]
    fn test_search_error_moves_to_next_query() {
        let lex = Lexicon::builtin().unwrap();
        let mut catalog = FakeCatalog::default().answer(
            "Black Skinhead Kanye West",
            track("Black Skinhead", "Kanye West", "spotify:track:bs"),
        );
        catalog.failing.insert("Kanye West Black Skinhead".to_string());
        let mut resolver = Resolver::new(&lex, &catalog, settings());

        let resolution = resolver.resolve_line("Kanye West - Black Skinhead.mp3");
        match resolution {
            Resolution::Found { query, .. } => assert_eq!(query, "Black Skinhead Kanye West"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(resolver.stats().query_errors, 1);
        assert_eq!(resolver.stats().queries_issued, 2);
    }

    #[test]
    fn test_rejected_candidates_exhaust_to_local() {
        let lex = Lexicon::builtin().unwrap();
        let catalog = FakeCatalog::default()
            .answer("Kanye West Black Skinhead", track("Power", "Kanye West", "spotify:track:p"));
        let mut resolver = Resolver::new(&lex, &catalog, settings());

        let resolution = resolver.resolve_line("Kanye West - Black Skinhead.mp3");
        assert!(matches!(resolution, Resolution::Exhausted));
        assert_eq!(resolution.bucket(), Bucket::LocalOnly);
        assert_eq!(resolver.stats().rejected_candidates, 1);
        assert!(resolver.pending().is_empty());
    }

    #[test]
    fn test_existing_track_is_not_queued() {
        let lex = Lexicon::builtin().unwrap();
        let mut catalog = FakeCatalog::default().answer(
            "Kanye West Black Skinhead",
            track("Black Skinhead", "Kanye West", "spotify:track:bs"),
        );
        catalog.inventory = vec![InventoryEntry::new(
            "Black Skinhead",
            "Kanye West",
            "spotify:track:bs",
        )];
        let mut resolver = Resolver::new(&lex, &catalog, settings());
        resolver.load_inventory();

        let resolution = resolver.resolve_line("Kanye West - Black Skinhead.mp3");
        assert!(matches!(resolution, Resolution::Found { already_present: true, .. }));
        assert!(resolver.pending().is_empty());
    }

    #[test]
    fn test_same_song_twice_in_one_run_is_added_once() {
        let lex = Lexicon::builtin().unwrap();
        let hit = track("Black Skinhead", "Kanye West", "spotify:track:bs");
        let catalog = FakeCatalog::default()
            .answer("Kanye West Black Skinhead", hit.clone())
            .answer("Black Skinhead", hit);
        let mut resolver = Resolver::new(&lex, &catalog, settings());

        resolver.resolve_line("Kanye West - Black Skinhead.mp3");
        let second = resolver.resolve_line("Black Skinhead (Lyrics).mp3");
        assert!(matches!(second, Resolution::Found { already_present: true, .. }));
        assert_eq!(resolver.pending().len(), 1);
    }

    #[test]
    fn test_run_checkpoints_and_records_every_line() {
        let lex = Lexicon::builtin().unwrap();
        let catalog = FakeCatalog::default()
            .answer("Drake Hotline Bling", track("Hotline Bling", "Drake", "spotify:track:hb"))
            .answer("Rihanna Diamonds", track("Diamonds", "Rihanna", "spotify:track:d"));
        let store = MemoryStore::default();
        let mut state = ProgressState::default();
        let input = lines(&[
            "Drake - Hotline Bling.mp3",
            "Rihanna - Diamonds.mp3",
            "Nobody - Unknown Demo.mp3",
            "Mozart - Requiem.mp3",
        ]);

        let mut resolver = Resolver::new(
            &lex,
            &catalog,
            ResolverSettings {
                checkpoint_every: 1,
                ..settings()
            },
        );
        let stats = resolver.run(&input, &mut state, &store).unwrap();

        assert_eq!(state.processed.len(), 4);
        assert_eq!(state.local, lines(&["Nobody - Unknown Demo.mp3"]));
        assert_eq!(state.classical, lines(&["Mozart - Requiem.mp3"]));
        assert_eq!(stats.found_new, 2);
        assert_eq!(stats.tracks_submitted, 2);
        assert_eq!(catalog.added.borrow().len(), 2);
        // Two checkpoints plus the final save
        assert_eq!(store.saves.get(), 3);
    }

    #[test]
    fn test_run_skips_processed_lines() {
        let lex = Lexicon::builtin().unwrap();
        let catalog = FakeCatalog::default();
        let store = MemoryStore::default();
        let mut state = ProgressState::default();
        state.record("Nobody - Unknown Demo.mp3", Bucket::LocalOnly);

        let mut resolver = Resolver::new(&lex, &catalog, settings());
        let stats = resolver
            .run(&lines(&["Nobody - Unknown Demo.mp3"]), &mut state, &store)
            .unwrap();

        assert_eq!(stats.skipped_processed, 1);
        assert!(catalog.searches.borrow().is_empty());
        assert_eq!(state.local.len(), 1);
    }

    #[test]
    fn test_dry_run_then_real_run_adds() {
        let lex = Lexicon::builtin().unwrap();
        let catalog = FakeCatalog::default()
            .answer("Drake Hotline Bling", track("Hotline Bling", "Drake", "spotify:track:hb"));
        let dir = TempDir::new().unwrap();
        let store = JsonProgressStore::new(dir.path().join("scan_progress.json"));
        let input = lines(&["Drake - Hotline Bling.mp3"]);

        let mut state = store.load().unwrap();
        let dry = ResolverSettings {
            dry_run: true,
            ..settings()
        };
        let stats = Resolver::new(&lex, &catalog, dry)
            .run(&input, &mut state, &store)
            .unwrap();
        assert_eq!(stats.found_new, 1);
        assert_eq!(stats.tracks_submitted, 0);
        assert_eq!(stats.checkpoints, 0);
        assert!(catalog.added.borrow().is_empty());
        assert!(!store.path().exists());

        // Nothing was persisted, so the real run resolves the line again
        let mut state = store.load().unwrap();
        assert!(!state.is_processed("Drake - Hotline Bling.mp3"));
        let stats = Resolver::new(&lex, &catalog, settings())
            .run(&input, &mut state, &store)
            .unwrap();
        assert_eq!(stats.tracks_submitted, 1);
        assert_eq!(*catalog.added.borrow(), vec![vec!["spotify:track:hb".to_string()]]);
        assert!(store.load().unwrap().is_processed("Drake - Hotline Bling.mp3"));
    }

    #[test]
    fn test_partial_inventory_survives_fetch_error() {
        let lex = Lexicon::builtin().unwrap();
        let mut catalog = FakeCatalog::default().answer(
            "Kanye West Black Skinhead",
            track("Black Skinhead", "Kanye West", "spotify:track:bs"),
        );
        catalog.inventory = vec![InventoryEntry::new(
            "Black Skinhead",
            "Kanye West",
            "spotify:track:bs",
        )];
        catalog.inventory_fails = true;
        let store = MemoryStore::default();
        let mut state = ProgressState::default();

        let mut resolver = Resolver::new(&lex, &catalog, settings());
        let stats = resolver
            .run(&lines(&["Kanye West - Black Skinhead.mp3"]), &mut state, &store)
            .unwrap();

        assert_eq!(stats.inventory_size, 1);
        assert_eq!(stats.found_existing, 1);
        assert_eq!(stats.found_new, 0);
        assert!(catalog.added.borrow().is_empty());
        assert!(state.is_processed("Kanye West - Black Skinhead.mp3"));
    }

    #[test]
    fn test_partial_inventory_marks_hit_present() {
        let lex = Lexicon::builtin().unwrap();
        let mut catalog = FakeCatalog::default().answer(
            "Kanye West Black Skinhead",
            track("Black Skinhead", "Kanye West", "spotify:track:bs"),
        );
        catalog.inventory = vec![InventoryEntry::new(
            "Black Skinhead",
            "Kanye West",
            "spotify:track:bs",
        )];
        catalog.inventory_fails = true;

        let mut resolver = Resolver::new(&lex, &catalog, settings());
        resolver.load_inventory();
        assert_eq!(resolver.inventory().len(), 1);
        assert!(matches!(
            resolver.resolve_line("Kanye West - Black Skinhead.mp3"),
            Resolution::Found { already_present: true, .. }
        ));
    }

    #[test]
    fn test_add_failure_does_not_abort() {
        let lex = Lexicon::builtin().unwrap();
        let mut catalog = FakeCatalog::default()
            .answer("Drake Hotline Bling", track("Hotline Bling", "Drake", "spotify:track:hb"));
        catalog.fail_adds = true;
        let store = MemoryStore::default();
        let mut state = ProgressState::default();

        let mut resolver = Resolver::new(&lex, &catalog, settings());
        let stats = resolver
            .run(&lines(&["Drake - Hotline Bling.mp3"]), &mut state, &store)
            .unwrap();

        assert_eq!(stats.add_errors, 1);
        assert!(state.is_processed("Drake - Hotline Bling.mp3"));
        assert_eq!(store.saves.get(), 1);
    }

    #[test]
    fn test_save_failure_aborts_run() {
        let lex = Lexicon::builtin().unwrap();
        let catalog = FakeCatalog::default();
        let store = MemoryStore {
            broken: true,
            ..MemoryStore::default()
        };
        let mut state = ProgressState::default();

        let mut resolver = Resolver::new(&lex, &catalog, settings());
        assert!(resolver
            .run(&lines(&["Nobody - Unknown Demo.mp3"]), &mut state, &store)
            .is_err());
    }

    #[test]
    fn test_explain_line() {
        let lex = Lexicon::builtin().unwrap();
        let report = explain_line("Kanye West - Black Skinhead (Official Video).mp3", &lex);
        assert_eq!(report.artist, "Kanye West");
        assert_eq!(report.stripped_title, "Black Skinhead");
        assert!(!report.leak);
        assert!(!report.classical);
        assert_eq!(report.queries[0], "Kanye West Black Skinhead");
    }
}
