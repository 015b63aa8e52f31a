use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::time::Instant;

use track_reconcile::catalog::SpotifyCatalog;
use track_reconcile::config::{CliConfig, FileConfig, InputMode, Settings};
use track_reconcile::driver::{explain_line, Resolver};
use track_reconcile::lexicon::Lexicon;
use track_reconcile::progress::{format_duration, set_log_only};
use track_reconcile::scan::{collect_folder, pending_lines, read_list};
use track_reconcile::state::{write_outputs, JsonProgressStore, ProgressStore};

#[derive(Parser)]
#[command(name = "track-reconcile")]
#[command(about = "Match local audio file names against Spotify and fill a playlist")]
struct Args {
    /// Where raw lines come from
    #[arg(long, value_enum)]
    mode: Option<InputMode>,

    /// Music folder to scan (folder mode)
    #[arg(long)]
    music_dir: Option<PathBuf>,

    /// Newline-delimited list of file names (text mode)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Target playlist link or id
    #[arg(long, env = "RECONCILE_PLAYLIST")]
    playlist: Option<String>,

    /// Spotify bearer token
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long)]
    progress_file: Option<PathBuf>,

    #[arg(long)]
    local_output: Option<PathBuf>,

    #[arg(long)]
    classical_output: Option<PathBuf>,

    /// Replacement vocabulary (TOML); the built-in one is used otherwise
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Optional TOML config file (CLI flags win over it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Flush additions and save progress every N queued tracks
    #[arg(long)]
    checkpoint_every: Option<usize>,

    /// Pause after a failed search, in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Resolve and report, but never modify the playlist, progress or lists
    #[arg(long)]
    dry_run: bool,

    /// Disable progress bars, emit periodic log lines instead
    #[arg(long)]
    log_only: bool,

    /// Write run statistics as JSON to this path
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Print what the pipeline derives from one line and exit (no network)
    #[arg(long)]
    explain: Option<String>,
}

impl Args {
    fn cli_config(&self) -> CliConfig {
        CliConfig {
            mode: self.mode,
            music_dir: self.music_dir.clone(),
            input: self.input.clone(),
            playlist: self.playlist.clone(),
            progress_file: self.progress_file.clone(),
            local_output: self.local_output.clone(),
            classical_output: self.classical_output.clone(),
            lexicon: self.lexicon.clone(),
            checkpoint_every: self.checkpoint_every,
            retry_delay_ms: self.retry_delay_ms,
            dry_run: self.dry_run,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    set_log_only(args.log_only);

    let file_config = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(args.cli_config(), file_config)?;

    let lexicon = match &settings.lexicon {
        Some(path) => Lexicon::load(path)?,
        None => Lexicon::builtin()?,
    };

    if let Some(line) = &args.explain {
        let report = explain_line(line, &lexicon);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let start = Instant::now();

    let playlist = settings
        .playlist
        .as_deref()
        .context("No target playlist (--playlist, RECONCILE_PLAYLIST or config)")?;
    let token = args
        .token
        .as_deref()
        .context("No access token (--token or SPOTIFY_ACCESS_TOKEN)")?;
    let catalog = SpotifyCatalog::new(token, playlist).context("Failed to create Spotify client")?;
    info!("Target playlist: {}", catalog.playlist_id());

    let store = JsonProgressStore::new(&settings.progress_file);
    let mut state = store.load()?;
    info!("Loaded progress: {} lines already processed", state.processed.len());

    let raw_lines = match settings.mode {
        InputMode::Folder => {
            let dir = settings
                .music_dir
                .as_deref()
                .context("Folder mode requires a music directory")?;
            collect_folder(dir)?
        }
        InputMode::Text => read_list(&settings.input)?,
    };
    let pending = pending_lines(raw_lines, &state);

    let mut resolver = Resolver::new(&lexicon, &catalog, settings.resolver.clone());
    let mut stats = resolver.run(&pending.lines, &mut state, &store)?;
    stats.input_lines = pending.input_lines;
    stats.skipped_processed += pending.skipped_processed;

    if settings.resolver.dry_run {
        info!("Dry run: progress and output lists left untouched");
    } else {
        write_outputs(&state, &settings.outputs, store.path())?;
    }

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    stats.log_phase("reconcile");
    if let Some(path) = &args.stats {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {:?}", path))?;
    }

    info!(
        "Done in {}: {} matched ({:.1}%), {} local only, {} classical",
        format_duration(start.elapsed()),
        stats.found_new + stats.found_existing,
        stats.match_rate(),
        state.local.len(),
        state.classical.len()
    );
    info!("Local-only list: {:?}", settings.outputs.local);
    info!("Classical list: {:?}", settings.outputs.classical);

    Ok(())
}
