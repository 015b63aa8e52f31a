//! Run configuration: CLI values, an optional TOML file, built-in defaults.
//!
//! Precedence is CLI over file over defaults. The access token is never read
//! from the file.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::{ResolverSettings, DEFAULT_CHECKPOINT_EVERY, DEFAULT_RETRY_DELAY};
use crate::state::OutputPaths;

pub const DEFAULT_INPUT_FILE: &str = "FINAL_LOCAL_ONLY.txt";
pub const DEFAULT_PROGRESS_FILE: &str = "scan_progress.json";
pub const DEFAULT_LOCAL_OUTPUT: &str = "FINAL_LOCAL_ONLY.txt";
pub const DEFAULT_CLASSICAL_OUTPUT: &str = "CLASSICAL_FAILURES.txt";

/// Where raw lines come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Walk a music folder for .mp3 file names
    Folder,
    /// Read a newline-delimited list
    #[default]
    Text,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub mode: Option<InputMode>,
    pub music_dir: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub playlist: Option<String>,
    pub progress_file: Option<PathBuf>,
    pub local_output: Option<PathBuf>,
    pub classical_output: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
    pub checkpoint_every: Option<usize>,
    pub retry_delay_ms: Option<u64>,
    pub dry_run: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

/// CLI values that take part in resolution. `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub mode: Option<InputMode>,
    pub music_dir: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub playlist: Option<String>,
    pub progress_file: Option<PathBuf>,
    pub local_output: Option<PathBuf>,
    pub classical_output: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
    pub checkpoint_every: Option<usize>,
    pub retry_delay_ms: Option<u64>,
    pub dry_run: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: InputMode,
    pub music_dir: Option<PathBuf>,
    pub input: PathBuf,
    pub playlist: Option<String>,
    pub progress_file: PathBuf,
    pub outputs: OutputPaths,
    pub lexicon: Option<PathBuf>,
    pub resolver: ResolverSettings,
}

impl Settings {
    pub fn resolve(cli: CliConfig, file: FileConfig) -> Result<Self> {
        let mode = cli.mode.or(file.mode).unwrap_or_default();
        let music_dir = cli.music_dir.or(file.music_dir);

        if mode == InputMode::Folder && music_dir.is_none() {
            bail!("Folder mode requires a music directory (--music-dir or music_dir in config)");
        }

        let checkpoint_every = cli
            .checkpoint_every
            .or(file.checkpoint_every)
            .unwrap_or(DEFAULT_CHECKPOINT_EVERY);
        if checkpoint_every == 0 {
            bail!("checkpoint_every must be at least 1");
        }

        let retry_delay = cli
            .retry_delay_ms
            .or(file.retry_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RETRY_DELAY);

        Ok(Self {
            mode,
            music_dir,
            input: cli
                .input
                .or(file.input)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_FILE)),
            playlist: cli.playlist.or(file.playlist),
            progress_file: cli
                .progress_file
                .or(file.progress_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRESS_FILE)),
            outputs: OutputPaths {
                local: cli
                    .local_output
                    .or(file.local_output)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_OUTPUT)),
                classical: cli
                    .classical_output
                    .or(file.classical_output)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CLASSICAL_OUTPUT)),
            },
            lexicon: cli.lexicon.or(file.lexicon),
            resolver: ResolverSettings {
                checkpoint_every,
                retry_delay,
                dry_run: cli.dry_run || file.dry_run.unwrap_or(false),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(CliConfig::default(), FileConfig::default()).unwrap();
        assert_eq!(settings.mode, InputMode::Text);
        assert_eq!(settings.input, PathBuf::from(DEFAULT_INPUT_FILE));
        assert_eq!(settings.progress_file, PathBuf::from(DEFAULT_PROGRESS_FILE));
        assert_eq!(settings.outputs.classical, PathBuf::from(DEFAULT_CLASSICAL_OUTPUT));
        assert_eq!(settings.resolver.checkpoint_every, 20);
        assert_eq!(settings.resolver.retry_delay, Duration::from_secs(2));
        assert!(!settings.resolver.dry_run);
        assert!(settings.playlist.is_none());
    }

    #[test]
    fn test_cli_wins_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reconcile.toml");
        std::fs::write(
            &path,
            r#"
mode = "folder"
music_dir = "/music"
playlist = "from-file"
checkpoint_every = 50
retry_delay_ms = 10
dry_run = true
"#,
        )
        .unwrap();
        let file = FileConfig::load(&path).unwrap();
        let cli = CliConfig {
            playlist: Some("from-cli".to_string()),
            checkpoint_every: Some(5),
            ..CliConfig::default()
        };

        let settings = Settings::resolve(cli, file).unwrap();
        assert_eq!(settings.mode, InputMode::Folder);
        assert_eq!(settings.music_dir, Some(PathBuf::from("/music")));
        assert_eq!(settings.playlist.as_deref(), Some("from-cli"));
        assert_eq!(settings.resolver.checkpoint_every, 5);
        assert_eq!(settings.resolver.retry_delay, Duration::from_millis(10));
        assert!(settings.resolver.dry_run);
    }

    #[test]
    fn test_folder_mode_needs_directory() {
        let cli = CliConfig {
            mode: Some(InputMode::Folder),
            ..CliConfig::default()
        };
        assert!(Settings::resolve(cli, FileConfig::default()).is_err());
    }

    #[test]
    fn test_zero_checkpoint_rejected() {
        let cli = CliConfig {
            checkpoint_every: Some(0),
            ..CliConfig::default()
        };
        assert!(Settings::resolve(cli, FileConfig::default()).is_err());
    }

    #[test]
    fn test_unknown_mode_fails_to_parse() {
        assert!(toml::from_str::<FileConfig>(r#"mode = "cloud""#).is_err());
    }
}
