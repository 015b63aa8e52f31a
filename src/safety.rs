//! Safety utilities to prevent accidental overwrites.
//!
//! The output lists are rewritten wholesale on every run. These checks make
//! sure none of them points at the progress file, an audio file, or another
//! output. The input list is not protected: it may be the previous run's
//! local-only list, which is read in full before outputs are written.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions that mark a path as music, never an output list.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "wav", "ogg"];

/// Validates that a set of output paths is safe to overwrite.
///
/// Checks:
/// - Outputs must be pairwise distinct
/// - No output may equal any of the protected paths
/// - No output may carry an audio extension
///
/// # Arguments
/// * `outputs` - Paths that will be created/overwritten
/// * `protected` - Paths that must survive the run (the progress file)
///
/// # Returns
/// * `Ok(())` if every output is safe
/// * `Err` with a descriptive message for the first failing check
pub fn validate_output_paths(outputs: &[&Path], protected: &[&Path]) -> Result<()> {
    for (i, output) in outputs.iter().enumerate() {
        let extension = output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            bail!(
                "Safety check failed: output '{}' looks like an audio file",
                output.display()
            );
        }

        for source in protected {
            if output == source {
                bail!(
                    "Safety check failed: output '{}' cannot be the same as '{}'",
                    output.display(),
                    source.display()
                );
            }
        }

        for other in &outputs[i + 1..] {
            if output == other {
                bail!(
                    "Safety check failed: output '{}' is used for two different lists",
                    output.display()
                );
            }
        }
    }

    Ok(())
}
