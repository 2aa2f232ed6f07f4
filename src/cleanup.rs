//! Best-effort removal of segment and manifest artifacts.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

/// File suffixes produced by the segmented renditions.
pub const ARTIFACT_SUFFIXES: [&str; 4] = [".ts", ".m3u8", ".mpd", ".m4s"];

/// Whether a directory entry name is a segment or manifest artifact.
#[must_use]
pub fn is_artifact(name: &str) -> bool {
    ARTIFACT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Remove every artifact file directly inside `directory`.
///
/// Listing and deletion failures are logged and skipped. Subdirectories and
/// the directory itself are left in place. Returns the number of files
/// removed.
pub fn remove_artifacts(directory: &Path) -> usize {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(directory = %directory.display(), %err, "cannot list output directory for cleanup");
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !is_artifact(&name.to_string_lossy()) {
            continue;
        }
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if !is_file {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed artifact");
                removed += 1;
            }
            Err(err) => warn!(path = %path.display(), %err, "failed to remove artifact"),
        }
    }
    removed
}
