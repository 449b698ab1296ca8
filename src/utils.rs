//! Utility functions for logging, slugs and debug artefacts.
//!
//! - String truncation for log fields
//! - Slugification of target names for file names
//! - Output directory validation
//! - HTML dumps of pages that were blocked or yielded no cards

use chrono::Utc;
use std::error::Error;
use std::fs as stdfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (on a char boundary) with an
/// ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Convert a target name to a file-name friendly slug.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("US Software (General)"), "us-software-general");
/// ```
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and immediately
/// deletes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

/// Write `html` to `<dir>/<label>_<unix-millis>.html` for later inspection.
///
/// Failures are logged and swallowed; a missing dump never affects a session.
pub async fn dump_html(dir: &Path, label: &str, html: &str) -> Option<PathBuf> {
    let path = dir.join(format!("{}_{}.html", slugify(label), Utc::now().timestamp_millis()));
    if let Err(e) = fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "Could not create debug directory");
        return None;
    }
    match fs::write(&path, html).await {
        Ok(()) => {
            info!(path = %path.display(), bytes = html.len(), "Saved page snapshot");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not save page snapshot");
            None
        }
    }
}
