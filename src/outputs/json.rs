//! JSON output for consumers of the published working set.
//!
//! `published.json` is overwritten on every successful cycle with the read
//! surface's view (bookkeeping fields stripped). Its name differs from every
//! store file, so the export may share a directory with the store. Cycle reports are kept per
//! day so a run's history can be inspected afterwards.

use crate::models::{CycleReport, Listing};
use crate::utils::slugify;
use chrono::Utc;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const LISTINGS_FILE: &str = "published.json";

/// Write the published listings to `{json_output_dir}/published.json`.
///
/// # Arguments
///
/// * `listings` - Published listings, newest first
/// * `json_output_dir` - Base directory for JSON output
///
/// # Returns
///
/// The path written, or an error if directory creation or writing fails.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display(), count = listings.len()))]
pub async fn write_listings(
    listings: &[Listing],
    json_output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(listings)?;

    if let Err(e) = fs::create_dir_all(json_output_dir).await {
        error!(error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = json_output_dir.join(LISTINGS_FILE);
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote listings JSON");
    Ok(path)
}

/// Write a cycle report to `{json_output_dir}/{date}/{target-slug}-{HHMMSS}.json`.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display()))]
pub async fn write_cycle_report(
    report: &CycleReport,
    json_output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    let now = Utc::now();

    let day_dir = json_output_dir.join(now.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&day_dir).await?;

    let path = day_dir.join(format!(
        "{}-{}.json",
        slugify(&report.target.name),
        now.format("%H%M%S")
    ));
    fs::write(&path, json).await?;
    info!(path = %path.display(), "Wrote cycle report");
    Ok(path)
}
