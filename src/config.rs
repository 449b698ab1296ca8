//! Target list loading.
//!
//! Targets come from one of two places, checked in this order:
//!
//! 1. A YAML file holding a list of `{name, url}` entries
//! 2. A `|`-separated list of URLs, named after their host and position
//!
//! ```yaml
//! - name: US Software (General)
//!   url: https://jobs.example.com/search?q=software
//! - name: US DevOps Engineer
//!   url: https://jobs.example.com/search?q=devops
//! ```
//!
//! An empty result is not an error here; the orchestrator reports
//! `NoTargetsConfigured` when it is asked to run a cycle.

use crate::error::{Result, ScrapeError};
use crate::models::Target;
use std::path::Path;
use tracing::{info, instrument};
use url::Url;

fn validate(target: &Target) -> Result<()> {
    let url = Url::parse(&target.url)
        .map_err(|e| ScrapeError::Config(format!("target {:?} has invalid url: {e}", target.name)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScrapeError::Config(format!(
            "target {:?} must use http or https, got {}",
            target.name,
            url.scheme()
        )));
    }
    if target.name.trim().is_empty() {
        return Err(ScrapeError::Config(format!("target {} has no name", target.url)));
    }
    Ok(())
}

/// Parse a YAML target list.
pub fn parse_targets_yaml(yaml: &str) -> Result<Vec<Target>> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let targets: Vec<Target> = serde_yaml::from_str(yaml)
        .map_err(|e| ScrapeError::Config(format!("invalid targets file: {e}")))?;
    targets.iter().try_for_each(validate)?;
    Ok(targets)
}

/// Build targets from `|`-separated URLs, e.g. `"https://a.test/x|https://b.test/y"`.
pub fn parse_source_urls(urls: &str) -> Result<Vec<Target>> {
    urls.split('|')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .enumerate()
        .map(|(i, raw)| {
            let url = Url::parse(raw)
                .map_err(|e| ScrapeError::Config(format!("invalid source url {raw:?}: {e}")))?;
            let host = url.host_str().unwrap_or("source");
            let target = Target::new(format!("{host} #{}", i + 1), raw);
            validate(&target)?;
            Ok(target)
        })
        .collect()
}

/// Load targets from `targets_file` if given, else from `source_urls`.
#[instrument(level = "info", skip_all)]
pub async fn load_targets(
    targets_file: Option<&Path>,
    source_urls: Option<&str>,
) -> Result<Vec<Target>> {
    let targets = match (targets_file, source_urls) {
        (Some(path), _) => {
            let yaml = tokio::fs::read_to_string(path).await.map_err(|e| {
                ScrapeError::Config(format!("cannot read targets file {}: {e}", path.display()))
            })?;
            parse_targets_yaml(&yaml)?
        }
        (None, Some(urls)) => parse_source_urls(urls)?,
        (None, None) => Vec::new(),
    };
    info!(count = targets.len(), "Loaded scrape targets");
    Ok(targets)
}
