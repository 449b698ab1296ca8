//! New-listing alerts.
//!
//! After a cycle publishes at least one listing, the orchestrator hands a
//! [`NewListingsAlert`] to its [`Notifier`]. Delivery is best-effort: a
//! failed alert is logged and never fails the cycle.

use crate::error::Result;
use crate::models::{CycleReport, Listing};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// One published listing as shown in an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEntry {
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
    pub apply_link: String,
}

impl From<&Listing> for AlertEntry {
    fn from(listing: &Listing) -> Self {
        Self {
            job_title: listing.job_title.clone(),
            company_name: listing.company_name.clone(),
            job_location: listing.job_location.clone(),
            apply_link: listing.apply_link.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListingsAlert {
    pub subject: String,
    /// Name of the target the listings came from.
    pub target: String,
    pub listings: Vec<AlertEntry>,
    pub created_at: DateTime<Utc>,
}

impl NewListingsAlert {
    /// Build the alert for a cycle, or `None` when it published nothing.
    pub fn for_cycle(report: &CycleReport, now: DateTime<Utc>) -> Option<Self> {
        if report.added_count == 0 {
            return None;
        }
        Some(Self {
            subject: format!("New Job Alert: {} new listing(s)", report.added_count),
            target: report.target.name.clone(),
            listings: report.novel_records.iter().map(AlertEntry::from).collect(),
            created_at: now,
        })
    }
}

pub trait Notifier {
    async fn notify(&self, alert: &NewListingsAlert) -> Result<()>;
}

/// Logs every alert and, when a path is set, appends it to a JSON Lines file
/// for whatever delivers mail or chat messages downstream.
#[derive(Debug, Clone, Default)]
pub struct AlertLog {
    jsonl: Option<PathBuf>,
}

impl AlertLog {
    pub fn new(jsonl: Option<PathBuf>) -> Self {
        Self { jsonl }
    }
}

impl Notifier for AlertLog {
    #[instrument(level = "info", skip_all, fields(target = %alert.target, count = alert.listings.len()))]
    async fn notify(&self, alert: &NewListingsAlert) -> Result<()> {
        info!(subject = %alert.subject, "New listings alert");
        let Some(path) = &self.jsonl else {
            return Ok(());
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(alert)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), "Appended alert");
        Ok(())
    }
}
