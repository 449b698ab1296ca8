//! Data models for scrape targets, extracted candidates and published listings.
//!
//! This module defines the records that flow through a scrape cycle:
//! - [`Target`]: one configured listing page
//! - [`RotationState`]: the durable rotation pointer
//! - [`RawCandidate`]: a card as pulled out of the rendered page (session-scoped)
//! - [`Fingerprint`] / [`SeenRecord`]: entries of the cross-session ledger
//! - [`Listing`] / [`DisplayRecord`]: the published working set
//! - [`CycleReport`]: what a trigger returns to its caller
//!
//! Serialized field names use camelCase to match the documents consumed by
//! the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One external listing page the orchestrator can scrape.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Target {
    /// Human-readable name used in logs and reports.
    pub name: String,
    /// Page URL to navigate to.
    pub url: String,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Durable rotation pointer. Holds `0 <= current_index < total_targets`
/// whenever it was written by [`crate::rotation::RotationCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    pub current_index: usize,
    pub total_targets: usize,
}

/// A listing card as extracted from the rendered page.
///
/// Never persisted directly; it is filtered against the ledger and then
/// transformed into a [`Listing`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCandidate {
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
    pub salary_text: String,
    pub raw_description: String,
    pub apply_link: String,
    pub logo_url: String,
    /// As stated on the listing's own detail page, when one was read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
}

impl RawCandidate {
    /// Key used to drop repeats within a single session: title and company only.
    pub fn session_key(&self) -> String {
        format!(
            "{}-{}",
            self.job_title.to_lowercase(),
            self.company_name.to_lowercase()
        )
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.job_title, &self.company_name, &self.job_location)
    }
}

/// Content hash of a normalized `(title, company, location)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(title: &str, company: &str, location: &str) -> Self {
        let normalized = format!(
            "{}-{}-{}",
            title.trim().to_lowercase(),
            company.trim().to_lowercase(),
            location.trim().to_lowercase()
        );
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ledger entry: the first time a fingerprint was published.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenRecord {
    pub fingerprint: Fingerprint,
    pub first_seen_at: DateTime<Utc>,
}

/// Upsert key of the published working set: trimmed title, company, location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
}

/// A published listing as exposed by the read surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub job_title: String,
    pub company_name: String,
    pub job_location: String,
    /// Search-friendly headline derived from title, location and salary.
    pub seo_title: String,
    pub min_price: String,
    pub max_price: String,
    pub salary_type: String,
    /// `YYYY-MM-DD` of the cycle that published the listing.
    pub posting_date: String,
    pub experience_level: String,
    pub employment_type: String,
    pub company_logo: String,
    /// Rewritten description HTML, treated as opaque.
    pub description: String,
    pub apply_link: String,
    pub skills: Vec<String>,
}

impl Listing {
    pub fn key(&self) -> ListingKey {
        ListingKey {
            job_title: self.job_title.trim().to_string(),
            company_name: self.company_name.trim().to_string(),
            job_location: self.job_location.trim().to_string(),
        }
    }
}

/// A listing as stored in the display collection, with bookkeeping fields
/// that the read surface strips.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub id: u64,
    pub revision: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub listing: Listing,
}

/// Result of one scrape cycle, returned to the trigger surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub message: String,
    pub target: Target,
    /// Number of listings durably written during this cycle.
    pub added_count: usize,
    pub novel_records: Vec<Listing>,
    pub next_rotation_index: usize,
}
