//! Cross-session novelty filter.
//!
//! Runs before anything destructive happens to the published set: a
//! candidate survives only if its fingerprint is absent from the ledger.
//! Survivors are not recorded here; the writer commits their fingerprints
//! once they have been published.

use crate::error::Result;
use crate::models::{Fingerprint, RawCandidate};
use crate::store::SeenLedger;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

/// A candidate that passed the ledger check, with its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovelCandidate {
    pub candidate: RawCandidate,
    pub fingerprint: Fingerprint,
}

/// Drop candidates whose fingerprint is already in the ledger at `now`.
#[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
pub async fn filter_novel<L: SeenLedger>(
    ledger: &L,
    candidates: Vec<RawCandidate>,
    now: DateTime<Utc>,
) -> Result<Vec<NovelCandidate>> {
    let total = candidates.len();
    let mut novel = Vec::with_capacity(total);

    for candidate in candidates {
        let fingerprint = candidate.fingerprint();
        if ledger.contains(&fingerprint, now).await? {
            debug!(
                fingerprint = fingerprint.as_str(),
                title = %candidate.job_title,
                company = %candidate.company_name,
                "Already seen"
            );
            continue;
        }
        novel.push(NovelCandidate {
            candidate,
            fingerprint,
        });
    }

    info!(total, novel = novel.len(), "Filtered candidates against ledger");
    Ok(novel)
}
