//! Replace-and-upsert writer for the published working set.
//!
//! The display collection is cleared unconditionally, then every novel
//! listing is upserted and, once written, its fingerprint is committed to the
//! ledger. The clear is committed on its own: a failure part-way leaves the
//! published set empty or partial, and the error says how far it got.

use crate::error::{Result, ScrapeError};
use crate::models::{Fingerprint, Listing};
use crate::store::{DisplayStore, SeenLedger};
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Listings removed by the fresh-start clear.
    pub cleared: usize,
    /// Listings durably written, in input order.
    pub written: Vec<Listing>,
}

/// Clear the display set, then publish `entries` and record their fingerprints.
///
/// # Arguments
///
/// * `store` - Store holding both the display set and the ledger
/// * `entries` - Novel listings paired with the fingerprint of their candidate
/// * `now` - Timestamp for display records and ledger entries
///
/// # Errors
///
/// [`ScrapeError::Persistence`] on the first failed write, naming how many
/// listings had been written before it. Later entries are not attempted.
#[instrument(level = "info", skip_all, fields(entries = entries.len()))]
pub async fn replace_and_upsert<S>(
    store: &S,
    entries: Vec<(Listing, Fingerprint)>,
    now: DateTime<Utc>,
) -> Result<WriteOutcome>
where
    S: DisplayStore + SeenLedger,
{
    let cleared = store.clear_display().await?;
    info!(cleared, "Cleared published listings");

    let mut written = Vec::with_capacity(entries.len());
    for (listing, fingerprint) in entries {
        let step = async {
            store.upsert_listing(listing.clone(), now).await?;
            store.upsert_seen(&fingerprint, now).await
        };
        if let Err(e) = step.await {
            error!(written = written.len(), error = %e, "Write failed after fresh-start clear");
            return Err(ScrapeError::Persistence(format!(
                "{e} ({} listing(s) written after clearing {cleared})",
                written.len()
            )));
        }
        written.push(listing);
    }

    info!(written = written.len(), "Published listings");
    Ok(WriteOutcome { cleared, written })
}
