//! Durable state shared across scrape cycles.
//!
//! Three collections outlive a single session:
//!
//! | Collection | Trait | Contents |
//! |------------|-------|----------|
//! | rotation | [`RotationStore`] | singleton [`RotationState`] |
//! | seen | [`SeenLedger`] | fingerprints with a 7-day retention window |
//! | listings | [`DisplayStore`] | the published working set |
//!
//! Two backends implement all three traits:
//! - [`memory::MemoryStore`]: in-process, for tests and ephemeral runs
//! - [`json::JsonStore`]: one JSON document per collection on disk
//!
//! All mutations are last-writer-wins. Nothing spans collections
//! transactionally; callers must serialize cycles themselves.

use crate::error::Result;
use crate::models::{DisplayRecord, Fingerprint, Listing, ListingKey, RotationState, SeenRecord};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod json;
pub mod memory;

/// How long a fingerprint stays in the ledger after it was first seen.
pub const SEEN_RETENTION_DAYS: i64 = 7;

pub fn seen_retention() -> Duration {
    Duration::days(SEEN_RETENTION_DAYS)
}

pub trait RotationStore {
    /// Load the rotation singleton, `None` if it was never written.
    async fn load_rotation(&self) -> Result<Option<RotationState>>;

    async fn save_rotation(&self, state: RotationState) -> Result<()>;
}

pub trait SeenLedger {
    /// Whether `fingerprint` is present and not yet expired at `now`.
    async fn contains(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<bool>;

    /// Record a sighting. An unexpired entry keeps its original `first_seen_at`.
    async fn upsert_seen(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<()>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

pub trait DisplayStore {
    /// Remove every published listing, returning how many were removed.
    async fn clear_display(&self) -> Result<usize>;

    /// Insert or replace the listing with the same trimmed
    /// `(title, company, location)` key.
    async fn upsert_listing(&self, listing: Listing, now: DateTime<Utc>) -> Result<DisplayRecord>;

    /// All published listings, newest first.
    async fn list_display(&self) -> Result<Vec<DisplayRecord>>;
}

/// All three collections behind one handle.
pub trait Store: RotationStore + SeenLedger + DisplayStore {}

impl<T: RotationStore + SeenLedger + DisplayStore> Store for T {}

/// Ledger contents, keyed by fingerprint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct LedgerDocument {
    records: BTreeMap<Fingerprint, SeenRecord>,
}

impl LedgerDocument {
    fn is_live(record: &SeenRecord, now: DateTime<Utc>) -> bool {
        record.first_seen_at + seen_retention() > now
    }

    pub(crate) fn contains(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> bool {
        self.records
            .get(fingerprint)
            .is_some_and(|r| Self::is_live(r, now))
    }

    pub(crate) fn upsert(&mut self, fingerprint: &Fingerprint, now: DateTime<Utc>) {
        let live = self.contains(fingerprint, now);
        if !live {
            self.records.insert(
                fingerprint.clone(),
                SeenRecord {
                    fingerprint: fingerprint.clone(),
                    first_seen_at: now,
                },
            );
        }
    }

    pub(crate) fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| Self::is_live(r, now));
        before - self.records.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

/// Published working set plus the id sequence.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DisplayDocument {
    next_id: u64,
    records: Vec<DisplayRecord>,
}

impl DisplayDocument {
    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.records.len();
        self.records.clear();
        removed
    }

    pub(crate) fn upsert(&mut self, listing: Listing, now: DateTime<Utc>) -> DisplayRecord {
        let key: ListingKey = listing.key();
        if let Some(existing) = self.records.iter_mut().find(|r| r.listing.key() == key) {
            existing.listing = listing;
            existing.revision += 1;
            existing.updated_at = now;
            return existing.clone();
        }

        self.next_id += 1;
        let record = DisplayRecord {
            id: self.next_id,
            revision: 0,
            created_at: now,
            updated_at: now,
            listing,
        };
        self.records.push(record.clone());
        record
    }

    /// Newest first; ties fall back to the later id.
    pub(crate) fn newest_first(&self) -> Vec<DisplayRecord> {
        let mut records = self.records.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::listing;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_ledger_entry_expires_after_retention() {
        let mut ledger = LedgerDocument::default();
        let fp = Fingerprint::compute("Engineer", "Acme", "NY");
        ledger.upsert(&fp, t0());

        assert!(ledger.contains(&fp, t0() + Duration::days(6)));
        assert!(!ledger.contains(&fp, t0() + seen_retention() + Duration::seconds(1)));
    }

    #[test]
    fn test_ledger_upsert_keeps_first_sighting() {
        let mut ledger = LedgerDocument::default();
        let fp = Fingerprint::compute("Engineer", "Acme", "NY");
        ledger.upsert(&fp, t0());
        ledger.upsert(&fp, t0() + Duration::days(3));

        // Still anchored to t0, so it expires 7 days after t0.
        assert!(!ledger.contains(&fp, t0() + Duration::days(7) + Duration::seconds(1)));
    }

    #[test]
    fn test_ledger_expired_entry_is_renewed() {
        let mut ledger = LedgerDocument::default();
        let fp = Fingerprint::compute("Engineer", "Acme", "NY");
        ledger.upsert(&fp, t0());
        let later = t0() + Duration::days(10);
        ledger.upsert(&fp, later);
        assert!(ledger.contains(&fp, later + Duration::days(6)));
    }

    #[test]
    fn test_ledger_purge() {
        let mut ledger = LedgerDocument::default();
        ledger.upsert(&Fingerprint::compute("a", "b", "c"), t0());
        ledger.upsert(&Fingerprint::compute("d", "e", "f"), t0() + Duration::days(5));
        assert_eq!(ledger.purge(t0() + Duration::days(8)), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_display_upsert_replaces_same_key() {
        let mut doc = DisplayDocument::default();
        let first = doc.upsert(listing("Engineer", "Acme", "NY"), t0());
        let mut changed = listing(" Engineer", "Acme ", "NY");
        changed.description = "<p>updated</p>".into();
        let second = doc.upsert(changed, t0() + Duration::minutes(1));

        assert_eq!(first.id, second.id);
        assert_eq!(second.revision, 1);
        assert_eq!(doc.newest_first().len(), 1);
        assert_eq!(doc.newest_first()[0].listing.description, "<p>updated</p>");
    }

    #[test]
    fn test_display_newest_first() {
        let mut doc = DisplayDocument::default();
        doc.upsert(listing("Old", "Acme", "NY"), t0());
        doc.upsert(listing("New", "Acme", "NY"), t0() + Duration::hours(1));
        let titles: Vec<_> = doc
            .newest_first()
            .into_iter()
            .map(|r| r.listing.job_title)
            .collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[test]
    fn test_display_clear() {
        let mut doc = DisplayDocument::default();
        doc.upsert(listing("A", "Acme", "NY"), t0());
        doc.upsert(listing("B", "Acme", "NY"), t0());
        assert_eq!(doc.clear(), 2);
        assert!(doc.newest_first().is_empty());
    }
}
