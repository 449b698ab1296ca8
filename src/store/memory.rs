//! In-process store. State lives as long as the value does.

use super::{DisplayDocument, DisplayStore, LedgerDocument, RotationStore, SeenLedger};
use crate::error::{Result, ScrapeError};
use crate::models::{DisplayRecord, Fingerprint, Listing, RotationState};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rotation: Mutex<Option<RotationState>>,
    ledger: Mutex<LedgerDocument>,
    display: Mutex<DisplayDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|e| ScrapeError::Persistence(format!("memory store poisoned: {e}")))
}

impl RotationStore for MemoryStore {
    async fn load_rotation(&self) -> Result<Option<RotationState>> {
        Ok(*lock(&self.rotation)?)
    }

    async fn save_rotation(&self, state: RotationState) -> Result<()> {
        *lock(&self.rotation)? = Some(state);
        Ok(())
    }
}

impl SeenLedger for MemoryStore {
    async fn contains(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<bool> {
        Ok(lock(&self.ledger)?.contains(fingerprint, now))
    }

    async fn upsert_seen(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<()> {
        lock(&self.ledger)?.upsert(fingerprint, now);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        Ok(lock(&self.ledger)?.purge(now))
    }
}

impl DisplayStore for MemoryStore {
    async fn clear_display(&self) -> Result<usize> {
        Ok(lock(&self.display)?.clear())
    }

    async fn upsert_listing(&self, listing: Listing, now: DateTime<Utc>) -> Result<DisplayRecord> {
        Ok(lock(&self.display)?.upsert(listing, now))
    }

    async fn list_display(&self) -> Result<Vec<DisplayRecord>> {
        Ok(lock(&self.display)?.newest_first())
    }
}
