//! File-backed store: one JSON document per collection.
//!
//! # Layout
//!
//! ```text
//! store_dir/
//! ├── rotation.json   # RotationState singleton
//! ├── seen.json       # fingerprint ledger
//! └── listings.json   # published working set
//! ```
//!
//! Every write goes to a sibling `.tmp` file that is then renamed over the
//! document, so readers see either the old or the new version. Expired ledger
//! entries are dropped whenever the ledger is rewritten.

use super::{DisplayDocument, DisplayStore, LedgerDocument, RotationStore, SeenLedger};
use crate::error::Result;
use crate::models::{DisplayRecord, Fingerprint, Listing, RotationState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

const ROTATION_FILE: &str = "rotation.json";
const SEEN_FILE: &str = "seen.json";
const LISTINGS_FILE: &str = "listings.json";

#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
    // Serializes read-modify-write sequences within this process.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Open (and create if needed) a store rooted at `dir`.
    #[instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display()))]
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        info!("Opened JSON store");
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    async fn read_doc<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_doc<T: Serialize>(&self, name: &str, doc: &T) -> Result<()> {
        let path = self.path(name);
        let tmp = self.path(&format!("{name}.tmp"));
        let json = serde_json::to_vec_pretty(doc)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Wrote store document");
        Ok(())
    }
}

impl RotationStore for JsonStore {
    async fn load_rotation(&self) -> Result<Option<RotationState>> {
        self.read_doc::<Option<RotationState>>(ROTATION_FILE).await
    }

    async fn save_rotation(&self, state: RotationState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_doc(ROTATION_FILE, &Some(state)).await
    }
}

impl SeenLedger for JsonStore {
    async fn contains(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<bool> {
        let ledger: LedgerDocument = self.read_doc(SEEN_FILE).await?;
        Ok(ledger.contains(fingerprint, now))
    }

    async fn upsert_seen(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut ledger: LedgerDocument = self.read_doc(SEEN_FILE).await?;
        ledger.purge(now);
        ledger.upsert(fingerprint, now);
        self.write_doc(SEEN_FILE, &ledger).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut ledger: LedgerDocument = self.read_doc(SEEN_FILE).await?;
        let removed = ledger.purge(now);
        if removed > 0 {
            self.write_doc(SEEN_FILE, &ledger).await?;
        }
        debug!(removed, remaining = ledger.len(), "Purged expired fingerprints");
        Ok(removed)
    }
}

impl DisplayStore for JsonStore {
    async fn clear_display(&self) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut doc: DisplayDocument = self.read_doc(LISTINGS_FILE).await?;
        let removed = doc.clear();
        self.write_doc(LISTINGS_FILE, &doc).await?;
        Ok(removed)
    }

    async fn upsert_listing(&self, listing: Listing, now: DateTime<Utc>) -> Result<DisplayRecord> {
        let _guard = self.write_lock.lock().await;
        let mut doc: DisplayDocument = self.read_doc(LISTINGS_FILE).await?;
        let record = doc.upsert(listing, now);
        self.write_doc(LISTINGS_FILE, &doc).await?;
        Ok(record)
    }

    async fn list_display(&self) -> Result<Vec<DisplayRecord>> {
        let doc: DisplayDocument = self.read_doc(LISTINGS_FILE).await?;
        Ok(doc.newest_first())
    }
}
