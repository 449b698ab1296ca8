//! Durable rotation over the configured targets.
//!
//! The cursor is advanced *before* a target is scraped, so a crash in the
//! middle of a session moves on to the next target on the following
//! trigger instead of hammering the same page forever. Both the manual
//! trigger and the continuous loop use this policy, which gives
//! `current_index == N mod total_targets` after `N` triggers.
//!
//! There is no lock around the read-modify-write; callers serialize triggers.

use crate::error::{Result, ScrapeError};
use crate::models::{RotationState, Target};
use crate::store::RotationStore;
use tracing::{info, instrument};

/// A target picked by [`RotationCursor::next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub target: Target,
    /// Index persisted for the following trigger.
    pub next_index: usize,
}

pub struct RotationCursor<'a, S> {
    store: &'a S,
    targets: &'a [Target],
}

impl<'a, S: RotationStore> RotationCursor<'a, S> {
    pub fn new(store: &'a S, targets: &'a [Target]) -> Self {
        Self { store, targets }
    }

    /// Select the target at the current index and persist the advanced index.
    ///
    /// The state is created with `current_index = 0` on first use. An empty
    /// target list fails with [`ScrapeError::NoTargetsConfigured`] without
    /// touching the store.
    #[instrument(level = "info", skip_all, fields(total = self.targets.len()))]
    pub async fn next(&self) -> Result<Selection> {
        let total = self.targets.len();
        if total == 0 {
            return Err(ScrapeError::NoTargetsConfigured);
        }

        let state = match self.store.load_rotation().await? {
            Some(state) => state,
            None => {
                let fresh = RotationState {
                    current_index: 0,
                    total_targets: total,
                };
                self.store.save_rotation(fresh).await?;
                info!("Initialized rotation state");
                fresh
            }
        };

        // The target list may have shrunk since the state was written.
        let index = state.current_index % total;
        let next_index = (index + 1) % total;
        self.store
            .save_rotation(RotationState {
                current_index: next_index,
                total_targets: total,
            })
            .await?;

        let target = self.targets[index].clone();
        info!(index, next_index, target = %target.name, "Selected scrape target");
        Ok(Selection {
            index,
            target,
            next_index,
        })
    }
}
