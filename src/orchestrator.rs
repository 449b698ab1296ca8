//! One scrape cycle, end to end, and the loop that repeats it.
//!
//! ```text
//! RotationCursor::next ─▶ purge expired ledger entries
//!        │
//!        ▼
//! Supervisor (launch + AutomationSession, bounded retries)
//!        │
//!        ▼
//! filter_novel ─▶ Supervisor::enrich (novel only) ─▶ to_listing
//!        │
//!        ▼
//! replace_and_upsert ─▶ CycleReport ─▶ Notifier (when anything was added)
//! ```
//!
//! The rotation index is persisted before the session starts, so a failed
//! or crashed cycle still moves on to the next target.

use crate::browser::BrowserLauncher;
use crate::error::{Result, ScrapeError};
use crate::models::{CycleReport, Listing, RawCandidate, Target};
use crate::notify::{AlertLog, NewListingsAlert, Notifier};
use crate::novelty::filter_novel;
use crate::outputs::json;
use crate::rotation::RotationCursor;
use crate::session::AutomationSession;
use crate::store::{DisplayStore, RotationStore, SeenLedger};
use crate::supervisor::{Supervisor, SupervisorPolicy, scrape_targets};
use crate::transform::{DescriptionRewriter, to_listing};
use crate::writer::replace_and_upsert;
use chrono::Utc;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Pauses of the continuous loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSchedule {
    /// Wait after a successful cycle.
    pub interval: Duration,
    /// Wait after a failed cycle.
    pub error_pause: Duration,
}

impl Default for WatchSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            error_pause: Duration::from_secs(60),
        }
    }
}

pub struct Orchestrator<S, L, R, N = AlertLog> {
    store: S,
    launcher: L,
    rewriter: R,
    notifier: N,
    targets: Vec<Target>,
    session: AutomationSession,
    policy: SupervisorPolicy,
    json_output_dir: Option<PathBuf>,
}

impl<S, L, R> Orchestrator<S, L, R> {
    /// An orchestrator whose alerts only go to the log.
    pub fn new(
        store: S,
        launcher: L,
        rewriter: R,
        targets: Vec<Target>,
        session: AutomationSession,
        policy: SupervisorPolicy,
    ) -> Self {
        Self {
            store,
            launcher,
            rewriter,
            notifier: AlertLog::default(),
            targets,
            session,
            policy,
            json_output_dir: None,
        }
    }
}

impl<S, L, R, N> Orchestrator<S, L, R, N>
where
    S: RotationStore + SeenLedger + DisplayStore,
    L: BrowserLauncher,
    R: DescriptionRewriter,
    N: Notifier,
{
    pub fn with_notifier<M: Notifier>(self, notifier: M) -> Orchestrator<S, L, R, M> {
        Orchestrator {
            store: self.store,
            launcher: self.launcher,
            rewriter: self.rewriter,
            notifier,
            targets: self.targets,
            session: self.session,
            policy: self.policy,
            json_output_dir: self.json_output_dir,
        }
    }

    /// Also export listings and cycle reports after every successful cycle.
    pub fn with_json_output(mut self, dir: Option<PathBuf>) -> Self {
        self.json_output_dir = dir;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one scrape cycle against the next target in rotation.
    ///
    /// # Returns
    ///
    /// A [`CycleReport`] whose `added_count` is the number of listings
    /// durably written. Fails with `NoTargetsConfigured` before any browser
    /// is launched, with a session error when the supervisor propagates
    /// exhaustion, or with `Persistence` when a store write fails.
    #[instrument(level = "info", skip_all, fields(targets = self.targets.len(), policy = ?self.policy.on_exhaustion))]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let t0 = Instant::now();
        let now = Utc::now();

        let selection = RotationCursor::new(&self.store, &self.targets).next().await?;
        let rotation_index = selection.index;
        let purged = self.store.purge_expired(now).await?;
        if purged > 0 {
            info!(purged, "Purged expired ledger entries");
        }

        let supervisor = Supervisor::new(&self.launcher, &self.session, self.policy);
        let candidates = supervisor.scrape(&selection.target).await?;
        let extracted = candidates.len();

        let mut novel = filter_novel(&self.store, candidates, now).await?;
        supervisor
            .enrich(novel.iter_mut().map(|n| &mut n.candidate).collect())
            .await;
        let today = now.date_naive();
        let entries = novel
            .into_iter()
            .map(|n| (to_listing(&n.candidate, &self.rewriter, today), n.fingerprint))
            .collect();

        let outcome = replace_and_upsert(&self.store, entries, now).await?;
        let added_count = outcome.written.len();

        let report = CycleReport {
            message: format!(
                "Scraped {}: {} extracted, {} new listing(s) published",
                selection.target.name, extracted, added_count
            ),
            target: selection.target,
            added_count,
            novel_records: outcome.written,
            next_rotation_index: selection.next_index,
        };
        info!(
            added_count,
            extracted,
            rotation_index,
            next_rotation_index = report.next_rotation_index,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Cycle complete"
        );

        self.export(&report).await;
        if let Some(alert) = NewListingsAlert::for_cycle(&report, Utc::now()) {
            if let Err(e) = self.notifier.notify(&alert).await {
                warn!(error = %e, "Could not deliver new listings alert");
            }
        }
        Ok(report)
    }

    /// Scrape every target once with a shared browser and return the
    /// candidates after follow-up lookups. Neither the rotation state, the
    /// ledger nor the published set is touched.
    #[instrument(level = "info", skip_all, fields(targets = self.targets.len()))]
    pub async fn preview(&self) -> Result<Vec<RawCandidate>> {
        let mut found =
            scrape_targets(&self.launcher, &self.session, &self.targets, self.policy).await?;
        Supervisor::new(&self.launcher, &self.session, self.policy)
            .enrich(found.iter_mut().collect())
            .await;
        Ok(found)
    }

    /// The read surface: published listings, newest first, without
    /// bookkeeping fields.
    pub async fn published(&self) -> Result<Vec<Listing>> {
        Ok(self
            .store
            .list_display()
            .await?
            .into_iter()
            .map(|r| r.listing)
            .collect())
    }

    /// Repeat [`run_cycle`](Self::run_cycle), pausing per `schedule`.
    ///
    /// Runs forever when `max_cycles` is `None`. Failed cycles are logged and
    /// never stop the loop, except `NoTargetsConfigured` and `Config`, which
    /// no retry can fix.
    #[instrument(level = "info", skip_all)]
    pub async fn watch(&self, schedule: WatchSchedule, max_cycles: Option<usize>) -> Result<usize> {
        let mut cycles = 0usize;
        loop {
            cycles += 1;
            let pause = match self.run_cycle().await {
                Ok(report) => {
                    info!(cycle = cycles, added_count = report.added_count, "Watch cycle succeeded");
                    schedule.interval
                }
                Err(e @ (ScrapeError::NoTargetsConfigured | ScrapeError::Config(_))) => {
                    error!(error = %e, "Watch loop cannot continue");
                    return Err(e);
                }
                Err(e) => {
                    error!(cycle = cycles, error = %e, "Watch cycle failed");
                    schedule.error_pause
                }
            };

            if max_cycles.is_some_and(|max| cycles >= max) {
                return Ok(cycles);
            }
            info!(?pause, "Sleeping before next cycle");
            sleep(pause).await;
        }
    }

    async fn export(&self, report: &CycleReport) {
        let Some(dir) = &self.json_output_dir else {
            return;
        };
        match self.published().await {
            Ok(listings) => {
                if let Err(e) = json::write_listings(&listings, dir).await {
                    warn!(error = %e, "Could not export listings");
                }
            }
            Err(e) => warn!(error = %e, "Could not read listings for export"),
        }
        if let Err(e) = json::write_cycle_report(report, dir).await {
            warn!(error = %e, "Could not export cycle report");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fingerprint;
    use crate::session::profile::SessionProfile;
    use crate::store::memory::MemoryStore;
    use crate::testing::{FakeLauncher, FakeSite, FakeWeb, card_html, page_html, page_html_listing};
    use crate::transform::TemplateRewriter;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<NewListingsAlert>>>);

    impl Notifier for Recorder {
        async fn notify(&self, alert: &NewListingsAlert) -> Result<()> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn targets() -> Vec<Target> {
        vec![Target::new("A", "http://a"), Target::new("B", "http://b")]
    }

    fn orchestrator(
        web: &FakeWeb,
        targets: Vec<Target>,
        policy: SupervisorPolicy,
    ) -> Orchestrator<MemoryStore, FakeLauncher, TemplateRewriter> {
        Orchestrator::new(
            MemoryStore::new(),
            web.launcher(),
            TemplateRewriter,
            targets,
            AutomationSession::new(SessionProfile::interactive(), None),
            policy,
        )
    }

    fn engineer_site() -> FakeSite {
        FakeSite::pages(vec![page_html(&[card_html("Engineer", "Acme", "NY", "/jobs/1")])])
    }

    async fn rotation_index(o: &Orchestrator<MemoryStore, FakeLauncher, TemplateRewriter>) -> usize {
        o.store()
            .load_rotation()
            .await
            .unwrap()
            .map(|s| s.current_index)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_trigger_scenario() {
        let web = FakeWeb::new();
        web.add_site("http://a", engineer_site());
        web.add_site("http://b", FakeSite::pages(vec![page_html(&[])]));
        let o = orchestrator(&web, targets(), SupervisorPolicy::manual());

        let first = o.run_cycle().await.unwrap();
        assert_eq!(first.target.name, "A");
        assert_eq!(first.added_count, 1);
        assert_eq!(first.novel_records[0].job_title, "Engineer");
        assert_eq!(first.next_rotation_index, 1);
        assert_eq!(o.published().await.unwrap().len(), 1);
        assert!(
            o.store()
                .contains(&Fingerprint::compute("Engineer", "Acme", "NY"), Utc::now())
                .await
                .unwrap()
        );
        assert_eq!(rotation_index(&o).await, 1);

        let second = o.run_cycle().await.unwrap();
        assert_eq!(second.target.name, "B");
        assert_eq!(second.added_count, 0);
        assert!(o.published().await.unwrap().is_empty());
        assert_eq!(rotation_index(&o).await, 0);

        let third = o.run_cycle().await.unwrap();
        assert_eq!(third.target.name, "A");
        assert_eq!(third.added_count, 0);
        assert!(third.novel_records.is_empty());
        assert!(o.published().await.unwrap().is_empty());
        assert_eq!(third.next_rotation_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_is_n_mod_t_even_when_scrapes_fail() {
        let web = FakeWeb::new();
        let three = vec![
            Target::new("A", "http://a"),
            Target::new("B", "http://b"),
            Target::new("C", "http://c"),
        ];
        web.add_site("http://a", engineer_site());
        let o = orchestrator(&web, three, SupervisorPolicy::manual());

        for n in 1..=5 {
            o.run_cycle().await.unwrap();
            assert_eq!(rotation_index(&o).await, n % 3);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_targets_fails_before_launch() {
        let web = FakeWeb::new();
        let o = orchestrator(&web, Vec::new(), SupervisorPolicy::manual());

        let err = o.run_cycle().await.unwrap_err();
        assert!(matches!(err, ScrapeError::NoTargetsConfigured));
        assert_eq!(web.launches(), 0);
        assert!(o.store().load_rotation().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_exhaustion_clears_display() {
        let web = FakeWeb::new();
        web.add_site("http://a", engineer_site());
        let o = orchestrator(&web, targets(), SupervisorPolicy::manual());
        o.run_cycle().await.unwrap();
        assert_eq!(o.published().await.unwrap().len(), 1);

        // B is unreachable on every attempt.
        let report = o.run_cycle().await.unwrap();
        assert_eq!(report.added_count, 0);
        assert!(o.published().await.unwrap().is_empty());
        assert_eq!(web.visits().iter().filter(|u| *u == "http://b").count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_continuous_exhaustion_surfaces_and_keeps_display() {
        let web = FakeWeb::new();
        web.add_site("http://a", engineer_site());
        let o = orchestrator(&web, targets(), SupervisorPolicy::continuous());
        o.run_cycle().await.unwrap();

        let err = o.run_cycle().await.unwrap_err();
        assert!(matches!(err, ScrapeError::Navigation { .. }));
        // Nothing destructive happened, but rotation still advanced.
        assert_eq!(o.published().await.unwrap().len(), 1);
        assert_eq!(rotation_index(&o).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_runs_bounded_cycles_through_failures() {
        let web = FakeWeb::new();
        web.add_site("http://a", engineer_site());
        let o = orchestrator(&web, targets(), SupervisorPolicy::continuous());

        let started = tokio::time::Instant::now();
        let cycles = o.watch(WatchSchedule::default(), Some(3)).await.unwrap();
        assert_eq!(cycles, 3);
        assert_eq!(rotation_index(&o).await, 1);
        // One interval after A plus one error pause after B.
        assert!(started.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_stops_without_targets() {
        let web = FakeWeb::new();
        let o = orchestrator(&web, Vec::new(), SupervisorPolicy::continuous());
        let err = o.watch(WatchSchedule::default(), None).await.unwrap_err();
        assert!(matches!(err, ScrapeError::NoTargetsConfigured));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preview_leaves_state_untouched() {
        let web = FakeWeb::new();
        web.add_site("http://a", engineer_site());
        web.add_site(
            "http://b",
            FakeSite::pages(vec![page_html(&[card_html("Analyst", "Globex", "SF", "/jobs/2")])]),
        );
        let o = orchestrator(&web, targets(), SupervisorPolicy::manual());

        let found = o.preview().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(web.launches(), 1);
        assert!(o.store().load_rotation().await.unwrap().is_none());
        assert!(o.published().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_export_after_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let web = FakeWeb::new();
        web.add_site("http://a", engineer_site());
        let o = orchestrator(&web, targets(), SupervisorPolicy::manual())
            .with_json_output(Some(dir.path().to_path_buf()));

        o.run_cycle().await.unwrap();
        let exported = std::fs::read_to_string(dir.path().join(json::LISTINGS_FILE)).unwrap();
        assert!(exported.contains("\"jobTitle\": \"Engineer\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_sent_only_when_listings_were_added() {
        let web = FakeWeb::new();
        web.add_site("http://a", engineer_site());
        web.add_site("http://b", FakeSite::pages(vec![page_html(&[])]));
        let recorder = Recorder::default();
        let o = orchestrator(&web, targets(), SupervisorPolicy::manual())
            .with_notifier(recorder.clone());

        o.run_cycle().await.unwrap();
        o.run_cycle().await.unwrap();

        let alerts = recorder.0.lock().unwrap().clone();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].target, "A");
        assert_eq!(alerts[0].listings[0].job_title, "Engineer");
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_up_lookups_only_for_novel_listings() {
        let web = FakeWeb::new();
        let link = "https://www.glassdoor.co.in/job-listing/x?jl=42";
        let partner = "https://www.glassdoor.co.in/partner/jobListing.htm?jobListingId=42";
        web.add_site(
            "http://a",
            FakeSite::pages(vec![page_html_listing(&[card_html("Engineer", "Acme", "NY", link)])]),
        );
        web.add_site(
            partner,
            FakeSite::pages(vec![String::new()]).redirect_to("https://careers.acme.com/apply/42"),
        );
        let o = Orchestrator::new(
            MemoryStore::new(),
            web.launcher(),
            TemplateRewriter,
            vec![Target::new("A", "http://a")],
            AutomationSession::new(SessionProfile::continuous(), None),
            SupervisorPolicy::manual(),
        );

        let first = o.run_cycle().await.unwrap();
        assert_eq!(first.novel_records[0].apply_link, "https://careers.acme.com/apply/42");
        let second = o.run_cycle().await.unwrap();
        assert_eq!(second.added_count, 0);

        let visits = web.visits();
        assert_eq!(visits.iter().filter(|u| *u == partner).count(), 1);
        assert_eq!(visits.iter().filter(|u| *u == link).count(), 1);
        assert_eq!(web.open_pages(), 0);
    }
}
