//! Bounded retries around browser acquisition and an automation session.
//!
//! Every attempt launches a fresh browser, runs one [`AutomationSession`]
//! against the target and closes the browser again, whatever the outcome.
//! Retryable failures (see [`ScrapeError::is_retryable`]) wait a fixed
//! cool-down before the next attempt; anything else is returned at once.
//!
//! What happens when all attempts fail depends on the calling context:
//!
//! | Mode | Cool-down | On exhaustion |
//! |------|-----------|---------------|
//! | [`SupervisorPolicy::manual`] | 5 s | empty result set |
//! | [`SupervisorPolicy::continuous`] | 60 s | last error is returned |

use crate::browser::{BrowserHandle, BrowserLauncher};
use crate::error::{Result, ScrapeError};
use crate::models::{RawCandidate, Target};
use crate::session::AutomationSession;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// What a supervisor returns once every attempt has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Treat the target as having yielded nothing.
    EmptyResult,
    /// Return the last error to the caller.
    Propagate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorPolicy {
    pub attempts: usize,
    pub cooldown: Duration,
    pub on_exhaustion: ExhaustionPolicy,
}

impl SupervisorPolicy {
    /// Policy for a single manually triggered cycle.
    pub fn manual() -> Self {
        Self {
            attempts: 3,
            cooldown: Duration::from_secs(5),
            on_exhaustion: ExhaustionPolicy::EmptyResult,
        }
    }

    /// Policy for the continuously looping scheduler.
    pub fn continuous() -> Self {
        Self {
            attempts: 3,
            cooldown: Duration::from_secs(60),
            on_exhaustion: ExhaustionPolicy::Propagate,
        }
    }
}

/// Runs an [`AutomationSession`] under a [`SupervisorPolicy`].
#[derive(Debug)]
pub struct Supervisor<'a, L> {
    launcher: &'a L,
    session: &'a AutomationSession,
    policy: SupervisorPolicy,
}

impl<'a, L: BrowserLauncher> Supervisor<'a, L> {
    pub fn new(launcher: &'a L, session: &'a AutomationSession, policy: SupervisorPolicy) -> Self {
        Self {
            launcher,
            session,
            policy,
        }
    }

    /// Launch, scrape and close, retrying session-level failures.
    ///
    /// # Returns
    ///
    /// The candidates of the first successful attempt. After the last failed
    /// attempt, either an empty vector or the last error depending on
    /// [`SupervisorPolicy::on_exhaustion`]. Non-retryable errors are returned
    /// immediately in both modes.
    #[instrument(level = "info", skip_all, fields(target = %target.name, attempts = self.policy.attempts))]
    pub async fn scrape(&self, target: &Target) -> Result<Vec<RawCandidate>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            let err = match self.attempt(target).await {
                Ok(candidates) => {
                    info!(
                        attempt,
                        count = candidates.len(),
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        "Session succeeded"
                    );
                    return Ok(candidates);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            if attempt >= self.policy.attempts {
                error!(
                    attempt,
                    max = self.policy.attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    error = %err,
                    "Session exhausted retries"
                );
                return match self.policy.on_exhaustion {
                    ExhaustionPolicy::EmptyResult => Ok(Vec::new()),
                    ExhaustionPolicy::Propagate => Err(err),
                };
            }

            warn!(
                attempt,
                max = self.policy.attempts,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                cooldown = ?self.policy.cooldown,
                error = %err,
                "Session attempt failed; cooling down"
            );
            sleep(self.policy.cooldown).await;
        }
    }

    /// Run the session's follow-up lookups on `candidates` with one fresh
    /// browser. Not retried: a launch failure leaves every candidate as the
    /// list page described it.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len()))]
    pub async fn enrich(&self, candidates: Vec<&mut RawCandidate>) {
        if candidates.is_empty() || !self.session.enriches() {
            return;
        }
        let browser = match self.launcher.launch().await {
            Ok(browser) => browser,
            Err(e) => {
                warn!(error = %e, "Could not launch browser for follow-up lookups");
                return;
            }
        };
        if let Err(e) = self.session.enrich(&browser, candidates).await {
            warn!(error = %e, "Follow-up lookups skipped");
        }
        browser.close().await;
    }

    async fn attempt(&self, target: &Target) -> Result<Vec<RawCandidate>> {
        let browser = self.launcher.launch().await?;
        let result = self.session.scrape(&browser, target).await;
        browser.close().await;
        result
    }
}

/// Same as [`Supervisor::scrape`] but for a multi-target run sharing one
/// browser per attempt.
pub async fn scrape_targets<L: BrowserLauncher>(
    launcher: &L,
    session: &AutomationSession,
    targets: &[Target],
    policy: SupervisorPolicy,
) -> Result<Vec<RawCandidate>> {
    if targets.is_empty() {
        return Err(ScrapeError::NoTargetsConfigured);
    }
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let outcome = match launcher.launch().await {
            Ok(browser) => {
                let result = session.scrape_many(&browser, targets).await;
                browser.close().await;
                result
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(found) => return Ok(found),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= policy.attempts => {
                error!(attempt, error = %e, "Multi-target run exhausted retries");
                return match policy.on_exhaustion {
                    ExhaustionPolicy::EmptyResult => Ok(Vec::new()),
                    ExhaustionPolicy::Propagate => Err(e),
                };
            }
            Err(e) => {
                warn!(attempt, error = %e, "Launch failed; cooling down");
                sleep(policy.cooldown).await;
            }
        }
    }
}
