//! Automation session: one browser page driven against one target.
//!
//! A session performs the following steps, all awaited sequentially:
//!
//! 1. Open an isolated page with the profile's [`PageIdentity`](profile::PageIdentity)
//! 2. Navigate to the target and wait the settle delay
//! 3. Scan title and body text for [`BLOCK_MARKERS`](profile::BLOCK_MARKERS);
//!    on a hit, reload once and re-check
//! 4. Run the progressive reveal loop (load more, scroll, recount)
//! 5. Click each card in turn and extract it from HTML snapshots
//!
//! [`AutomationSession::enrich`] runs separately, once the caller has decided
//! which candidates are worth the extra page loads: it reads each listing's
//! detail page and resolves partner redirects to the employer's own page.
//!
//! Failed clicks, failed "load more" attempts and per-card misses are logged
//! and skipped. Only navigation failures, launch failures and a block page
//! that yielded nothing surface as errors.

pub mod profile;

use crate::browser::{BrowserHandle, PageDriver};
use crate::error::{Result, ScrapeError};
use crate::extract::{CardExtractor, CardSnapshot, DetailExtractor, DetailFields};
use crate::models::{RawCandidate, Target};
use crate::utils::{dump_html, truncate_for_log};
use profile::{BLOCK_MARKERS, DetailLookup, MOBILE_USER_AGENT, PageIdentity, RedirectLookup, SessionProfile};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Poll interval while waiting for a partner redirect to leave the listing site.
const REDIRECT_POLL: Duration = Duration::from_secs(1);

/// Return the first block marker found in `text`, if any.
pub fn find_block_marker(text: &str) -> Option<&'static str> {
    BLOCK_MARKERS.iter().copied().find(|m| text.contains(m))
}

#[derive(Debug, Clone)]
pub struct AutomationSession {
    profile: SessionProfile,
    debug_dir: Option<PathBuf>,
}

impl AutomationSession {
    pub fn new(profile: SessionProfile, debug_dir: Option<PathBuf>) -> Self {
        Self { profile, debug_dir }
    }

    /// Scrape one target, returning at most `card_cap` candidates unique by
    /// lowercase title and company.
    #[instrument(level = "info", skip_all, fields(target = %target.name, profile = self.profile.name))]
    pub async fn scrape<B: BrowserHandle>(
        &self,
        browser: &B,
        target: &Target,
    ) -> Result<Vec<RawCandidate>> {
        let mut extractor = CardExtractor::new(&self.profile.selectors)?;
        self.scrape_with(browser, target, &mut extractor, self.profile.card_cap)
            .await
    }

    /// Scrape several targets with one browser, sharing in-session dedup and
    /// stopping once `run_cap` candidates have been collected.
    ///
    /// A target that fails is logged and skipped; the run only errors when
    /// the selectors themselves are invalid.
    #[instrument(level = "info", skip_all, fields(targets = targets.len(), profile = self.profile.name))]
    pub async fn scrape_many<B: BrowserHandle>(
        &self,
        browser: &B,
        targets: &[Target],
    ) -> Result<Vec<RawCandidate>> {
        let mut extractor = CardExtractor::new(&self.profile.selectors)?;
        let mut collected = Vec::new();

        for target in targets {
            let remaining = self.profile.run_cap.saturating_sub(collected.len());
            if remaining == 0 {
                info!(cap = self.profile.run_cap, "Run cap reached; skipping remaining targets");
                break;
            }
            let cap = remaining.min(self.profile.card_cap);
            match self.scrape_with(browser, target, &mut extractor, cap).await {
                Ok(mut found) => collected.append(&mut found),
                Err(e) => warn!(target = %target.name, error = %e, "Target failed; continuing"),
            }
        }

        info!(count = collected.len(), "Multi-target run complete");
        Ok(collected)
    }

    async fn scrape_with<B: BrowserHandle>(
        &self,
        browser: &B,
        target: &Target,
        extractor: &mut CardExtractor,
        cap: usize,
    ) -> Result<Vec<RawCandidate>> {
        let page = browser.open_page(&self.profile.identity).await?;
        let result = self.drive(&page, target, extractor, cap).await;
        page.close().await;
        result
    }

    /// Whether the profile has any per-listing follow-up lookups.
    pub fn enriches(&self) -> bool {
        self.profile.detail.is_some() || self.profile.redirect.is_some()
    }

    /// Follow each candidate to its detail page, then through the partner
    /// redirect, on auxiliary pages of `browser`.
    ///
    /// Both lookups are time-boxed and best-effort: a candidate whose lookup
    /// fails keeps what was read from the list page. Only invalid detail
    /// selectors are an error.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len(), profile = self.profile.name))]
    pub async fn enrich<B: BrowserHandle>(
        &self,
        browser: &B,
        candidates: Vec<&mut RawCandidate>,
    ) -> Result<()> {
        let detail = self
            .profile
            .detail
            .as_ref()
            .map(|lookup| DetailExtractor::new(&lookup.selectors).map(|ex| (lookup, ex)))
            .transpose()?;

        let mut detailed = 0usize;
        let mut redirected = 0usize;
        for candidate in candidates {
            if let Some((lookup, extractor)) = &detail {
                let link = candidate.apply_link.clone();
                match fetch_detail(browser, &self.profile.identity, lookup, extractor, &link).await {
                    Some(fields) => {
                        fields.apply_to(candidate);
                        detailed += 1;
                    }
                    None => debug!(title = %candidate.job_title, "Keeping list-page data"),
                }
            }
            if let Some(lookup) = &self.profile.redirect {
                if let Some(direct) = resolve_redirect(browser, lookup, &candidate.apply_link).await {
                    info!(title = %candidate.job_title, link = %direct, "Captured direct apply link");
                    candidate.apply_link = direct;
                    redirected += 1;
                }
            }
        }

        info!(detailed, redirected, "Follow-up lookups finished");
        Ok(())
    }

    async fn drive<P: PageDriver>(
        &self,
        page: &P,
        target: &Target,
        extractor: &mut CardExtractor,
        cap: usize,
    ) -> Result<Vec<RawCandidate>> {
        let started = Instant::now();
        info!(url = %target.url, "Navigating");
        page.goto(&target.url, self.profile.navigation_timeout).await?;
        sleep(self.profile.settle_delay).await;

        let blocked_by = self.check_block(page, target).await?;

        self.reveal(page).await;

        let card_query = self.profile.selectors.card_query();
        let visible = page.count(&card_query).await?;
        if visible == 0 {
            warn!("No cards found on page");
            self.dump(page, &format!("{}_no_cards", target.name)).await;
        }
        let to_extract = visible.min(cap);
        info!(visible, to_extract, "Extracting cards");

        let page_url = page.current_url().await.unwrap_or_else(|_| target.url.clone());
        let mut candidates = Vec::with_capacity(to_extract);
        for index in 0..to_extract {
            match self.extract_card(page, &card_query, index, &page_url, extractor).await {
                Ok(Some(candidate)) => {
                    if let Some(admitted) = extractor.admit(candidate) {
                        debug!(index, title = %admitted.job_title, "Extracted card");
                        candidates.push(admitted);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(index, error = %e, "Skipping card"),
            }
        }

        info!(
            count = candidates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Session extraction finished"
        );

        match blocked_by {
            Some(marker) if candidates.is_empty() => Err(ScrapeError::Blocked {
                url: target.url.clone(),
                marker: marker.to_string(),
            }),
            _ => Ok(candidates),
        }
    }

    /// Returns the marker still present after one reload, if any.
    async fn check_block<P: PageDriver>(
        &self,
        page: &P,
        target: &Target,
    ) -> Result<Option<&'static str>> {
        let Some(marker) = self.block_marker(page).await else {
            return Ok(None);
        };
        warn!(marker, "Block page detected; reloading");
        self.dump(page, &format!("{}_blocked", target.name)).await;

        page.reload(self.profile.navigation_timeout).await?;
        sleep(self.profile.block_recheck_delay).await;

        match self.block_marker(page).await {
            Some(marker) => {
                warn!(marker, "Still blocked after reload; attempting extraction anyway");
                Ok(Some(marker))
            }
            None => {
                info!("Block page cleared after reload");
                Ok(None)
            }
        }
    }

    async fn block_marker<P: PageDriver>(&self, page: &P) -> Option<&'static str> {
        let title = page.title().await.unwrap_or_default();
        let body = page.body_text().await.unwrap_or_default();
        find_block_marker(&title).or_else(|| find_block_marker(&body))
    }

    /// Progressive reveal loop. Every step is best-effort.
    async fn reveal<P: PageDriver>(&self, page: &P) {
        let tuning = &self.profile.reveal;
        let card_query = self.profile.selectors.card_query();

        for iteration in 0..tuning.iterations {
            for selector in &tuning.load_more {
                match page.click_first(selector).await {
                    Ok(true) => {
                        debug!(iteration, selector = %selector, "Clicked load more");
                        sleep(tuning.load_more_pause).await;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => debug!(iteration, error = %e, "Load more click failed"),
                }
            }

            if let Err(e) = page.scroll_by(tuning.scroll_step_px).await {
                debug!(iteration, error = %e, "Scroll failed");
            }
            sleep(tuning.scroll_pause).await;

            match page.count(&card_query).await {
                Ok(visible) if visible > tuning.visible_cap => {
                    info!(iteration, visible, "Visible card cap exceeded; stopping reveal");
                    break;
                }
                Ok(visible) => debug!(iteration, visible, "Reveal iteration"),
                Err(e) => debug!(iteration, error = %e, "Card count failed"),
            }
        }
    }

    async fn extract_card<P: PageDriver>(
        &self,
        page: &P,
        card_query: &str,
        index: usize,
        page_url: &str,
        extractor: &CardExtractor,
    ) -> Result<Option<RawCandidate>> {
        match page.focus_and_click(card_query, index).await {
            Ok(true) => sleep(self.profile.card_click_pause).await,
            Ok(false) => debug!(index, "Card vanished before click"),
            Err(e) => debug!(index, error = %e, "Card click failed"),
        }

        let Some(html) = page.outer_html(card_query, index).await? else {
            return Err(ScrapeError::ExtractionMiss {
                index,
                message: "card element not found".to_string(),
            });
        };
        let page_html = page.content().await.ok();

        extractor.extract(&CardSnapshot {
            index,
            html: &html,
            page_html: page_html.as_deref(),
            page_url,
        })
    }

    async fn dump<P: PageDriver>(&self, page: &P, label: &str) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        match page.content().await {
            Ok(html) => {
                dump_html(dir, label, &html).await;
            }
            Err(e) => debug!(error = %e, "Could not read page for snapshot"),
        }
    }
}

/// Time-boxed visit to a listing's own page. Never fails the session.
async fn fetch_detail<B: BrowserHandle>(
    browser: &B,
    identity: &PageIdentity,
    lookup: &DetailLookup,
    extractor: &DetailExtractor,
    link: &str,
) -> Option<DetailFields> {
    let page = match browser.open_page(identity).await {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "Could not open detail page");
            return None;
        }
    };

    let read = async {
        page.goto(link, lookup.budget).await?;
        sleep(lookup.settle_delay).await;
        page.content().await
    };
    let fields = match tokio::time::timeout(lookup.budget, read).await {
        Ok(Ok(html)) => Some(extractor.extract(&html, link)),
        Ok(Err(e)) => {
            debug!(link = %truncate_for_log(link, 120), error = %e, "Detail page failed");
            None
        }
        Err(_) => {
            debug!(link = %truncate_for_log(link, 120), "Detail page timed out");
            None
        }
    };
    page.close().await;
    fields
}

/// Extract the listing id carried in `id_param` of `link`.
fn listing_id(lookup: &RedirectLookup, link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == lookup.id_param.as_str())
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
}

/// Whether `url` points somewhere other than the listing site or a social host.
fn is_external(lookup: &RedirectLookup, url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    !lookup
        .internal_hosts
        .iter()
        .chain(&lookup.ignored_hosts)
        .any(|h| url.contains(h.as_str()))
}

/// Time-boxed side lookup on an auxiliary page. Never fails the session.
async fn resolve_redirect<B: BrowserHandle>(
    browser: &B,
    lookup: &RedirectLookup,
    apply_link: &str,
) -> Option<String> {
    let id = listing_id(lookup, apply_link)?;
    let partner_url = lookup.partner_url.replace("{id}", &id);

    let identity = PageIdentity {
        user_agent: MOBILE_USER_AGENT.to_string(),
        viewport_width: 390,
        viewport_height: 844,
        disable_cache: true,
        block_assets: false,
    };
    let page = match browser.open_page(&identity).await {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "Could not open redirect lookup page");
            return None;
        }
    };

    let lookup_run = async {
        if let Err(e) = page.goto(&partner_url, lookup.budget).await {
            debug!(url = %partner_url, error = %e, "Partner navigation did not complete");
        }
        loop {
            match page.current_url().await {
                Ok(current) if is_external(lookup, &current) => return Some(current),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Could not read redirect page URL"),
            }
            sleep(REDIRECT_POLL).await;
        }
    };
    let resolved = match tokio::time::timeout(lookup.budget, lookup_run).await {
        Ok(found) => found,
        Err(_) => {
            debug!(link = %truncate_for_log(apply_link, 120), "Redirect lookup timed out");
            None
        }
    };
    page.close().await;
    resolved
}
