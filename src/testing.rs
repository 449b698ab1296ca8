//! Test fixtures: record builders and a scripted in-memory browser.
//!
//! [`FakeWeb`] holds a set of sites keyed by URL. Each site is a list of
//! HTML snapshots; a successful "load more" click advances to the next one.
//! Pages evaluate selectors with `scraper`, so the session code under test
//! runs unchanged against them.

use crate::browser::{BrowserHandle, BrowserLauncher, PageDriver};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, RawCandidate};
use crate::session::profile::PageIdentity;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub(crate) fn candidate(title: &str, company: &str, location: &str) -> RawCandidate {
    RawCandidate {
        job_title: title.to_string(),
        company_name: company.to_string(),
        job_location: location.to_string(),
        salary_text: String::new(),
        raw_description: format!("{title} at {company}"),
        apply_link: "http://example.test/apply".to_string(),
        logo_url: "http://example.test/logo.png".to_string(),
        ..RawCandidate::default()
    }
}

pub(crate) fn listing(title: &str, company: &str, location: &str) -> Listing {
    Listing {
        job_title: title.to_string(),
        company_name: company.to_string(),
        job_location: location.to_string(),
        seo_title: format!("{title} Jobs in {location} – Salary Competitive Salary – Apply Now"),
        min_price: " ".to_string(),
        max_price: "Competitive Salary".to_string(),
        salary_type: "Yearly".to_string(),
        posting_date: "2024-05-01".to_string(),
        experience_level: "Mid-Level".to_string(),
        employment_type: "Full-time".to_string(),
        company_logo: "http://example.test/logo.png".to_string(),
        description: "<p>Role</p>".to_string(),
        apply_link: "http://example.test/apply".to_string(),
        skills: vec!["Software Development".to_string()],
    }
}

/// One card in the markup both built-in profiles understand.
pub(crate) fn card_html(title: &str, company: &str, location: &str, link: &str) -> String {
    format!(
        r#"<li data-test="jobListItem"><a data-test="job-link" class="job-title" href="{link}">{title}</a><span data-test="employer-name" class="employer-name">{company}</span><div data-test="location" class="location">{location}</div><div data-test="detailSalary" class="salary">$100K - $130K</div><img data-test="employer-logo" class="employer-logo" src="https://cdn.example.test/logo.png"></li>"#
    )
}

pub(crate) fn page_html(cards: &[String]) -> String {
    format!(
        "<html><head><title>Jobs</title></head><body><ul>{}</ul></body></html>",
        cards.concat()
    )
}

/// Like [`page_html`] with a "load more" button after the list.
pub(crate) fn page_html_more(cards: &[String]) -> String {
    format!(
        r#"<html><head><title>Jobs</title></head><body><ul>{}</ul><button data-test="load-more">Show more jobs</button></body></html>"#,
        cards.concat()
    )
}

/// Like [`page_html`] with cards marked up as `data-test="jobListing"`.
pub(crate) fn page_html_listing(cards: &[String]) -> String {
    let items: String = cards
        .iter()
        .map(|c| c.replacen("data-test=\"jobListItem\"", "data-test=\"jobListing\"", 1))
        .collect();
    format!("<html><head><title>Jobs</title></head><body><ul>{items}</ul></body></html>")
}

const CHALLENGE_TITLE: &str = "Just a moment...";
const CHALLENGE_BODY: &str = "Please complete the security check to continue.";

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSite {
    snapshots: Vec<String>,
    /// `Some(persistent)` serves a challenge page first.
    challenge: Option<bool>,
    redirect_to: Option<String>,
}

impl FakeSite {
    pub(crate) fn pages(snapshots: Vec<String>) -> Self {
        Self {
            snapshots,
            ..Self::default()
        }
    }

    /// Serve a challenge page; a non-persistent one clears on reload.
    pub(crate) fn challenge(mut self, persistent: bool) -> Self {
        self.challenge = Some(persistent);
        self
    }

    /// Report `url` as the page URL after navigation.
    pub(crate) fn redirect_to(mut self, url: &str) -> Self {
        self.redirect_to = Some(url.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct WebState {
    sites: HashMap<String, FakeSite>,
    fail_launches: usize,
    fail_navigations: usize,
    fail_cards: HashSet<usize>,
    fail_clicks: HashSet<usize>,
    fail_load_more: bool,
    launches: usize,
    browser_closes: usize,
    open_pages: isize,
    reloads: usize,
    load_more_clicks: usize,
    visits: Vec<String>,
}

/// Shared handle to the scripted web; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeWeb {
    state: Arc<Mutex<WebState>>,
}

impl FakeWeb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, WebState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_site(&self, url: &str, site: FakeSite) {
        self.state().sites.insert(url.to_string(), site);
    }

    /// Make the next `n` launches fail.
    pub(crate) fn fail_launches(&self, n: usize) {
        self.state().fail_launches = n;
    }

    /// Make the next `n` navigations time out.
    pub(crate) fn fail_navigations(&self, n: usize) {
        self.state().fail_navigations = n;
    }

    /// Make reading the `index`-th card fail on every page.
    pub(crate) fn fail_card(&self, index: usize) {
        self.state().fail_cards.insert(index);
    }

    /// Make clicking the `index`-th card fail on every page.
    pub(crate) fn fail_click(&self, index: usize) {
        self.state().fail_clicks.insert(index);
    }

    /// Make every "load more" click fail.
    pub(crate) fn fail_load_more(&self) {
        self.state().fail_load_more = true;
    }

    pub(crate) fn launcher(&self) -> FakeLauncher {
        FakeLauncher { web: self.clone() }
    }

    pub(crate) fn launches(&self) -> usize {
        self.state().launches
    }

    pub(crate) fn browser_closes(&self) -> usize {
        self.state().browser_closes
    }

    pub(crate) fn open_pages(&self) -> isize {
        self.state().open_pages
    }

    pub(crate) fn reloads(&self) -> usize {
        self.state().reloads
    }

    pub(crate) fn load_more_clicks(&self) -> usize {
        self.state().load_more_clicks
    }

    pub(crate) fn visits(&self) -> Vec<String> {
        self.state().visits.clone()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeLauncher {
    web: FakeWeb,
}

impl BrowserLauncher for FakeLauncher {
    type Browser = FakeBrowser;

    async fn launch(&self) -> Result<FakeBrowser> {
        let mut state = self.web.state();
        if state.fail_launches > 0 {
            state.fail_launches -= 1;
            return Err(ScrapeError::LaunchFailure("chromium not found".to_string()));
        }
        state.launches += 1;
        Ok(FakeBrowser {
            web: self.web.clone(),
        })
    }
}

pub(crate) struct FakeBrowser {
    web: FakeWeb,
}

impl BrowserHandle for FakeBrowser {
    type Page = FakePage;

    async fn open_page(&self, _identity: &PageIdentity) -> Result<FakePage> {
        self.web.state().open_pages += 1;
        Ok(FakePage {
            web: self.web.clone(),
            view: Mutex::new(PageView {
                url: "about:blank".to_string(),
                site: None,
                snapshot: 0,
                challenged: false,
            }),
        })
    }

    async fn close(self) {
        self.web.state().browser_closes += 1;
    }
}

#[derive(Debug)]
struct PageView {
    url: String,
    site: Option<FakeSite>,
    snapshot: usize,
    challenged: bool,
}

impl PageView {
    fn html(&self) -> String {
        self.site
            .as_ref()
            .and_then(|s| s.snapshots.get(self.snapshot))
            .cloned()
            .unwrap_or_default()
    }
}

pub(crate) struct FakePage {
    web: FakeWeb,
    view: Mutex<PageView>,
}

fn detached(what: &str) -> ScrapeError {
    ScrapeError::Navigation {
        url: "current page".to_string(),
        message: format!("{what}: node is detached from document"),
    }
}

fn selector(sel: &str) -> Result<Selector> {
    Selector::parse(sel).map_err(|e| ScrapeError::Config(e.to_string()))
}

impl FakePage {
    fn view(&self) -> MutexGuard<'_, PageView> {
        self.view.lock().unwrap()
    }

    fn matches(&self, sel: &str) -> Result<Vec<String>> {
        let sel = selector(sel)?;
        let doc = Html::parse_document(&self.view().html());
        Ok(doc.select(&sel).map(|e| e.html()).collect())
    }
}

impl PageDriver for FakePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        let mut state = self.web.state();
        state.visits.push(url.to_string());
        if state.fail_navigations > 0 {
            state.fail_navigations -= 1;
            return Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            });
        }
        let Some(site) = state.sites.get(url).cloned() else {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        };
        drop(state);

        let mut view = self.view();
        view.url = site.redirect_to.clone().unwrap_or_else(|| url.to_string());
        view.challenged = site.challenge.is_some();
        view.snapshot = 0;
        view.site = Some(site);
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        self.web.state().reloads += 1;
        let mut view = self.view();
        if view.site.as_ref().and_then(|s| s.challenge) == Some(false) {
            view.challenged = false;
        }
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        if self.view().challenged {
            return Ok(CHALLENGE_TITLE.to_string());
        }
        let doc = Html::parse_document(&self.view().html());
        let title = selector("title")?;
        Ok(doc
            .select(&title)
            .next()
            .map(|t| t.text().collect())
            .unwrap_or_default())
    }

    async fn body_text(&self) -> Result<String> {
        if self.view().challenged {
            return Ok(CHALLENGE_BODY.to_string());
        }
        let doc = Html::parse_document(&self.view().html());
        let body = selector("body")?;
        Ok(doc
            .select(&body)
            .next()
            .map(|b| b.text().collect::<Vec<_>>().join(" "))
            .unwrap_or_default())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.view().url.clone())
    }

    async fn content(&self) -> Result<String> {
        Ok(self.view().html())
    }

    async fn count(&self, sel: &str) -> Result<usize> {
        Ok(self.matches(sel)?.len())
    }

    async fn click_first(&self, sel: &str) -> Result<bool> {
        if self.web.state().fail_load_more {
            return Err(detached("click"));
        }
        if self.matches(sel)?.is_empty() {
            return Ok(false);
        }
        self.web.state().load_more_clicks += 1;
        let mut view = self.view();
        let last = view.site.as_ref().map_or(0, |s| s.snapshots.len().saturating_sub(1));
        if view.snapshot < last {
            view.snapshot += 1;
        }
        Ok(true)
    }

    async fn scroll_by(&self, _pixels: u32) -> Result<()> {
        Ok(())
    }

    async fn focus_and_click(&self, sel: &str, index: usize) -> Result<bool> {
        if self.web.state().fail_clicks.contains(&index) {
            return Err(detached("click"));
        }
        Ok(index < self.matches(sel)?.len())
    }

    async fn outer_html(&self, sel: &str, index: usize) -> Result<Option<String>> {
        if self.web.state().fail_cards.contains(&index) {
            return Err(detached("outerHTML"));
        }
        Ok(self.matches(sel)?.into_iter().nth(index))
    }

    async fn close(self) {
        self.web.state().open_pages -= 1;
    }
}
