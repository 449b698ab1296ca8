//! Tuning and selector profiles for an automation session.
//!
//! The two scraping strategies differ only in data: which selectors find
//! cards and fields, how long to wait, and how aggressively to reveal more
//! results. Both are expressed as a [`SessionProfile`].

use crate::extract::{CardSelectors, DetailSelectors};
use std::time::Duration;

/// Phrases that mark an anti-automation interstitial.
pub const BLOCK_MARKERS: &[&str] = &[
    "Help Us Protect",
    "Just a moment",
    "security check",
    "Pardon Our Interruption",
    "Human Verification",
    "Security Challenge",
];

pub const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_7_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.2 Mobile/15E148 Safari/604.1";

/// Identity a page presents to the target site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageIdentity {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub disable_cache: bool,
    /// Refuse image, stylesheet, font and media requests.
    pub block_assets: bool,
}

/// The bounded click/scroll cycle that forces lazy results to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealTuning {
    pub iterations: usize,
    /// "Load more" affordances, tried in order each iteration.
    pub load_more: Vec<String>,
    pub load_more_pause: Duration,
    pub scroll_step_px: u32,
    pub scroll_pause: Duration,
    /// Stop early once more than this many cards are visible.
    pub visible_cap: usize,
}

/// Optional side lookup that follows a partner redirect to the employer's
/// own application page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectLookup {
    /// URL template with `{id}` replaced by the listing id from the card link.
    pub partner_url: String,
    /// Query parameter in the card link that carries the listing id.
    pub id_param: String,
    /// Hosts that count as "still on the listing site".
    pub internal_hosts: Vec<String>,
    /// Hosts that never count as an employer page.
    pub ignored_hosts: Vec<String>,
    pub budget: Duration,
}

/// Optional follow-up visit to each listing's own page for the full
/// description and the fields the card does not show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLookup {
    pub selectors: DetailSelectors,
    /// Wait after the page loads before reading it.
    pub settle_delay: Duration,
    /// Covers navigation, settling and reading.
    pub budget: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProfile {
    pub name: &'static str,
    pub identity: PageIdentity,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
    /// Wait after reloading a page that showed a block marker.
    pub block_recheck_delay: Duration,
    pub reveal: RevealTuning,
    /// Cards extracted per target.
    pub card_cap: usize,
    /// Cards extracted across a multi-target run.
    pub run_cap: usize,
    pub card_click_pause: Duration,
    pub selectors: CardSelectors,
    pub detail: Option<DetailLookup>,
    pub redirect: Option<RedirectLookup>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl SessionProfile {
    /// Card-clicking strategy: click "show more", scroll, then open each card
    /// so its detail pane renders before extraction.
    pub fn interactive() -> Self {
        Self {
            name: "interactive",
            identity: PageIdentity {
                user_agent: DESKTOP_USER_AGENTS[0].to_string(),
                viewport_width: 1440,
                viewport_height: 900,
                disable_cache: true,
                block_assets: true,
            },
            navigation_timeout: Duration::from_secs(90),
            settle_delay: Duration::from_secs(7),
            block_recheck_delay: Duration::from_secs(10),
            reveal: RevealTuning {
                iterations: 6,
                load_more: strings(&[
                    "button[class*='JobCard_loadMore']",
                    "[data-test='load-more']",
                ]),
                load_more_pause: Duration::from_secs(3),
                scroll_step_px: 1500,
                scroll_pause: Duration::from_secs(2),
                visible_cap: 60,
            },
            card_cap: 60,
            run_cap: 100,
            card_click_pause: Duration::from_millis(1200),
            selectors: CardSelectors {
                cards: strings(&[
                    "[data-test='jobListItem']",
                    "[class*='JobCard_jobCardWrapper']",
                    ".react-job-listing",
                    "[data-test='jobListing']",
                ]),
                title: strings(&[
                    "[class*='JobCard_jobTitle']",
                    "[data-test='job-title']",
                    "a[data-test='job-link']",
                ]),
                company: strings(&[
                    "[class*='EmployerProfile_compactEmployerName']",
                    "[data-test='employer-name']",
                ]),
                location: strings(&["[class*='JobCard_location']", "[data-test='location']"]),
                salary: strings(&[
                    "[class*='JobCard_salaryEstimate']",
                    "[data-test='detailSalary']",
                ]),
                link: strings(&[
                    "a[class*='JobCard_trackingLink']",
                    "a[data-test='job-link']",
                ]),
                logo: strings(&[
                    "img[class*='avatar-base_Image']",
                    "img[data-test='employer-logo']",
                ]),
                detail_pane: strings(&[
                    "[class*='JobDetails_jobDescription']",
                    "[data-test='jobDescription']",
                    ".jobDescriptionContent",
                    "#JobDescriptionContainer",
                    ".desc",
                    "[class*='job-description']",
                ]),
            },
            detail: None,
            redirect: None,
        }
    }

    /// List-scanning strategy used by the continuous loop: scroll the result
    /// list in small steps and read cards in place. New listings are then
    /// followed to their detail page and through the partner redirect.
    pub fn continuous() -> Self {
        Self {
            name: "continuous",
            identity: PageIdentity {
                user_agent: DESKTOP_USER_AGENTS[1].to_string(),
                viewport_width: 1366,
                viewport_height: 768,
                disable_cache: true,
                block_assets: true,
            },
            navigation_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(5),
            block_recheck_delay: Duration::from_secs(10),
            reveal: RevealTuning {
                iterations: 8,
                load_more: Vec::new(),
                load_more_pause: Duration::ZERO,
                scroll_step_px: 800,
                scroll_pause: Duration::from_secs(1),
                visible_cap: 60,
            },
            card_cap: 60,
            run_cap: 100,
            card_click_pause: Duration::from_millis(1200),
            selectors: CardSelectors {
                cards: strings(&[
                    "li[data-test='jobListing']",
                    ".react-job-listing",
                    "li[class*='react-job-listing']",
                    "li[class*='job']",
                    "li[class*='JobsList']",
                ]),
                title: strings(&["a[class*='title']", "a[data-test='job-link']", "a"]),
                company: strings(&[
                    "div[class*='employer']",
                    "span[class*='employer']",
                    "div[class*='company']",
                    "span[class*='company']",
                ]),
                location: strings(&[
                    "div[class*='loc']",
                    "span[class*='loc']",
                    "[data-test='emp-location']",
                ]),
                salary: strings(&["div[class*='salary']", "span[class*='salary']"]),
                link: strings(&["a[class*='title']", "a[data-test='job-link']", "a"]),
                logo: strings(&[
                    "img[class*='logo']",
                    "img[class*='avatar']",
                    ".employerLogo img",
                ]),
                detail_pane: strings(&[
                    "div[class*='jobDescription']",
                    "div[class*='desc']",
                    ".jobDescriptionContent",
                ]),
            },
            detail: Some(DetailLookup {
                selectors: DetailSelectors {
                    description: strings(&[
                        "div[class*='jobDescription']",
                        "div[class*='desc']",
                        ".jobDescriptionContent",
                    ]),
                    employment_type: strings(&["div[class*='employment']", "span[class*='type']"]),
                    experience_level: strings(&[
                        "div[class*='experience']",
                        "span[class*='level']",
                    ]),
                    salary: strings(&["div[class*='salary']", "span[class*='salary']"]),
                    logo: strings(&["img[class*='logo']", "img[class*='avatar']"]),
                },
                settle_delay: Duration::from_secs(2),
                budget: Duration::from_secs(45),
            }),
            redirect: Some(RedirectLookup {
                partner_url: "https://www.glassdoor.co.in/partner/jobListing.htm?jobListingId={id}"
                    .to_string(),
                id_param: "jl".to_string(),
                internal_hosts: strings(&["glassdoor.co"]),
                ignored_hosts: strings(&["facebook", "linkedin", "twitter", "google"]),
                budget: Duration::from_secs(8),
            }),
        }
    }
}
