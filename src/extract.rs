//! Per-card field extraction and in-session dedup.
//!
//! Extraction is data-driven: every field has an ordered list of CSS
//! selectors and the first one that yields non-empty text wins. The rules
//! run against HTML snapshots (`scraper`), so they are testable without a
//! live browser.
//!
//! | Field | Source | Fallback |
//! |-------|--------|----------|
//! | title | card | card is discarded |
//! | company | card, rating suffix stripped | `"Unknown Company"` if a logo exists, else discarded |
//! | location | card | `"Remote"` |
//! | salary | card | empty |
//! | description | page detail pane longer than 50 chars | card's own text |
//! | apply link | card `href`, resolved against the page | page URL |
//! | logo | card `src` / `data-src` | placeholder image |
//!
//! [`DetailExtractor`] reads the same kind of rules from a listing's own
//! detail page and overlays what it finds onto an extracted candidate.

use crate::error::{Result, ScrapeError};
use crate::models::RawCandidate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

pub const DEFAULT_LOCATION: &str = "Remote";
pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const PLACEHOLDER_LOGO: &str = "https://i.imgur.com/0qGt7qj.png";
/// A detail pane must carry more text than this to be used as the description.
pub const MIN_DESCRIPTION_LEN: usize = 50;

/// Trailing employer rating such as `"Acme Corp 4.2"`.
static RATING_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+\d+(\.\d+)?\s*$").expect("valid rating regex"));

/// Ordered selector fallbacks for every extracted field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSelectors {
    /// Selectors that identify a card; combined into one query so cards are
    /// visited in document order.
    pub cards: Vec<String>,
    pub title: Vec<String>,
    pub company: Vec<String>,
    pub location: Vec<String>,
    pub salary: Vec<String>,
    pub link: Vec<String>,
    pub logo: Vec<String>,
    /// Page-level selectors for the detail pane opened by clicking a card.
    pub detail_pane: Vec<String>,
}

impl CardSelectors {
    /// All card selectors joined into a single selector group.
    pub fn card_query(&self) -> String {
        self.cards.join(", ")
    }
}

/// Strip a trailing numeric rating from an employer name.
pub fn normalize_company(raw: &str) -> String {
    RATING_SUFFIX.replace(raw.trim(), "").trim().to_string()
}

fn compile(field: &str, selectors: &[String]) -> Result<Vec<Selector>> {
    selectors
        .iter()
        .map(|s| {
            Selector::parse(s)
                .map_err(|e| ScrapeError::Config(format!("invalid {field} selector {s:?}: {e}")))
        })
        .collect()
}

/// Visible text of an element on one line.
fn inline_text(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Visible text of an element, one trimmed text node per line.
fn block_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn first_element<'a>(root: ElementRef<'a>, rule: &[Selector]) -> Option<ElementRef<'a>> {
    rule.iter().find_map(|sel| root.select(sel).next())
}

fn first_text(root: ElementRef<'_>, rule: &[Selector]) -> Option<String> {
    rule.iter()
        .flat_map(|sel| root.select(sel))
        .map(inline_text)
        .find(|t| !t.is_empty())
}

fn first_attr(root: ElementRef<'_>, rule: &[Selector], attrs: &[&str]) -> Option<String> {
    rule.iter().flat_map(|sel| root.select(sel)).find_map(|el| {
        attrs
            .iter()
            .filter_map(|a| el.value().attr(a))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// One card as captured from the live page.
#[derive(Debug, Clone, Copy)]
pub struct CardSnapshot<'a> {
    pub index: usize,
    /// Outer HTML of the card element.
    pub html: &'a str,
    /// Full page HTML after the card was clicked, if it could be captured.
    pub page_html: Option<&'a str>,
    pub page_url: &'a str,
}

#[derive(Debug)]
struct CompiledSelectors {
    title: Vec<Selector>,
    company: Vec<Selector>,
    location: Vec<Selector>,
    salary: Vec<Selector>,
    link: Vec<Selector>,
    logo: Vec<Selector>,
    detail_pane: Vec<Selector>,
}

/// Extracts [`RawCandidate`]s from card snapshots and drops repeats within
/// one session by lowercase `title-company`.
#[derive(Debug)]
pub struct CardExtractor {
    rules: CompiledSelectors,
    seen: HashSet<String>,
}

impl CardExtractor {
    pub fn new(selectors: &CardSelectors) -> Result<Self> {
        Ok(Self {
            rules: CompiledSelectors {
                title: compile("title", &selectors.title)?,
                company: compile("company", &selectors.company)?,
                location: compile("location", &selectors.location)?,
                salary: compile("salary", &selectors.salary)?,
                link: compile("link", &selectors.link)?,
                logo: compile("logo", &selectors.logo)?,
                detail_pane: compile("detail pane", &selectors.detail_pane)?,
            },
            seen: HashSet::new(),
        })
    }

    /// Text of the first detail pane longer than [`MIN_DESCRIPTION_LEN`].
    pub fn detail_pane_text(&self, page_html: &str) -> Option<String> {
        let document = Html::parse_document(page_html);
        self.rules
            .detail_pane
            .iter()
            .flat_map(|sel| document.select(sel).take(1))
            .map(block_text)
            .find(|t| t.chars().count() > MIN_DESCRIPTION_LEN)
    }

    /// Pull the fields out of one card.
    ///
    /// Returns `Ok(None)` when the card lacks a title, or lacks both a
    /// company and a logo.
    pub fn extract(&self, card: &CardSnapshot<'_>) -> Result<Option<RawCandidate>> {
        let fragment = Html::parse_fragment(card.html);
        let root = fragment.root_element();

        let Some(job_title) = first_text(root, &self.rules.title) else {
            debug!(index = card.index, "Card has no title");
            return Ok(None);
        };

        let company = first_text(root, &self.rules.company);
        let logo = first_attr(root, &self.rules.logo, &["src", "data-src"]);
        let has_logo_element = first_element(root, &self.rules.logo).is_some();
        if company.is_none() && !has_logo_element {
            debug!(index = card.index, %job_title, "Card has neither company nor logo");
            return Ok(None);
        }

        let company_name = company
            .map(|c| normalize_company(&c))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| UNKNOWN_COMPANY.to_string());

        let job_location =
            first_text(root, &self.rules.location).unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let salary_text = first_text(root, &self.rules.salary).unwrap_or_default();

        let raw_description = card
            .page_html
            .and_then(|html| self.detail_pane_text(html))
            .unwrap_or_else(|| block_text(root));

        let apply_link = match first_attr(root, &self.rules.link, &["href"]) {
            Some(href) => resolve_link(card.page_url, &href).ok_or_else(|| {
                ScrapeError::ExtractionMiss {
                    index: card.index,
                    message: format!("unresolvable link {href:?}"),
                }
            })?,
            None => card.page_url.to_string(),
        };

        Ok(Some(RawCandidate {
            job_title,
            company_name,
            job_location,
            salary_text,
            raw_description,
            apply_link,
            logo_url: logo.unwrap_or_else(|| PLACEHOLDER_LOGO.to_string()),
            ..RawCandidate::default()
        }))
    }

    /// Admit a candidate unless one with the same session key was already admitted.
    pub fn admit(&mut self, candidate: RawCandidate) -> Option<RawCandidate> {
        if self.seen.insert(candidate.session_key()) {
            Some(candidate)
        } else {
            debug!(title = %candidate.job_title, company = %candidate.company_name, "Duplicate card in session");
            None
        }
    }
}

/// Selectors read from a listing's own detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSelectors {
    pub description: Vec<String>,
    pub employment_type: Vec<String>,
    pub experience_level: Vec<String>,
    pub salary: Vec<String>,
    pub logo: Vec<String>,
}

/// What a detail page added; `None` where it had nothing usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub description: Option<String>,
    pub employment_type: Option<String>,
    pub experience_level: Option<String>,
    pub salary_text: Option<String>,
    pub logo_url: Option<String>,
}

impl DetailFields {
    /// Overlay onto `candidate`, keeping list-page values where the detail
    /// page had nothing. Identity fields are never touched.
    pub fn apply_to(self, candidate: &mut RawCandidate) {
        if let Some(description) = self.description {
            candidate.raw_description = description;
        }
        if let Some(salary) = self.salary_text {
            candidate.salary_text = salary;
        }
        if let Some(logo) = self.logo_url {
            candidate.logo_url = logo;
        }
        candidate.employment_type = self.employment_type.or(candidate.employment_type.take());
        candidate.experience_level = self.experience_level.or(candidate.experience_level.take());
    }
}

#[derive(Debug)]
pub struct DetailExtractor {
    description: Vec<Selector>,
    employment_type: Vec<Selector>,
    experience_level: Vec<Selector>,
    salary: Vec<Selector>,
    logo: Vec<Selector>,
}

impl DetailExtractor {
    pub fn new(selectors: &DetailSelectors) -> Result<Self> {
        Ok(Self {
            description: compile("detail description", &selectors.description)?,
            employment_type: compile("employment type", &selectors.employment_type)?,
            experience_level: compile("experience level", &selectors.experience_level)?,
            salary: compile("detail salary", &selectors.salary)?,
            logo: compile("detail logo", &selectors.logo)?,
        })
    }

    /// Read a rendered detail page served from `page_url`.
    pub fn extract(&self, page_html: &str, page_url: &str) -> DetailFields {
        let document = Html::parse_document(page_html);
        let root = document.root_element();

        let description = self
            .description
            .iter()
            .flat_map(|sel| document.select(sel).take(1))
            .map(block_text)
            .find(|t| t.chars().count() > MIN_DESCRIPTION_LEN);
        // Only a figure is worth replacing the card's salary text.
        let salary_text = first_text(root, &self.salary)
            .filter(|t| t.chars().any(|c| c.is_ascii_digit()));
        let logo_url = first_attr(root, &self.logo, &["src", "data-src"])
            .and_then(|src| resolve_link(page_url, &src));

        DetailFields {
            description,
            employment_type: first_text(root, &self.employment_type),
            experience_level: first_text(root, &self.experience_level),
            salary_text,
            logo_url,
        }
    }
}

/// Resolve `href` against the page URL, keeping absolute links as they are.
fn resolve_link(page_url: &str, href: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Some(absolute.to_string());
    }
    Url::parse(page_url)
        .ok()?
        .join(href)
        .ok()
        .map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::profile::SessionProfile;

    const PAGE_URL: &str = "https://jobs.example.com/search?q=rust";

    fn extractor() -> CardExtractor {
        CardExtractor::new(&SessionProfile::interactive().selectors).unwrap()
    }

    fn card(html: &str) -> CardSnapshot<'_> {
        CardSnapshot {
            index: 0,
            html,
            page_html: None,
            page_url: PAGE_URL,
        }
    }

    const FULL_CARD: &str = r#"
        <li data-test="jobListItem">
            <a data-test="job-link" href="/job/123?jl=987">Senior Rust Engineer</a>
            <span data-test="employer-name">Acme Corp 4.2</span>
            <div data-test="location">Austin, TX</div>
            <div data-test="detailSalary">$120K - $150K (Employer est.)</div>
            <img data-test="employer-logo" src="https://cdn.example.com/acme.png">
        </li>"#;

    #[test]
    fn test_normalize_company_strips_rating() {
        assert_eq!(normalize_company("Acme Corp 4.2"), "Acme Corp");
        assert_eq!(normalize_company("Initech 5 "), "Initech");
        assert_eq!(normalize_company("3M"), "3M");
        assert_eq!(normalize_company("Studio 54 Labs"), "Studio 54 Labs");
    }

    #[test]
    fn test_extracts_all_fields() {
        let c = extractor().extract(&card(FULL_CARD)).unwrap().unwrap();
        assert_eq!(c.job_title, "Senior Rust Engineer");
        assert_eq!(c.company_name, "Acme Corp");
        assert_eq!(c.job_location, "Austin, TX");
        assert_eq!(c.salary_text, "$120K - $150K (Employer est.)");
        assert_eq!(c.apply_link, "https://jobs.example.com/job/123?jl=987");
        assert_eq!(c.logo_url, "https://cdn.example.com/acme.png");
        assert!(c.raw_description.contains("Senior Rust Engineer"));
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let html = r#"<li data-test="jobListItem">
            <div data-test="job-title">Data Analyst</div>
            <span data-test="employer-name">Globex</span>
        </li>"#;
        let c = extractor().extract(&card(html)).unwrap().unwrap();
        assert_eq!(c.job_location, DEFAULT_LOCATION);
        assert_eq!(c.salary_text, "");
        assert_eq!(c.apply_link, PAGE_URL);
        assert_eq!(c.logo_url, PLACEHOLDER_LOGO);
    }

    #[test]
    fn test_logo_without_company_is_kept() {
        let html = r#"<li data-test="jobListItem">
            <div data-test="job-title">QA Engineer</div>
            <img data-test="employer-logo" data-src="https://cdn.example.com/x.png">
        </li>"#;
        let c = extractor().extract(&card(html)).unwrap().unwrap();
        assert_eq!(c.company_name, UNKNOWN_COMPANY);
        assert_eq!(c.logo_url, "https://cdn.example.com/x.png");
    }

    #[test]
    fn test_unextractable_cards_are_discarded() {
        let no_title = r#"<li data-test="jobListItem"><span data-test="employer-name">Acme</span></li>"#;
        let no_company = r#"<li data-test="jobListItem"><div data-test="job-title">Engineer</div></li>"#;
        let ex = extractor();
        assert!(ex.extract(&card(no_title)).unwrap().is_none());
        assert!(ex.extract(&card(no_company)).unwrap().is_none());
    }

    #[test]
    fn test_selector_priority_order() {
        let html = r#"<li data-test="jobListItem">
            <a data-test="job-link" href="/j/1">Link text title</a>
            <div class="JobCard_jobTitle__x">Preferred title</div>
            <span data-test="employer-name">Acme</span>
        </li>"#;
        let c = extractor().extract(&card(html)).unwrap().unwrap();
        assert_eq!(c.job_title, "Preferred title");
    }

    #[test]
    fn test_description_prefers_long_detail_pane() {
        let page = format!(
            r#"<html><body>
                <div data-test="jobDescription">short</div>
                <div class="jobDescriptionContent">{}</div>
            </body></html>"#,
            "Build reliable distributed systems in Rust. ".repeat(3)
        );
        let snapshot = CardSnapshot {
            page_html: Some(&page),
            ..card(FULL_CARD)
        };
        let c = extractor().extract(&snapshot).unwrap().unwrap();
        assert!(c.raw_description.starts_with("Build reliable distributed systems"));
    }

    #[test]
    fn test_description_falls_back_to_card_text() {
        let page = r#"<html><body><div data-test="jobDescription">too short</div></body></html>"#;
        let snapshot = CardSnapshot {
            page_html: Some(page),
            ..card(FULL_CARD)
        };
        let c = extractor().extract(&snapshot).unwrap().unwrap();
        assert!(c.raw_description.contains("Acme Corp 4.2"));
    }

    #[test]
    fn test_admit_keys_on_title_and_company() {
        let mut ex = extractor();
        let first = crate::testing::candidate("Engineer", "Acme", "NY");
        let same_place = crate::testing::candidate("engineer", "ACME", "NY");
        let other_place = crate::testing::candidate("Engineer", "Acme", "SF");
        assert!(ex.admit(first).is_some());
        assert!(ex.admit(same_place).is_none());
        assert!(ex.admit(other_place).is_none());
    }

    fn detail_extractor() -> DetailExtractor {
        let lookup = SessionProfile::continuous()
            .detail
            .expect("continuous profile reads detail pages");
        DetailExtractor::new(&lookup.selectors).unwrap()
    }

    #[test]
    fn test_detail_page_fields() {
        let page = format!(
            r#"<html><body>
                <div class="jobDescriptionContent">{}</div>
                <span class="job-type">Contract</span>
                <div class="experienceLevel">Senior</div>
                <div class="salaryEstimate">$140K - $170K</div>
                <img class="employer-logo" src="/logos/acme.png">
            </body></html>"#,
            "Own the ingestion pipeline and its on-call rotation. ".repeat(2)
        );
        let fields = detail_extractor().extract(&page, "https://jobs.example.com/job/1");

        assert!(fields.description.unwrap().starts_with("Own the ingestion pipeline"));
        assert_eq!(fields.employment_type.as_deref(), Some("Contract"));
        assert_eq!(fields.experience_level.as_deref(), Some("Senior"));
        assert_eq!(fields.salary_text.as_deref(), Some("$140K - $170K"));
        assert_eq!(
            fields.logo_url.as_deref(),
            Some("https://jobs.example.com/logos/acme.png")
        );
    }

    #[test]
    fn test_detail_fields_keep_list_values_when_missing() {
        let page = r#"<html><body><div class="salary">Not disclosed</div></body></html>"#;
        let fields = detail_extractor().extract(page, "https://jobs.example.com/job/1");
        assert_eq!(fields, DetailFields::default());

        let mut c = crate::testing::candidate("Engineer", "Acme", "NY");
        c.salary_text = "$100K".to_string();
        let before = c.clone();
        fields.apply_to(&mut c);
        assert_eq!(c, before);
    }

    #[test]
    fn test_detail_fields_overlay() {
        let mut c = crate::testing::candidate("Engineer", "Acme", "NY");
        DetailFields {
            description: Some("Full description".to_string()),
            employment_type: Some("Part-time".to_string()),
            ..DetailFields::default()
        }
        .apply_to(&mut c);

        assert_eq!(c.raw_description, "Full description");
        assert_eq!(c.employment_type.as_deref(), Some("Part-time"));
        assert_eq!(c.experience_level, None);
        assert_eq!(c.job_title, "Engineer");
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let mut selectors = SessionProfile::interactive().selectors;
        selectors.title = vec!["[[nope".into()];
        let err = CardExtractor::new(&selectors).unwrap_err();
        assert!(matches!(err, ScrapeError::Config(_)));
    }
}
