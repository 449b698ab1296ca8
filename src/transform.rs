//! Converts novel [`RawCandidate`]s into publishable [`Listing`]s.
//!
//! Everything here is pure string work: salary parsing, keyword inference
//! and the description rewrite. The identity fields (title, company,
//! location) are only trimmed, so the upsert key and the fingerprint of a
//! listing always match the candidate it came from.

use crate::models::{Listing, RawCandidate};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use rand::seq::IndexedRandom;
use regex::Regex;
use tracing::debug;

pub const DEFAULT_MIN_PRICE: &str = " ";
pub const DEFAULT_MAX_PRICE: &str = "Competitive Salary";
pub const SALARY_TYPE: &str = "Yearly";
pub const FALLBACK_SKILL: &str = "Software Development";

/// Keywords matched case-insensitively against the raw description.
pub const COMMON_SKILLS: &[&str] = &[
    "REACT",
    "NODE.JS",
    "MONGODB",
    "EXPRESS",
    "PYTHON",
    "JAVA",
    "SQL",
    "AWS",
    "DOCKER",
    "KUBERNETES",
    "TAILWIND CSS",
    "JAVASCRIPT",
    "TYPESCRIPT",
    "DEVOP",
    "RUST",
];

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digits regex"));

/// Produces the published description for one listing.
///
/// Implementations must be pure: the same inputs may yield different text
/// (templates can vary) but never touch shared state.
pub trait DescriptionRewriter {
    fn rewrite(&self, title: &str, company: &str, location: &str, raw_description: &str) -> String;
}

/// Parse salary text into `(min, max)` strings.
///
/// Currency symbols and separators are dropped; a `K` anywhere in the text
/// multiplies every number by 1000. One number only sets the minimum. A
/// figure that does not fit in a `u64` after scaling keeps its default.
pub fn parse_salary(text: &str) -> (String, String) {
    let mut min = DEFAULT_MIN_PRICE.to_string();
    let mut max = DEFAULT_MAX_PRICE.to_string();
    if text.trim().is_empty() {
        return (min, max);
    }

    let thousands = text.to_uppercase().contains('K');
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | 'K' | 'k' | '₹'))
        .collect();
    let scale = |n: &str| -> Option<String> {
        let v = n.parse::<u64>().ok()?;
        if thousands {
            v.checked_mul(1000).map(|v| v.to_string())
        } else {
            Some(v.to_string())
        }
    };

    let numbers = DIGITS.find_iter(&cleaned).map(|m| m.as_str()).collect_vec();
    match numbers.as_slice() {
        [] => {}
        [only] => min = scale(only).unwrap_or(min),
        [lo, hi, ..] => {
            min = scale(lo).unwrap_or(min);
            max = scale(hi).unwrap_or(max);
        }
    }
    (min, max)
}

/// `$123,456` for a plain integer, `None` for anything else.
fn format_money(value: &str) -> Option<String> {
    let n: u64 = value.trim().parse().ok()?;
    let digits = n.to_string();
    let grouped = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .join(",");
    Some(format!("${grouped}"))
}

/// Search headline: `"<title> Jobs in <location> – Salary <figure> – Apply Now"`.
///
/// The figure is the formatted maximum, else the formatted minimum, else
/// `"Competitive Salary"`.
pub fn seo_title(title: &str, location: &str, min: &str, max: &str) -> String {
    let salary = format_money(max)
        .or_else(|| format_money(min))
        .unwrap_or_else(|| DEFAULT_MAX_PRICE.to_string());
    let location = if location.trim().is_empty() {
        "USA"
    } else {
        location
    };
    format!("{title} Jobs in {location} – Salary {salary} – Apply Now")
}

pub fn experience_level(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    if lower.contains("senior") {
        "Senior"
    } else if lower.contains("junior") {
        "Junior"
    } else {
        "Mid-Level"
    }
}

pub fn employment_type(description: &str) -> &'static str {
    if description.to_lowercase().contains("contract") {
        "Contract"
    } else {
        "Full-time"
    }
}

pub fn extract_skills(description: &str) -> Vec<String> {
    let upper = description.to_uppercase();
    let skills = COMMON_SKILLS
        .iter()
        .filter(|skill| upper.contains(*skill))
        .map(|skill| skill.to_string())
        .unique()
        .collect_vec();
    if skills.is_empty() {
        vec![FALLBACK_SKILL.to_string()]
    } else {
        skills
    }
}

fn stated_or(stated: &Option<String>, inferred: impl FnOnce() -> &'static str) -> String {
    stated
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| inferred().to_string(), str::to_string)
}

/// Build the published listing for one candidate.
///
/// # Arguments
///
/// * `candidate` - A candidate that already passed the novelty filter
/// * `rewriter` - Produces the description HTML
/// * `today` - Posting date stamped on the listing
pub fn to_listing<R: DescriptionRewriter>(
    candidate: &RawCandidate,
    rewriter: &R,
    today: NaiveDate,
) -> Listing {
    let job_title = candidate.job_title.trim().to_string();
    let company_name = candidate.company_name.trim().to_string();
    let job_location = candidate.job_location.trim().to_string();
    let (min_price, max_price) = parse_salary(&candidate.salary_text);
    let raw = &candidate.raw_description;

    Listing {
        seo_title: seo_title(&job_title, &job_location, &min_price, &max_price),
        description: rewriter.rewrite(&job_title, &company_name, &job_location, raw),
        experience_level: stated_or(&candidate.experience_level, || experience_level(raw)),
        employment_type: stated_or(&candidate.employment_type, || employment_type(raw)),
        skills: extract_skills(raw),
        salary_type: SALARY_TYPE.to_string(),
        posting_date: today.format("%Y-%m-%d").to_string(),
        company_logo: candidate.logo_url.clone(),
        apply_link: candidate.apply_link.clone(),
        min_price,
        max_price,
        job_title,
        company_name,
        job_location,
    }
}

static BRANDING: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)glassdoor", "our portal"),
        (r"(?i)apply now", "join the team"),
        (r"(?i)click here", "proceed"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid branding regex"), replacement))
    .collect()
});

const MAX_SOURCE_CHARS: usize = 2000;
const MAX_RESPONSIBILITIES: usize = 8;
const MAX_QUALIFICATIONS: usize = 7;

const QUALIFICATION_HINTS: &[&str] = &[
    "experience",
    "degree",
    "knowledge",
    "proficien",
    "familiar",
    "years",
    "skills",
    "ability",
];

const INTROS: &[&str] = &[
    "{company} is hiring a {title} in {location}. The role suits someone who enjoys hard problems and wants their work to ship.",
    "Join {company} in {location} as its next {title}. You will work with a small team that owns its systems end to end.",
    "{company} is looking for a {title} to strengthen its {location} team and help deliver the next round of product work.",
];

const CLOSINGS: &[&str] = &[
    "If this sounds like your next step, send your application to {company} today.",
    "Applications for this {title} role at {company} are open now.",
    "Take the next step in your career with {company} in {location}.",
];

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn fill(template: &str, title: &str, company: &str, location: &str) -> String {
    template
        .replace("{title}", title)
        .replace("{company}", company)
        .replace("{location}", location)
}

/// Template rewriter: scrubs source branding from the raw text, splits it
/// into responsibilities and qualifications, and wraps them in a randomly
/// chosen introduction and closing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateRewriter;

impl TemplateRewriter {
    fn scrub(raw: &str) -> String {
        let mut text: String = raw.chars().take(MAX_SOURCE_CHARS).collect();
        for (pattern, replacement) in BRANDING.iter() {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }
        text
    }

    /// Candidate bullet points: one per line, or per sentence for prose.
    fn points(text: &str) -> Vec<String> {
        let lines = text
            .lines()
            .map(|l| l.trim().trim_start_matches(['-', '•', '*', '·']).trim())
            .filter(|l| l.split_whitespace().count() >= 3)
            .map(str::to_string)
            .collect_vec();
        if lines.len() > 1 {
            return lines;
        }
        text.split(['.', ';'])
            .map(str::trim)
            .filter(|s| s.split_whitespace().count() >= 3)
            .map(str::to_string)
            .collect_vec()
    }

    fn list(items: &[String]) -> String {
        let body = items
            .iter()
            .map(|i| format!("<li>{}</li>", escape_html(i)))
            .join("");
        format!("<ul>{body}</ul>")
    }
}

impl DescriptionRewriter for TemplateRewriter {
    fn rewrite(&self, title: &str, company: &str, location: &str, raw_description: &str) -> String {
        let (t, c, l) = (escape_html(title), escape_html(company), escape_html(location));
        let mut rng = rand::rng();
        let intro = INTROS.choose(&mut rng).copied().unwrap_or(INTROS[0]);
        let closing = CLOSINGS.choose(&mut rng).copied().unwrap_or(CLOSINGS[0]);

        let (qualifications, responsibilities): (Vec<String>, Vec<String>) =
            Self::points(&Self::scrub(raw_description))
                .into_iter()
                .partition(|p| {
                    let lower = p.to_lowercase();
                    QUALIFICATION_HINTS.iter().any(|h| lower.contains(h))
                });
        debug!(
            responsibilities = responsibilities.len(),
            qualifications = qualifications.len(),
            "Rewriting description"
        );

        let mut html = format!(
            "<h2>{t} at {c} in {l}</h2>\n<p>{}</p>\n",
            fill(intro, &t, &c, &l)
        );
        html.push_str("<h3><b>What You Will Do</b></h3>\n");
        if responsibilities.is_empty() {
            html.push_str(&format!(
                "<p>As a {t} at {c} you will design, build and support the systems your team owns.</p>\n"
            ));
        } else {
            let take = &responsibilities[..responsibilities.len().min(MAX_RESPONSIBILITIES)];
            html.push_str(&Self::list(take));
            html.push('\n');
        }
        html.push_str("<h3><b>What We Are Looking For</b></h3>\n");
        if qualifications.is_empty() {
            html.push_str(&format!(
                "<p>A solid track record in {t} work and clear communication with teammates.</p>\n"
            ));
        } else {
            let take = &qualifications[..qualifications.len().min(MAX_QUALIFICATIONS)];
            html.push_str(&Self::list(take));
            html.push('\n');
        }
        html.push_str(&format!("<p>{}</p>", fill(closing, &t, &c, &l)));
        html
    }
}
