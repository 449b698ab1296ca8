//! Error taxonomy for scrape cycles.
//!
//! Session-level failures (launch, navigation, persistent blocking) are
//! retried by the [`crate::supervisor`]; card-level misses are swallowed by
//! the session; configuration and persistence failures surface to whoever
//! triggered the cycle.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The browser could not be started or a page could not be opened.
    #[error("browser launch failed: {0}")]
    LaunchFailure(String),

    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// An anti-automation interstitial survived a reload.
    #[error("blocked by challenge page at {url} ({marker})")]
    Blocked { url: String, marker: String },

    #[error("card {index} could not be extracted: {message}")]
    ExtractionMiss { index: usize, message: String },

    #[error("no scrape targets configured")]
    NoTargetsConfigured,

    /// A write to the durable store failed. A preceding fresh-start clear
    /// may already have been committed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ScrapeError {
    /// Whether the retry supervisor should spend another attempt on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::LaunchFailure(_)
                | ScrapeError::NavigationTimeout { .. }
                | ScrapeError::Navigation { .. }
                | ScrapeError::Blocked { .. }
        )
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(err: std::io::Error) -> Self {
        ScrapeError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::Persistence(err.to_string())
    }
}
