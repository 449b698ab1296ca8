//! Browser driver abstraction.
//!
//! An automation session only needs a handful of page operations, so the
//! session logic is written against these traits instead of a concrete CDP
//! client. [`chrome`] implements them on top of headless Chromium; tests use
//! a scripted in-memory page.
//!
//! ```text
//! BrowserLauncher ──launch──▶ BrowserHandle ──open_page──▶ PageDriver
//! ```

use crate::error::Result;
use crate::session::profile::PageIdentity;
use std::time::Duration;

pub mod chrome;

pub trait BrowserLauncher {
    type Browser: BrowserHandle;

    /// Start a fresh browser. Failures map to `ScrapeError::LaunchFailure`.
    async fn launch(&self) -> Result<Self::Browser>;
}

pub trait BrowserHandle {
    type Page: PageDriver;

    /// Open an isolated page presenting `identity`.
    async fn open_page(&self, identity: &PageIdentity) -> Result<Self::Page>;

    /// Shut the browser down. Errors are logged, not returned.
    async fn close(self);
}

/// Page operations used by a session. Element-addressing calls take a CSS
/// selector group and, where relevant, the index into its matches in
/// document order.
pub trait PageDriver {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;

    async fn reload(&self, timeout: Duration) -> Result<()>;

    async fn title(&self) -> Result<String>;

    /// Rendered text of the document body.
    async fn body_text(&self) -> Result<String>;

    async fn current_url(&self) -> Result<String>;

    /// Serialized HTML of the whole document.
    async fn content(&self) -> Result<String>;

    async fn count(&self, selector: &str) -> Result<usize>;

    /// Click the first element matching `selector`; `Ok(false)` if none exists.
    async fn click_first(&self, selector: &str) -> Result<bool>;

    async fn scroll_by(&self, pixels: u32) -> Result<()>;

    /// Scroll the `index`-th match into view and click it; `Ok(false)` if it
    /// does not exist.
    async fn focus_and_click(&self, selector: &str, index: usize) -> Result<bool>;

    async fn outer_html(&self, selector: &str, index: usize) -> Result<Option<String>>;

    async fn close(self);
}
