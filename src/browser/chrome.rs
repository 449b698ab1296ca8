//! Headless Chromium backend built on `chromiumoxide`.
//!
//! Each launch starts a dedicated Chromium process and spawns the CDP
//! handler loop onto the runtime. Navigation is wrapped in
//! `tokio::time::timeout`; DOM queries run through `Runtime.evaluate` with
//! selectors passed as JSON string literals. Pages whose identity asks for
//! it pause asset requests through the `Fetch` domain and fail them.

use super::{BrowserHandle, BrowserLauncher, PageDriver};
use crate::error::{Result, ScrapeError};
use crate::session::profile::PageIdentity;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetCacheDisabledParams, SetUserAgentOverrideParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    /// Explicit Chromium binary; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    /// Show the browser window.
    pub headful: bool,
}

impl BrowserLauncher for ChromeLauncher {
    type Browser = ChromeBrowser;

    #[instrument(level = "info", skip_all, fields(headful = self.headful))]
    async fn launch(&self) -> Result<ChromeBrowser> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-http-cache")
            .window_size(1920, 1080);
        if self.headful {
            builder = builder.with_head();
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(ScrapeError::LaunchFailure)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::LaunchFailure(e.to_string()))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        info!("Launched Chromium");
        Ok(ChromeBrowser {
            browser,
            handler_task,
        })
    }
}

/// Resource types refused on pages with `block_assets` set.
const BLOCKED_RESOURCES: [ResourceType; 4] = [
    ResourceType::Image,
    ResourceType::Stylesheet,
    ResourceType::Font,
    ResourceType::Media,
];

fn is_blocked_resource(kind: &ResourceType) -> bool {
    BLOCKED_RESOURCES.contains(kind)
}

/// Pause requests for [`BLOCKED_RESOURCES`] and fail them; anything else
/// that gets paused is let through.
async fn block_assets(
    page: &Page,
) -> std::result::Result<JoinHandle<()>, chromiumoxide::error::CdpError> {
    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    let patterns = BLOCKED_RESOURCES
        .iter()
        .map(|kind| {
            RequestPattern::builder()
                .url_pattern("*")
                .resource_type(kind.clone())
                .build()
        })
        .collect::<Vec<_>>();
    page.execute(EnableParams::builder().patterns(patterns).build()).await?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let outcome = if is_blocked_resource(&event.resource_type) {
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                ))
                .await
                .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = outcome {
                debug!(error = %e, "Could not answer paused request");
            }
        }
    }))
}

pub struct ChromeBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserHandle for ChromeBrowser {
    type Page = ChromePage;

    async fn open_page(&self, identity: &PageIdentity) -> Result<ChromePage> {
        let launch_err = |e: chromiumoxide::error::CdpError| ScrapeError::LaunchFailure(e.to_string());

        let page = self.browser.new_page("about:blank").await.map_err(launch_err)?;
        page.set_user_agent(SetUserAgentOverrideParams::new(identity.user_agent.clone()))
            .await
            .map_err(launch_err)?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(identity.viewport_width),
            i64::from(identity.viewport_height),
            1.0,
            false,
        ))
        .await
        .map_err(launch_err)?;
        if identity.disable_cache {
            page.execute(SetCacheDisabledParams::new(true))
                .await
                .map_err(launch_err)?;
        }
        let interceptor = if identity.block_assets {
            Some(block_assets(&page).await.map_err(launch_err)?)
        } else {
            None
        };

        Ok(ChromePage { page, interceptor })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser close error");
        }
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "Browser process wait failed");
        }
        self.handler_task.abort();
    }
}

pub struct ChromePage {
    page: Page,
    interceptor: Option<JoinHandle<()>>,
}

impl ChromePage {
    fn failure(&self, e: impl std::fmt::Display) -> ScrapeError {
        ScrapeError::Navigation {
            url: "current page".to_string(),
            message: e.to_string(),
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self.page.evaluate(script).await.map_err(|e| self.failure(e))?;
        result.into_value::<T>().map_err(|e| self.failure(e))
    }

    async fn nth_element(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<Option<Element>> {
        // find_elements errors on zero matches.
        match self.page.find_elements(selector).await {
            Ok(mut elements) if index < elements.len() => Ok(Some(elements.swap_remove(index))),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!(selector, error = %e, "find_elements failed");
                Ok(None)
            }
        }
    }
}

fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl PageDriver for ChromePage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(e)) => Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn reload(&self, timeout: Duration) -> Result<()> {
        let url = self.current_url().await.unwrap_or_default();
        match tokio::time::timeout(timeout, self.page.reload()).await {
            Err(_) => Err(ScrapeError::NavigationTimeout { url, timeout }),
            Ok(Err(e)) => Err(ScrapeError::Navigation {
                url,
                message: e.to_string(),
            }),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn title(&self) -> Result<String> {
        let title = self.page.get_title().await.map_err(|e| self.failure(e))?;
        Ok(title.unwrap_or_default())
    }

    async fn body_text(&self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.page.url().await.map_err(|e| self.failure(e))?;
        Ok(url.unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(|e| self.failure(e))
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.eval(format!(
            "document.querySelectorAll({}).length",
            js_str(selector)
        ))
        .await
    }

    async fn click_first(&self, selector: &str) -> Result<bool> {
        let Some(element) = self.nth_element(selector, 0).await? else {
            return Ok(false);
        };
        element.click().await.map_err(|e| self.failure(e))?;
        Ok(true)
    }

    async fn scroll_by(&self, pixels: u32) -> Result<()> {
        self.eval::<serde_json::Value>(format!("window.scrollBy(0, {pixels}); true"))
            .await
            .map(|_| ())
    }

    async fn focus_and_click(&self, selector: &str, index: usize) -> Result<bool> {
        let Some(element) = self.nth_element(selector, index).await? else {
            return Ok(false);
        };
        element
            .scroll_into_view()
            .await
            .map_err(|e| self.failure(e))?;
        element.click().await.map_err(|e| self.failure(e))?;
        Ok(true)
    }

    async fn outer_html(&self, selector: &str, index: usize) -> Result<Option<String>> {
        let html: String = self
            .eval(format!(
                "(() => {{ const el = document.querySelectorAll({})[{index}]; return el ? el.outerHTML : ''; }})()",
                js_str(selector)
            ))
            .await?;
        Ok(Some(html).filter(|h| !h.is_empty()))
    }

    async fn close(self) {
        if let Some(task) = self.interceptor {
            task.abort();
        }
        if let Err(e) = self.page.close().await {
            debug!(error = %e, "Page close error (tab leak)");
        }
    }
}
