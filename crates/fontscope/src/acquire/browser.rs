//! Dynamic acquisition through a headless Chromium.
//!
//! One browser process is shared by every scan; each scan opens its own tab
//! and closes it when the observer is done, or when the scan is abandoned.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use url::Url;

use super::{Acquired, Acquisition, LiveDocument, OpenDocument};
use crate::ScanSettings;
use crate::error::{Error, Result};

/// Loads pages in a shared headless browser
pub struct BrowserAcquisition {
    browser: Browser,
    handler: JoinHandle<()>,
    page_timeout: Duration,
}

impl BrowserAcquisition {
    /// Launch the browser.
    ///
    /// `sandbox = false` passes `--no-sandbox`, which Chromium needs when it
    /// runs as root (containers).
    pub async fn launch(settings: &ScanSettings, sandbox: bool) -> Result<Self> {
        let mut builder =
            BrowserConfig::builder().arg(format!("--user-agent={}", settings.user_agent));
        if !sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder
            .build()
            .map_err(|e| Error::Browser(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(format!("failed to launch browser: {e}")))?;

        // Unhandled CDP messages surface here as errors; they are not fatal.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!(error = %e, "browser handler event");
                }
            }
        });

        tracing::info!("headless browser launched");

        Ok(Self {
            browser,
            handler,
            page_timeout: settings.page_timeout,
        })
    }
}

impl Drop for BrowserAcquisition {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

impl Acquisition for BrowserAcquisition {
    type Document = BrowserPage;

    const KIND: &'static str = "browser";

    async fn fetch_markup(&self, url: &Url) -> Result<Acquired<BrowserPage>> {
        let primary = |reason: String| Error::PrimaryFetch {
            url: url.to_string(),
            reason,
        };

        let timed_out = || {
            primary(format!(
                "page load timed out after {}s",
                self.page_timeout.as_secs_f32()
            ))
        };

        let opening = self.browser.new_page("about:blank");
        let blank = match tokio::time::timeout(self.page_timeout, opening).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return Err(primary(format!("failed to open a tab: {e}"))),
            Err(_) => return Err(timed_out()),
        };

        // From here on every early return drops `tab`, which closes it.
        let tab = OpenDocument::new(BrowserPage { page: blank });
        let page = &tab.get().page;

        let navigation = async {
            page.goto(url.as_str()).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(self.page_timeout, navigation).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(primary(e.to_string())),
            Err(_) => return Err(timed_out()),
        }

        let html = page
            .content()
            .await
            .map_err(|e| primary(format!("failed to read rendered markup: {e}")))?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .and_then(|current| Url::parse(&current).ok())
            .unwrap_or_else(|| url.clone());

        tracing::debug!(url = %url, final_url = %final_url, bytes = html.len(), "page rendered");

        Ok(Acquired {
            html,
            final_url,
            document: Some(tab.into_inner()),
        })
    }
}

/// A rendered tab
pub struct BrowserPage {
    page: Page,
}

impl LiveDocument for BrowserPage {
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| Error::Browser(format!("script failed: {e}")))?
            .into_value()
            .map_err(|e| Error::Browser(format!("script returned no usable value: {e}")))
    }

    async fn close(self) {
        if let Err(e) = self.page.close().await {
            tracing::debug!(error = %e, "failed to close page");
        }
    }
}
