//! HTTP fetching with per-request timeouts
//!
//! The page fetch is fatal when it fails. Stylesheet and kit fetches are not:
//! they produce a [`FetchOutcome`] that callers fold into their results.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use url::Url;

use crate::ScanSettings;
use crate::error::{Error, Result};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_CSS: &str = "text/css,*/*;q=0.1";

/// A browser-like User-Agent.
///
/// Plenty of sites serve different markup (or a 403) to anything that looks
/// like a bot, which would hide the fonts we are looking for.
pub fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string()
}

fn client_builder(settings: &ScanSettings) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(10))
}

/// Result of one secondary fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched { url: Url, text: String },
    Failed { url: Url, reason: String },
}

/// Shared HTTP client for page and stylesheet fetches
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    page_timeout: Duration,
    stylesheet_timeout: Duration,
}

impl Fetcher {
    pub fn new(settings: &ScanSettings) -> Result<Self> {
        let client = client_builder(settings).build()?;
        Ok(Self::with_client(client, settings))
    }

    /// Like [`Fetcher::new`], but `host` always connects to `addr`.
    ///
    /// The port in `addr` is ignored; the one in the request URL is used.
    pub fn with_resolved_hosts(
        settings: &ScanSettings,
        hosts: &[(&str, SocketAddr)],
    ) -> Result<Self> {
        let client = hosts
            .iter()
            .fold(client_builder(settings), |builder, (host, addr)| {
                builder.resolve(host, *addr)
            })
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    fn with_client(client: reqwest::Client, settings: &ScanSettings) -> Self {
        Self {
            client,
            page_timeout: settings.page_timeout,
            stylesheet_timeout: settings.stylesheet_timeout,
        }
    }

    /// Fetch the page markup. Returns the final URL after redirects.
    pub async fn fetch_page(&self, url: &Url) -> Result<(Url, String)> {
        self.fetch_text(url, ACCEPT_HTML, self.page_timeout)
            .await
            .map_err(|reason| Error::PrimaryFetch {
                url: url.to_string(),
                reason,
            })
    }

    /// Fetch a stylesheet; failures are reported, not raised.
    ///
    /// A fetched sheet carries the URL it was finally served from, which is
    /// the base for the references inside it.
    pub async fn fetch_stylesheet(&self, url: &Url) -> FetchOutcome {
        let start = Instant::now();
        let outcome = match self
            .fetch_text(url, ACCEPT_CSS, self.stylesheet_timeout)
            .await
        {
            Ok((final_url, text)) => FetchOutcome::Fetched {
                url: final_url,
                text,
            },
            Err(reason) => FetchOutcome::Failed {
                url: url.clone(),
                reason,
            },
        };

        let elapsed_ms = start.elapsed().as_millis();
        match &outcome {
            FetchOutcome::Fetched {
                url: final_url,
                text,
            } => {
                tracing::debug!(url = %url, final_url = %final_url, elapsed_ms = %elapsed_ms, bytes = text.len(), "stylesheet fetched");
            }
            FetchOutcome::Failed { reason, .. } => {
                tracing::warn!(url = %url, elapsed_ms = %elapsed_ms, error = %reason, "stylesheet fetch failed");
            }
        }

        outcome
    }

    async fn fetch_text(
        &self,
        url: &Url,
        accept: &str,
        timeout: Duration,
    ) -> std::result::Result<(Url, String), String> {
        let request = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, accept)
            .build()
            .map_err(|e| format!("failed to build request: {e}"))?;

        let fetch = async {
            let response = self
                .client
                .execute(request)
                .await
                .map_err(|e| e.to_string())?;

            let status = response.status();
            if !status.is_success() {
                return Err(format!("HTTP {}", status.as_u16()));
            }

            let final_url = response.url().clone();
            let text = response.text().await.map_err(|e| e.to_string())?;
            Ok((final_url, text))
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(format!("request timed out after {}s", timeout.as_secs_f32())),
        }
    }
}
