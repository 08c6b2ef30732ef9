//! Static acquisition: one HTTP GET, no script execution.

use url::Url;

use super::{Acquired, Acquisition, NoDocument};
use crate::error::Result;
use crate::fetch::Fetcher;

/// Fetches raw markup over HTTP
#[derive(Debug, Clone)]
pub struct StaticAcquisition {
    fetcher: Fetcher,
}

impl StaticAcquisition {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

impl Acquisition for StaticAcquisition {
    type Document = NoDocument;

    const KIND: &'static str = "static";

    async fn fetch_markup(&self, url: &Url) -> Result<Acquired<NoDocument>> {
        let (final_url, html) = self.fetcher.fetch_page(url).await?;
        tracing::debug!(url = %url, final_url = %final_url, bytes = html.len(), "page fetched");
        Ok(Acquired {
            html,
            final_url,
            document: None,
        })
    }
}
