//! Page acquisition strategies
//!
//! An [`Acquisition`] turns a URL into page markup and, when it can run
//! scripts, a live document handle. The scan pipeline is generic over it:
//! with a handle the observer runs against the rendered page, without one
//! everything is derived from fetched text.

use std::future::Future;

use url::Url;

use crate::error::Result;

#[cfg(feature = "browser")]
mod browser;
mod plain;

#[cfg(feature = "browser")]
pub use browser::{BrowserAcquisition, BrowserPage};
pub use plain::StaticAcquisition;

/// What an acquisition hands back for one page
#[derive(Debug)]
pub struct Acquired<D> {
    /// Markup as served (static) or as rendered (dynamic)
    pub html: String,
    /// The URL after redirects
    pub final_url: Url,
    /// Live document handle, present only when scripts can be evaluated
    pub document: Option<D>,
}

/// A loaded page that scripts can be evaluated against
pub trait LiveDocument: Send + Sync + 'static {
    /// Evaluate a script expression and return its JSON value.
    fn evaluate(&self, script: &str) -> impl Future<Output = Result<serde_json::Value>> + Send;

    /// Release the page.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Owns a document until it is closed.
///
/// Dropping the guard while the document is still open (an error return, a
/// timeout, a cancelled request) closes it on a background task, so a tab
/// never outlives the scan that opened it.
pub struct OpenDocument<D: LiveDocument> {
    // `None` only once `close` or `into_inner` has consumed the guard
    document: Option<D>,
}

impl<D: LiveDocument> OpenDocument<D> {
    pub fn new(document: D) -> Self {
        Self {
            document: Some(document),
        }
    }

    pub fn get(&self) -> &D {
        self.document
            .as_ref()
            .expect("document is present until the guard is consumed")
    }

    /// Hand the document back without closing it.
    pub fn into_inner(mut self) -> D {
        self.document
            .take()
            .expect("document is present until the guard is consumed")
    }

    pub async fn close(mut self) {
        if let Some(document) = self.document.take() {
            document.close().await;
        }
    }
}

impl<D: LiveDocument> Drop for OpenDocument<D> {
    fn drop(&mut self) {
        let Some(document) = self.document.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::debug!("document dropped while open, closing in the background");
                runtime.spawn(document.close());
            }
            Err(_) => tracing::warn!("document dropped outside a runtime, left open"),
        }
    }
}

/// Document type for acquisitions that never produce a live page
#[derive(Debug)]
pub enum NoDocument {}

impl LiveDocument for NoDocument {
    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        match *self {}
    }

    async fn close(self) {
        match self {}
    }
}

/// Loads a page
pub trait Acquisition: Send + Sync {
    type Document: LiveDocument;

    /// Reported in the catalog's page header
    const KIND: &'static str;

    /// Load `url`. Failing to load the page is fatal for the scan.
    fn fetch_markup(
        &self,
        url: &Url,
    ) -> impl Future<Output = Result<Acquired<Self::Document>>> + Send;
}
