//! Find the fonts a web page declares, loads and renders.
//!
//! Given a URL, a [`Scanner`] acquires the page (plain HTTP or a headless
//! browser), gathers its stylesheets, and reports every font signal it can
//! find as a [`FontCatalog`]: font-service links, `@font-face` rules, font
//! files, preloads, font imports, custom properties, runtime font fetches and
//! the font stacks applied to content.
//!
//! Parsing is best-effort throughout. Only an invalid URL or a page that
//! cannot be loaded fails a scan.

use std::time::Duration;

pub mod acquire;
pub mod catalog;
pub mod collect;
pub mod css;
pub mod error;
pub mod fetch;
pub mod markup;
pub mod observe;
pub mod resolve;
pub mod scan;
pub mod services;

#[cfg(feature = "browser")]
pub use acquire::BrowserAcquisition;
pub use acquire::{
    Acquired, Acquisition, LiveDocument, NoDocument, OpenDocument, StaticAcquisition,
};
pub use catalog::FontCatalog;
pub use error::{Error, Result};
pub use fetch::Fetcher;
pub use scan::{Scanner, parse_page_url};

/// Limits and identity used while scanning
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Sent with every HTTP request and by the headless browser
    pub user_agent: String,
    /// Timeout for loading the page itself
    pub page_timeout: Duration,
    /// Timeout for each stylesheet or kit fetch
    pub stylesheet_timeout: Duration,
    /// How many levels of `@import` to follow
    pub max_import_depth: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            user_agent: fetch::default_user_agent(),
            page_timeout: Duration::from_secs(30),
            stylesheet_timeout: Duration::from_secs(5),
            max_import_depth: 3,
        }
    }
}
