//! Error types for font scanning.

/// Errors that end a scan.
///
/// Failures of secondary fetches (stylesheets, font-service kits) are not
/// errors: they are logged and the affected source is left out.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request did not name a page
    #[error("missing url")]
    MissingUrl,

    /// The page URL could not be parsed
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: url::ParseError,
    },

    /// Only http and https pages can be scanned
    #[error("unsupported scheme '{scheme}' in '{url}'")]
    UnsupportedScheme { url: String, scheme: String },

    /// The page itself could not be loaded
    #[error("failed to fetch {url}: {reason}")]
    PrimaryFetch { url: String, reason: String },

    /// The headless browser could not be started or driven
    #[error("browser error: {0}")]
    Browser(String),

    /// The HTTP client could not be built
    #[error("failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl Error {
    /// Whether the caller supplied a bad request, as opposed to a failure
    /// while scanning.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingUrl | Error::InvalidUrl { .. } | Error::UnsupportedScheme { .. }
        )
    }
}

/// Result type alias for scanning operations.
pub type Result<T> = std::result::Result<T, Error>;
