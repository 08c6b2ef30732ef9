//! Resource URL resolution
//!
//! References found in markup and CSS are relative to different bases: the
//! page URL for markup and inline `<style>` blocks, the stylesheet URL for
//! anything inside a fetched sheet. Everything here is pure.

use url::Url;

/// Why a reference could not be turned into an absolute URL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Nothing left after trimming whitespace and quotes
    #[error("empty reference")]
    Empty,

    /// The reference is not a valid URL, even relative to the base
    #[error("cannot resolve '{reference}' against {base}: {reason}")]
    Invalid {
        reference: String,
        base: String,
        reason: url::ParseError,
    },
}

/// Resolve `reference` against `base` into an absolute URL.
///
/// Surrounding whitespace and quotes are ignored. Absolute references are
/// returned as-is; scheme-relative (`//host/path`) and path-relative
/// references are joined against `base`.
pub fn resolve_reference(reference: &str, base: &Url) -> Result<Url, ResolveError> {
    let reference = unquote(reference.trim());
    if reference.is_empty() {
        return Err(ResolveError::Empty);
    }

    match Url::parse(reference) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.join(reference).map_err(|reason| ResolveError::Invalid {
                reference: reference.to_string(),
                base: base.to_string(),
                reason,
            })
        }
        Err(reason) => Err(ResolveError::Invalid {
            reference: reference.to_string(),
            base: base.to_string(),
            reason,
        }),
    }
}

/// Strip one level of matching single or double quotes.
pub fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    value
}

/// Whether a reference is an inline `data:` URI
pub fn is_data_uri(reference: &str) -> bool {
    unquote(reference)
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:"))
}

/// Lowercase file extension of the last path segment, or `unknown`.
pub fn file_format(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_relative_against_stylesheet() {
        let sheet = base("https://cdn.example.com/css/site.css");
        let url = resolve_reference("../fonts/a.woff2", &sheet).unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/fonts/a.woff2");
    }

    #[test]
    fn test_absolute_and_scheme_relative() {
        let page = base("https://example.com/blog/post");
        assert_eq!(
            resolve_reference("https://fonts.gstatic.com/s/x.woff2", &page)
                .unwrap()
                .as_str(),
            "https://fonts.gstatic.com/s/x.woff2"
        );
        assert_eq!(
            resolve_reference("//static.example.net/f.ttf", &page)
                .unwrap()
                .as_str(),
            "https://static.example.net/f.ttf"
        );
        assert_eq!(
            resolve_reference("  '/assets/f.otf' ", &page)
                .unwrap()
                .as_str(),
            "https://example.com/assets/f.otf"
        );
    }

    #[test]
    fn test_invalid_references() {
        let page = base("https://example.com/");
        assert_eq!(resolve_reference("  \"\" ", &page), Err(ResolveError::Empty));
        assert!(matches!(
            resolve_reference("http://[::1", &page),
            Err(ResolveError::Invalid { .. })
        ));
    }

    #[test]
    fn test_file_format() {
        let url = base("https://example.com/f/Inter-Bold.WOFF2?v=3#x");
        assert_eq!(file_format(&url), "woff2");
        assert_eq!(file_format(&base("https://example.com/font")), "unknown");
        assert_eq!(file_format(&base("https://example.com/dir/")), "unknown");
    }

    #[test]
    fn test_data_uri() {
        assert!(is_data_uri("'data:font/woff2;base64,AAAA'"));
        assert!(is_data_uri("DATA:application/x-font-ttf,xx"));
        assert!(!is_data_uri("/fonts/data.woff"));
    }
}
