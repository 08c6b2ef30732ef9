//! Page markup scanning
//!
//! Parses the HTML once and pulls out everything the rest of the pipeline
//! needs. The parsed document is not `Send`, so it never outlives
//! [`PageMarkup::parse`].

use indexmap::IndexSet;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::css;
use crate::resolve::{file_format, resolve_reference};
use crate::services;

/// A font announced with `<link rel="preload" as="font">` (or `prefetch`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreloadedFont {
    pub url: String,
    pub format: String,
    /// Whether the link carried a `crossorigin` attribute
    pub crossorigin: bool,
}

/// What the markup tells us before any stylesheet is fetched
#[derive(Debug, Clone)]
pub struct PageMarkup {
    /// Base for relative references: `<base href>` or the page URL
    pub base: Url,
    /// Text of every `<style>` block, in document order
    pub inline_styles: Vec<String>,
    /// Linked stylesheets that are not font-service links
    pub stylesheet_links: Vec<Url>,
    /// Links to recognized font services
    pub service_links: Vec<Url>,
    pub preloads: Vec<PreloadedFont>,
    /// `font-family` values from `style=""` attributes
    pub inline_families: Vec<String>,
}

impl PageMarkup {
    pub fn parse(html: &str, page_url: &Url) -> Self {
        let document = Html::parse_document(html);

        let base = first_attr(&document, "base[href]", "href")
            .and_then(|href| resolve_reference(&href, page_url).ok())
            .unwrap_or_else(|| page_url.clone());

        let inline_styles = select(&document, "style")
            .into_iter()
            .map(|style| style.text().collect::<String>())
            .filter(|text| !text.trim().is_empty())
            .collect();

        let mut stylesheet_links = IndexSet::new();
        let mut service_links = IndexSet::new();
        let mut preloads = IndexSet::new();

        for link in select(&document, "link[href]") {
            let element = link.value();
            let rel = element.attr("rel").unwrap_or_default().to_ascii_lowercase();
            let rel: Vec<&str> = rel.split_whitespace().collect();
            let as_attr = element.attr("as").unwrap_or_default().to_ascii_lowercase();
            let type_attr = element.attr("type").unwrap_or_default().to_ascii_lowercase();
            let href = element.attr("href").unwrap_or_default();

            let url = match resolve_reference(href, &base) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!(href, error = %e, "skipping unresolvable link");
                    continue;
                }
            };

            let is_stylesheet = rel.contains(&"stylesheet");
            let is_hint = rel.contains(&"preload") || rel.contains(&"prefetch");

            if is_stylesheet || (is_hint && as_attr == "style") {
                if services::classify(&url).is_some() {
                    service_links.insert(url);
                } else {
                    stylesheet_links.insert(url);
                }
            } else if is_hint && (as_attr == "font" || type_attr.starts_with("font/")) {
                preloads.insert(PreloadedFont {
                    format: file_format(&url),
                    url: url.to_string(),
                    crossorigin: element.attr("crossorigin").is_some(),
                });
            }
        }

        let inline_families = select(&document, "[style]")
            .into_iter()
            .filter_map(|el| el.value().attr("style"))
            .flat_map(css::declarations)
            .filter(|(name, _)| name == "font-family")
            .map(|(_, value)| value.replace(['"', '\''], "").trim().to_string())
            .filter(|family| !family.is_empty())
            .collect();

        Self {
            base,
            inline_styles,
            stylesheet_links: stylesheet_links.into_iter().collect(),
            service_links: service_links.into_iter().collect(),
            preloads: preloads.into_iter().collect(),
            inline_families,
        }
    }
}

fn select<'a>(document: &'a Html, selector: &str) -> Vec<scraper::ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    select(document, selector)
        .into_iter()
        .find_map(|el| el.value().attr(attr).map(str::to_string))
}
