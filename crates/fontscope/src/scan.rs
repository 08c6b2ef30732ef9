//! The scan pipeline: acquisition, collection, classification, observation,
//! aggregation.

use std::time::Instant;

use indexmap::IndexSet;
use url::Url;

use crate::ScanSettings;
use crate::acquire::{Acquisition, OpenDocument};
use crate::catalog::{CatalogBuilder, FontCatalog};
use crate::collect::{self, StylesheetSource};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::markup::PageMarkup;
use crate::observe;
use crate::services;

/// Validate a page URL before anything touches the network.
pub fn parse_page_url(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::MissingUrl);
    }

    let url = Url::parse(raw).map_err(|reason| Error::InvalidUrl {
        url: raw.to_string(),
        reason,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::UnsupportedScheme {
            url: raw.to_string(),
            scheme: other.to_string(),
        }),
    }
}

/// Runs scans with one acquisition strategy.
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct Scanner<A> {
    acquisition: A,
    fetcher: Fetcher,
    settings: ScanSettings,
}

impl<A: Acquisition> Scanner<A> {
    pub fn new(acquisition: A, fetcher: Fetcher, settings: ScanSettings) -> Self {
        Self {
            acquisition,
            fetcher,
            settings,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Scan one page.
    ///
    /// Only a bad URL or a failed page load is an error; everything after
    /// that degrades per source.
    pub async fn scan(&self, raw_url: &str) -> Result<FontCatalog> {
        let start = Instant::now();
        let url = parse_page_url(raw_url)?;

        let acquired = self.acquisition.fetch_markup(&url).await?;
        // Closed at the end of the scan, or in the background if the scan is dropped first.
        let document = acquired.document.map(OpenDocument::new);
        let markup = PageMarkup::parse(&acquired.html, &acquired.final_url);

        let mut builder = CatalogBuilder::new(&acquired.final_url, A::KIND);
        builder.add_preloads(markup.preloads.iter().cloned());

        let sources = match &document {
            Some(document) => {
                let snapshots = observe::stylesheets(document.get()).await;
                collect::collect_live(snapshots, &markup.base)
            }
            None => {
                collect::collect_static(&markup, &self.fetcher, self.settings.max_import_depth)
                    .await
            }
        };
        for source in &sources {
            tracing::debug!(
                origin = source.origin(),
                bytes = source.bytes,
                usages = source.usages.len(),
                "parsed stylesheet"
            );
            builder.add_source(source);
        }

        let links = service_links(&markup, &sources);
        builder.add_services(services::classify_links(&links, &self.fetcher).await);

        match document {
            Some(document) => {
                builder.add_observation(observe::observe(document.get()).await);
                document.close().await;
            }
            None => {
                // Without computed styles, authored families stand in for them.
                for usage in sources.iter().flat_map(|s| &s.usages) {
                    if !usage.shorthand {
                        builder.add_stack(&usage.family);
                    }
                }
                for family in &markup.inline_families {
                    builder.add_stack(family);
                }
                builder.keep_sources(sources);
            }
        }

        let catalog = builder.finish();
        tracing::info!(
            url = %catalog.page.url,
            acquisition = A::KIND,
            faces = catalog.font_faces.len(),
            files = catalog.font_files.len(),
            service_families = catalog.service_families.len(),
            kits = catalog.kit_projects.len(),
            computed = catalog.computed_fonts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "scan complete"
        );
        Ok(catalog)
    }
}

/// Font-service links from the markup plus `@import`s pointing at a service.
fn service_links(markup: &PageMarkup, sources: &[StylesheetSource]) -> Vec<Url> {
    let imported = sources
        .iter()
        .flat_map(|source| &source.imports)
        .filter(|url| services::classify(url).is_some())
        .cloned();

    markup
        .service_links
        .iter()
        .cloned()
        .chain(imported)
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_url() {
        assert!(matches!(parse_page_url(""), Err(Error::MissingUrl)));
        assert!(matches!(parse_page_url("   "), Err(Error::MissingUrl)));
        assert!(matches!(
            parse_page_url("not a url"),
            Err(Error::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_page_url("ftp://example.com/"),
            Err(Error::UnsupportedScheme { .. })
        ));
        assert_eq!(
            parse_page_url(" https://example.com/a ").unwrap().as_str(),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_service_links_include_imports_once() {
        let page = Url::parse("https://example.com/").unwrap();
        let markup = PageMarkup::parse(
            r#"<link rel="stylesheet" href="https://fonts.googleapis.com/css?family=Lato">"#,
            &page,
        );
        let sources = vec![StylesheetSource::inline(
            r#"@import url(https://fonts.googleapis.com/css?family=Lato);
               @import url(https://use.typekit.net/kit1234.css);
               @import "local.css";"#
                .to_string(),
            &page,
        )];

        let links: Vec<String> = service_links(&markup, &sources)
            .iter()
            .map(Url::to_string)
            .collect();
        assert_eq!(
            links,
            vec![
                "https://fonts.googleapis.com/css?family=Lato",
                "https://use.typekit.net/kit1234.css",
            ]
        );
    }
}
