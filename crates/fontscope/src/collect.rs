//! Stylesheet source collection
//!
//! Static path: inline `<style>` blocks plus linked sheets fetched over HTTP,
//! following `@import` chains. Dynamic path: the sheets the browser already
//! loaded, read through the CSSOM.
//!
//! Fetches run one after another. A failed fetch drops that one source and
//! nothing else.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use url::Url;

use crate::css::{self, FamilyUsage};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::markup::PageMarkup;
use crate::observe::SheetSnapshot;
use crate::resolve::resolve_reference;
use crate::services;

/// Where a stylesheet came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Inline,
    External,
}

/// One stylesheet and the font usages found in it
#[derive(Debug, Clone, Serialize)]
pub struct StylesheetSource {
    pub kind: SourceKind,
    /// Absolute URL, `None` for inline sheets
    pub url: Option<String>,
    /// Size of the stylesheet text in bytes
    pub bytes: usize,
    pub usages: Vec<FamilyUsage>,
    #[serde(skip)]
    pub text: String,
    /// Base for references inside the sheet
    #[serde(skip)]
    pub base: Url,
    /// `@import` targets, resolved against `base`
    #[serde(skip)]
    pub imports: Vec<Url>,
}

impl StylesheetSource {
    pub fn inline(text: String, page_base: &Url) -> Self {
        Self::new(SourceKind::Inline, None, text, page_base.clone())
    }

    pub fn external(url: Url, text: String) -> Self {
        Self::new(SourceKind::External, Some(url.to_string()), text, url)
    }

    fn new(kind: SourceKind, url: Option<String>, text: String, base: Url) -> Self {
        let usages = css::family_usages(&text);
        let imports = css::imports(&text)
            .iter()
            .filter_map(|target| match resolve_reference(target, &base) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::debug!(import = %target, error = %e, "skipping unresolvable import");
                    None
                }
            })
            .collect();

        Self {
            kind,
            url,
            bytes: text.len(),
            usages,
            text,
            base,
            imports,
        }
    }

    /// Label used in logs and in import records
    pub fn origin(&self) -> &str {
        self.url.as_deref().unwrap_or("inline")
    }
}

/// Collect sources from markup, fetching external sheets.
///
/// Font-service links are left to the service classifier. Imports of
/// ordinary stylesheets are followed up to `max_import_depth` levels.
pub async fn collect_static(
    markup: &PageMarkup,
    fetcher: &Fetcher,
    max_import_depth: usize,
) -> Vec<StylesheetSource> {
    let mut sources: Vec<StylesheetSource> = markup
        .inline_styles
        .iter()
        .map(|text| StylesheetSource::inline(text.clone(), &markup.base))
        .collect();

    let mut visited: HashSet<Url> = HashSet::new();
    let mut queue: VecDeque<(Url, usize)> = VecDeque::new();

    for url in &markup.stylesheet_links {
        queue.push_back((url.clone(), 0));
    }
    for source in &sources {
        enqueue_imports(source, 1, max_import_depth, &mut queue);
    }

    let mut failed = 0_usize;
    while let Some((url, depth)) = queue.pop_front() {
        if !visited.insert(url.clone()) {
            continue;
        }

        match fetcher.fetch_stylesheet(&url).await {
            FetchOutcome::Fetched { url: served, text } => {
                // a redirect onto a sheet that was already collected
                if served != url && !visited.insert(served.clone()) {
                    tracing::debug!(url = %url, served = %served, "stylesheet already collected");
                    continue;
                }
                let source = StylesheetSource::external(served, text);
                enqueue_imports(&source, depth + 1, max_import_depth, &mut queue);
                sources.push(source);
            }
            FetchOutcome::Failed { .. } => failed += 1,
        }
    }

    tracing::debug!(sources = sources.len(), failed, "collected stylesheets");
    sources
}

fn enqueue_imports(
    source: &StylesheetSource,
    depth: usize,
    max_import_depth: usize,
    queue: &mut VecDeque<(Url, usize)>,
) {
    if depth > max_import_depth {
        return;
    }
    for import in &source.imports {
        if services::classify(import).is_none() && !is_font_binary(import) {
            queue.push_back((import.clone(), depth));
        }
    }
}

fn is_font_binary(url: &Url) -> bool {
    matches!(
        crate::resolve::file_format(url).as_str(),
        "woff" | "woff2" | "ttf" | "otf" | "eot"
    )
}

/// Turn the browser's stylesheet snapshots into sources.
///
/// A sheet whose rules cannot be read (cross-origin) is skipped.
pub fn collect_live(snapshots: Vec<SheetSnapshot>, page_base: &Url) -> Vec<StylesheetSource> {
    let mut sources = Vec::new();

    for snapshot in snapshots {
        let Some(text) = snapshot.css else {
            tracing::debug!(href = ?snapshot.href, "stylesheet rules not readable, skipping");
            continue;
        };

        let source = match snapshot
            .href
            .as_deref()
            .map(|href| resolve_reference(href, page_base))
        {
            Some(Ok(url)) => StylesheetSource::external(url, text),
            Some(Err(e)) => {
                tracing::debug!(error = %e, "stylesheet href not resolvable, treating as inline");
                StylesheetSource::inline(text, page_base)
            }
            None => StylesheetSource::inline(text, page_base),
        };
        sources.push(source);
    }

    sources
}
