//! Font catalog aggregation
//!
//! Each category keeps its own dedup rule:
//! - font files: set over (url, format)
//! - kit families: per project, first occurrence wins (done by the classifier)
//! - computed stacks: set over the whole raw string
//! - face declarations: never deduplicated, variants of one family are
//!   separate faces

use indexmap::IndexSet;
use serde::Serialize;
use url::Url;

use crate::collect::StylesheetSource;
use crate::css::{self, FontFaceDeclaration};
use crate::markup::PreloadedFont;
use crate::observe::{CustomPropertyFont, Observation, RuntimeFetch};
use crate::resolve::{file_format, is_data_uri, resolve_reference, unquote};
use crate::services::{KitProject, ServiceFamily, ServiceFonts};

/// Keywords that name no particular font
const GENERIC_FAMILIES: &[&str] = &[
    "serif",
    "sans-serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
    "-apple-system",
];

/// Tokens of well-known operating-system UI fonts
const SYSTEM_FONT_TOKENS: &[&str] = &[
    "system-ui",
    "-apple-system",
    "BlinkMacSystemFont",
    "Segoe UI",
    "Roboto",
    "Helvetica Neue",
    "Arial",
];

/// Which page was scanned and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// Final URL after redirects
    pub url: String,
    /// `static` or `browser`
    pub acquisition: String,
}

/// A font binary referenced from a `src` descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FontFileReference {
    pub url: String,
    pub format: String,
}

/// A font-related `@import`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FontImport {
    pub url: String,
    /// Importing stylesheet URL, or `inline`
    pub origin: String,
}

/// Everything found on one page
#[derive(Debug, Clone, Serialize)]
pub struct FontCatalog {
    pub page: PageInfo,
    pub service_families: Vec<ServiceFamily>,
    pub kit_projects: Vec<KitProject>,
    pub font_files: Vec<FontFileReference>,
    pub font_faces: Vec<FontFaceDeclaration>,
    pub preloaded: Vec<PreloadedFont>,
    pub imports: Vec<FontImport>,
    pub custom_properties: Vec<CustomPropertyFont>,
    pub runtime_fetches: Vec<RuntimeFetch>,
    pub system_stacks: Vec<String>,
    pub computed_fonts: Vec<String>,
    /// Sources the static path parsed; empty for browser scans
    pub stylesheets: Vec<StylesheetSource>,
}

/// Display name of a stack: tokens unquoted, generic keywords dropped.
///
/// Returns `None` when nothing but generic keywords remain.
pub fn clean_stack(stack: &str) -> Option<String> {
    let names: Vec<&str> = stack
        .split(',')
        .map(|token| unquote(token.trim()))
        .filter(|token| !token.is_empty())
        .filter(|token| {
            !GENERIC_FAMILIES
                .iter()
                .any(|generic| token.eq_ignore_ascii_case(generic))
        })
        .collect();

    (!names.is_empty()).then(|| names.join(", "))
}

/// Whether the raw stack mentions a well-known system UI font.
pub fn is_system_stack(stack: &str) -> bool {
    SYSTEM_FONT_TOKENS.iter().any(|token| stack.contains(token))
}

/// Accumulates one page's findings
#[derive(Debug)]
pub struct CatalogBuilder {
    page: PageInfo,
    service_families: Vec<ServiceFamily>,
    kit_projects: Vec<KitProject>,
    font_files: IndexSet<FontFileReference>,
    font_faces: Vec<FontFaceDeclaration>,
    preloaded: IndexSet<PreloadedFont>,
    imports: Vec<FontImport>,
    custom_properties: Vec<CustomPropertyFont>,
    runtime_fetches: Vec<RuntimeFetch>,
    stacks: IndexSet<String>,
    stylesheets: Vec<StylesheetSource>,
}

impl CatalogBuilder {
    pub fn new(page_url: &Url, acquisition: &str) -> Self {
        Self {
            page: PageInfo {
                url: page_url.to_string(),
                acquisition: acquisition.to_string(),
            },
            service_families: Vec::new(),
            kit_projects: Vec::new(),
            font_files: IndexSet::new(),
            font_faces: Vec::new(),
            preloaded: IndexSet::new(),
            imports: Vec::new(),
            custom_properties: Vec::new(),
            runtime_fetches: Vec::new(),
            stacks: IndexSet::new(),
            stylesheets: Vec::new(),
        }
    }

    /// Faces, font files and font imports of one stylesheet.
    ///
    /// `src` references resolve against the sheet's own URL; `data:` URIs
    /// stay in the face declaration but are not file references.
    pub fn add_source(&mut self, source: &StylesheetSource) {
        for face in css::font_faces(&source.text) {
            for reference in css::src_urls(&face.src) {
                if is_data_uri(&reference) {
                    continue;
                }
                match resolve_reference(&reference, &source.base) {
                    Ok(url) => {
                        self.font_files.insert(FontFileReference {
                            format: file_format(&url),
                            url: url.to_string(),
                        });
                    }
                    Err(e) => {
                        tracing::debug!(origin = source.origin(), error = %e, "skipping font src");
                    }
                }
            }
            self.font_faces.push(face);
        }

        for target in css::imports(&source.text) {
            if !css::is_font_import(&target) {
                continue;
            }
            let url = resolve_reference(&target, &source.base)
                .map(|url| url.to_string())
                .unwrap_or_else(|_| unquote(&target).to_string());
            self.imports.push(FontImport {
                url,
                origin: source.origin().to_string(),
            });
        }
    }

    pub fn add_preloads(&mut self, preloads: impl IntoIterator<Item = PreloadedFont>) {
        self.preloaded.extend(preloads);
    }

    pub fn add_services(&mut self, services: ServiceFonts) {
        self.service_families.extend(services.families);
        self.kit_projects.extend(services.kits);
    }

    /// Record a raw font stack (computed, or authored on the static path).
    pub fn add_stack(&mut self, stack: &str) {
        let stack = stack.trim();
        if !stack.is_empty() {
            self.stacks.insert(stack.to_string());
        }
    }

    pub fn add_observation(&mut self, observation: Observation) {
        for stack in &observation.computed_stacks {
            self.add_stack(stack);
        }
        self.custom_properties.extend(observation.custom_properties);
        self.runtime_fetches.extend(observation.runtime_fetches);
    }

    /// Keep the parsed sources for the transparency list.
    pub fn keep_sources(&mut self, sources: Vec<StylesheetSource>) {
        self.stylesheets = sources;
    }

    pub fn finish(self) -> FontCatalog {
        let computed_fonts: IndexSet<String> =
            self.stacks.iter().filter_map(|s| clean_stack(s)).collect();
        let system_stacks = self
            .stacks
            .iter()
            .filter(|s| is_system_stack(s))
            .cloned()
            .collect();

        FontCatalog {
            page: self.page,
            service_families: self.service_families,
            kit_projects: self.kit_projects,
            font_files: self.font_files.into_iter().collect(),
            font_faces: self.font_faces,
            preloaded: self.preloaded.into_iter().collect(),
            imports: self.imports,
            custom_properties: self.custom_properties,
            runtime_fetches: self.runtime_fetches,
            system_stacks,
            computed_fonts: computed_fonts.into_iter().collect(),
            stylesheets: self.stylesheets,
        }
    }
}
