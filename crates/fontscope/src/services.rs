//! Font-service link classification
//!
//! Two services get first-class treatment:
//! - Google Fonts, whose stylesheet URL lists the families in `family=`
//! - Adobe Fonts (Typekit), where a kit id resolves to a remote stylesheet
//!   holding the kit's `@font-face` rules

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::css;
use crate::fetch::{FetchOutcome, Fetcher};

const FAMILY_LIST_HOST: &str = "fonts.googleapis.com";
const KIT_HOSTS: &[&str] = &["use.typekit.net", "use.typekit.com"];

/// Which service a link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Families encoded in the query string
    FamilyList,
    /// Opaque project id resolved through a remote stylesheet
    Kit,
}

/// A family requested from the family-list service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFamily {
    pub name: String,
    /// The link the family was found in
    pub link: String,
}

/// A family bundled in a kit project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitFamily {
    pub family: String,
    pub weight: String,
    pub style: String,
}

/// A kit project and the families its stylesheet declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitProject {
    pub project_id: String,
    pub link: String,
    pub families: Vec<KitFamily>,
}

/// Everything found through font-service links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceFonts {
    pub families: Vec<ServiceFamily>,
    pub kits: Vec<KitProject>,
}

/// Recognize a font-service link by its host.
pub fn classify(url: &Url) -> Option<ServiceKind> {
    let host = url.host_str()?.to_ascii_lowercase();
    if host == FAMILY_LIST_HOST {
        Some(ServiceKind::FamilyList)
    } else if KIT_HOSTS.contains(&host.as_str()) && kit_project_id(url).is_some() {
        Some(ServiceKind::Kit)
    } else {
        None
    }
}

/// Family names from the `family=` parameters of a family-list link.
///
/// `family=Open+Sans:400,700|Roboto` yields `Open Sans` and `Roboto`. Names
/// are not deduplicated.
pub fn family_list_names(url: &Url) -> Vec<String> {
    url.query_pairs()
        .filter(|(key, _)| key == "family")
        .flat_map(|(_, value)| {
            value
                .split('|')
                .filter_map(|spec| {
                    let name = spec.split(':').next().unwrap_or_default();
                    let name = name.replace('+', " ").trim().to_string();
                    (!name.is_empty()).then_some(name)
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// The kit project id: last path segment without its extension.
pub fn kit_project_id(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let id = segment
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(segment);
    (!id.is_empty()).then(|| id.to_string())
}

/// Families declared by a kit stylesheet, first occurrence of each family
/// winning.
pub fn kit_families(css_text: &str) -> Vec<KitFamily> {
    let mut seen = IndexSet::new();
    css::font_faces(css_text)
        .into_iter()
        .filter(|face| seen.insert(face.family.clone()))
        .map(|face| KitFamily {
            family: face.family,
            weight: face.weight,
            style: face.style,
        })
        .collect()
}

/// Classify every link and fetch kit stylesheets, one at a time.
///
/// A kit whose stylesheet cannot be fetched is still reported, with no
/// families.
pub async fn classify_links(links: &[Url], fetcher: &Fetcher) -> ServiceFonts {
    let mut fonts = ServiceFonts::default();

    for link in links {
        match classify(link) {
            Some(ServiceKind::FamilyList) => {
                fonts
                    .families
                    .extend(family_list_names(link).into_iter().map(|name| ServiceFamily {
                        name,
                        link: link.to_string(),
                    }));
            }
            Some(ServiceKind::Kit) => {
                let Some(project_id) = kit_project_id(link) else {
                    continue;
                };
                let families = match fetcher.fetch_stylesheet(link).await {
                    FetchOutcome::Fetched { text, .. } => kit_families(&text),
                    FetchOutcome::Failed { .. } => Vec::new(),
                };
                tracing::debug!(project_id = %project_id, families = families.len(), "kit project");
                fonts.kits.push(KitProject {
                    project_id,
                    link: link.to_string(),
                    families,
                });
            }
            None => {}
        }
    }

    fonts
}
