//! Computed and runtime font observation
//!
//! Only available with a live document. Each observation is a script
//! evaluated in the page; the filtering of its raw output happens here, on the
//! Rust side. A script that fails is logged and contributes nothing.

use std::sync::LazyLock;

use indexmap::{IndexMap, IndexSet};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::acquire::LiveDocument;
use crate::css;

/// `getComputedStyle(el).fontFamily` for every element, shadow roots
/// included.
const COMPUTED_STACKS_SCRIPT: &str = r#"(() => {
  const stacks = [];
  const visit = (root) => {
    for (const el of root.querySelectorAll('*')) {
      try { stacks.push(getComputedStyle(el).fontFamily); } catch (e) {}
      if (el.shadowRoot) visit(el.shadowRoot);
    }
  };
  visit(document);
  return stacks;
})()"#;

/// Custom properties of the root element: names declared on root-targeting
/// rules (`:root`, `html`, also qualified like `html.dark`) and every `--*`
/// name the computed style enumerates, each with its computed value.
const CUSTOM_PROPERTIES_SCRIPT: &str = r#"(() => {
  const computed = getComputedStyle(document.documentElement);
  const entry = (name) => ({ name, value: computed.getPropertyValue(name).trim() });
  const declared = new Set();
  const isRoot = (selector) =>
    selector.split(',').some((s) => /^\s*(:root|html)([.#:\[][^\s>+~]*)?\s*$/i.test(s));
  const walk = (rules) => {
    for (const rule of rules) {
      if (rule.cssRules && !rule.selectorText) { walk(rule.cssRules); continue; }
      if (!rule.selectorText || !rule.style || !isRoot(rule.selectorText)) continue;
      for (let i = 0; i < rule.style.length; i++) {
        const name = rule.style[i];
        if (name.startsWith('--')) declared.add(name);
      }
    }
  };
  for (const sheet of document.styleSheets) {
    try { walk(sheet.cssRules); } catch (e) {}
  }
  const enumerated = [];
  for (let i = 0; i < computed.length; i++) {
    if (computed[i].startsWith('--')) enumerated.push(computed[i]);
  }
  return { declared: Array.from(declared).map(entry), computed: enumerated.map(entry) };
})()"#;

const RESOURCE_TIMINGS_SCRIPT: &str = r#"(() => performance.getEntriesByType('resource').map((e) => ({
  name: e.name,
  initiatorType: e.initiatorType,
  duration: e.duration,
})))()"#;

/// Rule text of every stylesheet, `null` where the rules are not readable.
const STYLESHEETS_SCRIPT: &str = r#"(() => Array.from(document.styleSheets).map((sheet) => {
  let css = null;
  try { css = Array.from(sheet.cssRules).map((r) => r.cssText).join('\n'); } catch (e) {}
  return { href: sheet.href, css };
}))()"#;

static FONT_RESOURCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(/fonts?/|\.(woff2?|ttf|otf|eot)([?#]|$))").unwrap()
});

/// A stylesheet as the browser loaded it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SheetSnapshot {
    /// `None` for inline `<style>` sheets
    pub href: Option<String>,
    /// `None` when the rules are cross-origin restricted
    pub css: Option<String>,
}

/// One `performance` resource entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceTiming {
    pub name: String,
    #[serde(rename = "initiatorType")]
    pub initiator_type: String,
    pub duration: f64,
}

/// A font-related resource the page loaded at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFetch {
    pub url: String,
    pub duration_ms: f64,
    pub initiator: String,
}

/// A font-related custom property and its computed value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPropertyFont {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct RawProperty {
    name: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct RootProperties {
    #[serde(default)]
    declared: Vec<RawProperty>,
    #[serde(default)]
    computed: Vec<RawProperty>,
}

/// Everything the page scripts found, already filtered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    /// Distinct raw computed stacks, in discovery order
    pub computed_stacks: Vec<String>,
    pub custom_properties: Vec<CustomPropertyFont>,
    pub runtime_fetches: Vec<RuntimeFetch>,
}

/// Run the computed-style, custom-property and resource-timing scripts.
pub async fn observe<D: LiveDocument>(document: &D) -> Observation {
    let stacks: Vec<String> = run_script(document, "computed_stacks", COMPUTED_STACKS_SCRIPT).await;
    let properties: RootProperties =
        run_script(document, "custom_properties", CUSTOM_PROPERTIES_SCRIPT).await;
    let timings: Vec<ResourceTiming> =
        run_script(document, "resource_timings", RESOURCE_TIMINGS_SCRIPT).await;

    let observation = Observation {
        computed_stacks: unique_stacks(stacks),
        custom_properties: font_properties(properties),
        runtime_fetches: font_fetches(timings),
    };

    tracing::debug!(
        computed_stacks = observation.computed_stacks.len(),
        custom_properties = observation.custom_properties.len(),
        runtime_fetches = observation.runtime_fetches.len(),
        "observed live document"
    );
    observation
}

/// Snapshot the stylesheets the browser has loaded.
pub async fn stylesheets<D: LiveDocument>(document: &D) -> Vec<SheetSnapshot> {
    run_script(document, "stylesheets", STYLESHEETS_SCRIPT).await
}

async fn run_script<T, D>(document: &D, name: &str, script: &str) -> T
where
    T: DeserializeOwned + Default,
    D: LiveDocument,
{
    let value = match document.evaluate(script).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(script = name, error = %e, "page script failed");
            return T::default();
        }
    };

    match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(script = name, error = %e, "page script returned unexpected data");
            T::default()
        }
    }
}

/// Whole-string dedup of computed stacks; empty values dropped.
pub fn unique_stacks(stacks: impl IntoIterator<Item = String>) -> Vec<String> {
    stacks
        .into_iter()
        .map(|stack| stack.trim().to_string())
        .filter(|stack| !stack.is_empty())
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Keep resources initiated by CSS or that look like font files.
pub fn font_fetches(timings: impl IntoIterator<Item = ResourceTiming>) -> Vec<RuntimeFetch> {
    timings
        .into_iter()
        .filter(|t| t.initiator_type == "css" || FONT_RESOURCE_REGEX.is_match(&t.name))
        .map(|t| RuntimeFetch {
            url: t.name,
            duration_ms: (t.duration * 100.0).round() / 100.0,
            initiator: t.initiator_type,
        })
        .collect()
}

/// Declared names first, then names only the computed style knows about.
fn font_properties(properties: RootProperties) -> Vec<CustomPropertyFont> {
    let mut merged: IndexMap<String, String> = IndexMap::new();
    for property in properties.declared.into_iter().chain(properties.computed) {
        merged.entry(property.name).or_insert(property.value);
    }

    css::font_custom_properties(merged)
        .into_iter()
        .map(|(name, value)| CustomPropertyFont { name, value })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::{Error, Result};

    fn timing(name: &str, initiator: &str, duration: f64) -> ResourceTiming {
        ResourceTiming {
            name: name.into(),
            initiator_type: initiator.into(),
            duration,
        }
    }

    #[test]
    fn test_font_fetches_filter() {
        let fetches = font_fetches(vec![
            timing("https://example.com/app.js", "script", 12.0),
            timing("https://example.com/bg.png", "css", 3.456),
            timing("https://cdn.example.com/Inter.woff2?v=4", "other", 20.0),
            timing("https://example.com/static/fonts/icons", "fetch", 1.0),
            timing("https://example.com/woff2-guide.html", "navigation", 1.0),
        ]);

        let urls: Vec<&str> = fetches.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/bg.png",
                "https://cdn.example.com/Inter.woff2?v=4",
                "https://example.com/static/fonts/icons",
            ]
        );
        assert_eq!(fetches[0].duration_ms, 3.46);
        assert_eq!(fetches[0].initiator, "css");
    }

    #[test]
    fn test_unique_stacks() {
        let stacks = unique_stacks(vec![
            "Inter, sans-serif".to_string(),
            "Times New Roman".to_string(),
            "Inter, sans-serif".to_string(),
            "".to_string(),
            "Inter,sans-serif".to_string(),
        ]);
        assert_eq!(
            stacks,
            vec!["Inter, sans-serif", "Times New Roman", "Inter,sans-serif"]
        );
    }

    struct CannedDocument;

    impl LiveDocument for CannedDocument {
        async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
            if script == COMPUTED_STACKS_SCRIPT {
                Ok(json!(["Inter, sans-serif", "Inter, sans-serif", "Georgia"]))
            } else if script == CUSTOM_PROPERTIES_SCRIPT {
                Ok(json!({
                    "declared": [
                        { "name": "--font-body", "value": " Inter, sans-serif" },
                        { "name": "--text-heading", "value": "var(--font-body)" },
                        { "name": "--brand-color", "value": "#f00" },
                    ],
                    "computed": [
                        { "name": "--brand-color", "value": "#f00" },
                        { "name": "--font-body", "value": "Inter, sans-serif" },
                    ],
                }))
            } else if script == RESOURCE_TIMINGS_SCRIPT {
                Ok(json!("not a list"))
            } else {
                Err(Error::Browser("unexpected script".into()))
            }
        }

        async fn close(self) {}
    }

    fn raw(name: &str, value: &str) -> RawProperty {
        RawProperty {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_font_properties_include_computed_only_names() {
        // `--font-dark` comes from `html.dark`, `--font-mono` from an inline
        // style on <html>: only the computed style enumeration sees them.
        let properties = font_properties(RootProperties {
            declared: vec![raw("--font-body", "Inter")],
            computed: vec![
                raw("--font-body", "Inter"),
                raw("--font-dark", "\"Night Sans\", sans-serif"),
                raw("--gap", "4px"),
                raw("--font-mono", "Menlo"),
            ],
        });

        let names: Vec<&str> = properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["--font-body", "--font-dark", "--font-mono"]);
        assert_eq!(properties[1].value, "\"Night Sans\", sans-serif");
    }

    #[test]
    fn test_custom_properties_script_reads_the_computed_root_style() {
        assert!(CUSTOM_PROPERTIES_SCRIPT.contains("getComputedStyle(document.documentElement)"));
        assert!(CUSTOM_PROPERTIES_SCRIPT.contains("computed.length"));
    }

    #[test_log::test(tokio::test)]
    async fn test_observe_filters_script_results() {
        let observation = observe(&CannedDocument).await;

        assert_eq!(observation.computed_stacks, vec!["Inter, sans-serif", "Georgia"]);
        assert_eq!(
            observation.custom_properties,
            vec![CustomPropertyFont {
                name: "--font-body".into(),
                value: "Inter, sans-serif".into(),
            }]
        );
        // malformed script output degrades to nothing
        assert!(observation.runtime_fetches.is_empty());

        // failing script degrades to nothing
        assert!(stylesheets(&CannedDocument).await.is_empty());
    }
}
