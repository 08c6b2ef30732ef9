//! Best-effort CSS declaration extraction
//!
//! This is a regular-expression and brace-matching extractor, not a CSS
//! parser. It never fails: anything it cannot make sense of is skipped.
//! Nesting at-rules (`@media`, `@supports`, `@layer`, ...) are descended into;
//! other at-rule blocks are ignored.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::resolve::unquote;

/// Hosts that serve web fonts or font stylesheets
pub const FONT_SERVICE_HOSTS: &[&str] = &[
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "use.typekit.net",
    "use.typekit.com",
    "p.typekit.net",
    "fonts.bunny.net",
    "fast.fonts.net",
    "cloud.typography.com",
];

static COMMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

static FONT_FACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@font-face\s*\{([^{}]*)\}").unwrap());

static IMPORT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?ix)
        @import\s+
        (?:
            url\(\s*(?:"(?P<url_double>[^"]*)"|'(?P<url_single>[^']*)'|(?P<url_bare>[^)\s]*))\s*\)
            |
            "(?P<double>[^"]*)"
            |
            '(?P<single>[^']*)'
        )"#,
    )
    .unwrap()
});

static SRC_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"(?P<double>[^"]*)"|'(?P<single>[^']*)'|(?P<bare>[^)]*))\s*\)"#)
        .unwrap()
});

static FONT_EXTENSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(woff2?|ttf|otf|eot)(\?.*)?$").unwrap());

/// One `@font-face` rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontFaceDeclaration {
    /// The declared `font-family`, unquoted
    pub family: String,
    /// The raw `src` value, unparsed
    pub src: String,
    /// `font-style`, `normal` when absent
    pub style: String,
    /// `font-weight`, `normal` when absent
    pub weight: String,
    /// `font-display`, empty when absent
    pub display: String,
}

/// A `font-family` (or `font` shorthand) found in a style rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyUsage {
    /// Selector text of the rule
    pub selector: String,
    /// The family value with quotes removed
    pub family: String,
    /// Derived from the `font` shorthand (lower confidence)
    pub shorthand: bool,
}

/// Remove `/* ... */` comments.
pub fn strip_comments(css: &str) -> String {
    COMMENT_REGEX.replace_all(css, "").into_owned()
}

/// Extract every `@font-face` rule that declares a family.
///
/// Rules for the same family are all kept: weight and style variants are
/// separate faces.
pub fn font_faces(css: &str) -> Vec<FontFaceDeclaration> {
    let css = strip_comments(css);
    let mut faces = Vec::new();

    for cap in FONT_FACE_REGEX.captures_iter(&css) {
        let mut family = None;
        let mut src = String::new();
        let mut style = None;
        let mut weight = None;
        let mut display = None;

        for (name, value) in declarations(&cap[1]) {
            match name.as_str() {
                "font-family" => family = Some(unquote(&value).to_string()),
                "src" => src = value,
                "font-style" => style = Some(value),
                "font-weight" => weight = Some(value),
                "font-display" => display = Some(value),
                _ => {}
            }
        }

        let Some(family) = family.filter(|f| !f.is_empty()) else {
            continue;
        };

        faces.push(FontFaceDeclaration {
            family,
            src,
            style: style.unwrap_or_else(|| "normal".to_string()),
            weight: weight.unwrap_or_else(|| "normal".to_string()),
            display: display.unwrap_or_default(),
        });
    }

    faces
}

/// Targets of every `@import` statement, in order, as written.
pub fn imports(css: &str) -> Vec<String> {
    let css = strip_comments(css);
    IMPORT_REGEX
        .captures_iter(&css)
        .filter_map(|cap| {
            ["url_double", "url_single", "url_bare", "double", "single"]
                .iter()
                .find_map(|group| cap.name(group))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|target| !target.is_empty())
        .collect()
}

/// Whether an import target looks font-related.
///
/// True for known font-service hosts, anything mentioning `fonts`, and
/// direct references to font binaries.
pub fn is_font_import(target: &str) -> bool {
    let lower = target.to_ascii_lowercase();
    FONT_SERVICE_HOSTS.iter().any(|host| lower.contains(host))
        || lower.contains("fonts")
        || FONT_EXTENSION_REGEX.is_match(&lower)
}

/// Every `url(...)` reference inside a `src` value, unquoted.
pub fn src_urls(src: &str) -> Vec<String> {
    SRC_URL_REGEX
        .captures_iter(src)
        .filter_map(|cap| {
            cap.name("double")
                .or_else(|| cap.name("single"))
                .or_else(|| cap.name("bare"))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|url| !url.is_empty())
        .collect()
}

/// Extract `font-family` and `font` usages from every style rule.
///
/// The `font` shorthand is handled with a heuristic: its last
/// whitespace-separated token is taken as the family unless it starts with a
/// digit. This misreads multi-family stacks and is only an approximation.
pub fn family_usages(css: &str) -> Vec<FamilyUsage> {
    let css = strip_comments(css);
    let mut usages = Vec::new();
    walk_rules(&css, &mut usages);
    usages
}

/// Keep custom properties that look like font settings.
///
/// The name must mention `font`, `typeface` or `text`, and the value must be
/// a non-empty literal rather than a `var()` reference.
pub fn font_custom_properties(
    properties: impl IntoIterator<Item = (String, String)>,
) -> Vec<(String, String)> {
    properties
        .into_iter()
        .filter_map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            let value = value.trim().to_string();
            let wanted = ["font", "typeface", "text"]
                .iter()
                .any(|token| lower.contains(token));
            let literal = !value.is_empty() && !value.to_ascii_lowercase().starts_with("var(");
            (wanted && literal).then_some((name, value))
        })
        .collect()
}

const NESTING_AT_RULES: &[&str] = &[
    "media",
    "supports",
    "layer",
    "container",
    "document",
    "-moz-document",
    "scope",
];

fn walk_rules(css: &str, usages: &mut Vec<FamilyUsage>) {
    let bytes = css.as_bytes();
    let mut pos = 0;

    while let Some(open) = find_unquoted(bytes, pos, b'{') {
        let Some(close) = matching_close(bytes, open) else {
            // Unbalanced input: nothing after this point can be trusted
            break;
        };

        let prelude = css[pos..open]
            .rsplit([';', '}'])
            .next()
            .unwrap_or_default()
            .trim();
        let body = &css[open + 1..close];

        if let Some(at_rule) = prelude.strip_prefix('@') {
            let name = at_rule
                .split(|c: char| c.is_whitespace() || c == '(' || c == '{')
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase();
            if NESTING_AT_RULES.contains(&name.as_str()) {
                walk_rules(body, usages);
            }
        } else if !prelude.is_empty() {
            push_usages(prelude, body, usages);
        }

        pos = close + 1;
    }
}

fn push_usages(selector: &str, body: &str, usages: &mut Vec<FamilyUsage>) {
    let selector = selector.split_whitespace().collect::<Vec<_>>().join(" ");

    for (name, value) in declarations(body) {
        let value = strip_important(&value);
        match name.as_str() {
            "font-family" => {
                let family = value.replace(['"', '\''], "").trim().to_string();
                if !family.is_empty() {
                    usages.push(FamilyUsage {
                        selector: selector.clone(),
                        family,
                        shorthand: false,
                    });
                }
            }
            "font" => {
                let Some(last) = value.split_whitespace().last() else {
                    continue;
                };
                if last.starts_with(|c: char| c.is_ascii_digit()) {
                    continue;
                }
                let family = last.replace(['"', '\''], "");
                if !family.is_empty() {
                    usages.push(FamilyUsage {
                        selector: selector.clone(),
                        family,
                        shorthand: true,
                    });
                }
            }
            _ => {}
        }
    }
}

fn strip_important(value: &str) -> &str {
    let trimmed = value.trim_end();
    match trimmed.to_ascii_lowercase().rfind("!important") {
        Some(idx) if idx + "!important".len() == trimmed.len() => trimmed[..idx].trim_end(),
        _ => trimmed,
    }
}

/// Split a declaration block into lowercase `(name, value)` pairs.
///
/// Semicolons inside quotes or parentheses (data URIs, `format()` lists) do
/// not end a declaration.
pub(crate) fn declarations(block: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 0_i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in block.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' | '\'' if quote == Some(ch) => quote = None,
            '"' | '\'' if quote.is_none() => quote = Some(ch),
            '(' if quote.is_none() => paren_depth += 1,
            ')' if quote.is_none() => paren_depth = (paren_depth - 1).max(0),
            ';' if quote.is_none() && paren_depth == 0 => {
                push_declaration(&mut out, &current);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    push_declaration(&mut out, &current);

    out
}

fn push_declaration(out: &mut Vec<(String, String)>, raw: &str) {
    let Some((name, value)) = raw.trim().split_once(':') else {
        return;
    };
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return;
    }
    let name = if name.starts_with("--") {
        name.to_string()
    } else {
        name.to_ascii_lowercase()
    };
    out.push((name, value.trim().to_string()));
}

fn find_unquoted(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    let mut quote = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == needle => return Some(i),
            None => {}
        }
        i += 1;
    }
    None
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0_usize;
    let mut quote = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}
