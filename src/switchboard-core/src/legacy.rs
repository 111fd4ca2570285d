//! Legacy XML representation of feature settings.
//!
//! Older releases stored one element per feature:
//!
//! ```xml
//! <Features>
//!   <Feature name="NewEditor" enabled="true" />
//!   <Feature name="Telemetry" enabled="" />
//! </Features>
//! ```
//!
//! An empty `enabled` attribute means unspecified. The wrapper element is
//! not significant; every `Feature` element in the document is read.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::store::atomic_write;
use crate::{FeatureError, FeatureState, Result, TriState};

const FEATURE_ELEMENT: &str = "Feature";

/// Parse every `<Feature>` element in a legacy document.
pub fn parse_legacy_xml(xml: &str) -> Result<Vec<(String, TriState)>> {
    let mut features = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];

        if let Some(comment) = rest.strip_prefix("!--") {
            let end = comment
                .find("-->")
                .ok_or_else(|| FeatureError::Legacy("unterminated comment".to_string()))?;
            rest = &comment[end + 3..];
            continue;
        }

        let end = find_tag_end(rest)
            .ok_or_else(|| FeatureError::Legacy("unterminated element".to_string()))?;
        let tag = &rest[..end];
        rest = &rest[end + 1..];

        if tag.starts_with('/') || tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }

        let tag = tag.trim_end_matches('/').trim();
        let (element, attributes) = match tag.find(char::is_whitespace) {
            Some(split) => (&tag[..split], &tag[split..]),
            None => (tag, ""),
        };
        if element != FEATURE_ELEMENT {
            continue;
        }

        let attributes = parse_attributes(attributes)?;
        let name = attributes
            .iter()
            .find(|(key, _)| key == "name")
            .map(|(_, value)| value.as_str())
            .unwrap_or_default();
        if name.is_empty() {
            warn!("Skipping legacy feature element without a name");
            continue;
        }

        let enabled = attributes
            .iter()
            .find(|(key, _)| key == "enabled")
            .map(|(_, value)| value.as_str())
            .unwrap_or_default();
        let enabled = enabled.parse().unwrap_or_else(|_| {
            warn!(
                "Unable to read feature enabled configuration: name={}, enabled={}",
                name, enabled
            );
            TriState::Unspecified
        });

        features.push((name.to_string(), enabled));
    }

    Ok(features)
}

/// Render features as a legacy document.
pub fn render_legacy_xml<'a, I>(features: I) -> String
where
    I: IntoIterator<Item = &'a FeatureState>,
{
    let mut out = String::from("<Features>\n");
    for feature in features {
        out.push_str(&format!(
            "  <{} name=\"{}\" enabled=\"{}\" />\n",
            FEATURE_ELEMENT,
            escape(&feature.name),
            escape(feature.enabled.as_str())
        ));
    }
    out.push_str("</Features>\n");
    out
}

/// A legacy document on disk.
#[derive(Debug, Clone)]
pub struct LegacyXmlFile {
    path: PathBuf,
}

impl LegacyXmlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the document; a missing file has no features.
    pub fn read(&self) -> Result<Vec<(String, TriState)>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        parse_legacy_xml(&content)
    }

    /// Replace the document with `features`.
    pub fn write<'a, I>(&self, features: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a FeatureState>,
    {
        atomic_write(&self.path, render_legacy_xml(features).as_bytes())?;
        debug!("Wrote legacy feature file {}", self.path.display());
        Ok(())
    }
}

/// Position of the closing `>`, ignoring any inside quoted attribute values.
fn find_tag_end(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_attributes(s: &str) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    let mut rest = s.trim_start();

    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| FeatureError::Legacy(format!("malformed attribute near '{rest}'")))?;
        let key = rest[..eq].trim().to_string();
        let after = rest[eq + 1..].trim_start();

        let quote = after
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| FeatureError::Legacy(format!("unquoted value for '{key}'")))?;
        let value_end = after[1..]
            .find(quote)
            .ok_or_else(|| FeatureError::Legacy(format!("unterminated value for '{key}'")))?;

        attributes.push((key, unescape(&after[1..1 + value_end])));
        rest = after[value_end + 2..].trim_start();
    }

    Ok(attributes)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
