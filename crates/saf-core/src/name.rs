//! Hierarchical request names and content prefixes

use std::fmt;
use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::NameError;
use crate::face::Layer;

/// A hierarchical request name, e.g. `/provider0/video/seg=3`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Name {
    components: Vec<String>,
}

impl Name {
    /// The root name `/`
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a name from its components
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            components: components
                .into_iter()
                .map(Into::into)
                .filter(|c: &String| !c.is_empty())
                .collect(),
        }
    }

    /// Parse a name from its URI form
    ///
    /// Accepts an optional `ndn:` scheme. Empty components are ignored, so
    /// `/a//b/` parses to `/a/b`.
    pub fn parse(uri: &str) -> Result<Self, NameError> {
        let path = uri.strip_prefix("ndn:").unwrap_or(uri);
        if !path.starts_with('/') {
            return Err(NameError::InvalidUri(uri.to_string()));
        }
        Ok(Self::from_components(path.split('/')))
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Check if `prefix` is a component-wise prefix of this name
    pub fn starts_with(&self, prefix: &Name) -> bool {
        prefix.len() <= self.len() && self.components[..prefix.len()] == prefix.components[..]
    }

    /// Truncate to the first `components` components
    ///
    /// A name shorter than `components` yields the whole name; zero yields
    /// the root prefix.
    pub fn content_prefix(&self, components: usize) -> ContentPrefix {
        let n = components.min(self.len());
        ContentPrefix::from_components(&self.components[..n])
    }

    /// Determine the content layer encoded in the name
    ///
    /// A component `layerK` or a component ending in `-LK.svc` selects layer
    /// K. Names without a layer marker are layer 0; layers beyond
    /// `max_layers` clamp to the highest available layer.
    pub fn content_layer(&self, max_layers: usize) -> Layer {
        let highest = max_layers.saturating_sub(1);
        self.components
            .iter()
            .find_map(|c| parse_layer_marker(c))
            .map(|layer| layer.min(highest))
            .unwrap_or(0)
    }
}

fn parse_layer_marker(component: &str) -> Option<Layer> {
    if let Some(rest) = component.strip_prefix("layer") {
        return rest.parse().ok();
    }
    let stem = component.strip_suffix(".svc")?;
    let idx = stem.rfind("-L")?;
    stem[idx + 2..].parse().ok()
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }
        for c in &self.components {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Key identifying the granularity of adaptation: the leading components of
/// a request name in URI form
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentPrefix(String);

impl ContentPrefix {
    /// The root prefix `/`
    pub fn root() -> Self {
        Self("/".to_string())
    }

    fn from_components(components: &[String]) -> Self {
        if components.is_empty() {
            Self::root()
        } else {
            Self(components.iter().map(|c| format!("/{}", c)).collect())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&Name> for ContentPrefix {
    fn from(name: &Name) -> Self {
        Self::from_components(name.components())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::parse(uri).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let n = name("/provider0/video/seg=3");
        assert_eq!(n.len(), 3);
        assert_eq!(n.to_string(), "/provider0/video/seg=3");

        assert_eq!(name("ndn:/a//b/").to_string(), "/a/b");
        assert!(name("/").is_empty());
        assert_eq!(Name::root().to_string(), "/");
    }

    #[test]
    fn test_parse_rejects_relative() {
        assert!(matches!(
            Name::parse("provider0/x"),
            Err(NameError::InvalidUri(_))
        ));
        assert!(Name::parse("").is_err());
    }

    #[test]
    fn test_content_prefix_truncation() {
        let n = name("/provider0/video/seg=3");
        assert_eq!(n.content_prefix(0), ContentPrefix::root());
        assert_eq!(n.content_prefix(1).as_str(), "/provider0");
        assert_eq!(n.content_prefix(2).as_str(), "/provider0/video");
        // Shorter names keep every component
        assert_eq!(n.content_prefix(10).as_str(), "/provider0/video/seg=3");
    }

    #[test]
    fn test_starts_with() {
        let n = name("/a/b/c");
        assert!(n.starts_with(&name("/a/b")));
        assert!(n.starts_with(&Name::root()));
        assert!(!n.starts_with(&name("/a/c")));
        assert!(!name("/a").starts_with(&n));
    }

    #[test]
    fn test_content_layer() {
        assert_eq!(name("/video/layer2/seg=1").content_layer(4), 2);
        assert_eq!(name("/video/clip-L1.svc").content_layer(4), 1);
        assert_eq!(name("/video/seg=1").content_layer(4), 0);
        // Clamped to the configured layer count
        assert_eq!(name("/video/layer7").content_layer(3), 2);
        assert_eq!(name("/video/layer7").content_layer(1), 0);
        // Not a marker
        assert_eq!(name("/video/layerx").content_layer(4), 0);
    }

    #[test]
    fn test_prefix_display_and_serde() {
        let prefix = name("/provider0/x").content_prefix(1);
        assert_eq!(format!("{}", prefix), "/provider0");

        let json = serde_json::to_string(&prefix).unwrap();
        let back: ContentPrefix = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prefix);
    }
}
