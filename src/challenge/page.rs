//! Page automation contract used by the challenge solver.
//!
//! The solver never drives a browser directly. It asks a [`ChallengePage`]
//! for the current challenge image and hands it text to inject, which keeps
//! the solve loop testable with in-memory pages.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How to find an element on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum FieldLocator {
    /// Element `id` attribute, matched literally.
    Id(String),
    /// CSS selector.
    Css(String),
    /// XPath expression.
    #[serde(rename = "xpath")]
    XPath(String),
}

impl FieldLocator {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    /// CSS selector matching the element with this id.
    ///
    /// Characters outside `[A-Za-z0-9_-]` are backslash-escaped, so ids such
    /// as `DWNL$ctl10` produce a valid selector.
    pub fn css_for_id(id: &str) -> Self {
        let mut selector = String::with_capacity(id.len() + 1);
        selector.push('#');
        for c in id.chars() {
            if !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                selector.push('\\');
            }
            selector.push(c);
        }
        Self::Css(selector)
    }

    /// Lookup kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Id(_) => "id",
            Self::Css(_) => "css",
            Self::XPath(_) => "xpath",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Id(v) | Self::Css(v) | Self::XPath(v) => v,
        }
    }
}

impl fmt::Display for FieldLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

/// Errors reported by a page collaborator.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("challenge image could not be retrieved: {0}")]
    ImageUnavailable(String),

    #[error("input field not found: {0}")]
    FieldNotFound(FieldLocator),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("page operation timed out after {0:?}")]
    Timeout(Duration),
}

/// A live page showing a visual challenge.
#[async_trait]
pub trait ChallengePage: Send + Sync {
    /// Raw bytes of the current challenge image.
    ///
    /// `Ok(None)` means the page shows no challenge image.
    async fn fetch_challenge_image(&self) -> Result<Option<Vec<u8>>, PageError>;

    /// Clear the field at `locator` and type `text` into it.
    async fn fill_field(&self, locator: &FieldLocator, text: &str) -> Result<(), PageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_for_id_escapes() {
        assert_eq!(
            FieldLocator::css_for_id("DWNL$ctl10"),
            FieldLocator::Css("#DWNL\\$ctl10".to_string())
        );
        assert_eq!(
            FieldLocator::css_for_id("plain-id_1"),
            FieldLocator::Css("#plain-id_1".to_string())
        );
    }

    #[test]
    fn test_locator_serde_shape() {
        let locator: FieldLocator =
            serde_json::from_str(r#"{"by": "xpath", "value": "//input[1]"}"#).unwrap();
        assert_eq!(locator, FieldLocator::XPath("//input[1]".to_string()));

        let json = serde_json::to_value(FieldLocator::id("DWNL$ctl10")).unwrap();
        assert_eq!(json["by"], "id");
        assert_eq!(json["value"], "DWNL$ctl10");
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(FieldLocator::id("x").to_string(), "id=x");
    }
}
