//! Address Module for Crafter
//!
//! An address names a place in the document a binding reads from or writes to:
//!
//! ```text
//! address    := selector (":" designator)?
//! designator := "" | "[" attrname "]" | propname
//! ```
//!
//! - `#word` reads text content and writes markup content (default channel)
//! - `#word:value` reads or writes the `value` property
//! - `#word:[data-id]` reads or writes the `data-id` attribute
//! - `#word:innerText`, `#word:textContent`, `#word:innerHTML` name the content
//!   channels explicitly
//!
//! A trailing colon with nothing after it (`#word:`) is the default channel.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::CrafterError;

/// Selector token that resolves to the binding element itself when used as a target.
pub const SELF_SELECTOR: &str = "this";

lazy_static! {
    static ref PROPERTY_NAME: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
    static ref ATTRIBUTE_NAME: Regex = Regex::new(r#"^[^\s"'>/=\[\]]+$"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    /// `innerText` / `textContent`
    Text,
    /// `innerHTML`
    Markup,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum Designator {
    Content(ContentKind),
    Property(String),
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub selector: String,
    /// `None` is the default channel.
    pub designator: Option<Designator>,
}

impl Address {
    pub fn parse(raw: &str) -> Result<Self, CrafterError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CrafterError::address(raw, "address is empty"));
        }

        let segments: Vec<&str> = trimmed.split(':').collect();
        if segments.len() > 2 {
            return Err(CrafterError::address(raw, "more than one ':' separator"));
        }

        let selector = segments[0].trim();
        if selector.is_empty() {
            return Err(CrafterError::address(raw, "selector before ':' is empty"));
        }

        let designator = match segments.get(1).map(|s| s.trim()) {
            None | Some("") => None,
            Some(designator) => Some(parse_designator(raw, designator)?),
        };

        Ok(Address {
            selector: selector.to_string(),
            designator,
        })
    }

    /// True when the selector is the `this` token.
    pub fn is_self(&self) -> bool {
        self.selector == SELF_SELECTOR
    }
}

fn parse_designator(raw: &str, designator: &str) -> Result<Designator, CrafterError> {
    if let Some(inner) = designator.strip_prefix('[') {
        let name = inner
            .strip_suffix(']')
            .ok_or_else(|| CrafterError::address(raw, "attribute designator is missing ']'"))?
            .trim();
        if !ATTRIBUTE_NAME.is_match(name) {
            return Err(CrafterError::address(
                raw,
                format!("'{}' is not a valid attribute name", name),
            ));
        }
        // HTML attribute names are case-insensitive; the parser stores them lowercased.
        return Ok(Designator::Attribute(name.to_ascii_lowercase()));
    }

    if !PROPERTY_NAME.is_match(designator) {
        return Err(CrafterError::address(
            raw,
            format!("'{}' is not a valid property name", designator),
        ));
    }

    Ok(match designator {
        "innerText" | "textContent" => Designator::Content(ContentKind::Text),
        "innerHTML" => Designator::Content(ContentKind::Markup),
        name => Designator::Property(name.to_string()),
    })
}

impl FromStr for Address {
    type Err = CrafterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.designator {
            None => write!(f, "{}", self.selector),
            Some(Designator::Content(ContentKind::Text)) => write!(f, "{}:innerText", self.selector),
            Some(Designator::Content(ContentKind::Markup)) => {
                write!(f, "{}:innerHTML", self.selector)
            }
            Some(Designator::Property(name)) => write!(f, "{}:{}", self.selector, name),
            Some(Designator::Attribute(name)) => write!(f, "{}:[{}]", self.selector, name),
        }
    }
}

/// Split a comma separated address list. A blank list has no entries.
pub fn split_address_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|part| part.trim().to_string()).collect()
}
