//! Address Resolver for Crafter
//!
//! Inputs and targets resolve against the live document at dispatch time. The two
//! directions fail differently on purpose:
//! - a missing input element reads as `""` so partial argument lists still run
//! - a missing target element is an error, there is nowhere to write the result

use serde_json::Value;

use crate::address::{split_address_list, Address, ContentKind, Designator};
use crate::bridge::value_to_text;
use crate::dom::{Document, Element};
use crate::error::CrafterError;

/// Read every address of a comma separated list.
pub fn read_all(document: &Document, raw_list: &str) -> Result<Vec<String>, CrafterError> {
    read_addresses(document, &split_address_list(raw_list))
}

pub fn read_addresses(document: &Document, raws: &[String]) -> Result<Vec<String>, CrafterError> {
    raws.iter()
        .map(|raw| read_address(document, &Address::parse(raw)?))
        .collect()
}

pub fn read_address(document: &Document, address: &Address) -> Result<String, CrafterError> {
    let Some(element) = document.query_selector(&address.selector)? else {
        tracing::debug!(address = %address, "input element not found, reading empty string");
        return Ok(String::new());
    };

    Ok(match &address.designator {
        None | Some(Designator::Content(ContentKind::Text)) => element.text_content(),
        Some(Designator::Content(ContentKind::Markup)) => element.inner_html(),
        Some(Designator::Property(name)) => document.property(&element, name).unwrap_or_default(),
        Some(Designator::Attribute(name)) => element.attribute(name).unwrap_or_default(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Text,
    Markup,
    Property(String),
    Attribute(String),
}

/// Destination of a binding result.
#[derive(Debug, Clone, Default)]
pub struct TargetWriter {
    destination: Option<(Element, Channel)>,
}

impl TargetWriter {
    /// Writer that discards the value.
    pub fn noop() -> Self {
        TargetWriter::default()
    }

    pub fn destination(&self) -> Option<&Element> {
        self.destination.as_ref().map(|(element, _)| element)
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.destination.as_ref().map(|(_, channel)| channel)
    }

    pub fn write(&self, document: &Document, value: &Value) {
        let Some((element, channel)) = &self.destination else {
            return;
        };
        let text = value_to_text(value);
        match channel {
            Channel::Text => {
                element.set_text_content(&text);
                document.prune_detached();
            }
            Channel::Markup => {
                element.set_inner_html(&text);
                document.prune_detached();
            }
            Channel::Property(name) => document.set_property(element, name, &text),
            Channel::Attribute(name) => element.set_attribute(name, &text),
        }
    }
}

/// Build the writer for a target address. A blank address or the `this` selector
/// writes to `self_element`.
pub fn make_writer(
    document: &Document,
    raw: &str,
    self_element: &Element,
) -> Result<TargetWriter, CrafterError> {
    if raw.trim().is_empty() {
        return Ok(TargetWriter {
            destination: Some((self_element.clone(), Channel::Markup)),
        });
    }

    let address = Address::parse(raw)?;
    let element = if address.is_self() {
        self_element.clone()
    } else {
        document
            .query_selector(&address.selector)?
            .ok_or_else(|| CrafterError::TargetNotFound {
                raw: raw.to_string(),
            })?
    };

    let channel = match address.designator {
        None | Some(Designator::Content(ContentKind::Markup)) => Channel::Markup,
        Some(Designator::Content(ContentKind::Text)) => Channel::Text,
        Some(Designator::Property(name)) => Channel::Property(name),
        Some(Designator::Attribute(name)) => Channel::Attribute(name),
    };

    Ok(TargetWriter {
        destination: Some((element, channel)),
    })
}
