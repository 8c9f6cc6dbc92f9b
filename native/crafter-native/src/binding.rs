//! Binding descriptors read off candidate elements.

use serde::Serialize;

use crate::address::split_address_list;
use crate::dom::Element;
use crate::options::CrafterOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Immediate,
    /// Literal event name. Not validated; unknown names simply never fire.
    Event(String),
}

#[derive(Debug, Clone)]
pub struct BindingDescriptor {
    pub element: Element,
    pub operation: String,
    /// Raw input addresses in argument order.
    pub inputs: Vec<String>,
    /// Raw target address. `None` discards the result.
    pub target: Option<String>,
    pub trigger: Trigger,
    pub is_async: bool,
    pub processed: bool,
}

/// Serializable view of a descriptor for tooling.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSummary {
    pub operation: String,
    pub inputs: Vec<String>,
    pub target: Option<String>,
    pub trigger: Option<String>,
    pub is_async: bool,
    pub processed: bool,
}

/// Operation name of a binding candidate, if `element` is one.
pub fn operation_name(element: &Element, options: &CrafterOptions) -> Option<String> {
    element
        .attribute(&options.name_attribute)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

pub fn is_processed(element: &Element, options: &CrafterOptions) -> bool {
    element.has_attribute(&options.processed_attribute)
}

/// Read the binding attributes of `element`. `None` when it names no operation.
pub fn extract(element: &Element, options: &CrafterOptions) -> Option<BindingDescriptor> {
    let operation = operation_name(element, options)?;

    let inputs = element
        .attribute(&options.input_attribute)
        .map(|raw| split_address_list(&raw))
        .unwrap_or_default();

    let trigger = match element.attribute(&options.trigger_attribute) {
        Some(event) if !event.trim().is_empty() => Trigger::Event(event.trim().to_string()),
        _ => Trigger::Immediate,
    };

    Some(BindingDescriptor {
        element: element.clone(),
        operation,
        inputs,
        target: element.attribute(&options.target_attribute),
        trigger,
        is_async: element.has_attribute(&options.async_attribute),
        processed: is_processed(element, options),
    })
}

impl BindingDescriptor {
    pub fn summary(&self) -> BindingSummary {
        BindingSummary {
            operation: self.operation.clone(),
            inputs: self.inputs.clone(),
            target: self.target.clone(),
            trigger: match &self.trigger {
                Trigger::Immediate => None,
                Trigger::Event(name) => Some(name.clone()),
            },
            is_async: self.is_async,
            processed: self.processed,
        }
    }
}
