//! # Crafter
//!
//! Declarative bindings between HTML elements and an external operation table.
//!
//! ```html
//! <p id="seed">21</p>
//! <span craft-name="double" craft-input="#seed" craft-target="this"></span>
//! ```
//!
//! The engine finds every element carrying the name attribute, reads its inputs
//! from the live document, calls the named bridge operation, writes the result to
//! the target and marks the element processed. Markup written by a binding is
//! indexed again, so operations can emit further bindings.
//!
//! ## Address Grammar
//!
//! `selector[:designator]`, where the designator is one of
//! - absent or empty: default channel (text on read, markup on write)
//! - `innerText` / `textContent`: text content
//! - `innerHTML`: markup
//! - `[name]`: attribute
//! - any other identifier: script-visible property
//!
//! The selector `this` denotes the binding element itself.
//!
//! ## Layout
//!
//! - [`dom`]: live document, element handles, selector subset
//! - [`address`] / [`resolve`]: address parsing, reading and writing
//! - [`bridge`]: the operation table
//! - [`binding`] / [`engine`]: descriptors, dispatch and re-indexing
//! - [`prerender`] / [`cache`]: ahead-of-time rendering of static pages

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod address;
pub mod binding;
pub mod bridge;
pub mod cache;
pub mod dom;
pub mod engine;
pub mod error;
pub mod options;
pub mod prerender;
pub mod resolve;

#[cfg(test)]
mod engine_tests;

pub use address::{Address, ContentKind, Designator};
pub use binding::{BindingDescriptor, BindingSummary, Trigger};
pub use bridge::{Bridge, Invocation, Operation, PendingValue};
pub use cache::IncrementalCache;
pub use dom::{Document, Element};
pub use engine::{BindingFailure, Crafter, DispatchOutcome, ScanReport};
pub use error::CrafterError;
pub use options::CrafterOptions;
pub use prerender::{prerender_dir, render_page, PageReport, RenderedPage};

/// Binding summaries of every candidate element in `html`, in document order.
pub fn extract_bindings(html: &str, options: &CrafterOptions) -> Vec<BindingSummary> {
    Document::parse(html)
        .elements_with_attribute(&options.name_attribute)
        .iter()
        .filter_map(|element| binding::extract(element, options))
        .map(|descriptor| descriptor.summary())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE-API EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn parse_address_native(raw: String) -> napi::Result<serde_json::Value> {
    let address = Address::parse(&raw).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    serde_json::to_value(address).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn extract_bindings_native(html: String) -> napi::Result<serde_json::Value> {
    let summaries = extract_bindings(&html, &CrafterOptions::default());
    serde_json::to_value(summaries).map_err(|e| napi::Error::from_reason(e.to_string()))
}
