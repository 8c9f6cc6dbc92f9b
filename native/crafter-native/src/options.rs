//! Attribute vocabulary for binding markup.

use serde::{Deserialize, Serialize};

use crate::error::CrafterError;

pub const DEFAULT_PREFIX: &str = "craft";
pub const DEFAULT_INIT_OPERATION: &str = "init";

/// Names of the declarative attributes the engine reads and writes.
///
/// Hosts that already use `craft-*` attributes for something else can move the
/// whole vocabulary with [`CrafterOptions::with_prefix`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrafterOptions {
    /// Presence marks a binding candidate; the value names the bridge operation.
    pub name_attribute: String,
    /// Comma separated input addresses.
    pub input_attribute: String,
    /// Address the result is written to.
    pub target_attribute: String,
    /// Event name that fires the binding. Absent or blank means immediate.
    pub trigger_attribute: String,
    /// Presence marks the operation result as pending.
    pub async_attribute: String,
    /// Written by the engine once a binding completed.
    pub processed_attribute: String,
    /// Operation called once when a bridge is attached.
    pub init_operation: String,
}

impl Default for CrafterOptions {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
}

impl CrafterOptions {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            name_attribute: format!("{}-name", prefix),
            input_attribute: format!("{}-input", prefix),
            target_attribute: format!("{}-target", prefix),
            trigger_attribute: format!("{}-trigger", prefix),
            async_attribute: format!("{}-async", prefix),
            processed_attribute: format!("{}-proceed", prefix),
            init_operation: DEFAULT_INIT_OPERATION.to_string(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CrafterError> {
        Ok(serde_json::from_str(json)?)
    }
}
