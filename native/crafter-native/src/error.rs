//! Error types for the Crafter binding engine.
//!
//! Every message carries a stable `CRAFT-0xx` code so host pages and tooling can
//! match on failures without parsing prose.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrafterError {
    // ─────────────────────────────────────────────────────────────
    // Address errors (CRAFT-010 to CRAFT-012)
    // ─────────────────────────────────────────────────────────────
    #[error("CRAFT-010: Invalid address '{raw}': {reason}")]
    AddressSyntax { raw: String, reason: String },

    #[error("CRAFT-011: Unsupported selector '{selector}'")]
    UnsupportedSelector { selector: String },

    #[error("CRAFT-012: Target '{raw}' did not resolve to any element")]
    TargetNotFound { raw: String },

    // ─────────────────────────────────────────────────────────────
    // Bridge errors (CRAFT-020 to CRAFT-024)
    // ─────────────────────────────────────────────────────────────
    #[error("CRAFT-020: Bridge not ready")]
    BridgeNotReady,

    #[error("CRAFT-021: Bridge already attached")]
    AlreadyAttached,

    #[error("CRAFT-022: Operation '{operation}' not found on the bridge")]
    OperationNotFound { operation: String },

    #[error("CRAFT-023: Operation '{operation}' failed: {message}")]
    OperationInvocation { operation: String, message: String },

    #[error("CRAFT-024: Could not schedule operation '{operation}': {message}")]
    Schedule { operation: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Host errors (CRAFT-030 to CRAFT-032)
    // ─────────────────────────────────────────────────────────────
    #[error("CRAFT-030: Invalid options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("CRAFT-031: IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CRAFT-032: Failed to serialize document: {0}")]
    Serialize(String),
}

impl CrafterError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AddressSyntax { .. } => "CRAFT-010",
            Self::UnsupportedSelector { .. } => "CRAFT-011",
            Self::TargetNotFound { .. } => "CRAFT-012",
            Self::BridgeNotReady => "CRAFT-020",
            Self::AlreadyAttached => "CRAFT-021",
            Self::OperationNotFound { .. } => "CRAFT-022",
            Self::OperationInvocation { .. } => "CRAFT-023",
            Self::Schedule { .. } => "CRAFT-024",
            Self::Options(_) => "CRAFT-030",
            Self::Io { .. } => "CRAFT-031",
            Self::Serialize(_) => "CRAFT-032",
        }
    }

    pub(crate) fn address(raw: &str, reason: impl Into<String>) -> Self {
        Self::AddressSyntax {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_carries_code() {
        let err = CrafterError::OperationNotFound {
            operation: "double".to_string(),
        };
        assert_eq!(err.code(), "CRAFT-022");
        assert!(err.to_string().starts_with("CRAFT-022:"));
        assert!(err.to_string().contains("double"));
    }

    #[test]
    fn test_address_helper() {
        let err = CrafterError::address("a:b:c", "more than one ':'");
        assert!(matches!(err, CrafterError::AddressSyntax { ref raw, .. } if raw == "a:b:c"));
        assert_eq!(err.code(), "CRAFT-010");
    }
}
