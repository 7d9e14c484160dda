//! Plan, import and metadata types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A change to a single top-level attribute in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub path: String,
    /// `None` when the attribute is being set for the first time.
    pub before: Option<Value>,
    /// `None` when the attribute is being removed.
    pub after: Option<Value>,
}

impl AttributeChange {
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

fn decode_bytes(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        None
    } else {
        serde_json::from_slice(bytes).ok()
    }
}

fn encode_value(value: Option<Value>) -> Vec<u8> {
    value
        .and_then(|v| serde_json::to_vec(&v).ok())
        .unwrap_or_default()
}

impl From<crate::generated::AttributeChange> for AttributeChange {
    fn from(proto: crate::generated::AttributeChange) -> Self {
        Self {
            before: decode_bytes(&proto.before),
            after: decode_bytes(&proto.after),
            path: proto.path,
        }
    }
}

impl From<AttributeChange> for crate::generated::AttributeChange {
    fn from(change: AttributeChange) -> Self {
        Self {
            path: change.path,
            before: encode_value(change.before),
            after: encode_value(change.after),
        }
    }
}

/// The outcome of planning a resource change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// State expected after apply. Unknown computed values are JSON null.
    pub planned_state: Value,
    pub changes: Vec<AttributeChange>,
    /// A `force_new` attribute changed, so the object is destroyed and recreated.
    pub requires_replace: bool,
}

impl PlanResult {
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    pub fn with_changes(planned_state: Value, changes: Vec<AttributeChange>, requires_replace: bool) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// The change recorded for a top-level attribute, if any.
    pub fn change(&self, path: &str) -> Option<&AttributeChange> {
        self.changes.iter().find(|c| c.path == path)
    }
}

/// State produced by `ImportResourceState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    pub resource_type: String,
    pub state: Value,
}

impl ImportedResource {
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

impl From<ImportedResource> for crate::generated::ImportedResource {
    fn from(imported: ImportedResource) -> Self {
        Self {
            resource_type: imported.resource_type,
            state: encode_value(Some(imported.state)),
        }
    }
}

/// Returned by `GetMetadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    pub resources: Vec<String>,
    pub data_sources: Vec<String>,
    pub capabilities: ServerCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// The provider is consulted when planning a destroy.
    pub plan_destroy: bool,
}

/// Plugin protocol version announced in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// First field of the handshake line, `TWINGATE_PROVIDER|1|127.0.0.1:50051`.
pub const HANDSHAKE_PREFIX: &str = "TWINGATE_PROVIDER";
