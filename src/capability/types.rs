//! Capability descriptors and invocation output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Advertised descriptor of one capability.
///
/// Only `name` is interpreted locally. Every other field of the source
/// manifest is carried verbatim so the coordinator sees the full descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolManifest {
    pub name: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl ToolManifest {
    /// Manifest with a name and no metadata.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Map::new(),
        }
    }

    /// Attach one metadata field.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// What a capability returned on success.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityOutput {
    /// Already-structured data, forwarded as-is.
    Structured(Value),
    /// Raw text; the dispatcher tries to parse it as JSON.
    Text(String),
}
