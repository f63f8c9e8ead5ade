//! The capability provider seam.

use async_trait::async_trait;
use serde_json::Value;

use super::errors::CapabilityError;
use super::types::{CapabilityOutput, ToolManifest};

/// Source of the node's tools.
///
/// `list_manifests` is read once at startup to build the registration
/// snapshot. `invoke` may run concurrently for different requests and must
/// not hold shared locks across its await points.
#[async_trait]
pub trait CapabilityProvider: Send + Sync + 'static {
    /// Ordered descriptors of every available tool.
    fn list_manifests(&self) -> Vec<ToolManifest>;

    /// Run the tool `name` with `arguments`.
    async fn invoke(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<CapabilityOutput, CapabilityError>;
}
