//! Capability Provider: the tools this node advertises and executes.
//!
//! The provider is a trait seam: the node only needs an ordered manifest list
//! and an `invoke(name, arguments)` call. The bundled implementation discovers
//! stdio plugins from a directory on disk.

pub mod errors;
pub mod plugins;
pub mod provider;
pub mod types;

// Re-exports for convenience
pub use errors::{CapabilityError, CapabilityErrorKind};
pub use plugins::PluginDirectoryProvider;
pub use provider::CapabilityProvider;
pub use types::{CapabilityOutput, ToolManifest};
