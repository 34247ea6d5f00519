//! Workspace runtime configuration.
//!
//! This crate holds the immutable descriptors the runtime registry starts
//! workspaces from (workspaces, their environments and machine configs) and
//! the settings that tune the runtime itself. Both are plain serde types
//! loaded from YAML.

pub mod error;
pub mod loader;
pub mod runtime;
pub mod workspace;

pub use error::{ConfigError, Result};
pub use loader::{load_workspaces, parse_workspaces};
pub use runtime::{RuntimeConfig, SecondaryProvisioning};
pub use workspace::{EnvironmentConfig, MachineConfig, RecipeConfig, WorkspaceConfig};
