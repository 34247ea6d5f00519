//! Workspace runtime registry.
//!
//! Tracks which workspaces are starting, running or stopping in this process
//! and sequences the provisioning of their machines. State is in memory only
//! and is rebuilt empty on restart.

pub mod environment;
pub mod error;
pub mod model;
pub mod registry;
pub mod shutdown;

pub use environment::EnvironmentStarter;
pub use error::{Result, RuntimeError};
pub use model::{RuntimeWorkspace, WorkspaceStatus};
pub use registry::{DrainReport, RuntimeWorkspaceRegistry};
pub use shutdown::ShutdownCoordinator;
