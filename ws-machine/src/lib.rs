//! Machine provisioning abstraction.
//!
//! The runtime registry never talks to a container engine directly. It goes
//! through a [`Provisioner`], which creates or destroys one machine per call
//! and blocks until the backend has answered. Timeouts, if any, are the
//! backend's business.

// Standard library
use std::sync::Arc;

// Internal imports
use ws_config::{MachineConfig, RuntimeConfig};

pub mod error;
pub mod machine;

#[cfg(feature = "docker")]
pub mod docker;

// When the `test-helpers` feature is enabled, include the mock provisioner.
#[cfg(feature = "test-helpers")]
pub mod mock;

pub use error::{ProvisionError, Result};
pub use machine::Machine;

/// Creates and destroys individual machines.
pub trait Provisioner: Send + Sync {
    /// Name of the backend (e.g. "docker").
    fn name(&self) -> &'static str;

    /// Provisions one machine for `workspace_id` and returns once it runs.
    fn create_machine(
        &self,
        config: &MachineConfig,
        workspace_id: &str,
        env_name: &str,
    ) -> Result<Machine>;

    /// Destroys a machine previously returned by [`Provisioner::create_machine`].
    /// `force` removes it even if it is still running.
    fn destroy_machine(&self, machine_id: &str, force: bool) -> Result<()>;
}

/// Creates the provisioner named by the runtime configuration.
pub fn get_provisioner(config: &RuntimeConfig) -> Result<Arc<dyn Provisioner>> {
    let name = config.provisioner.as_str();

    #[cfg(feature = "test-helpers")]
    if name == "mock" {
        return Ok(Arc::new(mock::MockProvisioner::new()));
    }

    match name {
        #[cfg(feature = "docker")]
        "docker" => Ok(Arc::new(docker::DockerProvisioner::new()?)),
        _ => Err(ProvisionError::UnknownProvisioner(name.to_string())),
    }
}
