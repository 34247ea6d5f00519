//! Error types for machine provisioning.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Failures reported by a provisioner backend.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Unknown provisioner: {0}")]
    UnknownProvisioner(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Machine '{machine}' rejected: {reason}")]
    Rejected { machine: String, reason: String },

    #[error("Machine not found: {0}")]
    MachineNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
