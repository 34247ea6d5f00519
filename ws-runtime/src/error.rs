use thiserror::Error;
use ws_machine::ProvisionError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Duplicate start, or a stop of a workspace that isn't running.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed environment or runtime record.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The registry is draining and accepts no more changes.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("{context}: {source}")]
    Provisioning {
        context: String,
        #[source]
        source: ProvisionError,
    },
}

impl RuntimeError {
    pub fn provisioning(context: impl Into<String>, source: ProvisionError) -> Self {
        RuntimeError::Provisioning {
            context: context.into(),
            source,
        }
    }
}
