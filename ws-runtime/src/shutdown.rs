//! Process shutdown hook for the runtime registry.

use crate::registry::{DrainReport, RuntimeWorkspaceRegistry};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Drains the registry when the process is going away.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    registry: Arc<RuntimeWorkspaceRegistry>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<RuntimeWorkspaceRegistry>) -> Self {
        Self { registry }
    }

    /// Runs the drain sweep on the current thread.
    pub fn drain(&self) -> DrainReport {
        self.registry.shutdown()
    }

    /// Waits for `signal`, then drains the registry on a blocking thread.
    pub async fn drain_on<F>(self, signal: F) -> DrainReport
    where
        F: Future<Output = ()>,
    {
        signal.await;
        info!("shutdown signal received, stopping workspaces");

        let registry = Arc::clone(&self.registry);
        match tokio::task::spawn_blocking(move || registry.shutdown()).await {
            Ok(report) => report,
            Err(e) => {
                error!("Drain task failed: {}", e);
                DrainReport::default()
            }
        }
    }
}
