use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ws_config::MachineConfig;

/// Handle to a provisioned machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Backend-assigned identifier, used to destroy the machine.
    pub id: String,
    pub workspace_id: String,
    pub env_name: String,
    pub config: MachineConfig,
    pub created_at: DateTime<Utc>,
}

impl Machine {
    pub fn new(
        id: impl Into<String>,
        config: &MachineConfig,
        workspace_id: &str,
        env_name: &str,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.to_string(),
            env_name: env_name.to_string(),
            config: config.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn is_dev(&self) -> bool {
        self.config.dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_machine_carries_its_config() {
        let config = MachineConfig::new("db", "postgres:16").with_memory_mb(512);

        let machine = Machine::new("c-1", &config, "ws-1", "default");

        assert_eq!(machine.id, "c-1");
        assert_eq!(machine.name(), "db");
        assert_eq!(machine.workspace_id, "ws-1");
        assert_eq!(machine.env_name, "default");
        assert_eq!(machine.config.memory_mb, Some(512));
        assert!(!machine.is_dev());
    }
}
