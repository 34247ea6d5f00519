use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use ws_config::{EnvironmentConfig, WorkspaceConfig};
use ws_machine::Machine;

/// Lifecycle of a runtime record. A stopped workspace has no record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for WorkspaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceStatus::Starting => write!(f, "starting"),
            WorkspaceStatus::Running => write!(f, "running"),
            WorkspaceStatus::Stopping => write!(f, "stopping"),
        }
    }
}

/// Runtime view of a workspace tracked by the registry.
///
/// Values handed out by the registry are copies; changing one has no effect
/// until it is passed back through `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeWorkspace {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub active_env: String,
    pub status: WorkspaceStatus,
    pub dev_machine: Option<Machine>,
    pub machines: Vec<Machine>,
    pub environments: Vec<EnvironmentConfig>,
    pub attributes: IndexMap<String, String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuntimeWorkspace {
    /// New record for `workspace` with no machines yet.
    pub fn from_workspace(
        workspace: &WorkspaceConfig,
        active_env: impl Into<String>,
        status: WorkspaceStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: workspace.id.clone(),
            name: workspace.name.clone(),
            owner: workspace.owner.clone(),
            active_env: active_env.into(),
            status,
            dev_machine: None,
            machines: Vec::new(),
            environments: workspace.environments.clone(),
            attributes: workspace.attributes.clone(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn active_environment(&self) -> Option<&EnvironmentConfig> {
        self.environments
            .iter()
            .find(|env| env.name == self.active_env)
    }

    /// Ids of every provisioned machine, dev machine included.
    pub fn machine_ids(&self) -> Vec<String> {
        self.machines.iter().map(|m| m.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_config::MachineConfig;

    #[test]
    fn test_from_workspace_copies_descriptor() {
        let mut ws = WorkspaceConfig::new("ws-1", "backend", "alice", "default").with_environment(
            EnvironmentConfig::new("default", vec![MachineConfig::new("dev", "ubuntu").dev()]),
        );
        ws.attributes.insert("team".to_string(), "platform".to_string());

        let record = RuntimeWorkspace::from_workspace(&ws, "default", WorkspaceStatus::Starting);

        assert_eq!(record.id, "ws-1");
        assert_eq!(record.owner, "alice");
        assert_eq!(record.status, WorkspaceStatus::Starting);
        assert!(record.dev_machine.is_none());
        assert!(record.machines.is_empty());
        assert_eq!(record.active_environment().unwrap().name, "default");
        assert_eq!(record.attributes.get("team").unwrap(), "platform");
    }

    #[test]
    fn test_machine_ids_in_provisioning_order() {
        let ws = WorkspaceConfig::new("ws-1", "backend", "alice", "default");
        let dev = MachineConfig::new("dev", "ubuntu").dev();
        let db = MachineConfig::new("db", "postgres");

        let mut record = RuntimeWorkspace::from_workspace(&ws, "default", WorkspaceStatus::Running);
        record.machines = vec![
            Machine::new("c-1", &dev, "ws-1", "default"),
            Machine::new("c-2", &db, "ws-1", "default"),
        ];

        assert_eq!(record.machine_ids(), vec!["c-1", "c-2"]);
        assert_eq!(record.status.to_string(), "running");
    }
}
