//! Workspace, environment and machine descriptors.
//!
//! A workspace owns one or more named environments. Each environment is a
//! list of machine configs, exactly one of which is marked `dev`: that
//! machine is the primary one and must come up for the environment to count
//! as started.

use crate::error::{ConfigError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Immutable definition of a user's workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub id: String,
    pub name: String,
    pub owner: String,

    /// Environment used when a start request doesn't name one.
    pub default_env: String,

    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attributes: IndexMap<String, String>,
}

/// Named collection of machine configs inside a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<RecipeConfig>,

    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

/// Describes how an environment is assembled. Only the type is interpreted
/// by the runtime; the script is carried along for provisioners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeConfig {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

/// Specification of a single machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub name: String,

    /// Marks the primary machine of its environment.
    #[serde(default)]
    pub dev: bool,

    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

impl MachineConfig {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dev: false,
            image: image.into(),
            memory_mb: None,
            command: None,
            env: IndexMap::new(),
        }
    }

    /// Same config marked as the environment's dev machine.
    pub fn dev(mut self) -> Self {
        self.dev = true;
        self
    }

    pub fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }
}

impl EnvironmentConfig {
    pub fn new(name: impl Into<String>, machines: Vec<MachineConfig>) -> Self {
        Self {
            name: name.into(),
            recipe: None,
            machines,
        }
    }

    pub fn with_recipe(mut self, kind: impl Into<String>) -> Self {
        self.recipe = Some(RecipeConfig {
            kind: kind.into(),
            script: None,
        });
        self
    }

    /// Recipe type of this environment, or `default` when no recipe is set.
    pub fn recipe_type<'a>(&'a self, default: &'a str) -> &'a str {
        self.recipe
            .as_ref()
            .map(|recipe| recipe.kind.as_str())
            .unwrap_or(default)
    }

    /// First machine marked `dev`.
    pub fn dev_machine(&self) -> Option<&MachineConfig> {
        self.machines.iter().find(|machine| machine.dev)
    }

    pub fn secondary_machines(&self) -> impl Iterator<Item = &MachineConfig> {
        self.machines.iter().filter(|machine| !machine.dev)
    }
}

impl WorkspaceConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        owner: impl Into<String>,
        default_env: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: owner.into(),
            default_env: default_env.into(),
            environments: Vec::new(),
            attributes: IndexMap::new(),
        }
    }

    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|env| env.name == name)
    }

    /// Structural checks on the descriptor.
    ///
    /// Environments are not required to have a dev machine here: that is
    /// reported when the environment is started, so a workspace may carry
    /// environments that are still being edited.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("id", &self.id), ("name", &self.name), ("owner", &self.owner)] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "workspace {field} must not be empty"
                )));
            }
        }

        let mut env_names = HashSet::new();
        for env in &self.environments {
            if !env_names.insert(env.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "workspace '{}' declares environment '{}' twice",
                    self.id, env.name
                )));
            }

            let mut machine_names = HashSet::new();
            for machine in &env.machines {
                if !machine_names.insert(machine.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "environment '{}' of workspace '{}' declares machine '{}' twice",
                        env.name, self.id, machine.name
                    )));
                }
            }
        }

        if self.environment(&self.default_env).is_none() {
            return Err(ConfigError::Invalid(format!(
                "default environment '{}' of workspace '{}' does not exist",
                self.default_env, self.id
            )));
        }

        Ok(())
    }
}
