//! Settings for the workspace runtime itself.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How machines other than the dev machine are brought up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryProvisioning {
    #[default]
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Provisioner backend name (`docker`, or `mock` in test builds).
    #[serde(default = "default_provisioner")]
    pub provisioner: String,

    /// Environment recipe types the runtime knows how to start.
    #[serde(default = "default_supported_recipe_types")]
    pub supported_recipe_types: Vec<String>,

    /// Recipe type assumed for environments that don't declare one.
    #[serde(default = "default_recipe_type")]
    pub default_recipe_type: String,

    /// Passed to the provisioner when machines are destroyed.
    #[serde(default = "default_true")]
    pub force_destroy: bool,

    #[serde(default)]
    pub secondary_provisioning: SecondaryProvisioning,
}

fn default_provisioner() -> String {
    "docker".to_string()
}

fn default_recipe_type() -> String {
    "docker".to_string()
}

fn default_supported_recipe_types() -> Vec<String> {
    vec![default_recipe_type()]
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provisioner: default_provisioner(),
            supported_recipe_types: default_supported_recipe_types(),
            default_recipe_type: default_recipe_type(),
            force_destroy: true,
            secondary_provisioning: SecondaryProvisioning::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads settings from a YAML file, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `WS_PROVISIONER`, `WS_FORCE_DESTROY` and
    /// `WS_SECONDARY_PROVISIONING` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provisioner) = lookup("WS_PROVISIONER") {
            tracing::debug!(%provisioner, "provisioner overridden from environment");
            self.provisioner = provisioner;
        }

        if let Some(value) = lookup("WS_FORCE_DESTROY") {
            self.force_destroy = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "WS_FORCE_DESTROY must be a boolean, got '{other}'"
                    )))
                }
            };
        }

        if let Some(value) = lookup("WS_SECONDARY_PROVISIONING") {
            self.secondary_provisioning = match value.to_ascii_lowercase().as_str() {
                "sequential" => SecondaryProvisioning::Sequential,
                "parallel" => SecondaryProvisioning::Parallel,
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "WS_SECONDARY_PROVISIONING must be 'sequential' or 'parallel', got '{other}'"
                    )))
                }
            };
        }

        self.validate()
    }

    pub fn supports_recipe(&self, kind: &str) -> bool {
        self.supported_recipe_types.iter().any(|t| t == kind)
    }

    fn validate(&self) -> Result<()> {
        if self.provisioner.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "provisioner must not be empty".to_string(),
            ));
        }
        if !self.supports_recipe(&self.default_recipe_type) {
            return Err(ConfigError::Invalid(format!(
                "default recipe type '{}' is not in supported_recipe_types",
                self.default_recipe_type
            )));
        }
        Ok(())
    }
}
