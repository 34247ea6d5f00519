//! Bringing up the machines of one environment.
//!
//! The dev machine is created first and must succeed. Other machines are
//! best effort: a failure is logged and the machine is left out of the
//! result, the environment still counts as started.

use crate::error::{Result, RuntimeError};
use rayon::prelude::*;
use tracing::{error, info};
use ws_config::{EnvironmentConfig, MachineConfig, RuntimeConfig, SecondaryProvisioning};
use ws_machine::{Machine, Provisioner};

pub struct EnvironmentStarter<'a> {
    provisioner: &'a dyn Provisioner,
    config: &'a RuntimeConfig,
}

impl<'a> EnvironmentStarter<'a> {
    pub fn new(provisioner: &'a dyn Provisioner, config: &'a RuntimeConfig) -> Self {
        Self {
            provisioner,
            config,
        }
    }

    /// Checks that `environment` can be started, without provisioning anything.
    pub fn validate<'e>(&self, environment: &'e EnvironmentConfig) -> Result<&'e MachineConfig> {
        let recipe_type = environment.recipe_type(&self.config.default_recipe_type);
        if !self.config.supports_recipe(recipe_type) {
            return Err(RuntimeError::Validation(format!(
                "Invalid environment recipe type '{}' in environment '{}'",
                recipe_type, environment.name
            )));
        }

        let dev_count = environment.machines.iter().filter(|m| m.dev).count();
        if dev_count > 1 {
            return Err(RuntimeError::Validation(format!(
                "Environment '{}' marks {} machines as dev, exactly one is allowed",
                environment.name, dev_count
            )));
        }

        environment.dev_machine().ok_or_else(|| {
            RuntimeError::Validation(format!(
                "Dev machine was not found in workspace environment '{}'",
                environment.name
            ))
        })
    }

    /// Provisions every machine of `environment` for `workspace_id`.
    ///
    /// Returns the machines that came up, dev machine first, the rest in
    /// declaration order.
    pub fn start_environment(
        &self,
        environment: &EnvironmentConfig,
        workspace_id: &str,
    ) -> Result<Vec<Machine>> {
        let dev_config = self.validate(environment)?;

        let dev = self
            .provisioner
            .create_machine(dev_config, workspace_id, &environment.name)
            .map_err(|e| {
                RuntimeError::provisioning(
                    format!(
                        "Failed to start dev machine '{}' of workspace '{}'",
                        dev_config.name, workspace_id
                    ),
                    e,
                )
            })?;
        info!(
            workspace = workspace_id,
            machine = %dev_config.name,
            id = %dev.id,
            "dev machine started"
        );

        let secondary: Vec<&MachineConfig> = environment.secondary_machines().collect();
        let started: Vec<Option<Machine>> = match self.config.secondary_provisioning {
            SecondaryProvisioning::Sequential => secondary
                .iter()
                .map(|config| self.start_secondary(config, workspace_id, &environment.name))
                .collect(),
            SecondaryProvisioning::Parallel => secondary
                .par_iter()
                .map(|config| self.start_secondary(config, workspace_id, &environment.name))
                .collect(),
        };

        let mut machines = Vec::with_capacity(secondary.len() + 1);
        machines.push(dev);
        machines.extend(started.into_iter().flatten());
        Ok(machines)
    }

    fn start_secondary(
        &self,
        config: &MachineConfig,
        workspace_id: &str,
        env_name: &str,
    ) -> Option<Machine> {
        match self.provisioner.create_machine(config, workspace_id, env_name) {
            Ok(machine) => {
                info!(
                    workspace = workspace_id,
                    machine = %config.name,
                    id = %machine.id,
                    "machine started"
                );
                Some(machine)
            }
            Err(e) => {
                error!(
                    workspace = workspace_id,
                    machine = %config.name,
                    "Failed to start machine: {}",
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_machine::mock::MockProvisioner;

    fn environment() -> EnvironmentConfig {
        EnvironmentConfig::new(
            "default",
            vec![
                MachineConfig::new("db", "postgres:16"),
                MachineConfig::new("dev", "ubuntu:24.04").dev(),
                MachineConfig::new("cache", "redis:7"),
            ],
        )
    }

    #[test]
    fn test_dev_machine_first_then_declaration_order() {
        let mock = MockProvisioner::new();
        let config = RuntimeConfig::default();
        let starter = EnvironmentStarter::new(&mock, &config);

        let machines = starter.start_environment(&environment(), "ws-1").unwrap();

        let names: Vec<_> = machines.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["dev", "db", "cache"]);
        assert_eq!(mock.creates()[0].machine, "dev");
        assert!(machines.iter().all(|m| m.workspace_id == "ws-1"));
    }

    #[test]
    fn test_parallel_secondaries_keep_order() {
        let mock = MockProvisioner::new();
        let config = RuntimeConfig {
            secondary_provisioning: SecondaryProvisioning::Parallel,
            ..Default::default()
        };
        let starter = EnvironmentStarter::new(&mock, &config);

        let machines = starter.start_environment(&environment(), "ws-1").unwrap();

        let names: Vec<_> = machines.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["dev", "db", "cache"]);
        assert_eq!(mock.creates()[0].machine, "dev");
    }

    #[test]
    fn test_secondary_failure_is_tolerated() {
        let mock = MockProvisioner::new();
        mock.fail_create("db");
        let config = RuntimeConfig::default();
        let starter = EnvironmentStarter::new(&mock, &config);

        let machines = starter.start_environment(&environment(), "ws-1").unwrap();

        let names: Vec<_> = machines.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["dev", "cache"]);
        assert_eq!(mock.creates().len(), 3);
    }

    #[test]
    fn test_dev_failure_aborts_before_secondaries() {
        let mock = MockProvisioner::new();
        mock.fail_create("dev");
        let config = RuntimeConfig::default();
        let starter = EnvironmentStarter::new(&mock, &config);

        let err = starter.start_environment(&environment(), "ws-1").unwrap_err();

        assert!(matches!(err, RuntimeError::Provisioning { .. }));
        assert_eq!(mock.creates().len(), 1);
    }

    #[test]
    fn test_missing_dev_machine_is_validation_error() {
        let mock = MockProvisioner::new();
        let config = RuntimeConfig::default();
        let starter = EnvironmentStarter::new(&mock, &config);
        let env = EnvironmentConfig::new("default", vec![MachineConfig::new("db", "postgres")]);

        let err = starter.start_environment(&env, "ws-1").unwrap_err();

        assert!(matches!(err, RuntimeError::Validation(_)));
        assert!(mock.creates().is_empty());
    }

    #[test]
    fn test_second_dev_machine_is_validation_error() {
        let mock = MockProvisioner::new();
        let config = RuntimeConfig::default();
        let starter = EnvironmentStarter::new(&mock, &config);
        let env = EnvironmentConfig::new(
            "default",
            vec![
                MachineConfig::new("dev", "ubuntu:24.04").dev(),
                MachineConfig::new("db", "postgres:16"),
                MachineConfig::new("dev2", "ubuntu:24.04").dev(),
            ],
        );

        assert!(matches!(
            starter.validate(&env),
            Err(RuntimeError::Validation(_))
        ));
        let err = starter.start_environment(&env, "ws-1").unwrap_err();

        assert!(err.to_string().contains("exactly one"));
        assert!(mock.creates().is_empty());
    }

    #[test]
    fn test_unsupported_recipe_is_validation_error() {
        let mock = MockProvisioner::new();
        let config = RuntimeConfig::default();
        let starter = EnvironmentStarter::new(&mock, &config);
        let env = environment().with_recipe("compose");

        let err = starter.start_environment(&env, "ws-1").unwrap_err();

        assert!(err.to_string().contains("compose"));
        assert!(mock.creates().is_empty());
    }
}
