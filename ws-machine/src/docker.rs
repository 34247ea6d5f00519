//! Docker-backed provisioner.
//!
//! Every machine becomes one detached container. Containers are labelled with
//! the workspace, environment and machine name so they can be traced back to
//! the runtime record that owns them.

use crate::error::{ProvisionError, Result};
use crate::machine::Machine;
use crate::Provisioner;
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;
use ws_config::MachineConfig;

pub const LABEL_WORKSPACE: &str = "ws.workspace";
pub const LABEL_ENVIRONMENT: &str = "ws.environment";
pub const LABEL_MACHINE: &str = "ws.machine";

#[derive(Debug, Clone)]
pub struct DockerProvisioner {
    docker: PathBuf,
}

impl DockerProvisioner {
    /// Locates the `docker` executable on `PATH`.
    pub fn new() -> Result<Self> {
        let docker = which::which("docker").map_err(|_| {
            ProvisionError::DependencyNotFound("Docker is not installed or not on PATH".to_string())
        })?;
        Ok(Self { docker })
    }

    fn run(&self, args: &[String]) -> Result<String> {
        debug!("Executing Docker command: docker {}", args.join(" "));
        let output = duct::cmd(&self.docker, args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ProvisionError::CommandFailed(format!(
                "docker {} exited with {}: {}",
                args.first().map(String::as_str).unwrap_or_default(),
                output.status,
                stderr.trim()
            )))
        }
    }
}

/// Container name for a machine; unique per call so restarts never collide
/// with containers that are still being removed.
pub fn container_name(workspace_id: &str, machine: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ws-{}-{}-{}", workspace_id, machine, &suffix[..8])
}

/// Arguments for `docker run` creating `config`.
pub fn run_args(
    config: &MachineConfig,
    workspace_id: &str,
    env_name: &str,
    name: &str,
) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        name.to_string(),
        "--label".to_string(),
        format!("{LABEL_WORKSPACE}={workspace_id}"),
        "--label".to_string(),
        format!("{LABEL_ENVIRONMENT}={env_name}"),
        "--label".to_string(),
        format!("{LABEL_MACHINE}={}", config.name),
    ];

    if let Some(memory_mb) = config.memory_mb {
        args.push("--memory".to_string());
        args.push(format!("{memory_mb}m"));
    }

    for (key, value) in &config.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    args.push(config.image.clone());

    if let Some(command) = &config.command {
        args.extend(command.iter().cloned());
    }

    args
}

/// Arguments for `docker rm` removing `container_id`.
pub fn rm_args(container_id: &str, force: bool) -> Vec<String> {
    let mut args = vec!["rm".to_string()];
    if force {
        args.push("-f".to_string());
    }
    args.push(container_id.to_string());
    args
}

impl Provisioner for DockerProvisioner {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn create_machine(
        &self,
        config: &MachineConfig,
        workspace_id: &str,
        env_name: &str,
    ) -> Result<Machine> {
        let name = container_name(workspace_id, &config.name);
        let container_id = self.run(&run_args(config, workspace_id, env_name, &name))?;
        if container_id.is_empty() {
            return Err(ProvisionError::CommandFailed(format!(
                "docker run returned no container id for '{name}'"
            )));
        }

        info!(
            workspace = workspace_id,
            machine = %config.name,
            container = %container_id,
            "container created"
        );
        Ok(Machine::new(container_id, config, workspace_id, env_name))
    }

    fn destroy_machine(&self, machine_id: &str, force: bool) -> Result<()> {
        match self.run(&rm_args(machine_id, force)) {
            Ok(_) => {
                info!(container = machine_id, "container removed");
                Ok(())
            }
            Err(ProvisionError::CommandFailed(msg)) if msg.contains("No such container") => {
                Err(ProvisionError::MachineNotFound(machine_id.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_include_labels_limits_and_command() {
        let mut config = MachineConfig::new("db", "postgres:16").with_memory_mb(512);
        config
            .env
            .insert("POSTGRES_PASSWORD".to_string(), "secret".to_string());
        config.command = Some(vec!["postgres".to_string(), "-N".to_string(), "50".to_string()]);

        let args = run_args(&config, "ws-1", "default", "ws-ws-1-db-abcd1234");

        assert_eq!(&args[..4], &["run", "-d", "--name", "ws-ws-1-db-abcd1234"]);
        assert!(args.contains(&"ws.workspace=ws-1".to_string()));
        assert!(args.contains(&"ws.environment=default".to_string()));
        assert!(args.contains(&"ws.machine=db".to_string()));
        assert!(args.windows(2).any(|w| w == ["--memory", "512m"]));
        assert!(args.windows(2).any(|w| w == ["-e", "POSTGRES_PASSWORD=secret"]));

        let image_pos = args.iter().position(|a| a == "postgres:16").unwrap();
        assert_eq!(&args[image_pos + 1..], &["postgres", "-N", "50"]);
    }

    #[test]
    fn test_rm_args_force_flag() {
        assert_eq!(rm_args("abc", true), vec!["rm", "-f", "abc"]);
        assert_eq!(rm_args("abc", false), vec!["rm", "abc"]);
    }

    #[test]
    fn test_container_names_are_unique() {
        let a = container_name("ws-1", "dev");
        let b = container_name("ws-1", "dev");
        assert!(a.starts_with("ws-ws-1-dev-"));
        assert_ne!(a, b);
    }
}
