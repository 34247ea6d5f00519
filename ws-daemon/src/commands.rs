use crate::cli::{Args, Command, StartTarget};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use ws_config::{load_workspaces, RuntimeConfig, WorkspaceConfig};
use ws_machine::get_provisioner;
use ws_runtime::{RuntimeWorkspace, RuntimeWorkspaceRegistry, ShutdownCoordinator};

pub async fn execute(args: Args) -> Result<()> {
    match args.command {
        Command::Check { workspaces, json } => check(&workspaces, json),
        Command::Run { workspaces, start } => {
            let config = load_runtime_config(args.config.as_deref())?;
            run(config, &workspaces, &start).await
        }
    }
}

fn load_runtime_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("Failed to load runtime config {}", path.display()))?,
        None => RuntimeConfig::from_env()?,
    };
    info!(
        provisioner = %config.provisioner,
        secondary = ?config.secondary_provisioning,
        force_destroy = config.force_destroy,
        "runtime configuration loaded"
    );
    Ok(config)
}

fn check(path: &Path, json: bool) -> Result<()> {
    let workspaces = load_workspaces(path)
        .with_context(|| format!("Invalid workspace file {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workspaces)?);
        return Ok(());
    }

    println!("{:<16} {:<12} {:<14} {:<6}", "ID", "OWNER", "DEFAULT ENV", "ENVS");
    for ws in &workspaces {
        println!(
            "{:<16} {:<12} {:<14} {:<6}",
            ws.id,
            ws.owner,
            ws.default_env,
            ws.environments.len()
        );
        for env in &ws.environments {
            if env.dev_machine().is_none() {
                warn!(
                    workspace = %ws.id,
                    env = %env.name,
                    "environment has no dev machine and cannot be started"
                );
            }
        }
    }
    println!("{} workspace(s) OK", workspaces.len());
    Ok(())
}

/// Picks the workspaces to start. No targets means all of them.
fn select(
    workspaces: Vec<WorkspaceConfig>,
    targets: &[StartTarget],
) -> Result<Vec<(WorkspaceConfig, Option<String>)>> {
    if targets.is_empty() {
        return Ok(workspaces.into_iter().map(|ws| (ws, None)).collect());
    }

    let mut selected = Vec::with_capacity(targets.len());
    for target in targets {
        let Some(ws) = workspaces.iter().find(|ws| ws.id == target.id) else {
            bail!("Workspace '{}' is not declared in the workspace file", target.id);
        };
        selected.push((ws.clone(), target.env.clone()));
    }
    Ok(selected)
}

async fn run(config: RuntimeConfig, path: &Path, targets: &[StartTarget]) -> Result<()> {
    let workspaces = load_workspaces(path)
        .with_context(|| format!("Invalid workspace file {}", path.display()))?;
    let selected = select(workspaces, targets)?;

    let provisioner = get_provisioner(&config)?;
    let registry = Arc::new(RuntimeWorkspaceRegistry::with_config(provisioner, config));

    // The registry blocks while provisioning, so each start gets its own
    // blocking thread.
    let tasks: Vec<_> = selected
        .into_iter()
        .map(|(ws, env)| {
            let registry = Arc::clone(&registry);
            tokio::task::spawn_blocking(move || {
                let result = registry.start(&ws, env.as_deref());
                (ws.id, result)
            })
        })
        .collect();

    let mut failed = 0;
    for task in tasks {
        let (id, result) = task.await.context("start task panicked")?;
        match result {
            Ok(record) => info!(
                workspace = %id,
                env = %record.active_env,
                machines = record.machines.len(),
                "workspace running"
            ),
            Err(e) => {
                failed += 1;
                error!(workspace = %id, "Failed to start workspace: {}", e);
            }
        }
    }

    print_workspaces(&registry.list());
    if failed > 0 {
        warn!(failed, "some workspaces did not start");
    }

    info!("Press Ctrl-C to stop all workspaces");
    let report = ShutdownCoordinator::new(Arc::clone(&registry))
        .drain_on(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;

    info!(
        stopped = report.stopped.len(),
        machine_failures = report.machine_failures,
        "all workspaces stopped"
    );
    Ok(())
}

fn print_workspaces(workspaces: &[RuntimeWorkspace]) {
    println!(
        "{:<16} {:<12} {:<10} {:<12} {:<8}",
        "ID", "OWNER", "STATUS", "ENV", "MACHINES"
    );
    for ws in workspaces {
        println!(
            "{:<16} {:<12} {:<10} {:<12} {:<8}",
            ws.id,
            ws.owner,
            ws.status.to_string(),
            ws.active_env,
            ws.machines.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ws_config::{EnvironmentConfig, MachineConfig};

    fn workspaces() -> Vec<WorkspaceConfig> {
        ["ws-1", "ws-2"]
            .into_iter()
            .map(|id| {
                WorkspaceConfig::new(id, id, "alice", "default").with_environment(
                    EnvironmentConfig::new("default", vec![MachineConfig::new("dev", "ubuntu").dev()]),
                )
            })
            .collect()
    }

    #[test]
    fn test_select_all_without_targets() {
        let selected = select(workspaces(), &[]).unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|(_, env)| env.is_none()));
    }

    #[test]
    fn test_select_targets_with_env() {
        let targets = [StartTarget {
            id: "ws-2".to_string(),
            env: Some("light".to_string()),
        }];
        let selected = select(workspaces(), &targets).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0.id, "ws-2");
        assert_eq!(selected[0].1.as_deref(), Some("light"));
    }

    #[test]
    fn test_select_unknown_target_fails() {
        let targets = [StartTarget {
            id: "ws-9".to_string(),
            env: None,
        }];
        assert!(select(workspaces(), &targets).is_err());
    }
}
