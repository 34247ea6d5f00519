//! In-memory registry of workspaces that are starting, running or stopping.
//!
//! Records live in a single map keyed by workspace id; a second map from
//! owner to ids is maintained alongside it inside the same write section, so
//! both views always agree. Both sit behind one `RwLock`. Machine creation
//! and destruction happen outside the lock: a slow provisioner never blocks
//! readers or the start/stop of other workspaces.
//!
//! Lifecycle of a record:
//!
//! ```text
//! start ──► STARTING ──► RUNNING ──stop──► STOPPING ──► (removed)
//!              │
//!              └── provisioning failed ──► (removed)
//! ```

use crate::environment::EnvironmentStarter;
use crate::error::{Result, RuntimeError};
use crate::model::{RuntimeWorkspace, WorkspaceStatus};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, instrument, warn};
use ws_config::{RuntimeConfig, WorkspaceConfig};
use ws_machine::{Machine, Provisioner};

/// Outcome of [`RuntimeWorkspaceRegistry::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Workspaces force-stopped by the sweep.
    pub stopped: Vec<String>,
    /// Machines the provisioner failed to destroy.
    pub machine_failures: usize,
}

#[derive(Debug, Default)]
struct Indices {
    by_id: HashMap<String, RuntimeWorkspace>,
    by_owner: HashMap<String, BTreeSet<String>>,
}

impl Indices {
    /// Inserts or replaces a record, moving it between owners if needed.
    fn put(&mut self, workspace: RuntimeWorkspace) {
        let previous_owner = self
            .by_id
            .get(&workspace.id)
            .map(|existing| existing.owner.clone())
            .filter(|owner| *owner != workspace.owner);
        if let Some(owner) = previous_owner {
            self.unlink(&owner, &workspace.id);
        }

        self.by_owner
            .entry(workspace.owner.clone())
            .or_default()
            .insert(workspace.id.clone());
        self.by_id.insert(workspace.id.clone(), workspace);
    }

    fn remove(&mut self, id: &str) -> Option<RuntimeWorkspace> {
        let workspace = self.by_id.remove(id)?;
        self.unlink(&workspace.owner, id);
        Some(workspace)
    }

    fn unlink(&mut self, owner: &str, id: &str) {
        if let Some(ids) = self.by_owner.get_mut(owner) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_owner.remove(owner);
            }
        }
    }
}

pub struct RuntimeWorkspaceRegistry {
    indices: RwLock<Indices>,
    draining: AtomicBool,
    provisioner: Arc<dyn Provisioner>,
    config: RuntimeConfig,
}

impl RuntimeWorkspaceRegistry {
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self::with_config(provisioner, RuntimeConfig::default())
    }

    pub fn with_config(provisioner: Arc<dyn Provisioner>, config: RuntimeConfig) -> Self {
        Self {
            indices: RwLock::new(Indices::default()),
            draining: AtomicBool::new(false),
            provisioner,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Starts `workspace` with the environment `env_name`, or the workspace's
    /// default environment when `None`.
    ///
    /// The record is visible with [`WorkspaceStatus::Starting`] while the
    /// machines are provisioned, dev machine first. On success the returned
    /// copy is [`WorkspaceStatus::Running`]. On failure no record is left
    /// behind.
    ///
    /// # Errors
    /// - `Conflict` when a record with the same id exists, whatever its status
    /// - `ServiceUnavailable` when the registry is draining
    /// - `Validation` when the environment is unknown or malformed
    /// - `Provisioning` when the dev machine could not be created
    #[instrument(skip(self, workspace), fields(workspace_id = %workspace.id))]
    pub fn start(
        &self,
        workspace: &WorkspaceConfig,
        env_name: Option<&str>,
    ) -> Result<RuntimeWorkspace> {
        self.check_not_draining()?;
        let env_name = env_name.unwrap_or(workspace.default_env.as_str());
        let placeholder =
            RuntimeWorkspace::from_workspace(workspace, env_name, WorkspaceStatus::Starting);

        {
            let mut indices = self.write();
            self.check_not_draining()?;
            if let Some(existing) = indices.by_id.get(&workspace.id) {
                return Err(RuntimeError::Conflict(format!(
                    "Could not start workspace '{}' because its status is '{}'",
                    workspace.name, existing.status
                )));
            }
            indices.put(placeholder);
        }
        info!(env = env_name, "workspace starting");

        let machines = match self.provision(workspace, env_name) {
            Ok(machines) => machines,
            Err(e) => {
                error!("Failed to start workspace '{}': {}", workspace.id, e);
                self.discard_placeholder(&workspace.id);
                return Err(e);
            }
        };

        self.finish_start(&workspace.id, machines)
    }

    /// Stops a running workspace, destroying all of its machines.
    ///
    /// The record turns [`WorkspaceStatus::Stopping`] before any machine is
    /// touched and is removed once every destruction has been attempted.
    /// Individual destruction failures are logged, not returned.
    ///
    /// # Errors
    /// - `NotFound` when no record exists for `id`
    /// - `Conflict` when the record is not `Running`
    /// - `ServiceUnavailable` when the registry is draining
    #[instrument(skip(self))]
    pub fn stop(&self, id: &str) -> Result<()> {
        self.check_not_draining()?;
        let workspace = {
            let mut indices = self.write();
            self.check_not_draining()?;
            let workspace = indices
                .by_id
                .get_mut(id)
                .ok_or_else(|| not_running(id))?;
            if workspace.status != WorkspaceStatus::Running {
                return Err(RuntimeError::Conflict(format!(
                    "Couldn't stop '{}' workspace because its status is '{}'",
                    workspace.name, workspace.status
                )));
            }
            workspace.status = WorkspaceStatus::Stopping;
            workspace.updated_at = Utc::now();
            workspace.clone()
        };
        info!("workspace stopping");

        self.do_stop(&workspace);
        Ok(())
    }

    /// Replaces the stored record with a copy of `update`. Never creates one.
    ///
    /// The lifecycle fields stay under registry control: `status` must match
    /// the stored record, and `machines`/`dev_machine` may only change while
    /// it is `Running`.
    ///
    /// # Errors
    /// - `NotFound` when no record with the same id exists
    /// - `Conflict` when `status` differs from the stored one, or machines
    ///   change on a record that is not `Running`
    /// - `Validation` when a `Running` record has no dev machine or no machines
    /// - `ServiceUnavailable` when the registry is draining
    #[instrument(skip(self, update), fields(workspace_id = %update.id))]
    pub fn update(&self, update: &RuntimeWorkspace) -> Result<()> {
        self.check_not_draining()?;
        if update.status == WorkspaceStatus::Running
            && (update.dev_machine.is_none() || update.machines.is_empty())
        {
            return Err(RuntimeError::Validation(format!(
                "Running workspace '{}' must have a dev machine and at least one machine",
                update.id
            )));
        }

        let mut indices = self.write();
        self.check_not_draining()?;
        let Some(stored) = indices.by_id.get(&update.id) else {
            return Err(RuntimeError::NotFound(format!(
                "Could not update runtime workspace '{}' because it is not running",
                update.id
            )));
        };
        if stored.status != update.status {
            return Err(RuntimeError::Conflict(format!(
                "Could not update workspace '{}' from status '{}' to '{}'",
                update.id, stored.status, update.status
            )));
        }
        if stored.status != WorkspaceStatus::Running
            && (stored.machines != update.machines || stored.dev_machine != update.dev_machine)
        {
            return Err(RuntimeError::Conflict(format!(
                "Could not change machines of workspace '{}' because its status is '{}'",
                update.id, stored.status
            )));
        }
        indices.put(update.clone());
        debug!(status = %update.status, "workspace updated");
        Ok(())
    }

    /// Copy of the record for `id`.
    pub fn get(&self, id: &str) -> Result<RuntimeWorkspace> {
        self.read()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| not_running(id))
    }

    /// Copies of every record owned by `owner`, ordered by id.
    pub fn get_by_owner(&self, owner: &str) -> Vec<RuntimeWorkspace> {
        let indices = self.read();
        indices
            .by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| indices.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copies of every record.
    pub fn list(&self) -> Vec<RuntimeWorkspace> {
        let mut workspaces: Vec<_> = self.read().by_id.values().cloned().collect();
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));
        workspaces
    }

    /// True when a record exists for `id`, whether it is starting, running
    /// or stopping.
    ///
    /// ```ignore
    /// if !registry.is_running("ws-1") {
    ///     registry.start(&workspace, None)?;
    /// }
    /// ```
    pub fn is_running(&self, id: &str) -> bool {
        self.read().by_id.contains_key(id)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Stops accepting changes and force-stops every tracked workspace.
    ///
    /// Records already stopping are left to the stop in progress. Failures are
    /// logged and counted, never returned, so the sweep always completes.
    /// Only the first call does any work; the flag is never cleared.
    pub fn shutdown(&self) -> DrainReport {
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("registry already draining");
            return DrainReport::default();
        }
        info!("draining workspace runtime registry");

        let targets: Vec<RuntimeWorkspace> = {
            let mut indices = self.write();
            let now = Utc::now();
            indices
                .by_id
                .values_mut()
                .filter(|workspace| workspace.status != WorkspaceStatus::Stopping)
                .map(|workspace| {
                    workspace.status = WorkspaceStatus::Stopping;
                    workspace.updated_at = now;
                    workspace.clone()
                })
                .collect()
        };

        let mut report = DrainReport::default();
        for workspace in targets {
            report.machine_failures += self.do_stop(&workspace);
            report.stopped.push(workspace.id);
        }

        info!(
            stopped = report.stopped.len(),
            machine_failures = report.machine_failures,
            "workspace runtime registry drained"
        );
        report
    }

    fn provision(
        &self,
        workspace: &WorkspaceConfig,
        env_name: &str,
    ) -> Result<Vec<Machine>> {
        let environment = workspace.environment(env_name).ok_or_else(|| {
            RuntimeError::Validation(format!(
                "Environment '{}' is not defined in workspace '{}'",
                env_name, workspace.id
            ))
        })?;
        EnvironmentStarter::new(self.provisioner.as_ref(), &self.config)
            .start_environment(environment, &workspace.id)
    }

    /// Promotes the placeholder to `Running`. If it was swept away by a drain
    /// in the meantime, the new machines are destroyed instead.
    fn finish_start(&self, id: &str, machines: Vec<Machine>) -> Result<RuntimeWorkspace> {
        let promoted = {
            let mut indices = self.write();
            let draining = self.is_draining();
            match indices.by_id.get_mut(id) {
                Some(workspace) if workspace.status == WorkspaceStatus::Starting && !draining => {
                    workspace.dev_machine = machines.iter().find(|m| m.is_dev()).cloned();
                    workspace.machines = machines;
                    workspace.status = WorkspaceStatus::Running;
                    workspace.updated_at = Utc::now();
                    Ok(workspace.clone())
                }
                _ => Err(machines),
            }
        };

        match promoted {
            Ok(workspace) => {
                info!(machines = workspace.machines.len(), "workspace running");
                Ok(workspace)
            }
            Err(machines) => {
                self.destroy_machines(id, &machines);
                self.discard_placeholder(id);
                if self.is_draining() {
                    warn!(
                        machines = machines.len(),
                        "registry drained during provisioning, destroyed new machines"
                    );
                    Err(RuntimeError::ServiceUnavailable(format!(
                        "Workspace '{id}' was stopped while starting because the registry is draining"
                    )))
                } else {
                    // Only a drain removes a starting record, and `update`
                    // cannot change its status.
                    error!(
                        machines = machines.len(),
                        "workspace record left starting state outside of a drain, destroyed new machines"
                    );
                    Err(RuntimeError::Conflict(format!(
                        "Workspace '{id}' is no longer starting, its new machines were destroyed"
                    )))
                }
            }
        }
    }

    /// Removes the record for `id` if it is still a `Starting` placeholder.
    fn discard_placeholder(&self, id: &str) {
        let mut indices = self.write();
        if indices
            .by_id
            .get(id)
            .is_some_and(|workspace| workspace.status == WorkspaceStatus::Starting)
        {
            indices.remove(id);
        }
    }

    /// Destroys the workspace's machines and drops its record. Returns the
    /// number of machines that could not be destroyed.
    fn do_stop(&self, workspace: &RuntimeWorkspace) -> usize {
        let failures = self.destroy_machines(&workspace.id, &workspace.machines);
        self.write().remove(&workspace.id);
        info!(workspace_id = %workspace.id, failures, "workspace stopped");
        failures
    }

    fn destroy_machines(&self, workspace_id: &str, machines: &[Machine]) -> usize {
        let mut failures = 0;
        for machine in machines {
            if let Err(e) = self
                .provisioner
                .destroy_machine(&machine.id, self.config.force_destroy)
            {
                failures += 1;
                error!(
                    workspace_id,
                    machine = %machine.id,
                    "Failed to destroy machine: {}",
                    e
                );
            }
        }
        failures
    }

    fn check_not_draining(&self) -> Result<()> {
        if self.is_draining() {
            return Err(RuntimeError::ServiceUnavailable(
                "Could not perform operation while registry is stopping workspaces".to_string(),
            ));
        }
        Ok(())
    }

    // Every write section leaves both indices consistent before it can
    // panic, so a poisoned lock still guards valid data.
    fn read(&self) -> RwLockReadGuard<'_, Indices> {
        self.indices
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indices> {
        self.indices
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_running(id: &str) -> RuntimeError {
    RuntimeError::NotFound(format!("Workspace with id '{id}' is not running"))
}
