//! In-memory provisioner for tests.
//!
//! Records every call, can be told to fail specific machines, and can hold
//! creations or destructions at a gate so tests can observe the registry
//! mid-start or mid-stop.

use crate::error::{ProvisionError, Result};
use crate::machine::Machine;
use crate::Provisioner;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use ws_config::MachineConfig;

/// A recorded `create_machine` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCall {
    pub machine: String,
    pub workspace_id: String,
    pub env_name: String,
}

/// A recorded `destroy_machine` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyCall {
    pub machine_id: String,
    pub force: bool,
}

#[derive(Debug, Default)]
struct MockState {
    creates: Vec<CreateCall>,
    destroys: Vec<DestroyCall>,
    failing_creates: HashSet<String>,
    failing_destroys: HashSet<String>,
    held: bool,
    held_destroys: bool,
}

#[derive(Debug, Default)]
pub struct MockProvisioner {
    state: Mutex<MockState>,
    changed: Condvar,
    next_id: AtomicUsize,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every creation of a machine named `machine` fail.
    pub fn fail_create(&self, machine: &str) {
        lock(&self.state).failing_creates.insert(machine.to_string());
    }

    /// Makes destruction of machines created from config `machine` fail.
    pub fn fail_destroy(&self, machine: &str) {
        lock(&self.state).failing_destroys.insert(machine.to_string());
    }

    /// Blocks subsequent creations until [`MockProvisioner::release`].
    /// Calls are still recorded before blocking.
    pub fn hold(&self) {
        lock(&self.state).held = true;
    }

    pub fn release(&self) {
        lock(&self.state).held = false;
        self.changed.notify_all();
    }

    /// Blocks subsequent destructions until [`MockProvisioner::release_destroys`].
    /// Calls are still recorded before blocking.
    pub fn hold_destroys(&self) {
        lock(&self.state).held_destroys = true;
    }

    pub fn release_destroys(&self) {
        lock(&self.state).held_destroys = false;
        self.changed.notify_all();
    }

    pub fn creates(&self) -> Vec<CreateCall> {
        lock(&self.state).creates.clone()
    }

    pub fn destroys(&self) -> Vec<DestroyCall> {
        lock(&self.state).destroys.clone()
    }

    /// Waits until at least `count` creations have been recorded.
    pub fn wait_for_creates(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.creates.len() >= count)
    }

    /// Waits until at least `count` destructions have been recorded.
    pub fn wait_for_destroys(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |state| state.destroys.len() >= count)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&MockState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.state);
        while !done(&state) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

/// Machine ids embed the config name so destroy failures can target them.
fn machine_name_of(machine_id: &str) -> &str {
    machine_id
        .strip_prefix("mock-")
        .and_then(|rest| rest.split_once('-'))
        .map(|(_, name)| name)
        .unwrap_or(machine_id)
}

impl Provisioner for MockProvisioner {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create_machine(
        &self,
        config: &MachineConfig,
        workspace_id: &str,
        env_name: &str,
    ) -> Result<Machine> {
        let mut state = lock(&self.state);
        state.creates.push(CreateCall {
            machine: config.name.clone(),
            workspace_id: workspace_id.to_string(),
            env_name: env_name.to_string(),
        });
        self.changed.notify_all();

        while state.held {
            state = match self.changed.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }

        if state.failing_creates.contains(&config.name) {
            return Err(ProvisionError::Rejected {
                machine: config.name.clone(),
                reason: "mock failure".to_string(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Machine::new(
            format!("mock-{n}-{}", config.name),
            config,
            workspace_id,
            env_name,
        ))
    }

    fn destroy_machine(&self, machine_id: &str, force: bool) -> Result<()> {
        let mut state = lock(&self.state);
        state.destroys.push(DestroyCall {
            machine_id: machine_id.to_string(),
            force,
        });
        self.changed.notify_all();

        while state.held_destroys {
            state = match self.changed.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }

        if state.failing_destroys.contains(machine_name_of(machine_id)) {
            return Err(ProvisionError::CommandFailed(format!(
                "mock failed to destroy {machine_id}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_and_fails_on_demand() {
        let mock = MockProvisioner::new();
        mock.fail_create("db");

        let dev = mock
            .create_machine(&MachineConfig::new("dev", "ubuntu").dev(), "ws-1", "default")
            .expect("dev should be created");
        assert!(dev.id.ends_with("-dev"));
        assert!(dev.is_dev());

        let err = mock
            .create_machine(&MachineConfig::new("db", "postgres"), "ws-1", "default")
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Rejected { .. }));

        assert_eq!(mock.creates().len(), 2);
    }

    #[test]
    fn test_destroy_failure_targets_machine_name() {
        let mock = MockProvisioner::new();
        mock.fail_destroy("db");

        assert!(mock.destroy_machine("mock-0-dev", true).is_ok());
        assert!(mock.destroy_machine("mock-1-db", true).is_err());
        assert_eq!(mock.destroys().len(), 2);
        assert!(mock.destroys().iter().all(|call| call.force));
    }

    #[test]
    fn test_held_destroy_is_recorded_before_release() {
        let mock = std::sync::Arc::new(MockProvisioner::new());
        mock.hold_destroys();

        let destroying = {
            let mock = std::sync::Arc::clone(&mock);
            std::thread::spawn(move || mock.destroy_machine("mock-0-dev", true))
        };
        assert!(mock.wait_for_destroys(1, Duration::from_secs(5)));
        assert!(!destroying.is_finished());

        mock.release_destroys();
        assert!(destroying.join().unwrap().is_ok());
        assert_eq!(mock.destroys().len(), 1);
    }

    #[test]
    fn test_machine_name_with_dashes() {
        assert_eq!(machine_name_of("mock-12-build-cache"), "build-cache");
        assert_eq!(machine_name_of("container-abc"), "container-abc");
    }
}
