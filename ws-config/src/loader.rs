//! Loading workspace descriptor files.
//!
//! A descriptor file is a YAML document with a top-level `workspaces` list:
//!
//! ```yaml
//! workspaces:
//!   - id: ws-1
//!     name: backend
//!     owner: alice
//!     default_env: default
//!     environments:
//!       - name: default
//!         machines:
//!           - { name: dev, dev: true, image: "ubuntu:24.04" }
//!           - { name: db, image: "postgres:16" }
//! ```

use crate::error::{ConfigError, Result};
use crate::workspace::WorkspaceConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct WorkspaceFile {
    #[serde(default)]
    workspaces: Vec<WorkspaceConfig>,
}

/// Reads and validates every workspace declared in `path`.
pub fn load_workspaces(path: &Path) -> Result<Vec<WorkspaceConfig>> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let workspaces = parse_workspaces(&contents)?;
    debug!(
        path = %path.display(),
        count = workspaces.len(),
        "loaded workspace descriptors"
    );
    Ok(workspaces)
}

/// Parses and validates a descriptor document held in memory.
pub fn parse_workspaces(contents: &str) -> Result<Vec<WorkspaceConfig>> {
    let file: WorkspaceFile = serde_yaml_ng::from_str(contents)?;

    let mut ids = HashSet::new();
    for workspace in &file.workspaces {
        workspace.validate()?;
        if !ids.insert(workspace.id.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "workspace id '{}' is declared more than once",
                workspace.id
            )));
        }
    }

    Ok(file.workspaces)
}
