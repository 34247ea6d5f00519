// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "wsd")]
#[command(about = "Runs workspaces and stops them cleanly on shutdown")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the runtime settings file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Validate a workspace descriptor file
    Check {
        /// Workspace descriptor file
        #[arg(short, long)]
        workspaces: PathBuf,

        /// Print the parsed workspaces as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start workspaces and keep them running until interrupted
    Run {
        /// Workspace descriptor file
        #[arg(short, long)]
        workspaces: PathBuf,

        /// Workspace to start, optionally with an environment (e.g. "ws-1:light").
        /// Starts every workspace in its default environment when omitted.
        #[arg(short, long = "start", value_name = "ID[:ENV]", value_parser = parse_target)]
        start: Vec<StartTarget>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTarget {
    pub id: String,
    pub env: Option<String>,
}

pub fn parse_target(value: &str) -> Result<StartTarget, String> {
    let (id, env) = match value.split_once(':') {
        Some((id, env)) => (id, Some(env)),
        None => (value, None),
    };

    if id.is_empty() {
        return Err("workspace id must not be empty".to_string());
    }
    if env.is_some_and(str::is_empty) {
        return Err(format!("environment name missing after '{id}:'"));
    }

    Ok(StartTarget {
        id: id.to_string(),
        env: env.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("ws-1").unwrap(),
            StartTarget {
                id: "ws-1".to_string(),
                env: None
            }
        );
        assert_eq!(parse_target("ws-1:light").unwrap().env.as_deref(), Some("light"));
        assert!(parse_target(":light").is_err());
        assert!(parse_target("ws-1:").is_err());
    }

    #[test]
    fn test_run_args() {
        let args = Args::try_parse_from([
            "wsd",
            "--config",
            "runtime.yaml",
            "run",
            "--workspaces",
            "ws.yaml",
            "--start",
            "ws-1",
            "-s",
            "ws-2:light",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("runtime.yaml")));
        match args.command {
            Command::Run { workspaces, start } => {
                assert_eq!(workspaces, PathBuf::from("ws.yaml"));
                assert_eq!(start.len(), 2);
                assert_eq!(start[1].env.as_deref(), Some("light"));
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_check_args() {
        let args = Args::try_parse_from(["wsd", "check", "-w", "ws.yaml", "--json"]).unwrap();

        assert!(args.config.is_none());
        match args.command {
            Command::Check { workspaces, json } => {
                assert_eq!(workspaces, PathBuf::from("ws.yaml"));
                assert!(json);
            }
            other => panic!("Expected check command, got {:?}", other),
        }
    }
}
