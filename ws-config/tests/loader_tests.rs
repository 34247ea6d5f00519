//! Integration tests for descriptor and runtime config loading.

use std::fs;
use tempfile::TempDir;
use ws_config::{load_workspaces, parse_workspaces, ConfigError, RuntimeConfig};

const DESCRIPTORS: &str = r#"
workspaces:
  - id: ws-1
    name: backend
    owner: alice
    default_env: default
    attributes:
      team: platform
    environments:
      - name: default
        recipe:
          type: docker
        machines:
          - name: dev
            dev: true
            image: "ubuntu:24.04"
            memory_mb: 2048
          - name: db
            image: "postgres:16"
            env:
              POSTGRES_PASSWORD: secret
      - name: minimal
        machines:
          - { name: dev, dev: true, image: "alpine:3" }
  - id: ws-2
    name: frontend
    owner: bob
    default_env: default
    environments:
      - name: default
        machines:
          - { name: dev, dev: true, image: "node:22" }
"#;

#[test]
fn test_load_workspaces_from_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("workspaces.yaml");
    fs::write(&path, DESCRIPTORS).expect("Failed to write descriptors");

    let workspaces = load_workspaces(&path).expect("Failed to load workspaces");
    assert_eq!(workspaces.len(), 2);

    let backend = &workspaces[0];
    assert_eq!(backend.id, "ws-1");
    assert_eq!(backend.owner, "alice");
    assert_eq!(backend.attributes.get("team").map(String::as_str), Some("platform"));
    assert_eq!(backend.environments.len(), 2);

    let env = backend.environment("default").expect("default env");
    assert_eq!(env.recipe_type("docker"), "docker");
    let dev = env.dev_machine().expect("dev machine");
    assert_eq!(dev.image, "ubuntu:24.04");
    assert_eq!(dev.memory_mb, Some(2048));

    let db = env.secondary_machines().next().expect("db machine");
    assert_eq!(db.env.get("POSTGRES_PASSWORD").map(String::as_str), Some("secret"));

    let minimal = backend.environment("minimal").expect("minimal env");
    assert!(minimal.recipe.is_none());
}

#[test]
fn test_missing_file_reports_path() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("missing.yaml");

    match load_workspaces(&path) {
        Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("Expected Io error, got {:?}", other),
    }
}

#[test]
fn test_duplicate_workspace_ids_rejected() {
    let yaml = r#"
workspaces:
  - { id: ws-1, name: a, owner: alice, default_env: e, environments: [{ name: e }] }
  - { id: ws-1, name: b, owner: bob, default_env: e, environments: [{ name: e }] }
"#;

    let err = parse_workspaces(yaml).unwrap_err();
    assert!(err.to_string().contains("more than once"));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    assert!(matches!(
        parse_workspaces("workspaces: [ {id: "),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn test_empty_document_has_no_workspaces() {
    let workspaces = parse_workspaces("workspaces: []\n").expect("empty list is valid");
    assert!(workspaces.is_empty());
}

#[test]
fn test_runtime_config_load_from_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("runtime.yaml");
    fs::write(
        &path,
        "supported_recipe_types: [docker, compose]\nforce_destroy: false\n",
    )
    .expect("Failed to write runtime config");

    let config = RuntimeConfig::load(&path).expect("Failed to load runtime config");
    assert!(config.supports_recipe("compose"));
    assert!(!config.force_destroy);
}
