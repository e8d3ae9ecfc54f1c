//! Configuration loading and validation tests
//!
//! Tests focus on the observable outcome of loading a file: what the
//! built components look like and which mistakes are rejected.

use agent_swarm::config::{ConfigError, SwarmConfig};
use agent_swarm::handoff::HandoffRequest;
use agent_swarm::routing::Task;
use agent_swarm::runtime::RuntimeKind;
use agent_swarm::SwarmError;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[router]
memory_capacity = 10

[consensus]
default_threshold = 0.7
max_sessions = 5

[handoff]
enable_evaluation = false
latency_target_ms = 1500

[[agents]]
id = "coder"
name = "Coder"
expertise = ["coding", "rust"]
capacity = 2

[[agents]]
id = "reviewer"
name = "Reviewer"
expertise = ["review"]

[[runtimes]]
label = "hosted"
base_url = "https://agents.example.com/v1"
model = "agent-large"
api_key_env = "SWARM_TEST_UNSET_KEY"
"#,
    );

    let config = SwarmConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.router.memory_capacity, 10);
    assert_eq!(config.consensus.default_threshold, 0.7);
    assert!(!config.handoff.enable_evaluation);
    assert_eq!(config.agents.len(), 2);
    assert_eq!(config.runtimes[0].kind, RuntimeKind::Remote);
    assert_eq!(config.runtimes[0].runtime_config().api_key, None);
}

#[test]
fn test_loaded_config_routes_tasks() {
    let temp_file = write_config(
        r#"
[[agents]]
id = "coder"
expertise = ["coding"]

[[agents]]
id = "reviewer"
expertise = ["review"]
"#,
    );

    let router = SwarmConfig::load_from_file(temp_file.path())
        .unwrap()
        .build_router();
    let decision = router
        .route(&Task::new("t-1", "Please review this change"))
        .unwrap();
    assert_eq!(decision.agent.id, "reviewer");
}

#[test]
fn test_missing_file_is_read_error() {
    let err = SwarmConfig::load_from_file(Path::new("/nonexistent/swarm.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileRead(_)));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[router\nmemory_capacity = ");
    let err = SwarmConfig::load_from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::TomlParse(_)));
}

#[test]
fn test_duplicate_agent_ids_rejected() {
    let temp_file = write_config(
        r#"
[[agents]]
id = "coder"

[[agents]]
id = "coder"
"#,
    );
    let err = SwarmConfig::load_from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("duplicate agent id"));
}

#[test]
fn test_zero_capacity_rejected() {
    let temp_file = write_config(
        r#"
[[agents]]
id = "idle"
capacity = 0
"#,
    );
    let err = SwarmConfig::load_from_file(temp_file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidConfig(_)));
}

#[test]
fn test_zero_iteration_ceiling_rejected() {
    let temp_file = write_config("[workflow]\nmax_iterations = 0\n");
    let err = SwarmConfig::load_from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("max_iterations"));
}

#[test]
fn test_api_key_resolved_from_environment() {
    std::env::set_var("SWARM_TEST_RUNTIME_KEY", "sk-test-value");
    let temp_file = write_config(
        r#"
[[runtimes]]
label = "hosted"
base_url = "https://agents.example.com/v1"
model = "agent-large"
api_key_env = "SWARM_TEST_RUNTIME_KEY"
"#,
    );

    let config = SwarmConfig::load_from_file(temp_file.path()).unwrap();
    assert_eq!(
        config.runtimes[0].runtime_config().api_key.as_deref(),
        Some("sk-test-value")
    );
    std::env::remove_var("SWARM_TEST_RUNTIME_KEY");
}

#[test]
fn test_show_renders_loadable_toml() {
    let config = SwarmConfig::default();
    let rendered = config.to_toml().unwrap();
    assert!(rendered.contains("[router]"));
    assert_eq!(SwarmConfig::from_toml_str(&rendered).unwrap(), config);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_ttl_applies_to_built_transfer() {
    let temp_file = write_config(
        r#"
[handoff]
transfer_ttl_secs = 600
"#,
    );
    let config = SwarmConfig::load_from_file(temp_file.path()).unwrap();
    let transfer = config.build_context_transfer();
    let request = HandoffRequest::new("planner", "coder", "task-9", json!({"step": 4}));

    let kept = transfer.initiate(&request).await;
    let lapsed = transfer.initiate(&request).await;

    // Past the default blob lifetime, still inside the configured window
    tokio::time::advance(Duration::from_secs(400)).await;
    let completed = transfer
        .complete_handoff(&kept.handoff_id, "coder")
        .await
        .unwrap();
    assert_eq!(completed.context, json!({"step": 4}));

    tokio::time::advance(Duration::from_secs(201)).await;
    assert!(matches!(
        transfer.complete_handoff(&lapsed.handoff_id, "coder").await,
        Err(SwarmError::HandoffNotFound { .. })
    ));
}

#[test]
fn test_zero_transfer_ttl_rejected() {
    assert!(matches!(
        SwarmConfig::from_toml_str("[handoff]\ntransfer_ttl_secs = 0\n"),
        Err(ConfigError::InvalidConfig(ref message)) if message.contains("transfer_ttl_secs")
    ));
}
