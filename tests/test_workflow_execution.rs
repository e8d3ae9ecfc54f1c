//! Workflow execution from definitions
//!
//! Runs whole graphs loaded from TOML through the orchestrator and checks
//! the returned execution value.

mod test_helpers;

use agent_swarm::workflow::{
    Context, RoutedProcessor, SimulatedProcessor, WorkflowDefinition, WorkflowEdge,
    WorkflowError, WorkflowNode, WorkflowOrchestrator,
};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use test_helpers::coder_reviewer_router;

const REVIEW_PIPELINE: &str = r#"
start = "fetch"

[[nodes]]
id = "fetch"
type = "process"
label = "fetch sources"

[[nodes]]
id = "implement"
type = "agent"
label = "rust coding"

[[nodes]]
id = "gate"
type = "decision"
label = "quality gate"

[[edges]]
source = "fetch"
target = "implement"

[[edges]]
source = "implement"
target = "gate"
"#;

fn simulated() -> Arc<SimulatedProcessor> {
    Arc::new(SimulatedProcessor::default().with_decision(true))
}

#[tokio::test]
async fn test_single_node_without_edges() {
    let orchestrator = WorkflowOrchestrator::new("start", simulated());
    orchestrator
        .add_node(WorkflowNode::process("start", "only"))
        .unwrap();

    let execution = orchestrator.execute(Context::new()).await;
    assert!(execution.is_success());
    assert_eq!(execution.execution_path, vec!["start"]);

    let report = execution.to_report();
    assert_eq!(report["success"], true);
    assert_eq!(report["error"], Value::Null);
    assert_eq!(report["executionPath"], serde_json::json!(["start"]));
}

#[tokio::test]
async fn test_pipeline_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{REVIEW_PIPELINE}").unwrap();

    let definition = WorkflowDefinition::load_from_file(file.path()).unwrap();
    let orchestrator = WorkflowOrchestrator::from_definition(&definition, simulated()).unwrap();

    let mut initial = Context::new();
    initial.insert("ticket".to_string(), Value::from("SW-42"));
    let execution = orchestrator.execute(initial).await;

    assert!(execution.is_success());
    assert_eq!(execution.execution_path, vec!["fetch", "implement", "gate"]);
    let output = execution.output().unwrap();
    assert_eq!(output["ticket"], "SW-42");
    assert_eq!(output["processedBy"], "quality gate");
    assert_eq!(output["decision"], true);
    assert_eq!(execution.state.history.len(), 3);
    assert_eq!(execution.state.history[1].input["processedBy"], "fetch sources");
}

#[tokio::test]
async fn test_routed_pipeline_names_the_agent() {
    let definition = WorkflowDefinition::from_toml_str(REVIEW_PIPELINE).unwrap();
    let router = Arc::new(coder_reviewer_router());
    let processor = Arc::new(RoutedProcessor::new(
        router.clone(),
        SimulatedProcessor::default(),
    ));
    let orchestrator = WorkflowOrchestrator::from_definition(&definition, processor).unwrap();

    let execution = orchestrator.execute(Context::new()).await;
    assert!(execution.is_success());
    let implement = &execution.state.history[1];
    assert_eq!(implement.output["processedBy"], "Coder");
    assert_eq!(implement.output["agentId"], "coder");
    assert_eq!(router.registry().get("coder").unwrap().workload, 0);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_run_gives_back_agent_slot() {
    let definition = WorkflowDefinition::from_toml_str(
        r#"
start = "implement"

[[nodes]]
id = "implement"
type = "agent"
label = "rust coding"
"#,
    )
    .unwrap();
    let router = Arc::new(coder_reviewer_router());
    let processor = Arc::new(RoutedProcessor::new(
        router.clone(),
        SimulatedProcessor::new(Duration::from_secs(10)),
    ));
    let orchestrator = WorkflowOrchestrator::from_definition(&definition, processor).unwrap();

    let mut run = Box::pin(orchestrator.execute(Context::new()));
    if futures::poll!(run.as_mut()).is_pending() {
        assert_eq!(router.registry().get("coder").unwrap().workload, 1);
    }
    drop(run);

    assert_eq!(router.registry().get("coder").unwrap().workload, 0);
}

#[tokio::test]
async fn test_cycle_stops_at_iteration_ceiling() {
    let definition = WorkflowDefinition::from_toml_str(
        r#"
start = "a"

[[nodes]]
id = "a"
type = "process"

[[nodes]]
id = "b"
type = "process"

[[edges]]
source = "a"
target = "b"

[[edges]]
source = "b"
target = "a"
"#,
    )
    .unwrap();
    let orchestrator = WorkflowOrchestrator::from_definition(&definition, simulated()).unwrap();

    let execution = orchestrator.execute(Context::new()).await;
    assert_eq!(
        execution.error(),
        Some(&WorkflowError::IterationLimitExceeded { limit: 100 })
    );
    assert_eq!(execution.execution_path.len(), 100);
    assert_eq!(execution.to_report()["success"], false);
}

#[tokio::test]
async fn test_edge_to_missing_node_keeps_partial_path() {
    let definition = WorkflowDefinition::from_toml_str(
        r#"
start = "a"

[[nodes]]
id = "a"
type = "agent"

[[edges]]
source = "a"
target = "ghost"
"#,
    )
    .unwrap();
    let orchestrator = WorkflowOrchestrator::from_definition(&definition, simulated()).unwrap();

    let execution = orchestrator.execute(Context::new()).await;
    assert_eq!(execution.execution_path, vec!["a"]);
    assert!(matches!(
        execution.error(),
        Some(WorkflowError::NodeNotFound { node_id }) if node_id == "ghost"
    ));
}

#[test]
fn test_unknown_node_type_rejected_at_load() {
    let definition = WorkflowDefinition::from_toml_str(
        r#"
start = "a"

[[nodes]]
id = "a"
type = "webhook"
"#,
    )
    .unwrap();
    let result = WorkflowOrchestrator::from_definition(&definition, simulated());
    assert!(matches!(
        result,
        Err(WorkflowError::UnknownNodeType { tag }) if tag == "webhook"
    ));
}

proptest::proptest! {
    #[test]
    fn prop_chain_path_is_bounded_by_ceiling(length in 1usize..40, ceiling in 1usize..30) {
        let orchestrator = WorkflowOrchestrator::new("n0", simulated())
            .with_max_iterations(ceiling);
        for i in 0..length {
            orchestrator
                .add_node(WorkflowNode::process(format!("n{i}"), format!("step {i}")))
                .unwrap();
            if i > 0 {
                orchestrator.add_edge(WorkflowEdge::new(
                    format!("e{i}"),
                    format!("n{}", i - 1),
                    format!("n{i}"),
                ));
            }
        }

        let execution = tokio_test::block_on(orchestrator.execute(Context::new()));
        proptest::prop_assert_eq!(execution.execution_path.len(), length.min(ceiling));
        proptest::prop_assert_eq!(execution.is_success(), length <= ceiling);
    }
}
