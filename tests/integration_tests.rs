//! End-to-end tests driving the public engine API with mock providers

use anyhow::Result;
use async_trait::async_trait;
use flowsmith::runtime::context::ExecutionContext;
use flowsmith::runtime::executor::{HandlerRegistry, NodeHandler};
use flowsmith::runtime::observer::NoopObserver;
use flowsmith::runtime::sandbox::ScriptSandbox;
use flowsmith::services::{
    ModelProvider, ModelRequest, ModelResponse, Passage, RetrievalProvider, RetrievalRequest,
    RetrievalResponse, ServiceHub, TokenUsage,
};
use flowsmith::workflow::graph::WorkflowGraph;
use flowsmith::workflow::registry::{MemoryScheduleStore, WorkflowRegistry};
use flowsmith::{
    Edge, Node, NodeType, Workflow, WorkflowExecutor, WorkflowScheduler, WorkflowValidator,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Echoes the prompt back in upper case
struct EchoModel;

#[async_trait]
impl ModelProvider for EchoModel {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse> {
        Ok(ModelResponse {
            response: request.prompt.to_uppercase(),
            model: request.model,
            usage: TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 3,
                total_tokens: 6,
            },
        })
    }
}

struct DownModel;

#[async_trait]
impl ModelProvider for DownModel {
    async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse> {
        Err(anyhow::anyhow!("model service unavailable"))
    }
}

struct FixedKnowledgeBase;

#[async_trait]
impl RetrievalProvider for FixedKnowledgeBase {
    async fn retrieve(&self, _request: RetrievalRequest) -> Result<RetrievalResponse> {
        Ok(RetrievalResponse {
            passages: vec![
                Passage {
                    content: "cats purr".to_string(),
                    score: 0.9,
                    ..Default::default()
                },
                Passage {
                    content: "dogs bark".to_string(),
                    score: 0.2,
                    ..Default::default()
                },
            ],
        })
    }
}

struct BrokenTrigger;

#[async_trait]
impl NodeHandler for BrokenTrigger {
    async fn execute(&self, _node: &Node, _ctx: &mut ExecutionContext) -> Result<Value> {
        Err(anyhow::anyhow!("payload rejected"))
    }
}

/// Blocks until released so a run stays in flight
struct Gate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl NodeHandler for Gate {
    async fn execute(&self, _node: &Node, _ctx: &mut ExecutionContext) -> Result<Value> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(json!("released"))
    }
}

fn workflow(id: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
    Workflow {
        id: id.to_string(),
        name: format!("{} workflow", id),
        nodes,
        edges,
        ..Default::default()
    }
}

fn trigger(id: &str) -> Node {
    Node::new(id, NodeType::Trigger, json!({"label": "Start"}))
}

fn input(id: &str, variable: &str, default: Value) -> Node {
    Node::new(
        id,
        NodeType::Input,
        json!({"label": id, "variableName": variable, "dataType": "number", "defaultValue": default}),
    )
}

fn output(id: &str, variable: &str) -> Node {
    Node::new(
        id,
        NodeType::Output,
        json!({"label": id, "variableName": variable}),
    )
}

fn llm(id: &str, prompt: &str) -> Node {
    Node::new(
        id,
        NodeType::Llm,
        json!({"label": id, "model": "mock-1", "prompt": prompt}),
    )
}

fn executor(services: ServiceHub) -> WorkflowExecutor {
    WorkflowExecutor::new(HandlerRegistry::with_defaults(
        services,
        ScriptSandbox::default(),
    ))
}

fn simple_pipeline() -> Workflow {
    workflow(
        "simple",
        vec![trigger("t"), input("in", "x", json!(5)), output("out", "x")],
        vec![Edge::new("t", "in"), Edge::new("in", "out")],
    )
}

#[tokio::test]
async fn cycle_is_reported_and_refused() {
    let wf = workflow(
        "cyclic",
        vec![
            trigger("t"),
            llm("a", "first"),
            llm("b", "second"),
        ],
        vec![Edge::new("t", "a"), Edge::new("a", "b"), Edge::new("b", "a")],
    );

    let validation = WorkflowValidator::new().validate(&wf);
    assert!(!validation.valid);
    assert!(validation
        .errors
        .iter()
        .any(|issue| issue.message.starts_with("Cycle detected")));

    let result = executor(ServiceHub::new().with_model(Arc::new(EchoModel)))
        .execute(&wf, &NoopObserver)
        .await;
    assert!(!result.success);
    assert!(result.node_results.is_empty());
    assert!(result.error.unwrap().contains("Cycle detected"));
}

#[tokio::test]
async fn workflow_without_trigger_is_refused() {
    let wf = workflow(
        "headless",
        vec![input("in", "x", json!(1)), output("out", "x")],
        vec![Edge::new("in", "out")],
    );

    assert!(!WorkflowValidator::new().validate(&wf).valid);

    let result = executor(ServiceHub::new()).execute(&wf, &NoopObserver).await;
    assert!(!result.success);
    assert!(result.execution_order.is_empty());
    assert!(result
        .error
        .unwrap()
        .contains("Workflow must contain at least one trigger node"));
}

#[tokio::test]
async fn execution_order_respects_every_edge() {
    let wf = workflow(
        "diamond",
        vec![
            output("sink", "y"),
            llm("right", "right side"),
            llm("left", "left side"),
            input("seed", "y", json!(2)),
            trigger("t"),
        ],
        vec![
            Edge::new("t", "seed"),
            Edge::new("seed", "left"),
            Edge::new("seed", "right"),
            Edge::new("left", "sink"),
            Edge::new("right", "sink"),
        ],
    );

    let order = WorkflowGraph::build(&wf).execution_order();
    assert!(order.is_complete());
    assert_eq!(order.order.len(), wf.nodes.len());
    assert_eq!(order.order[0], "t");

    let position: HashMap<&str, usize> = order
        .order
        .iter()
        .enumerate()
        .map(|(index, id)| (id.as_str(), index))
        .collect();
    for edge in &wf.edges {
        assert!(position[edge.source.as_str()] < position[edge.target.as_str()]);
    }

    let result = executor(ServiceHub::new().with_model(Arc::new(EchoModel)))
        .execute(&wf, &NoopObserver)
        .await;
    assert!(result.success);
    assert_eq!(result.execution_order, order.order);
}

#[tokio::test]
async fn input_value_reaches_final_output() {
    let result = executor(ServiceHub::new())
        .execute(&simple_pipeline(), &NoopObserver)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output["x"], json!(5));
    assert_eq!(result.stats.nodes_executed, 3);
    assert_eq!(result.stats.errors_encountered, 0);
}

#[tokio::test]
async fn node_failure_does_not_stop_unrelated_branches() {
    let wf = workflow(
        "branches",
        vec![
            trigger("t"),
            llm("summary", "summarise"),
            output("summary_out", "summary"),
            input("in", "count", json!(3)),
            output("count_out", "count"),
        ],
        vec![
            Edge::new("t", "summary"),
            Edge::new("summary", "summary_out"),
            Edge::new("t", "in"),
            Edge::new("in", "count_out"),
        ],
    );

    let result = executor(ServiceHub::new().with_model(Arc::new(DownModel)))
        .execute(&wf, &NoopObserver)
        .await;

    assert!(!result.success);
    assert!(result.stats.errors_encountered >= 1);
    let failed = result.node("summary").unwrap();
    assert!(!failed.success);
    assert!(failed.error.as_ref().unwrap().contains("model service unavailable"));

    assert!(result.node("summary_out").is_some());
    assert!(result.node("count_out").unwrap().success);
    assert_eq!(result.output["count"], json!(3));
}

#[tokio::test]
async fn trigger_failure_halts_the_run() {
    let engine = WorkflowExecutor::new(
        HandlerRegistry::with_defaults(ServiceHub::new(), ScriptSandbox::default())
            .with_handler(NodeType::Trigger, Arc::new(BrokenTrigger)),
    );

    let result = engine.execute(&simple_pipeline(), &NoopObserver).await;

    assert!(!result.success);
    assert_eq!(result.node_results.len(), 1);
    assert!(!result.node("t").unwrap().success);
    assert!(result.node("in").is_none());
    assert!(result.node("out").is_none());
    assert!(result.error.unwrap().contains("Trigger node 't' failed"));
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let wf = workflow(
        "repeat",
        vec![
            trigger("t"),
            input("in", "topic", json!(7)),
            llm("ask", "tell me about {{topic}}"),
            output("out", "answer"),
        ],
        vec![
            Edge::new("t", "in"),
            Edge::new("in", "ask"),
            Edge::new("ask", "out"),
        ],
    );
    let engine = executor(ServiceHub::new().with_model(Arc::new(EchoModel)));

    let first = engine.execute(&wf, &NoopObserver).await;
    let second = engine.execute(&wf, &NoopObserver).await;

    assert!(first.success, "{:?}", first.error);
    assert_eq!(first.output, second.output);
    assert_eq!(first.execution_order, second.execution_order);
    assert_eq!(first.output["answer"]["response"], json!("TELL ME ABOUT 7"));
}

#[tokio::test]
async fn retrieval_feeds_model_prompt() {
    let wf = workflow(
        "rag",
        vec![
            trigger("t"),
            Node::new(
                "kb",
                NodeType::Rag,
                json!({
                    "label": "Docs",
                    "knowledgeBaseId": "animals",
                    "query": "{{trigger.question}}",
                    "similarityThreshold": 0.5
                }),
            ),
            llm("ask", "context: {{kb_output.context}}"),
            output("out", "answer"),
        ],
        vec![
            Edge::new("t", "kb"),
            Edge::new("kb", "ask"),
            Edge::new("ask", "out"),
        ],
    );
    let services = ServiceHub::new()
        .with_model(Arc::new(EchoModel))
        .with_retrieval(Arc::new(FixedKnowledgeBase));

    let result = executor(services)
        .execute_with_input(&wf, Some(json!({"question": "what do cats do?"})), &NoopObserver)
        .await;

    assert!(result.success, "{:?}", result.error);
    let kb = result.node("kb").unwrap().output.clone().unwrap();
    assert_eq!(kb["query"], json!("what do cats do?"));
    assert_eq!(kb["count"], json!(1));
    assert_eq!(result.output["answer"]["response"], json!("CONTEXT: CATS PURR"));
}

#[tokio::test]
async fn second_run_is_rejected_while_first_is_in_flight() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let engine = Arc::new(WorkflowExecutor::new(
        HandlerRegistry::with_defaults(ServiceHub::new(), ScriptSandbox::default()).with_handler(
            NodeType::Function,
            Arc::new(Gate {
                entered: entered.clone(),
                release: release.clone(),
            }),
        ),
    ));
    let wf = workflow(
        "slow",
        vec![
            trigger("t"),
            Node::new("slow", NodeType::Function, json!({"label": "Slow", "code": "return 1"})),
            output("out", "result"),
        ],
        vec![Edge::new("t", "slow"), Edge::new("slow", "out")],
    );

    let first = {
        let engine = engine.clone();
        let wf = wf.clone();
        tokio::spawn(async move { engine.execute(&wf, &NoopObserver).await })
    };
    entered.notified().await;

    let rejected = engine.execute(&wf, &NoopObserver).await;
    assert!(!rejected.success);
    assert!(rejected.node_results.is_empty());
    assert_eq!(
        rejected.error.as_deref(),
        Some("Workflow execution already in progress")
    );

    release.notify_one();
    let completed = first.await.unwrap();
    assert!(completed.success, "{:?}", completed.error);
    assert_eq!(completed.output["result"], json!("released"));
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn daily_schedule_is_armed_and_disabling_cancels_it() {
    let workflows = Arc::new(WorkflowRegistry::new());
    let schedules = Arc::new(MemoryScheduleStore::new());
    let scheduler = WorkflowScheduler::new(
        workflows.clone(),
        schedules.clone(),
        Arc::new(executor(ServiceHub::new())),
    )
    .await
    .unwrap();

    let before = chrono::Utc::now();
    let entry = scheduler.schedule(&simple_pipeline(), "0 0 * * *").await;

    assert!(entry.next_run > before);
    assert!(entry.next_run - before <= chrono::Duration::hours(24));
    assert!(scheduler.has_pending_timer(&entry.id).await);

    assert!(scheduler.toggle(&entry.id, false).await);
    assert!(!scheduler.has_pending_timer(&entry.id).await);
    assert!(!scheduler.get(&entry.id).await.unwrap().enabled);
    assert!(!schedules.snapshot()[0].enabled);

    assert!(scheduler.toggle(&entry.id, true).await);
    assert!(scheduler.has_pending_timer(&entry.id).await);

    scheduler.shutdown().await.unwrap();
}
