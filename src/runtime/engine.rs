/// Workflow execution engine
///
/// Validates a workflow, orders it with Kahn's algorithm (triggers first),
/// then walks the order one node at a time. Each node gets its inputs prepared
/// from the outputs of its upstream nodes, is dispatched to its handler and has
/// its output published to the shared context. Only a failed trigger stops the
/// walk; any other failure is recorded and the run carries on.
///
/// One run at a time per executor instance. Callers that need concurrent runs
/// create more executors.

use crate::error::EngineError;
use crate::runtime::context::{input_key, inputs_key, output_key, ExecutionContext};
use crate::runtime::executor::{HandlerRegistry, NodeExecutor};
use crate::runtime::observer::ExecutionObserver;
use crate::runtime::result::{
    millis, ExecutionStats, NodeExecutionResult, WorkflowExecutionResult,
};
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::types::{Node, NodeType, Workflow};
use crate::workflow::validator::WorkflowValidator;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Number of trailing successful nodes exposed when a workflow has no output node
pub const FALLBACK_OUTPUT_COUNT: usize = 3;

/// Single-run workflow executor
#[derive(Debug)]
pub struct WorkflowExecutor {
    /// Re-validates every workflow before it runs
    validator: WorkflowValidator,
    /// Dispatches nodes to their handlers
    executor: NodeExecutor,
    /// Set while a run is in flight
    running: AtomicBool,
    /// Cooperative stop request, checked between nodes
    cancel_requested: AtomicBool,
}

/// Resets the running flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Timestamped run log that mirrors every line to the observer
struct RunLog<'a> {
    lines: Vec<String>,
    observer: &'a dyn ExecutionObserver,
}

impl<'a> RunLog<'a> {
    fn new(observer: &'a dyn ExecutionObserver) -> Self {
        Self {
            lines: Vec::new(),
            observer,
        }
    }

    fn push(&mut self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}",
            chrono::Utc::now().format("%H:%M:%S%.3f"),
            message.as_ref()
        );
        tracing::info!("{}", message.as_ref());
        self.observer.on_log_update(&line);
        self.lines.push(line);
    }

    fn take_lines(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl WorkflowExecutor {
    /// Create an executor over a handler registry with the default validator
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            validator: WorkflowValidator::new(),
            executor: NodeExecutor::new(registry),
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    /// Replace the validator used before each run
    pub fn with_validator(mut self, validator: WorkflowValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn validator(&self) -> &WorkflowValidator {
        &self.validator
    }

    /// True while a run is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the in-flight run to stop before its next node
    ///
    /// Returns false when nothing is running. The node currently executing is
    /// not interrupted.
    pub fn stop(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        tracing::warn!("🛑 Stop requested for running workflow");
        self.cancel_requested.store(true, Ordering::Release);
        true
    }

    /// Run a workflow without a trigger payload
    pub async fn execute(
        &self,
        workflow: &Workflow,
        observer: &dyn ExecutionObserver,
    ) -> WorkflowExecutionResult {
        self.execute_with_input(workflow, None, observer).await
    }

    /// Run a workflow, handing `trigger_input` to its trigger nodes
    ///
    /// Never fails: every failure mode becomes a result with `success == false`.
    /// `on_workflow_complete` fires exactly once per call.
    pub async fn execute_with_input(
        &self,
        workflow: &Workflow,
        trigger_input: Option<Value>,
        observer: &dyn ExecutionObserver,
    ) -> WorkflowExecutionResult {
        let started = Instant::now();

        let Some(_guard) = RunGuard::acquire(&self.running) else {
            let err = EngineError::AlreadyRunning;
            tracing::warn!("⚠️ Refusing to run '{}': {}", workflow.id, err);
            let mut log = RunLog::new(observer);
            log.push(format!("❌ {}", err));
            let result = WorkflowExecutionResult::refused(&err, log.take_lines(), started.elapsed());
            observer.on_workflow_complete(&result);
            return result;
        };
        self.cancel_requested.store(false, Ordering::Release);

        let mut log = RunLog::new(observer);
        let outcome = AssertUnwindSafe(self.run(workflow, trigger_input, &mut log, started))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let err = EngineError::internal(panic_message(panic.as_ref()));
                tracing::error!("🔥 Workflow '{}' aborted: {}", workflow.id, err);
                log.push(format!("🔥 {}", err));
                WorkflowExecutionResult::refused(&err, log.take_lines(), started.elapsed())
            }
        };

        observer.on_workflow_complete(&result);
        result
    }

    async fn run(
        &self,
        workflow: &Workflow,
        trigger_input: Option<Value>,
        log: &mut RunLog<'_>,
        started: Instant,
    ) -> WorkflowExecutionResult {
        log.push(format!(
            "🚀 Starting workflow '{}' ({} nodes, {} edges)",
            workflow.id,
            workflow.nodes.len(),
            workflow.edges.len()
        ));

        // STEP 1: re-validate, no partial runs on an unsound graph
        let validation = self.validator.validate(workflow);
        for warning in &validation.warnings {
            tracing::debug!("⚠️ Validation warning: {}", warning.message);
        }
        if !validation.valid {
            let err = EngineError::InvalidWorkflow {
                errors: validation.error_messages(),
            };
            log.push(format!("❌ {}", err));
            return WorkflowExecutionResult::refused(&err, log.take_lines(), started.elapsed());
        }

        // STEP 2: dependency order, refuse rather than drop unordered nodes
        let order = WorkflowGraph::build(workflow).execution_order();
        if !order.is_complete() {
            let err = EngineError::UnorderedNodes {
                nodes: order.unordered,
            };
            log.push(format!("❌ {}", err));
            return WorkflowExecutionResult::refused(&err, log.take_lines(), started.elapsed());
        }
        log.push(format!("📋 Execution order: {}", order.order.join(" -> ")));

        // STEP 3: walk the order
        let mut ctx = ExecutionContext::with_trigger_input(trigger_input);
        let mut node_results = BTreeMap::new();
        let mut stats = ExecutionStats::default();
        let mut succeeded: Vec<&Node> = Vec::new();
        let mut halted: Option<EngineError> = None;

        for (step, node_id) in order.order.iter().enumerate() {
            if self.cancel_requested.load(Ordering::Acquire) {
                log.push(format!("🛑 Run cancelled before node '{}'", node_id));
                halted = Some(EngineError::Cancelled);
                break;
            }

            let Some(node) = workflow.node(node_id) else {
                continue;
            };

            prepare_context(workflow, node, &mut ctx);
            log.observer.on_node_start(&node.id);
            log.push(format!(
                "📍 Step {}/{}: {} '{}'",
                step + 1,
                order.order.len(),
                node.node_type,
                node.display_name()
            ));

            let node_started = Instant::now();
            let dispatched = AssertUnwindSafe(self.executor.execute_node(node, &mut ctx))
                .catch_unwind()
                .await;
            let elapsed = node_started.elapsed();
            stats.nodes_executed += 1;

            let outcome = match dispatched {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(e)) => Err(format!("{:#}", e)),
                Err(panic) => Err(format!(
                    "Node handler panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };

            match outcome {
                Ok(output) => {
                    stats.successful_nodes += 1;
                    ctx.publish_output(&node.id, output.clone());
                    log.observer.on_node_complete(&node.id, &output);
                    log.push(format!(
                        "✅ '{}' completed in {}ms",
                        node.display_name(),
                        millis(elapsed)
                    ));
                    node_results.insert(node.id.clone(), NodeExecutionResult::success(output, elapsed));
                    succeeded.push(node);
                }
                Err(message) => {
                    stats.errors_encountered += 1;
                    log.observer.on_node_error(&node.id, &message);
                    log.push(format!("❌ '{}' failed: {}", node.display_name(), message));
                    node_results.insert(
                        node.id.clone(),
                        NodeExecutionResult::failure(message.clone(), elapsed),
                    );

                    if node.node_type == NodeType::Trigger {
                        log.push("🛑 Trigger failed, halting run");
                        halted = Some(EngineError::TriggerFailed {
                            node_id: node.id.clone(),
                            reason: message,
                        });
                        break;
                    }
                }
            }
        }

        // STEP 4: final outputs
        let output = gather_outputs(workflow, &ctx, &succeeded);

        // STEP 5: assemble the result
        let success = stats.errors_encountered == 0 && halted.is_none();
        let error = match halted {
            Some(err) => Some(err.to_string()),
            None if stats.errors_encountered > 0 => {
                Some(format!("{} node(s) failed", stats.errors_encountered))
            }
            None => None,
        };

        let elapsed = started.elapsed();
        stats.total_execution_time = millis(elapsed);
        log.push(format!(
            "{} Workflow '{}' finished in {}ms: {} executed, {} succeeded, {} failed",
            if success { "🎉" } else { "⚠️" },
            workflow.id,
            stats.total_execution_time,
            stats.nodes_executed,
            stats.successful_nodes,
            stats.errors_encountered
        ));

        WorkflowExecutionResult {
            success,
            output,
            node_results,
            execution_order: order.order,
            execution_time: millis(elapsed),
            logs: log.take_lines(),
            stats,
            error,
        }
    }
}

/// Prepare `{id}_input`, `{id}_inputs` and handle variables for a node
///
/// Only upstream nodes that succeeded have published an output, so a failed
/// dependency simply leaves the primary input null.
fn prepare_context(workflow: &Workflow, node: &Node, ctx: &mut ExecutionContext) {
    let mut has_incoming = false;
    let mut inputs = Vec::new();

    for edge in workflow.edges.iter().filter(|edge| edge.target == node.id) {
        has_incoming = true;
        let Some(output) = ctx.get(&output_key(&edge.source)).cloned() else {
            continue;
        };
        if let Some(handle) = edge
            .source_handle
            .as_deref()
            .filter(|handle| !handle.trim().is_empty())
        {
            ctx.set(handle, output.clone());
        }
        inputs.push(output);
    }

    if !has_incoming {
        return;
    }

    ctx.set(input_key(&node.id), inputs.first().cloned().unwrap_or(Value::Null));
    ctx.set(inputs_key(&node.id), Value::Array(inputs));
}

/// Named outputs of a finished run
fn gather_outputs(workflow: &Workflow, ctx: &ExecutionContext, succeeded: &[&Node]) -> Map<String, Value> {
    let mut output = Map::new();
    let output_nodes: Vec<&Node> = workflow
        .nodes
        .iter()
        .filter(|node| node.node_type == NodeType::Output)
        .collect();

    if output_nodes.is_empty() {
        let start = succeeded.len().saturating_sub(FALLBACK_OUTPUT_COUNT);
        for node in &succeeded[start..] {
            if let Some(value) = ctx.get(&node.id) {
                output.insert(node.display_name().to_string(), value.clone());
            }
        }
        return output;
    }

    for variable in ctx.captured() {
        if let Some(value) = ctx.get(variable) {
            output.insert(variable.clone(), value.clone());
        }
    }
    for node in output_nodes {
        let Some(variable) = node.data_str("variableName") else {
            continue;
        };
        if output.contains_key(variable) {
            continue;
        }
        if let Some(value) = ctx.get(variable) {
            output.insert(variable.to_string(), value.clone());
        }
    }
    output
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::executor::NodeHandler;
    use crate::runtime::observer::NoopObserver;
    use crate::runtime::sandbox::ScriptSandbox;
    use crate::services::ServiceHub;
    use crate::workflow::types::Edge;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    fn workflow(nodes: Vec<Node>, edges: Vec<Edge>) -> Workflow {
        Workflow {
            id: "wf-test".to_string(),
            name: "Test workflow".to_string(),
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
            json!({"variableName": variable, "dataType": "number", "defaultValue": default}),
        )
    }

    fn output(id: &str, variable: &str) -> Node {
        Node::new(id, NodeType::Output, json!({"variableName": variable}))
    }

    fn engine() -> WorkflowExecutor {
        WorkflowExecutor::new(HandlerRegistry::with_defaults(
            ServiceHub::new(),
            ScriptSandbox::default(),
        ))
    }

    fn engine_with(node_type: NodeType, handler: Arc<dyn NodeHandler>) -> WorkflowExecutor {
        WorkflowExecutor::new(
            HandlerRegistry::with_defaults(ServiceHub::new(), ScriptSandbox::default())
                .with_handler(node_type, handler),
        )
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ExecutionObserver for Recorder {
        fn on_node_start(&self, node_id: &str) {
            self.events.lock().unwrap().push(format!("start:{}", node_id));
        }

        fn on_node_complete(&self, node_id: &str, _output: &Value) {
            self.events.lock().unwrap().push(format!("complete:{}", node_id));
        }

        fn on_node_error(&self, node_id: &str, _error: &str) {
            self.events.lock().unwrap().push(format!("error:{}", node_id));
        }

        fn on_workflow_complete(&self, _result: &WorkflowExecutionResult) {
            self.events.lock().unwrap().push("done".to_string());
        }
    }

    struct Failing;

    #[async_trait]
    impl NodeHandler for Failing {
        async fn execute(&self, node: &Node, _ctx: &mut ExecutionContext) -> Result<Value> {
            Err(anyhow::anyhow!("{} exploded", node.id))
        }
    }

    struct Panicking;

    #[async_trait]
    impl NodeHandler for Panicking {
        async fn execute(&self, _node: &Node, _ctx: &mut ExecutionContext) -> Result<Value> {
            panic!("kaboom");
        }
    }

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

    fn gated() -> (Arc<Notify>, Arc<Notify>, WorkflowExecutor) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let engine = engine_with(
            NodeType::Function,
            Arc::new(Gate {
                entered: entered.clone(),
                release: release.clone(),
            }),
        );
        (entered, release, engine)
    }

    fn slow_workflow() -> Workflow {
        workflow(
            vec![
                trigger("t"),
                Node::new("slow", NodeType::Function, json!({"code": "return 1"})),
                output("out", "result"),
            ],
            vec![Edge::new("t", "slow"), Edge::new("slow", "out")],
        )
    }

    #[tokio::test]
    async fn test_input_value_reaches_output() {
        let wf = workflow(
            vec![trigger("t"), input("in", "x", json!(5)), output("out", "x")],
            vec![Edge::new("t", "in"), Edge::new("in", "out")],
        );
        let result = engine().execute(&wf, &NoopObserver).await;

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output.get("x"), Some(&json!(5)));
        assert_eq!(result.execution_order, vec!["t", "in", "out"]);
        assert_eq!(result.stats.nodes_executed, 3);
        assert_eq!(result.stats.successful_nodes, 3);
        assert!(!result.logs.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_workflow_is_refused() {
        let wf = workflow(
            vec![trigger("t"), output("a", "a"), output("b", "b")],
            vec![Edge::new("t", "a"), Edge::new("a", "b"), Edge::new("b", "a")],
        );
        let recorder = Recorder::default();
        let result = engine().execute(&wf, &recorder).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Cycle detected"));
        assert!(result.node_results.is_empty());
        assert_eq!(recorder.events(), vec!["done"]);
    }

    #[tokio::test]
    async fn test_node_failure_does_not_stop_the_run() {
        let wf = workflow(
            vec![
                trigger("t"),
                Node::new("llm", NodeType::Llm, json!({"model": "m", "prompt": "hi"})),
                input("in", "x", json!(2)),
                output("out", "x"),
            ],
            vec![
                Edge::new("t", "llm"),
                Edge::new("t", "in"),
                Edge::new("in", "out"),
            ],
        );
        let recorder = Recorder::default();
        let result = engine().execute(&wf, &recorder).await;

        assert!(!result.success);
        assert_eq!(result.stats.errors_encountered, 1);
        assert_eq!(result.node("llm").map(|r| r.success), Some(false));
        assert_eq!(result.output.get("x"), Some(&json!(2)));
        assert_eq!(result.error.as_deref(), Some("1 node(s) failed"));
        assert!(recorder.events().contains(&"error:llm".to_string()));
    }

    #[tokio::test]
    async fn test_failed_dependency_leaves_input_null() {
        let wf = workflow(
            vec![
                trigger("t"),
                Node::new("llm", NodeType::Llm, json!({"model": "m", "prompt": "hi"})),
                output("out", "answer"),
            ],
            vec![Edge::new("t", "llm"), Edge::new("llm", "out")],
        );
        let result = engine().execute(&wf, &NoopObserver).await;

        assert_eq!(result.node("out").map(|r| r.success), Some(true));
        assert_eq!(result.output.get("answer"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_trigger_failure_halts() {
        let engine = engine_with(NodeType::Trigger, Arc::new(Failing));
        let wf = workflow(
            vec![trigger("t"), input("in", "x", json!(1)), output("out", "x")],
            vec![Edge::new("t", "in"), Edge::new("in", "out")],
        );
        let recorder = Recorder::default();
        let result = engine.execute(&wf, &recorder).await;

        assert!(!result.success);
        assert_eq!(result.stats.nodes_executed, 1);
        assert!(result.node("in").is_none());
        assert!(result.error.unwrap().contains("Trigger node 't' failed"));
        assert_eq!(recorder.events(), vec!["start:t", "error:t", "done"]);
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_node_failure() {
        let engine = engine_with(NodeType::Function, Arc::new(Panicking));
        let wf = workflow(
            vec![
                trigger("t"),
                Node::new("fn", NodeType::Function, json!({"code": "return 1"})),
            ],
            vec![Edge::new("t", "fn")],
        );
        let result = engine.execute(&wf, &NoopObserver).await;

        let failed = result.node("fn").unwrap();
        assert!(!failed.success);
        assert!(failed.error.as_deref().unwrap().contains("kaboom"));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let (entered, release, engine) = gated();
        let engine = Arc::new(engine);
        let wf = slow_workflow();

        let first = {
            let engine = engine.clone();
            let wf = wf.clone();
            tokio::spawn(async move { engine.execute(&wf, &NoopObserver).await })
        };
        entered.notified().await;
        assert!(engine.is_running());

        let second = engine.execute(&wf, &NoopObserver).await;
        assert!(!second.success);
        assert_eq!(second.error, Some(EngineError::AlreadyRunning.to_string()));
        assert!(second.node_results.is_empty());

        release.notify_one();
        let first = first.await.unwrap();
        assert!(first.success, "{:?}", first.error);
        assert_eq!(first.output.get("result"), Some(&json!("released")));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_stop_cancels_before_next_node() {
        let (entered, release, engine) = gated();
        let engine = Arc::new(engine);
        assert!(!engine.stop());

        let run = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.execute(&slow_workflow(), &NoopObserver).await })
        };
        entered.notified().await;
        assert!(engine.stop());
        release.notify_one();

        let result = run.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error, Some(EngineError::Cancelled.to_string()));
        assert_eq!(result.node("slow").map(|r| r.success), Some(true));
        assert!(result.node("out").is_none());
    }

    #[tokio::test]
    async fn test_source_handle_seeds_variable() {
        let wf = workflow(
            vec![
                trigger("t"),
                input("in", "x", json!(7)),
                Node::new("cond", NodeType::Conditional, json!({"expression": "picked == 7"})),
            ],
            vec![
                Edge::new("t", "in"),
                Edge::new("in", "cond").with_source_handle("picked"),
            ],
        );
        let result = engine().execute(&wf, &NoopObserver).await;
        let cond = result.node("cond").and_then(|r| r.output.clone());
        assert_eq!(cond.map(|o| o["result"].clone()), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_fallback_outputs_keyed_by_label() {
        let wf = workflow(
            vec![
                trigger("t"),
                Node::new(
                    "in",
                    NodeType::Input,
                    json!({"variableName": "x", "defaultValue": "hello", "label": "Greeting"}),
                ),
            ],
            vec![Edge::new("t", "in")],
        );
        let result = engine()
            .execute_with_input(&wf, Some(json!({"source": "test"})), &NoopObserver)
            .await;

        assert!(result.success);
        assert_eq!(result.output.get("Greeting"), Some(&json!("hello")));
        assert_eq!(result.output.get("Start"), Some(&json!({"source": "test"})));
    }
}
