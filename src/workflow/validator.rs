/// Workflow validation
///
/// Inspects a workflow for structural soundness before it is allowed to run.
/// Validation is a pure function of the definition. Errors block execution,
/// warnings and suggestions never do.

use crate::workflow::graph::WorkflowGraph;
use crate::workflow::types::{Node, NodeType, Workflow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Comparison operators accepted by structured conditional nodes
pub const CONDITIONAL_OPERATORS: [&str; 8] = ["==", "===", "!=", "!==", ">", ">=", "<", "<="];

/// Data types accepted by input and output nodes
pub const DATA_TYPES: [&str; 5] = ["string", "number", "boolean", "object", "array"];

/// A single validation finding, optionally tied to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl ValidationIssue {
    fn workflow(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            node_id: None,
        }
    }

    fn node(node_id: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            node_id: Some(node_id.to_string()),
        }
    }
}

/// Outcome of validating a workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True when no errors were found
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub suggestions: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Error messages, used when a run is refused
    pub fn error_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|issue| match &issue.node_id {
                Some(node_id) => format!("[{}] {}", node_id, issue.message),
                None => issue.message.clone(),
            })
            .collect()
    }

    fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    fn suggestion(&mut self, issue: ValidationIssue) {
        self.suggestions.push(issue);
    }
}

/// Thresholds for the flow-level and best-practice checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorLimits {
    /// More triggers than this produce a warning
    pub max_triggers: usize,
    /// More nodes than this produce a large-workflow warning
    pub large_workflow_nodes: usize,
    /// This many expensive nodes without a conditional produce a suggestion
    pub expensive_node_threshold: usize,
}

impl Default for ValidatorLimits {
    fn default() -> Self {
        Self {
            max_triggers: 5,
            large_workflow_nodes: 50,
            expensive_node_threshold: 3,
        }
    }
}

/// Structural validator for workflow definitions
#[derive(Debug, Clone, Default)]
pub struct WorkflowValidator {
    limits: ValidatorLimits,
}

impl WorkflowValidator {
    /// Create a validator with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator with custom thresholds
    pub fn with_limits(limits: ValidatorLimits) -> Self {
        Self { limits }
    }

    /// Validate a workflow definition
    ///
    /// Checks run from most to least severe: structure, per-node fields, edge
    /// integrity, flow (triggers, cycles, reachability) and finally heuristics.
    pub fn validate(&self, workflow: &Workflow) -> ValidationResult {
        tracing::debug!("🔍 Validating workflow '{}'", workflow.id);

        let mut result = ValidationResult::default();

        // STEP 1: structural checks
        if workflow.id.trim().is_empty() {
            result.error(ValidationIssue::workflow("Workflow must have an id"));
        }
        if workflow.name.trim().is_empty() {
            result.error(ValidationIssue::workflow("Workflow must have a name"));
        }
        if workflow.nodes.is_empty() {
            result.error(ValidationIssue::workflow(
                "Workflow must contain at least one node",
            ));
            result.valid = false;
            return result;
        }

        let mut seen_ids = HashSet::new();
        for node in &workflow.nodes {
            if node.id.trim().is_empty() {
                result.error(ValidationIssue::workflow("Node is missing an id"));
            } else if !seen_ids.insert(node.id.as_str()) {
                result.error(ValidationIssue::node(
                    &node.id,
                    format!("Duplicate node id '{}'", node.id),
                ));
            }
        }

        // STEP 2: per-node required fields
        for node in &workflow.nodes {
            self.validate_node(node, &mut result);
        }

        // STEP 3: edge integrity
        self.validate_edges(workflow, &seen_ids, &mut result);

        // STEP 4: flow-level checks
        self.validate_flow(workflow, &mut result);

        // STEP 5: best-practice heuristics
        self.apply_heuristics(workflow, &mut result);

        result.valid = result.errors.is_empty();

        tracing::debug!(
            "📋 Validation of '{}': valid={} errors={} warnings={} suggestions={}",
            workflow.id,
            result.valid,
            result.errors.len(),
            result.warnings.len(),
            result.suggestions.len()
        );

        result
    }

    fn validate_node(&self, node: &Node, result: &mut ValidationResult) {
        let id = node.id.as_str();

        if node.label().is_none() {
            result.warning(ValidationIssue::node(id, "Node has no label"));
        }

        match node.node_type {
            NodeType::Trigger => {}
            NodeType::Llm => {
                if node.data_str("model").is_none() {
                    result.error(ValidationIssue::node(id, "LLM node requires a model"));
                }
                if node.data_str("prompt").is_none() {
                    result.error(ValidationIssue::node(id, "LLM node requires a non-empty prompt"));
                }
                if let Some(temperature) = node.data_f64("temperature") {
                    if !(0.0..=2.0).contains(&temperature) {
                        result.error(ValidationIssue::node(
                            id,
                            format!("Temperature {} is outside 0..=2", temperature),
                        ));
                    }
                }
                check_positive(node, "maxTokens", result);
            }
            NodeType::Agent => {
                if node.data_str("model").is_none() {
                    result.error(ValidationIssue::node(id, "Agent node requires a model"));
                }
                if node.data_str("instructions").is_none() && node.data_str("systemPrompt").is_none() {
                    result.warning(ValidationIssue::node(id, "Agent node has no instructions"));
                }
                check_positive(node, "maxIterations", result);
            }
            NodeType::Rag => {
                if node.data_str("knowledgeBaseId").is_none() {
                    result.warning(ValidationIssue::node(
                        id,
                        "Retrieval node has no knowledge base selected",
                    ));
                }
                check_positive(node, "topK", result);
            }
            NodeType::WebSearch => {
                if node.data_str("query").is_none() {
                    result.warning(ValidationIssue::node(
                        id,
                        "Web search node has no query, upstream input will be used",
                    ));
                }
                check_positive(node, "maxResults", result);
            }
            NodeType::Conditional => self.validate_conditional(node, result),
            NodeType::Function => {
                if node.data_str("code").is_none() {
                    result.error(ValidationIssue::node(id, "Function node requires code"));
                }
            }
            NodeType::Input | NodeType::Output => {
                if node.data_str("variableName").is_none() {
                    result.error(ValidationIssue::node(
                        id,
                        format!("{} node requires a variableName", node.node_type),
                    ));
                }
                match node.data_str("dataType") {
                    Some(data_type) if !DATA_TYPES.contains(&data_type) => {
                        result.error(ValidationIssue::node(
                            id,
                            format!("Unknown data type '{}'", data_type),
                        ));
                    }
                    None if node.node_type == NodeType::Input => {
                        result.warning(ValidationIssue::node(id, "Input node has no data type"));
                    }
                    _ => {}
                }
            }
        }
    }

    fn validate_conditional(&self, node: &Node, result: &mut ValidationResult) {
        let id = node.id.as_str();

        if node.data_str("expression").is_some() {
            return;
        }

        let has_left = node.field("left").is_some();
        let has_right = node.field("right").is_some();
        match node.data_str("operator") {
            Some(operator) if has_left && has_right => {
                if !CONDITIONAL_OPERATORS.contains(&operator) {
                    result.error(ValidationIssue::node(
                        id,
                        format!("Unknown conditional operator '{}'", operator),
                    ));
                }
            }
            _ => result.error(ValidationIssue::node(
                id,
                "Conditional node requires an expression or a left/operator/right comparison",
            )),
        }
    }

    fn validate_edges(
        &self,
        workflow: &Workflow,
        node_ids: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let mut seen_pairs = HashSet::new();
        let mut seen_edge_ids = HashSet::new();

        for edge in &workflow.edges {
            let label = if edge.id.is_empty() {
                format!("{} -> {}", edge.source, edge.target)
            } else {
                edge.id.clone()
            };

            if !node_ids.contains(edge.source.as_str()) {
                result.error(ValidationIssue::workflow(format!(
                    "Edge '{}' references unknown source node '{}'",
                    label, edge.source
                )));
            }
            if !node_ids.contains(edge.target.as_str()) {
                result.error(ValidationIssue::workflow(format!(
                    "Edge '{}' references unknown target node '{}'",
                    label, edge.target
                )));
            }
            if edge.source == edge.target {
                result.error(ValidationIssue::node(
                    &edge.source,
                    format!("Edge '{}' connects a node to itself", label),
                ));
            }
            if !seen_pairs.insert((edge.source.as_str(), edge.target.as_str())) {
                result.warning(ValidationIssue::workflow(format!(
                    "Duplicate connection {} -> {}",
                    edge.source, edge.target
                )));
            }
            if !edge.id.is_empty() && !seen_edge_ids.insert(edge.id.as_str()) {
                result.warning(ValidationIssue::workflow(format!(
                    "Duplicate edge id '{}'",
                    edge.id
                )));
            }
            if workflow
                .node(&edge.target)
                .is_some_and(|node| node.node_type == NodeType::Trigger)
            {
                result.warning(ValidationIssue::node(
                    &edge.target,
                    "Trigger node has an incoming connection that will be ignored",
                ));
            }
        }
    }

    fn validate_flow(&self, workflow: &Workflow, result: &mut ValidationResult) {
        let trigger_count = workflow.triggers().count();
        if trigger_count == 0 {
            result.error(ValidationIssue::workflow(
                "Workflow must contain at least one trigger node",
            ));
        } else if trigger_count > self.limits.max_triggers {
            result.warning(ValidationIssue::workflow(format!(
                "Workflow has {} trigger nodes, consider splitting it",
                trigger_count
            )));
        }

        let graph = WorkflowGraph::build(workflow);

        if let Some(cycle) = graph.find_cycle() {
            result.error(ValidationIssue::node(
                &cycle[0],
                format!("Cycle detected: {}", cycle.join(" -> ")),
            ));
        }

        if trigger_count == 0 {
            return;
        }

        let reachable = graph.reachable_from_triggers();
        for node in &workflow.nodes {
            if node.node_type == NodeType::Trigger || reachable.contains(node.id.as_str()) {
                continue;
            }
            if graph.degree(&node.id) == 0 {
                result.error(ValidationIssue::node(
                    &node.id,
                    format!("Node '{}' is isolated with no connections", node.display_name()),
                ));
            } else {
                result.warning(ValidationIssue::node(
                    &node.id,
                    format!("Node '{}' is not reachable from any trigger", node.display_name()),
                ));
            }
        }
    }

    fn apply_heuristics(&self, workflow: &Workflow, result: &mut ValidationResult) {
        if workflow.nodes.len() > self.limits.large_workflow_nodes {
            result.warning(ValidationIssue::workflow(format!(
                "Large workflow with {} nodes may be slow to execute",
                workflow.nodes.len()
            )));
        }

        let expensive = workflow
            .nodes
            .iter()
            .filter(|node| node.node_type.is_expensive())
            .count();
        let has_conditional = workflow
            .nodes
            .iter()
            .any(|node| node.node_type == NodeType::Conditional);
        if expensive >= self.limits.expensive_node_threshold && !has_conditional {
            result.suggestion(ValidationIssue::workflow(format!(
                "{} expensive nodes run unconditionally, consider adding a conditional node to guard them",
                expensive
            )));
        }

        if !workflow.nodes.iter().any(|node| node.node_type == NodeType::Output) {
            result.suggestion(ValidationIssue::workflow(
                "Add an output node to expose named results",
            ));
        }

        let unlabeled = workflow.nodes.iter().filter(|node| node.label().is_none()).count();
        if unlabeled > 0 {
            result.suggestion(ValidationIssue::workflow(format!(
                "Give descriptive labels to {} unnamed node(s)",
                unlabeled
            )));
        }
    }
}

fn check_positive(node: &Node, key: &str, result: &mut ValidationResult) {
    if node.field(key).is_none() {
        return;
    }
    match node.data_f64(key) {
        Some(value) if value > 0.0 => {}
        _ => result.error(ValidationIssue::node(
            &node.id,
            format!("{} must be a positive number", key),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::Edge;
    use serde_json::{json, Value};

    fn node(id: &str, node_type: NodeType, data: Value) -> Node {
        Node::new(id, node_type, data)
    }

    fn linear(nodes: Vec<Node>) -> Workflow {
        let edges = nodes
            .windows(2)
            .map(|pair| Edge::new(&pair[0].id, &pair[1].id))
            .collect();
        Workflow {
            id: "wf".to_string(),
            name: "Validation".to_string(),
            nodes,
            edges,
            ..Default::default()
        }
    }

    fn messages(issues: &[ValidationIssue]) -> String {
        issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    #[test]
    fn test_minimal_valid_workflow() {
        let wf = linear(vec![
            node("t", NodeType::Trigger, json!({"label": "Start"})),
            node("in", NodeType::Input, json!({"label": "X", "variableName": "x", "dataType": "number"})),
            node("out", NodeType::Output, json!({"label": "Result", "variableName": "x"})),
        ]);
        let result = WorkflowValidator::new().validate(&wf);
        assert!(result.valid, "unexpected errors: {}", messages(&result.errors));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_empty_workflow_is_rejected_early() {
        let wf = Workflow::default();
        let result = WorkflowValidator::new().validate(&wf);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_missing_trigger_is_an_error() {
        let wf = linear(vec![
            node("in", NodeType::Input, json!({"variableName": "x"})),
            node("out", NodeType::Output, json!({"variableName": "x"})),
        ]);
        let result = WorkflowValidator::new().validate(&wf);
        assert!(!result.valid);
        assert!(messages(&result.errors).contains("at least one trigger"));
    }

    #[test]
    fn test_cycle_is_an_error() {
        let mut wf = linear(vec![
            node("t", NodeType::Trigger, json!({})),
            node("a", NodeType::Function, json!({"code": "return 1"})),
            node("b", NodeType::Function, json!({"code": "return 2"})),
        ]);
        wf.edges.push(Edge::new("b", "a"));
        let result = WorkflowValidator::new().validate(&wf);
        assert!(!result.valid);
        assert!(messages(&result.errors).contains("Cycle detected: a -> b -> a"));
    }

    #[test]
    fn test_required_fields_per_type() {
        let wf = linear(vec![
            node("t", NodeType::Trigger, json!({})),
            node("llm", NodeType::Llm, json!({"model": "gpt", "prompt": "  "})),
            node("fn", NodeType::Function, json!({})),
            node("cond", NodeType::Conditional, json!({"left": 1, "operator": "~", "right": 2})),
            node("agent", NodeType::Agent, json!({})),
            node("out", NodeType::Output, json!({})),
        ]);
        let result = WorkflowValidator::new().validate(&wf);
        let errors = messages(&result.errors);
        assert!(errors.contains("non-empty prompt"));
        assert!(errors.contains("Function node requires code"));
        assert!(errors.contains("Unknown conditional operator '~'"));
        assert!(errors.contains("Agent node requires a model"));
        assert!(errors.contains("output node requires a variableName"));
        assert!(messages(&result.warnings).contains("Agent node has no instructions"));
    }

    #[test]
    fn test_conditional_accepts_expression_or_triple() {
        let wf = linear(vec![
            node("t", NodeType::Trigger, json!({})),
            node("c1", NodeType::Conditional, json!({"expression": "{{score}} > 5"})),
            node("c2", NodeType::Conditional, json!({"left": "{{a}}", "operator": "===", "right": "b"})),
            node("c3", NodeType::Conditional, json!({"left": "{{a}}"})),
        ]);
        let result = WorkflowValidator::new().validate(&wf);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].node_id.as_deref(), Some("c3"));
    }

    #[test]
    fn test_edge_integrity() {
        let mut wf = linear(vec![
            node("t", NodeType::Trigger, json!({})),
            node("out", NodeType::Output, json!({"variableName": "x"})),
        ]);
        wf.edges.push(Edge::new("t", "out"));
        wf.edges.push(Edge::new("out", "out"));
        wf.edges.push(Edge::new("t", "missing"));
        let result = WorkflowValidator::new().validate(&wf);
        let errors = messages(&result.errors);
        assert!(errors.contains("connects a node to itself"));
        assert!(errors.contains("unknown target node 'missing'"));
        let warnings = messages(&result.warnings);
        assert!(warnings.contains("Duplicate connection t -> out"));
        assert!(warnings.contains("Duplicate edge id 't-out'"));
    }

    #[test]
    fn test_unreachable_versus_isolated() {
        let mut wf = linear(vec![
            node("t", NodeType::Trigger, json!({})),
            node("out", NodeType::Output, json!({"variableName": "x"})),
        ]);
        wf.nodes.push(node("orphan", NodeType::Input, json!({"variableName": "y"})));
        wf.nodes.push(node("sink", NodeType::Output, json!({"variableName": "y"})));
        wf.nodes.push(node("island", NodeType::Output, json!({"variableName": "z"})));
        wf.edges.push(Edge::new("orphan", "sink"));

        let result = WorkflowValidator::new().validate(&wf);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].node_id.as_deref(), Some("island"));
        let unreachable: Vec<_> = result
            .warnings
            .iter()
            .filter(|issue| issue.message.contains("not reachable"))
            .filter_map(|issue| issue.node_id.as_deref())
            .collect();
        assert_eq!(unreachable, vec!["orphan", "sink"]);
    }

    #[test]
    fn test_heuristics_never_block() {
        let wf = linear(vec![
            node("t", NodeType::Trigger, json!({})),
            node("l1", NodeType::Llm, json!({"model": "m", "prompt": "p"})),
            node("l2", NodeType::Llm, json!({"model": "m", "prompt": "p"})),
            node("s", NodeType::WebSearch, json!({"query": "q"})),
        ]);
        let result = WorkflowValidator::new().validate(&wf);
        assert!(result.valid);
        let suggestions = messages(&result.suggestions);
        assert!(suggestions.contains("3 expensive nodes"));
        assert!(suggestions.contains("Add an output node"));
        assert!(suggestions.contains("4 unnamed node(s)"));
    }

    #[test]
    fn test_trigger_count_limit_is_a_warning() {
        let limits = ValidatorLimits {
            max_triggers: 1,
            ..Default::default()
        };
        let wf = linear(vec![
            node("t1", NodeType::Trigger, json!({})),
            node("t2", NodeType::Trigger, json!({})),
        ]);
        let result = WorkflowValidator::with_limits(limits).validate(&wf);
        assert!(messages(&result.warnings).contains("2 trigger nodes"));
    }

    #[test]
    fn test_invalid_numeric_ranges() {
        let wf = linear(vec![
            node("t", NodeType::Trigger, json!({})),
            node("l", NodeType::Llm, json!({"model": "m", "prompt": "p", "temperature": 3.5, "maxTokens": 0})),
            node("r", NodeType::Rag, json!({"knowledgeBaseId": "kb", "topK": -1})),
        ]);
        let result = WorkflowValidator::new().validate(&wf);
        let errors = messages(&result.errors);
        assert!(errors.contains("outside 0..=2"));
        assert!(errors.contains("maxTokens must be a positive number"));
        assert!(errors.contains("topK must be a positive number"));
    }
}
