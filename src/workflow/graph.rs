/// Petgraph view of a workflow
///
/// Builds a directed graph from a workflow definition and answers the structural
/// questions both the validator and the executor need: the trigger-seeded Kahn
/// execution order, cycle search with a DFS recursion stack, and reachability
/// from trigger nodes.
///
/// Construction is tolerant: edges pointing at unknown nodes are skipped and
/// duplicate node ids keep their first declaration, since reporting those is
/// the validator's job.

use crate::workflow::types::{NodeType, Workflow};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed graph over a borrowed workflow
///
/// Node weights are positions in `workflow.nodes`, so graph indices follow
/// declaration order and every tie is broken by it.
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    /// Source definition
    workflow: &'a Workflow,
    /// The petgraph DiGraph structure
    graph: DiGraph<usize, ()>,
    /// Mapping from node ID to graph node index
    node_id_to_index: HashMap<&'a str, NodeIndex>,
}

/// Result of the Kahn ordering pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOrder {
    /// Node ids in dependency order
    pub order: Vec<String>,
    /// Node ids that could not be placed (cycle members and their dependents)
    pub unordered: Vec<String>,
}

impl ExecutionOrder {
    /// True when every node was placed
    pub fn is_complete(&self) -> bool {
        self.unordered.is_empty()
    }
}

impl<'a> WorkflowGraph<'a> {
    /// Build a graph from a workflow definition
    pub fn build(workflow: &'a Workflow) -> Self {
        tracing::debug!(
            "🏗️ Building workflow graph for '{}' ({} nodes, {} edges)",
            workflow.id,
            workflow.nodes.len(),
            workflow.edges.len()
        );

        let mut graph = DiGraph::with_capacity(workflow.nodes.len(), workflow.edges.len());
        let mut node_id_to_index = HashMap::new();

        for (position, node) in workflow.nodes.iter().enumerate() {
            let index = graph.add_node(position);
            node_id_to_index.entry(node.id.as_str()).or_insert(index);
        }

        for edge in &workflow.edges {
            let (Some(&from), Some(&to)) = (
                node_id_to_index.get(edge.source.as_str()),
                node_id_to_index.get(edge.target.as_str()),
            ) else {
                tracing::debug!("  ⏭️ Skipping dangling edge: '{}' → '{}'", edge.source, edge.target);
                continue;
            };
            graph.add_edge(from, to, ());
        }

        Self {
            workflow,
            graph,
            node_id_to_index,
        }
    }

    fn id_of(&self, index: NodeIndex) -> &'a str {
        &self.workflow.nodes[self.graph[index]].id
    }

    fn type_of(&self, index: NodeIndex) -> NodeType {
        self.workflow.nodes[self.graph[index]].node_type
    }

    /// Compute the execution order with Kahn's algorithm
    ///
    /// Trigger nodes are seeded first in declaration order, then every other
    /// zero in-degree node. Parallel edges each count towards in-degree.
    /// Successors freed by the same node are enqueued by declaration order, so
    /// the result is stable across runs.
    pub fn execution_order(&self) -> ExecutionOrder {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| self.graph.edges_directed(index, Direction::Incoming).count())
            .collect();

        let mut queue = VecDeque::new();
        let mut queued = vec![false; in_degree.len()];

        // STEP 1: triggers always run before any other ready node
        for index in self.graph.node_indices() {
            if in_degree[index.index()] == 0 && self.type_of(index) == NodeType::Trigger {
                queue.push_back(index);
                queued[index.index()] = true;
            }
        }

        // STEP 2: remaining standalone roots
        for index in self.graph.node_indices() {
            if in_degree[index.index()] == 0 && !queued[index.index()] {
                queue.push_back(index);
                queued[index.index()] = true;
            }
        }

        // STEP 3: standard Kahn walk
        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(current) = queue.pop_front() {
            order.push(self.id_of(current).to_string());

            let mut freed = Vec::new();
            for edge in self.graph.edges_directed(current, Direction::Outgoing) {
                let target = edge.target();
                let degree = &mut in_degree[target.index()];
                *degree = degree.saturating_sub(1);
                if *degree == 0 && !queued[target.index()] {
                    queued[target.index()] = true;
                    freed.push(target);
                }
            }
            freed.sort();
            queue.extend(freed);
        }

        let unordered: Vec<String> = self
            .graph
            .node_indices()
            .filter(|index| !queued[index.index()])
            .map(|index| self.id_of(index).to_string())
            .collect();

        if !unordered.is_empty() {
            tracing::warn!(
                "⚠️ Execution order for '{}' is missing {} node(s): {:?}",
                self.workflow.id,
                unordered.len(),
                unordered
            );
        }

        ExecutionOrder { order, unordered }
    }

    /// Find one cycle via an iterative DFS
    ///
    /// Every node is used as a DFS root in declaration order. The returned path
    /// starts and ends on the same node id, e.g. `["a", "b", "a"]`. The DFS
    /// keeps its own stack so long chains cannot exhaust the thread stack.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let count = self.graph.node_count();
        let mut visited = vec![false; count];
        let mut on_path = vec![false; count];

        for root in self.graph.node_indices() {
            if visited[root.index()] {
                continue;
            }

            // (node, its sorted successors, next successor to look at)
            let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> = Vec::new();
            visited[root.index()] = true;
            on_path[root.index()] = true;
            stack.push((root, self.successors(root), 0));

            while let Some((current, successors, cursor)) = stack.last_mut() {
                let Some(&next) = successors.get(*cursor) else {
                    on_path[current.index()] = false;
                    stack.pop();
                    continue;
                };
                *cursor += 1;

                if on_path[next.index()] {
                    let start = stack
                        .iter()
                        .position(|(index, _, _)| *index == next)
                        .unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..]
                        .iter()
                        .map(|(index, _, _)| self.id_of(*index).to_string())
                        .collect();
                    cycle.push(self.id_of(next).to_string());
                    return Some(cycle);
                }
                if !visited[next.index()] {
                    visited[next.index()] = true;
                    on_path[next.index()] = true;
                    stack.push((next, self.successors(next), 0));
                }
            }
        }
        None
    }

    fn successors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut successors: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        successors.sort();
        successors.dedup();
        successors
    }

    /// Node ids reachable from any trigger, triggers included
    pub fn reachable_from_triggers(&self) -> HashSet<&'a str> {
        let mut reachable = HashSet::new();

        for start in self
            .graph
            .node_indices()
            .filter(|&index| self.type_of(index) == NodeType::Trigger)
        {
            let mut dfs = Dfs::new(&self.graph, start);
            while let Some(index) = dfs.next(&self.graph) {
                reachable.insert(self.id_of(index));
            }
        }

        reachable
    }

    /// Number of edges touching the node in either direction
    pub fn degree(&self, node_id: &str) -> usize {
        self.node_id_to_index
            .get(node_id)
            .map(|&index| {
                self.graph.edges_directed(index, Direction::Incoming).count()
                    + self.graph.edges_directed(index, Direction::Outgoing).count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{Edge, Node};
    use serde_json::json;

    fn workflow(nodes: &[(&str, NodeType)], edges: &[(&str, &str)]) -> Workflow {
        Workflow {
            id: "wf".to_string(),
            name: "test".to_string(),
            nodes: nodes
                .iter()
                .map(|(id, node_type)| Node::new(*id, *node_type, json!({})))
                .collect(),
            edges: edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
            ..Default::default()
        }
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn test_triggers_are_seeded_before_other_roots() {
        let wf = workflow(
            &[
                ("standalone", NodeType::Input),
                ("t1", NodeType::Trigger),
                ("t2", NodeType::Trigger),
                ("out", NodeType::Output),
            ],
            &[("t1", "out"), ("standalone", "out")],
        );
        let result = WorkflowGraph::build(&wf).execution_order();
        assert!(result.is_complete());
        assert_eq!(result.order[..3], ["t1", "t2", "standalone"]);
        assert_eq!(result.order[3], "out");
    }

    #[test]
    fn test_order_respects_every_edge() {
        let wf = workflow(
            &[
                ("d", NodeType::Output),
                ("c", NodeType::Llm),
                ("b", NodeType::Input),
                ("a", NodeType::Trigger),
            ],
            &[("a", "b"), ("b", "c"), ("a", "c"), ("c", "d"), ("b", "d")],
        );
        let result = WorkflowGraph::build(&wf).execution_order();
        assert_eq!(result.order.len(), 4);
        for edge in &wf.edges {
            assert!(position(&result.order, &edge.source) < position(&result.order, &edge.target));
        }
    }

    #[test]
    fn test_parallel_edges_count_towards_in_degree() {
        let wf = workflow(
            &[("t", NodeType::Trigger), ("x", NodeType::Function), ("y", NodeType::Output)],
            &[("t", "y"), ("t", "y"), ("t", "x"), ("x", "y")],
        );
        let result = WorkflowGraph::build(&wf).execution_order();
        assert_eq!(result.order, vec!["t", "x", "y"]);
    }

    #[test]
    fn test_cycle_leaves_nodes_unordered() {
        let wf = workflow(
            &[("t", NodeType::Trigger), ("a", NodeType::Llm), ("b", NodeType::Llm)],
            &[("t", "a"), ("a", "b"), ("b", "a")],
        );
        let graph = WorkflowGraph::build(&wf);
        let result = graph.execution_order();
        assert_eq!(result.order, vec!["t"]);
        assert_eq!(result.unordered, vec!["a", "b"]);
        assert_eq!(graph.find_cycle(), Some(vec!["a".into(), "b".into(), "a".into()]));
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let wf = workflow(&[("t", NodeType::Trigger)], &[("t", "t")]);
        assert_eq!(
            WorkflowGraph::build(&wf).find_cycle(),
            Some(vec!["t".to_string(), "t".to_string()])
        );
    }

    #[test]
    fn test_reachability_and_degree() {
        let wf = workflow(
            &[
                ("t", NodeType::Trigger),
                ("a", NodeType::Llm),
                ("island", NodeType::Output),
                ("orphan", NodeType::Input),
                ("b", NodeType::Output),
            ],
            &[("t", "a"), ("orphan", "b"), ("ghost", "a")],
        );
        let graph = WorkflowGraph::build(&wf);
        let reachable = graph.reachable_from_triggers();
        assert!(reachable.contains("t") && reachable.contains("a"));
        assert!(!reachable.contains("orphan") && !reachable.contains("b"));
        assert_eq!(graph.degree("island"), 0);
        assert_eq!(graph.degree("orphan"), 1);
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn test_long_chain_does_not_exhaust_the_stack() {
        let ids: Vec<String> = (0..100_000).map(|i| format!("n{}", i)).collect();
        let mut nodes = vec![("t", NodeType::Trigger)];
        nodes.extend(ids.iter().map(|id| (id.as_str(), NodeType::Function)));
        let mut edges = vec![("t", ids[0].as_str())];
        edges.extend(ids.windows(2).map(|pair| (pair[0].as_str(), pair[1].as_str())));

        let acyclic = workflow(&nodes, &edges);
        assert_eq!(WorkflowGraph::build(&acyclic).find_cycle(), None);

        edges.push((ids[ids.len() - 1].as_str(), ids[ids.len() - 3].as_str()));
        let cyclic = workflow(&nodes, &edges);
        let cycle = WorkflowGraph::build(&cyclic).find_cycle().unwrap();
        assert_eq!(
            cycle,
            vec!["n99997", "n99998", "n99999", "n99997"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }
}
