/// Node dispatch
///
/// Each node type is served by a `NodeHandler` registered in a
/// `HandlerRegistry`. New node types are added by registering a handler, not
/// by touching the engine's control flow.

use crate::runtime::context::ExecutionContext;
use crate::runtime::handlers::{
    ConditionalHandler, FunctionHandler, InputHandler, ModelHandler, OutputHandler,
    RetrievalHandler, SearchHandler, TriggerHandler,
};
use crate::runtime::sandbox::ScriptSandbox;
use crate::services::ServiceHub;
use crate::workflow::types::{Node, NodeType};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc};

/// Executes one node type
///
/// Handlers read `node.data`, may read and write the shared context, and return
/// the node's output. The engine publishes that output under `{nodeId}` and
/// `{nodeId}_output`. Handlers must tolerate a missing primary input, since an
/// upstream failure does not stop the run.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn execute(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value>;
}

/// Mapping from node type to handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<NodeType, Arc<dyn NodeHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(NodeType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry").field("types", &types).finish()
    }
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every node type
    pub fn with_defaults(services: ServiceHub, sandbox: ScriptSandbox) -> Self {
        let mut registry = Self::new();
        registry.register(NodeType::Trigger, Arc::new(TriggerHandler));
        registry.register(NodeType::Input, Arc::new(InputHandler));
        registry.register(NodeType::Output, Arc::new(OutputHandler));
        registry.register(
            NodeType::Llm,
            Arc::new(ModelHandler::llm(services.clone())),
        );
        registry.register(
            NodeType::Agent,
            Arc::new(ModelHandler::agent(services.clone())),
        );
        registry.register(NodeType::Rag, Arc::new(RetrievalHandler::new(services.clone())));
        registry.register(NodeType::WebSearch, Arc::new(SearchHandler::new(services)));
        registry.register(NodeType::Conditional, Arc::new(ConditionalHandler));
        registry.register(NodeType::Function, Arc::new(FunctionHandler::new(sandbox)));
        registry
    }

    /// Register or replace the handler for a node type
    pub fn register(
        &mut self,
        node_type: NodeType,
        handler: Arc<dyn NodeHandler>,
    ) -> Option<Arc<dyn NodeHandler>> {
        tracing::debug!("🔌 Registering handler for node type '{}'", node_type);
        self.handlers.insert(node_type, handler)
    }

    /// Builder-style registration
    pub fn with_handler(mut self, node_type: NodeType, handler: Arc<dyn NodeHandler>) -> Self {
        self.register(node_type, handler);
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<&Arc<dyn NodeHandler>> {
        self.handlers.get(&node_type)
    }

}

/// Dispatches nodes to their registered handlers
#[derive(Debug, Clone)]
pub struct NodeExecutor {
    registry: HandlerRegistry,
}

impl NodeExecutor {
    /// Create a node executor over a handler registry
    pub fn new(registry: HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Execute a single node against the shared context
    ///
    /// An unregistered node type is a node failure, not an engine failure.
    pub async fn execute_node(&self, node: &Node, ctx: &mut ExecutionContext) -> Result<Value> {
        tracing::info!("🚀 Starting node execution: {} (type: {})", node.id, node.node_type);

        let handler = self.registry.get(node.node_type).ok_or_else(|| {
            anyhow::anyhow!("No handler registered for node type '{}'", node.node_type)
        })?;

        let start_time = std::time::Instant::now();
        let result = handler.execute(node, ctx).await;
        let duration = start_time.elapsed();

        match &result {
            Ok(output) => {
                tracing::info!("✅ Node execution completed: {} in {:?}", node.id, duration);
                tracing::debug!("📤 Output data: {}", output);
            }
            Err(e) => {
                tracing::error!(
                    "❌ Node execution failed: {} in {:?} - Error: {:#}",
                    node.id,
                    duration,
                    e
                );
            }
        }

        result
    }
}
