//! Concrete tool protocol adapters.
//!
//! - [`FunctionToolProtocol`]: registers async Rust closures as tools. The
//!   specialist agents use it for their deterministic business functions
//!   (customer lookup, billing rule, escalation).
//!
//! The remote-agent adapter lives in [`agent_proxy`](crate::agent_proxy)
//! because it also owns the HTTP client configuration.

use crate::tool_protocol::{ToolError, ToolMetadata, ToolProtocol, ToolResult};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Type alias for asynchronous tool functions exposed via the adapter.
pub type AsyncToolFunction = Arc<
    dyn Fn(
            JsonValue,
        ) -> std::pin::Pin<
            Box<
                dyn std::future::Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>>
                    + Send,
            >,
        > + Send
        + Sync,
>;

/// Function-calling tool adapter.
///
/// Allows registering Rust functions as tools that agents can use.
///
/// # Example
///
/// ```rust,no_run
/// use fieldops::tool_protocols::FunctionToolProtocol;
/// use fieldops::tool_protocol::{ToolMetadata, ToolResult};
/// use std::sync::Arc;
///
/// # async {
/// let adapter = FunctionToolProtocol::new();
/// adapter.register_tool(
///     ToolMetadata::new("find_customer", "Look up a customer record"),
///     Arc::new(|params| {
///         Box::pin(async move {
///             let name = params["customer_name"].as_str().unwrap_or("").to_string();
///             Ok(ToolResult::success(serde_json::json!({"status": "found", "name": name})))
///         })
///     }),
/// ).await;
/// # };
/// ```
pub struct FunctionToolProtocol {
    tools: Arc<RwLock<HashMap<String, ToolMetadata>>>,
    functions: Arc<RwLock<HashMap<String, AsyncToolFunction>>>,
}

impl FunctionToolProtocol {
    /// Create an empty adapter ready to accept new tool registrations.
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            functions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register an asynchronous tool function.
    ///
    /// Subsequent calls will overwrite any existing tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.functions.write().await.insert(name, function);
    }
}

impl Default for FunctionToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for FunctionToolProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: JsonValue,
    ) -> Result<ToolResult, Box<dyn Error + Send + Sync>> {
        let function = {
            let functions = self.functions.read().await;
            functions.get(tool_name).cloned()
        };
        match function {
            Some(f) => f(parameters).await,
            None => Err(Box::new(ToolError::NotFound(tool_name.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(self.tools.read().await.values().cloned().collect())
    }

    fn protocol_name(&self) -> &str {
        "function"
    }
}
