//! Tool registry and execution
//!
//! Tools are async handlers keyed by name, each with a JSON-schema
//! description handed to the model. Execution of a batch of calls is
//! concurrent but order-preserving: the results vector parallels the calls
//! vector index for index, which is what keeps tool-call/tool-result
//! pairing intact on the tape.
//!
//! Failures never abort a turn. An unknown tool, unparseable arguments, a
//! handler error, or a per-tool timeout all render as an `error: ...`
//! string in the result slot and the loop continues.

use crate::error::{AgentError, AgentResult};
use crate::llm::ToolCall;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Tool handler: JSON arguments in, JSON value out
pub type ToolHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, AgentResult<serde_json::Value>> + Send + Sync>;

/// Wrap an async closure as a [`ToolHandler`]
pub fn tool_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = AgentResult<serde_json::Value>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Schema describing one tool to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

struct RegisteredTool {
    schema: ToolSchema,
    handler: ToolHandler,
    timeout: Option<Duration>,
}

/// Registry of callable tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; replaces an existing tool of the same name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: ToolHandler,
    ) -> &mut Self {
        self.register_with_timeout(name, description, parameters, handler, None)
    }

    /// Register a tool with a per-call execution deadline
    pub fn register_with_timeout(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        handler: ToolHandler,
        timeout: Option<Duration>,
    ) -> &mut Self {
        let name = name.into();
        self.tools.retain(|t| t.schema.name != name);
        self.tools.push(RegisteredTool {
            schema: ToolSchema {
                name,
                description: description.into(),
                parameters,
            },
            handler,
            timeout,
        });
        self
    }

    /// Schemas for every registered tool, in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    /// Registered tool names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.schema.name.clone()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// True when no tools are registered
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.schema.name == name)
    }

    /// Execute a batch of calls concurrently
    ///
    /// The returned vector parallels `calls` index for index. Failures
    /// render as `error: ...` strings in their slot.
    pub async fn execute_calls(&self, calls: &[ToolCall]) -> Vec<serde_json::Value> {
        let futures = calls.iter().map(|call| self.execute_one(call));
        futures::future::join_all(futures).await
    }

    async fn execute_one(&self, call: &ToolCall) -> serde_json::Value {
        let name = call.function.name.as_str();
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = %name, "unknown tool requested");
            return error_value(format!("unknown tool: {}", name));
        };

        let args: serde_json::Value = if call.function.arguments.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(&call.function.arguments) {
                Ok(args) => args,
                Err(e) => {
                    tracing::warn!(tool = %name, error = %e, "unparseable tool arguments");
                    return error_value(format!("invalid arguments: {}", e));
                }
            }
        };

        let invocation = (tool.handler)(args);
        let result = match tool.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(format!("tool:{}", name))),
            },
            None => invocation.await,
        };

        match result {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool execution failed");
                error_value(e.to_string())
            }
        }
    }
}

fn error_value(message: String) -> serde_json::Value {
    serde_json::Value::String(format!("error: {}", message))
}
