use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use tradebook_core::OwnerId;
use tradebook_db::repositories::RepositoryError;

use crate::message::ToolCall;
use crate::remote::RemoteError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Who a tool runs on behalf of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolContext {
    pub owner_id: OwnerId,
    pub session_id: String,
    pub correlation_id: String,
}

impl ToolContext {
    pub fn new(
        owner_id: impl Into<String>,
        session_id: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: OwnerId::new(owner_id),
            session_id: session_id.into(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn require_owner(&self) -> Result<&OwnerId, ToolError> {
        if self.owner_id.is_blank() {
            return Err(ToolError::MissingOwner);
        }
        Ok(&self.owner_id)
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing owner")]
    MissingOwner,
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("internal tool failure: {0}")]
    Internal(String),
}

/// Normalized outcome of one tool call. This is the only shape the reasoning
/// engine ever sees for tool output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(data: Value) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }

    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"tool result could not be serialized"}"#.to_string()
        })
    }

    pub fn from_content(content: &str) -> Option<Self> {
        serde_json::from_str(content).ok()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    async fn execute(&self, arguments: Value, context: &ToolContext) -> Result<Value, ToolError>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Name-keyed catalog of tools, fixed once the runtime starts.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_arc(Arc::new(tool));
    }

    /// Registering a name twice replaces the earlier tool in place.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order.iter().filter_map(|name| self.tools.get(name)).map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Runs one call and folds every outcome into a `ToolResult`.
    pub async fn invoke(&self, call: &ToolCall, context: &ToolContext) -> ToolResult {
        let Some(tool) = self.lookup(&call.tool_name) else {
            warn!(
                event_name = "agent.tool.unknown",
                correlation_id = %context.correlation_id,
                tool_name = %call.tool_name,
                call_id = %call.call_id,
                "reasoning engine requested an unregistered tool"
            );
            return ToolResult::failure(format!("Unknown tool: {}", call.tool_name));
        };

        let outcome = AssertUnwindSafe(tool.execute(call.arguments.clone(), context))
            .catch_unwind()
            .await;
        let Ok(outcome) = outcome else {
            error!(
                event_name = "agent.tool.panicked",
                correlation_id = %context.correlation_id,
                owner_id = %context.owner_id,
                tool_name = %call.tool_name,
                call_id = %call.call_id,
                "tool call panicked"
            );
            return ToolResult::failure(format!("tool `{}` failed unexpectedly", call.tool_name));
        };

        match outcome {
            Ok(data) => {
                info!(
                    event_name = "agent.tool.completed",
                    correlation_id = %context.correlation_id,
                    owner_id = %context.owner_id,
                    tool_name = %call.tool_name,
                    call_id = %call.call_id,
                    "tool call completed"
                );
                ToolResult::ok(data)
            }
            Err(error) => {
                warn!(
                    event_name = "agent.tool.failed",
                    correlation_id = %context.correlation_id,
                    owner_id = %context.owner_id,
                    tool_name = %call.tool_name,
                    call_id = %call.call_id,
                    error = %error,
                    "tool call failed"
                );
                ToolResult::failure(error.to_string())
            }
        }
    }
}
