use std::sync::Arc;

use crate::message::{Message, ToolCall};
use crate::tools::{ToolContext, ToolRegistry};

/// Runs the calls of one assistant message in issue order, one attempt each,
/// producing exactly one result message per call.
pub struct ToolExecutionStep {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutionStep {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub async fn run(&self, calls: &[ToolCall], context: &ToolContext) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.registry.invoke(call, context).await;
            results.push(Message::tool_result(&call.call_id, &call.tool_name, result.to_content()));
        }
        results
    }
}
