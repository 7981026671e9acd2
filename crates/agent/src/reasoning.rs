use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::llm::{Completion, CompletionRequest, LlmClient};
use crate::message::Message;
use crate::tools::{ToolContext, ToolDefinition};

pub const SYSTEM_PROMPT: &str = "\
You are Tradebook, a business assistant for a small trading company. You help \
the owner manage three kinds of records: inventory items, buyers and expenses.

Use the provided tools to look records up or change them. Never guess data that \
a tool can give you.

Start every reply with exactly one marker:
- ✅ when an action succeeded or the answer is complete,
- ❌ when something failed (say what failed and why, in plain words),
- ❓ when you need a clarification before you can act.

Rules:
- Never invent identifiers, emails, amounts or records that did not come from \
the user or from a tool result.
- When you create or change a record, confirm it with the concrete details \
(names, amounts, dates).
- If a request is ambiguous, ask a short ❓ question instead of guessing.
- Politely refuse anything unrelated to running the business.";

pub const APOLOGY_REPLY: &str =
    "❌ Sorry, I ran into a problem while working on that. Please try again in a moment.";

/// One call to the reasoning engine. Never fails: engine problems turn into a
/// terminal apology message.
pub struct ReasoningStep {
    llm: Arc<dyn LlmClient>,
    tools: Vec<ToolDefinition>,
    timeout: Duration,
}

impl ReasoningStep {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Vec<ToolDefinition>, timeout: Duration) -> Self {
        Self { llm, tools, timeout }
    }

    pub async fn run(&self, messages: &[Message], context: &ToolContext) -> Message {
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: messages.to_vec(),
            tools: self.tools.clone(),
            owner_id: context.owner_id.as_str().to_string(),
            session_id: context.session_id.clone(),
        };

        let completion = match tokio::time::timeout(self.timeout, self.llm.complete(&request)).await
        {
            Ok(Ok(completion)) if !completion.is_empty() => completion,
            Ok(Ok(_)) => return apology(context, "reasoning engine returned an empty response"),
            Ok(Err(error)) => return apology(context, &format!("{error:#}")),
            Err(_) => {
                return apology(
                    context,
                    &format!("reasoning engine timed out after {}s", self.timeout.as_secs()),
                )
            }
        };

        let Completion { content, mut tool_calls } = completion;
        for call in &mut tool_calls {
            if call.call_id.trim().is_empty() {
                call.call_id = format!("call_{}", Uuid::new_v4().simple());
            }
        }

        debug!(
            event_name = "agent.reasoning.completed",
            correlation_id = %context.correlation_id,
            tool_calls = tool_calls.len(),
            "reasoning step completed"
        );
        Message::assistant_with_calls(content, tool_calls)
    }
}

fn apology(context: &ToolContext, reason: &str) -> Message {
    warn!(
        event_name = "agent.reasoning.failed",
        correlation_id = %context.correlation_id,
        owner_id = %context.owner_id,
        session_id = %context.session_id,
        error = %reason,
        "reasoning engine failed; replying with apology"
    );
    Message::assistant(APOLOGY_REPLY)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;

    use super::{ReasoningStep, APOLOGY_REPLY, SYSTEM_PROMPT};
    use crate::llm::{Completion, CompletionRequest, LlmClient};
    use crate::message::{Message, ToolCall};
    use crate::tools::ToolContext;

    enum Behavior {
        Reply(Completion),
        Fail,
        Hang,
    }

    struct StubLlm(Behavior);

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
            assert_eq!(request.system_prompt, SYSTEM_PROMPT);
            match &self.0 {
                Behavior::Reply(completion) => Ok(completion.clone()),
                Behavior::Fail => Err(anyhow!("connection refused")),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Completion::text("too late"))
                }
            }
        }
    }

    fn step(behavior: Behavior) -> ReasoningStep {
        ReasoningStep::new(Arc::new(StubLlm(behavior)), Vec::new(), Duration::from_millis(50))
    }

    fn context() -> ToolContext {
        ToolContext::new("owner-1", "s1", "corr-1")
    }

    #[tokio::test]
    async fn engine_error_becomes_apology() {
        let message = step(Behavior::Fail).run(&[Message::user("hi")], &context()).await;
        assert_eq!(message, Message::assistant(APOLOGY_REPLY));
    }

    #[tokio::test]
    async fn empty_completion_becomes_apology() {
        let message = step(Behavior::Reply(Completion::default())).run(&[], &context()).await;
        assert_eq!(message, Message::assistant(APOLOGY_REPLY));
    }

    #[tokio::test]
    async fn slow_engine_times_out_into_apology() {
        let message = step(Behavior::Hang).run(&[], &context()).await;
        assert_eq!(message.final_text(), Some(APOLOGY_REPLY));
    }

    #[tokio::test]
    async fn blank_call_ids_are_filled_in() {
        let completion = Completion::calls(vec![ToolCall::new("", "get_buyers", json!({}))]);
        let message = step(Behavior::Reply(completion)).run(&[], &context()).await;
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].call_id.starts_with("call_"));
    }
}
