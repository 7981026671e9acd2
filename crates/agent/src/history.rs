//! Keeps stored transcripts structurally valid and bounded.
//!
//! A transcript is well-formed when every tool call of an assistant message is
//! answered by a contiguous run of tool results directly after it. Histories
//! coming back from storage, or cut short by truncation, are brought back to
//! that shape here before they are reused.

use tracing::debug;

use crate::message::Message;
use crate::tools::ToolResult;

pub const INTERRUPTED_TOOL_CALL: &str = "tool call was interrupted before it produced a result";

/// Pairs every tool call with exactly one result.
///
/// Results for ids the preceding assistant message did not request (or already
/// got) are dropped, and calls left without a result get a synthesized failure.
/// Applying it twice gives the same transcript as applying it once.
pub fn repair(messages: Vec<Message>) -> Vec<Message> {
    let mut repaired = Vec::with_capacity(messages.len());
    let mut dropped = 0usize;
    let mut synthesized = 0usize;
    let mut iter = messages.into_iter().peekable();

    while let Some(message) = iter.next() {
        match message {
            Message::ToolResult { .. } => dropped += 1,
            Message::Assistant { ref tool_calls, .. } if !tool_calls.is_empty() => {
                let mut pending: Vec<(String, String)> = tool_calls
                    .iter()
                    .map(|call| (call.call_id.clone(), call.tool_name.clone()))
                    .collect();
                repaired.push(message);

                while !pending.is_empty() {
                    let Some(Message::ToolResult { call_id, .. }) = iter.peek() else {
                        break;
                    };
                    let position = pending.iter().position(|(id, _)| id == call_id);
                    let Some(result) = iter.next() else {
                        break;
                    };
                    match position {
                        Some(index) => {
                            pending.remove(index);
                            repaired.push(result);
                        }
                        None => dropped += 1,
                    }
                }

                for (call_id, tool_name) in pending {
                    synthesized += 1;
                    repaired.push(Message::tool_result(
                        call_id,
                        tool_name,
                        ToolResult::failure(INTERRUPTED_TOOL_CALL).to_content(),
                    ));
                }
            }
            other => repaired.push(other),
        }
    }

    if dropped > 0 || synthesized > 0 {
        debug!(
            event_name = "agent.history.repaired",
            dropped_results = dropped,
            synthesized_results = synthesized,
            "conversation history repaired"
        );
    }
    repaired
}

/// Keeps the most recent `window` messages.
pub fn truncate(mut messages: Vec<Message>, window: usize) -> Vec<Message> {
    if messages.len() > window {
        messages.drain(..messages.len() - window);
    }
    messages
}

/// Shape a finished turn for storage: repair, cut to the window, then repair
/// again so the stored window never opens with an orphaned result.
pub fn prepare_for_storage(messages: Vec<Message>, window: usize) -> Vec<Message> {
    repair(truncate(repair(messages), window))
}
