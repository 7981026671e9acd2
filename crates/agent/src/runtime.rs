use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tradebook_core::config::{AppConfig, DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_REASONING_STEPS};
use tradebook_core::ApplicationError;

use crate::executor::ToolExecutionStep;
use crate::history;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::reasoning::ReasoningStep;
use crate::store::{ConversationStore, SessionKey, SessionLocks, StoreError};
use crate::tools::{ToolContext, ToolRegistry};

pub const STEP_LIMIT_REPLY: &str = "❌ I couldn't finish that request within the allowed number of \
steps. Please try a simpler or more specific request.";

pub const FALLBACK_REPLY: &str = "❌ Sorry, I could not process your request.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Agent,
    Tools,
    Done,
}

/// Conversation state threaded through one turn.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnState {
    pub owner_id: String,
    pub session_id: String,
    pub messages: Vec<Message>,
}

/// What a single step contributes. Only new messages, never the full list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateUpdate {
    pub owner_id: String,
    pub session_id: String,
    pub messages: Vec<Message>,
}

impl StateUpdate {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self { messages, ..Self::default() }
    }
}

impl TurnState {
    pub fn new(owner_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self { owner_id: owner_id.into(), session_id: session_id.into(), messages: Vec::new() }
    }

    /// Messages concatenate; scalar fields take the update's value unless it is empty.
    pub fn merge(&mut self, update: StateUpdate) {
        if !update.owner_id.is_empty() {
            self.owner_id = update.owner_id;
        }
        if !update.session_id.is_empty() {
            self.session_id = update.session_id;
        }
        self.messages.extend(update.messages);
    }
}

/// Which step runs next, decided by the newest message alone.
pub fn next_phase(messages: &[Message]) -> LoopPhase {
    match messages.last() {
        Some(Message::Assistant { tool_calls, .. }) if !tool_calls.is_empty() => LoopPhase::Tools,
        Some(Message::ToolResult { .. }) => LoopPhase::Agent,
        _ => LoopPhase::Done,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoopOutcome {
    pub state: TurnState,
    pub trace: Vec<LoopPhase>,
    pub reasoning_steps: u32,
    pub tool_calls: usize,
}

pub struct AgentLoop {
    reasoning: ReasoningStep,
    tools: ToolExecutionStep,
    max_reasoning_steps: u32,
}

impl AgentLoop {
    pub fn new(reasoning: ReasoningStep, tools: ToolExecutionStep, max_reasoning_steps: u32) -> Self {
        Self { reasoning, tools, max_reasoning_steps }
    }

    pub async fn run(&self, mut state: TurnState, context: &ToolContext) -> LoopOutcome {
        let mut trace = Vec::new();
        let mut reasoning_steps = 0u32;
        let mut tool_calls = 0usize;
        let mut phase = LoopPhase::Agent;

        loop {
            match phase {
                LoopPhase::Agent if reasoning_steps >= self.max_reasoning_steps => {
                    warn!(
                        event_name = "agent.loop.step_limit",
                        correlation_id = %context.correlation_id,
                        owner_id = %context.owner_id,
                        session_id = %context.session_id,
                        max_reasoning_steps = self.max_reasoning_steps,
                        "reasoning step limit reached"
                    );
                    state.merge(StateUpdate::messages(vec![Message::assistant(STEP_LIMIT_REPLY)]));
                }
                LoopPhase::Agent => {
                    trace.push(LoopPhase::Agent);
                    reasoning_steps += 1;
                    let message = self.reasoning.run(&state.messages, context).await;
                    state.merge(StateUpdate::messages(vec![message]));
                }
                LoopPhase::Tools => {
                    trace.push(LoopPhase::Tools);
                    let calls =
                        state.messages.last().map(|m| m.tool_calls().to_vec()).unwrap_or_default();
                    tool_calls += calls.len();
                    let results = self.tools.run(&calls, context).await;
                    state.merge(StateUpdate::messages(results));
                }
                LoopPhase::Done => {
                    trace.push(LoopPhase::Done);
                    break;
                }
            }
            phase = next_phase(&state.messages);
        }

        debug!(
            event_name = "agent.loop.finished",
            correlation_id = %context.correlation_id,
            trace = ?trace,
            "agent loop finished"
        );
        LoopOutcome { state, trace, reasoning_steps, tool_calls }
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    pub max_reasoning_steps: u32,
    pub history_window: usize,
    pub llm_timeout: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            max_reasoning_steps: DEFAULT_MAX_REASONING_STEPS,
            history_window: DEFAULT_HISTORY_WINDOW,
            llm_timeout: Duration::from_secs(60),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_reasoning_steps: config.agent.max_reasoning_steps,
            history_window: config.agent.history_window,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("internal agent failure: {0}")]
    Internal(String),
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::InvalidInput(message) => Self::InvalidInput(message),
            AgentError::Store(error) => Self::Persistence(error.to_string()),
            AgentError::Internal(message) => Self::Internal(message),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TurnReply {
    pub reply: String,
    pub correlation_id: String,
    pub reasoning_steps: u32,
    pub tool_calls: usize,
    pub trace: Vec<LoopPhase>,
}

pub struct AgentRuntime {
    agent_loop: AgentLoop,
    store: Arc<dyn ConversationStore>,
    locks: SessionLocks,
    history_window: usize,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        settings: RuntimeSettings,
    ) -> Self {
        let reasoning = ReasoningStep::new(llm, registry.definitions(), settings.llm_timeout);
        let tools = ToolExecutionStep::new(registry);
        Self {
            agent_loop: AgentLoop::new(reasoning, tools, settings.max_reasoning_steps),
            store,
            locks: SessionLocks::default(),
            history_window: settings.history_window,
        }
    }

    pub async fn run_turn(
        &self,
        owner_id: &str,
        session_id: &str,
        user_text: &str,
    ) -> Result<TurnReply, AgentError> {
        let (owner_id, session_id) = validate_scope(owner_id, session_id)?;
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(AgentError::InvalidInput("message is required".to_string()));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let context = ToolContext::new(owner_id, session_id, correlation_id.clone());
        let key = SessionKey::new(owner_id, session_id);
        let started = Instant::now();

        info!(
            event_name = "agent.turn.start",
            correlation_id = %correlation_id,
            owner_id = %owner_id,
            session_id = %session_id,
            "conversation turn started"
        );

        let _turn = self.locks.acquire(&key).await;

        let prior = self.store.get(&key).await?.unwrap_or_default();
        let mut state = TurnState::new(owner_id, session_id);
        state.merge(StateUpdate::messages(history::repair(prior)));
        state.merge(StateUpdate::messages(vec![Message::user(user_text)]));
        let turn_start = state.messages.len();

        let outcome = self.agent_loop.run(state, &context).await;

        let reply = outcome.state.messages[turn_start..]
            .iter()
            .rev()
            .find_map(Message::final_text)
            .unwrap_or(FALLBACK_REPLY)
            .to_string();

        let stored = history::prepare_for_storage(outcome.state.messages, self.history_window);
        let stored_messages = stored.len();
        self.store.put(&key, stored).await?;

        info!(
            event_name = "agent.turn.completed",
            correlation_id = %correlation_id,
            owner_id = %owner_id,
            session_id = %session_id,
            reasoning_steps = outcome.reasoning_steps,
            tool_calls = outcome.tool_calls,
            stored_messages,
            duration_ms = started.elapsed().as_millis() as u64,
            "conversation turn completed"
        );

        Ok(TurnReply {
            reply,
            correlation_id,
            reasoning_steps: outcome.reasoning_steps,
            tool_calls: outcome.tool_calls,
            trace: outcome.trace,
        })
    }

    pub async fn clear_history(&self, owner_id: &str, session_id: &str) -> Result<(), AgentError> {
        let (owner_id, session_id) = validate_scope(owner_id, session_id)?;
        let key = SessionKey::new(owner_id, session_id);
        let _turn = self.locks.acquire(&key).await;
        self.store.delete(&key).await?;
        info!(
            event_name = "agent.history.cleared",
            owner_id = %owner_id,
            session_id = %session_id,
            "conversation history cleared"
        );
        Ok(())
    }

    /// Drops per-conversation locks that no turn is holding.
    pub async fn prune_idle_locks(&self) -> usize {
        self.locks.prune_idle().await;
        self.locks.session_count().await
    }

    /// Stored transcript of a conversation, empty when none exists.
    pub async fn history(&self, owner_id: &str, session_id: &str) -> Result<Vec<Message>, AgentError> {
        let (owner_id, session_id) = validate_scope(owner_id, session_id)?;
        Ok(self.store.get(&SessionKey::new(owner_id, session_id)).await?.unwrap_or_default())
    }
}

fn validate_scope<'a>(owner_id: &'a str, session_id: &'a str) -> Result<(&'a str, &'a str), AgentError> {
    let owner_id = owner_id.trim();
    if owner_id.is_empty() {
        return Err(AgentError::InvalidInput("ownerId is required".to_string()));
    }
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(AgentError::InvalidInput("sessionId is required".to_string()));
    }
    Ok((owner_id, session_id))
}
