use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use tradebook_agent::business_tools::{register_business_tools, BusinessToolDeps};
use tradebook_agent::history::repair;
use tradebook_agent::llm::{Completion, CompletionRequest, LlmClient};
use tradebook_agent::reasoning::APOLOGY_REPLY;
use tradebook_agent::remote::{
    BusinessApi, BuyerUpdateRequest, NewBuyerRequest, NewExpenseRequest, RemoteError,
};
use tradebook_agent::runtime::{LoopPhase, STEP_LIMIT_REPLY};
use tradebook_agent::store::{ConversationStore, InMemoryConversationStore, SessionKey};
use tradebook_agent::tools::{ToolRegistry, ToolResult};
use tradebook_agent::{AgentError, AgentRuntime, Message, RuntimeSettings, ToolCall};
use tradebook_db::repositories::{
    InMemoryBuyerRepository, InMemoryExpenseRepository, InMemoryInventoryRepository,
};

enum Script {
    Fail,
    Reply(Completion),
}

/// Plays back scripted completions in order, then answers with plain text.
#[derive(Default)]
struct ScriptedLlm {
    script: Mutex<VecDeque<Script>>,
    repeat: Option<Completion>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    fn new(script: Vec<Script>) -> Self {
        Self { script: Mutex::new(script.into()), ..Self::default() }
    }

    fn repeating(completion: Completion) -> Self {
        Self { repeat: Some(completion), ..Self::default() }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        self.requests.lock().expect("requests lock").push(request.clone());
        if let Some(completion) = &self.repeat {
            return Ok(completion.clone());
        }
        match self.script.lock().expect("script lock").pop_front() {
            Some(Script::Reply(completion)) => Ok(completion),
            Some(Script::Fail) => Err(anyhow!("upstream 503")),
            None => Ok(Completion::text("✅ Anything else?")),
        }
    }
}

#[derive(Default)]
struct FakeBusinessApi {
    requests: Mutex<Vec<Value>>,
}

#[async_trait]
impl BusinessApi for FakeBusinessApi {
    async fn create_buyer(&self, request: &NewBuyerRequest) -> Result<Value, RemoteError> {
        self.requests.lock().expect("requests lock").push(json!(request));
        Ok(json!({"success": true, "buyer": {"id": "BYR-1", "firstName": request.first_name}}))
    }

    async fn update_buyer(&self, _request: &BuyerUpdateRequest) -> Result<Value, RemoteError> {
        Err(RemoteError::Rejected { status: 404, message: "buyer not found".to_string() })
    }

    async fn create_expense(&self, _request: &NewExpenseRequest) -> Result<Value, RemoteError> {
        Err(RemoteError::Transport("connection reset".to_string()))
    }
}

struct Harness {
    runtime: Arc<AgentRuntime>,
    llm: Arc<ScriptedLlm>,
    api: Arc<FakeBusinessApi>,
    store: Arc<InMemoryConversationStore>,
}

fn harness_with(llm: ScriptedLlm, settings: RuntimeSettings) -> Harness {
    let llm = Arc::new(llm);
    let api = Arc::new(FakeBusinessApi::default());
    let store = Arc::new(InMemoryConversationStore::default());

    let mut registry = ToolRegistry::default();
    register_business_tools(
        &mut registry,
        BusinessToolDeps {
            inventory: Arc::new(InMemoryInventoryRepository::default()),
            buyers: Arc::new(InMemoryBuyerRepository::default()),
            expenses: Arc::new(InMemoryExpenseRepository::default()),
            api: api.clone(),
        },
    );

    let runtime = Arc::new(AgentRuntime::new(
        llm.clone(),
        Arc::new(registry),
        store.clone(),
        settings,
    ));
    Harness { runtime, llm, api, store }
}

fn harness(script: Vec<Script>) -> Harness {
    harness_with(ScriptedLlm::new(script), RuntimeSettings::default())
}

fn call(id: &str, tool: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, tool, arguments)
}

async fn stored(harness: &Harness, owner: &str, session: &str) -> Vec<Message> {
    harness.runtime.history(owner, session).await.expect("history")
}

#[tokio::test]
async fn text_only_answer_takes_one_reasoning_step() {
    let h = harness(vec![Script::Reply(Completion::text("✅ Hello! How can I help?"))]);

    let turn = h.runtime.run_turn("owner-1", "s1", "hi").await.expect("turn");

    assert_eq!(turn.reply, "✅ Hello! How can I help?");
    assert_eq!(turn.reasoning_steps, 1);
    assert_eq!(turn.tool_calls, 0);
    assert_eq!(turn.trace, vec![LoopPhase::Agent, LoopPhase::Done]);
    assert_eq!(h.llm.requests().len(), 1);
}

#[tokio::test]
async fn one_tool_round_then_answer_visits_agent_tools_agent_done() {
    let h = harness(vec![
        Script::Reply(Completion::calls(vec![call("c1", "get_inventory", json!({}))])),
        Script::Reply(Completion::text("✅ Your inventory is empty.")),
    ]);

    let turn = h.runtime.run_turn("owner-1", "s1", "what's in stock?").await.expect("turn");

    assert_eq!(
        turn.trace,
        vec![LoopPhase::Agent, LoopPhase::Tools, LoopPhase::Agent, LoopPhase::Done]
    );
    assert_eq!(turn.reply, "✅ Your inventory is empty.");

    let requests = h.llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 6);
    let Some(Message::ToolResult { call_id, content, .. }) = requests[1].messages.last() else {
        panic!("second reasoning step should see the tool result");
    };
    assert_eq!(call_id, "c1");
    let result = ToolResult::from_content(content).expect("normalized");
    assert!(result.success);
    assert_eq!(result.data.expect("data")["count"], 0);
}

#[tokio::test]
async fn add_buyer_scenario_confirms_and_stores_four_messages() {
    let h = harness(vec![
        Script::Reply(Completion::calls(vec![call(
            "call-add",
            "add_buyer",
            json!({"firstName": "John", "lastName": "Doe", "email": "john@x.com"}),
        )])),
        Script::Reply(Completion::text("✅ Added John Doe as a new buyer.")),
    ]);

    let turn = h
        .runtime
        .run_turn("owner-1", "s1", "Add a buyer John Doe, john@x.com")
        .await
        .expect("turn");

    assert_eq!(turn.reply, "✅ Added John Doe as a new buyer.");

    let history = stored(&h, "owner-1", "s1").await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0], Message::user("Add a buyer John Doe, john@x.com"));
    assert_eq!(history[1].tool_calls()[0].tool_name, "add_buyer");
    let Message::ToolResult { call_id, content, .. } = &history[2] else {
        panic!("expected tool result, got {:?}", history[2]);
    };
    assert_eq!(call_id, "call-add");
    let result = ToolResult::from_content(content).expect("normalized");
    assert_eq!(
        result.data,
        Some(json!({"success": true, "buyer": {"id": "BYR-1", "firstName": "John"}}))
    );
    assert_eq!(history[3], Message::assistant("✅ Added John Doe as a new buyer."));

    let sent = h.api.requests.lock().expect("requests lock");
    assert_eq!(sent[0]["ownerId"], "owner-1");
    assert_eq!(sent[0]["email"], "john@x.com");
}

#[tokio::test]
async fn every_requested_call_gets_a_result_even_when_all_fail() {
    let h = harness(vec![
        Script::Reply(Completion::calls(vec![
            call("c1", "update_buyer", json!({"identifier": "Nobody", "phone": "1"})),
            call("c2", "add_expense", json!({"description": "Rent", "amount": 10})),
            call("c3", "launch_rockets", json!({})),
        ])),
        Script::Reply(Completion::text("❌ None of that worked.")),
    ]);

    let turn = h.runtime.run_turn("owner-1", "s1", "do three things").await.expect("turn");
    assert_eq!(turn.tool_calls, 3);

    let history = stored(&h, "owner-1", "s1").await;
    let results: Vec<(String, ToolResult)> = history
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { call_id, content, .. } => {
                Some((call_id.clone(), ToolResult::from_content(content).expect("normalized")))
            }
            _ => None,
        })
        .collect();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, "c1");
    assert_eq!(results[0].1, ToolResult::failure("no buyer matches `Nobody`"));
    assert_eq!(results[1].0, "c2");
    assert_eq!(
        results[1].1,
        ToolResult::failure("business service unreachable: connection reset")
    );
    assert_eq!(results[2].0, "c3");
    assert_eq!(results[2].1, ToolResult::failure("Unknown tool: launch_rockets"));
}

#[tokio::test]
async fn engine_failure_ends_turn_with_apology() {
    let h = harness(vec![Script::Fail]);

    let turn = h.runtime.run_turn("owner-1", "s1", "hi").await.expect("turn");

    assert_eq!(turn.reply, APOLOGY_REPLY);
    assert_eq!(turn.trace, vec![LoopPhase::Agent, LoopPhase::Done]);
    assert_eq!(
        stored(&h, "owner-1", "s1").await,
        vec![Message::user("hi"), Message::assistant(APOLOGY_REPLY)]
    );
}

#[tokio::test]
async fn step_limit_stops_a_looping_engine() {
    let h = harness_with(
        ScriptedLlm::repeating(Completion::calls(vec![call("", "get_buyers", json!({}))])),
        RuntimeSettings { max_reasoning_steps: 3, ..RuntimeSettings::default() },
    );

    let turn = h.runtime.run_turn("owner-1", "s1", "loop forever").await.expect("turn");

    assert_eq!(turn.reply, STEP_LIMIT_REPLY);
    assert_eq!(turn.reasoning_steps, 3);
    assert_eq!(turn.tool_calls, 3);
    assert_eq!(h.llm.requests().len(), 3);
    assert_eq!(turn.trace.last(), Some(&LoopPhase::Done));

    let history = stored(&h, "owner-1", "s1").await;
    assert_eq!(repair(history.clone()), history);
}

#[tokio::test]
async fn stored_history_is_bounded_by_window() {
    let h = harness(Vec::new());

    for i in 0..15 {
        h.runtime.run_turn("owner-1", "s1", &format!("message {i}")).await.expect("turn");
    }

    let history = stored(&h, "owner-1", "s1").await;
    assert_eq!(history.len(), 20);
    assert_eq!(history.last(), Some(&Message::assistant("✅ Anything else?")));
    assert_eq!(history[18], Message::user("message 14"));
}

#[tokio::test]
async fn broken_stored_history_is_repaired_before_reasoning() {
    let h = harness(Vec::new());
    let key = SessionKey::new("owner-1", "s1");
    h.store
        .put(
            &key,
            vec![
                Message::tool_result("orphan", "get_buyers", "{}"),
                Message::user("list buyers and expenses"),
                Message::assistant_with_calls(
                    "",
                    vec![call("a", "get_buyers", json!({})), call("b", "get_expenses", json!({}))],
                ),
                Message::tool_result("a", "get_buyers", r#"{"success":true,"data":[]}"#),
            ],
        )
        .await
        .expect("put");

    h.runtime.run_turn("owner-1", "s1", "hello again").await.expect("turn");

    let sent = &h.llm.requests()[0].messages;
    assert_eq!(repair(sent.clone()), *sent);
    assert_eq!(sent.len(), 5);
    assert_eq!(sent[0], Message::user("list buyers and expenses"));
    assert_eq!(sent[4], Message::user("hello again"));
}

#[tokio::test]
async fn sessions_and_owners_are_isolated() {
    let h = harness(Vec::new());

    h.runtime.run_turn("owner-1", "s1", "first").await.expect("turn");
    h.runtime.run_turn("owner-2", "s1", "second").await.expect("turn");

    assert_eq!(stored(&h, "owner-1", "s1").await[0], Message::user("first"));
    assert_eq!(stored(&h, "owner-2", "s1").await[0], Message::user("second"));
    assert!(stored(&h, "owner-1", "s2").await.is_empty());
}

#[tokio::test]
async fn dashed_owner_and_session_ids_do_not_collide() {
    let h = harness(Vec::new());

    h.runtime.run_turn("acme", "x-secret", "tenant A private note").await.expect("turn");

    assert!(stored(&h, "acme-x", "secret").await.is_empty());
    assert_eq!(stored(&h, "acme", "x-secret").await[0], Message::user("tenant A private note"));

    h.runtime.run_turn("acme-x", "secret", "tenant B note").await.expect("turn");
    let first_request_of_b = h.llm.requests()[1].messages.clone();
    assert_eq!(first_request_of_b, vec![Message::user("tenant B note")]);
}

#[tokio::test]
async fn concurrent_turns_on_one_session_are_serialized() {
    let h = harness(Vec::new());

    let first = {
        let runtime = h.runtime.clone();
        tokio::spawn(async move { runtime.run_turn("owner-1", "s1", "one").await })
    };
    let second = {
        let runtime = h.runtime.clone();
        tokio::spawn(async move { runtime.run_turn("owner-1", "s1", "two").await })
    };
    first.await.expect("join").expect("turn one");
    second.await.expect("join").expect("turn two");

    let history = stored(&h, "owner-1", "s1").await;
    assert_eq!(history.len(), 4, "both turns must survive: {history:?}");
}

#[tokio::test]
async fn clear_history_is_idempotent() {
    let h = harness(Vec::new());
    h.runtime.run_turn("owner-1", "s1", "hi").await.expect("turn");

    h.runtime.clear_history("owner-1", "s1").await.expect("first clear");
    h.runtime.clear_history("owner-1", "s1").await.expect("second clear");

    assert!(stored(&h, "owner-1", "s1").await.is_empty());
    assert_eq!(h.store.session_count().await, 0);
}

#[tokio::test]
async fn blank_input_is_rejected_before_the_loop() {
    let h = harness(Vec::new());

    for (owner, session, text) in [("", "s1", "hi"), ("owner-1", "  ", "hi"), ("owner-1", "s1", " ")] {
        let error = h.runtime.run_turn(owner, session, text).await.expect_err("invalid input");
        assert!(matches!(error, AgentError::InvalidInput(_)), "{error:?}");
    }
    assert!(h.llm.requests().is_empty());
}

#[tokio::test]
async fn slow_engine_is_cut_off_by_timeout() {
    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Completion::text("late"))
        }
    }

    let runtime = AgentRuntime::new(
        Arc::new(SlowLlm),
        Arc::new(ToolRegistry::default()),
        Arc::new(InMemoryConversationStore::default()),
        RuntimeSettings { llm_timeout: Duration::from_millis(20), ..RuntimeSettings::default() },
    );

    let turn = runtime.run_turn("owner-1", "s1", "hi").await.expect("turn");
    assert_eq!(turn.reply, APOLOGY_REPLY);
}
