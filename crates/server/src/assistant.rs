use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use tradebook_agent::{AgentError, AgentRuntime};
use tradebook_core::{ApplicationError, InterfaceError};

#[derive(Clone)]
pub struct AssistantState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub reply: String,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/api/v1/assistant/chat", post(chat))
        .route("/api/v1/assistant/sessions/{owner_id}/{session_id}", delete(clear_session))
        .with_state(AssistantState { runtime })
}

pub async fn chat(
    State(state): State<AssistantState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let turn = state
        .runtime
        .run_turn(&request.owner_id, &request.session_id, &request.message)
        .await
        .map_err(into_api_error)?;

    Ok(Json(ChatResponse { success: true, reply: turn.reply, correlation_id: turn.correlation_id }))
}

pub async fn clear_session(
    State(state): State<AssistantState>,
    Path((owner_id, session_id)): Path<(String, String)>,
) -> Result<Json<ClearResponse>, ApiError> {
    state.runtime.clear_history(&owner_id, &session_id).await.map_err(into_api_error)?;
    Ok(Json(ClearResponse { success: true }))
}

fn into_api_error(error: AgentError) -> ApiError {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = ApplicationError::from(error).into_interface(correlation_id.clone());

    let (status, message) = match &interface {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message.clone()),
        InterfaceError::ServiceUnavailable { message, .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, message.clone())
        }
        InterfaceError::Internal { message, .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
        }
    };

    let public_error = if status == StatusCode::BAD_REQUEST {
        message
    } else {
        error!(
            event_name = "assistant.request.failed",
            correlation_id = %correlation_id,
            error = %message,
            "assistant request failed"
        );
        interface.user_message().to_string()
    };

    (
        status,
        Json(ErrorBody { success: false, error: public_error, correlation_id }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::{Path, State};
    use axum::http::{Request, StatusCode};
    use axum::Json;
    use tower::ServiceExt;

    use tradebook_agent::llm::{Completion, CompletionRequest, LlmClient};
    use tradebook_agent::store::InMemoryConversationStore;
    use tradebook_agent::tools::ToolRegistry;
    use tradebook_agent::{AgentRuntime, RuntimeSettings};

    use super::{chat, clear_session, router, AssistantState, ChatRequest};

    struct FixedLlm;

    #[async_trait]
    impl LlmClient for FixedLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion> {
            Ok(Completion::text("✅ Hello from the assistant."))
        }
    }

    fn runtime() -> Arc<AgentRuntime> {
        Arc::new(AgentRuntime::new(
            Arc::new(FixedLlm),
            Arc::new(ToolRegistry::default()),
            Arc::new(InMemoryConversationStore::default()),
            RuntimeSettings::default(),
        ))
    }

    fn request(owner: &str, session: &str, message: &str) -> Json<ChatRequest> {
        Json(ChatRequest {
            owner_id: owner.to_string(),
            session_id: session.to_string(),
            message: message.to_string(),
        })
    }

    #[tokio::test]
    async fn chat_returns_reply() {
        let state = AssistantState { runtime: runtime() };

        let Json(response) =
            chat(State(state), request("owner-1", "s1", "hi")).await.expect("chat succeeds");

        assert!(response.success);
        assert_eq!(response.reply, "✅ Hello from the assistant.");
        assert!(!response.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn chat_rejects_missing_session_with_400() {
        let state = AssistantState { runtime: runtime() };

        let (status, Json(body)) =
            chat(State(state), request("owner-1", "", "hi")).await.expect_err("bad request");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(body.error, "sessionId is required");
    }

    #[tokio::test]
    async fn clear_session_removes_history() {
        let runtime = runtime();
        let state = AssistantState { runtime: runtime.clone() };
        chat(State(state.clone()), request("owner-1", "s1", "hi")).await.expect("chat");

        let Json(cleared) = clear_session(
            State(state),
            Path(("owner-1".to_string(), "s1".to_string())),
        )
        .await
        .expect("clear");

        assert!(cleared.success);
        assert!(runtime.history("owner-1", "s1").await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn routes_are_wired() {
        let app = router(runtime());

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/assistant/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"ownerId":"o","sessionId":"s","message":"hi"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::delete("/api/v1/assistant/sessions/o/s").body(Body::empty()).expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
