use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use tradebook_core::config::BusinessApiConfig;

/// Request bodies send money as JSON numbers (`"balance": 250.0`).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBuyerRequest {
    pub owner_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

/// Partial update; absent fields are left untouched by the service.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerUpdateRequest {
    pub owner_id: String,
    pub buyer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::float_option")]
    pub balance: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpenseRequest {
    pub owner_id: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("business service unreachable: {0}")]
    Transport(String),
    /// The service answered and refused; `message` is its own error text.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("business service returned an unreadable response: {0}")]
    Decode(String),
}

/// Mutating endpoints of the remote business service.
#[async_trait]
pub trait BusinessApi: Send + Sync {
    async fn create_buyer(&self, request: &NewBuyerRequest) -> Result<Value, RemoteError>;
    async fn update_buyer(&self, request: &BuyerUpdateRequest) -> Result<Value, RemoteError>;
    async fn create_expense(&self, request: &NewExpenseRequest) -> Result<Value, RemoteError>;
}

pub struct HttpBusinessApi {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpBusinessApi {
    pub fn from_config(config: &BusinessApiConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn send<B>(&self, method: Method, path: &str, body: &B) -> Result<Value, RemoteError>
    where
        B: Serialize + Sync,
    {
        let url = format!("{}/{path}", self.base_url);
        debug!(event_name = "agent.remote.request", method = %method, url = %url, "calling business service");

        let mut request = self.client.request(method, &url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| RemoteError::Transport(e.to_string()))?;

        interpret_response(status, &text).map_err(|error| {
            warn!(
                event_name = "agent.remote.failed",
                url = %url,
                status = status.as_u16(),
                error = %error,
                "business service call failed"
            );
            error
        })
    }
}

/// The service reports failures either through the HTTP status or through a
/// `{"success": false, "error": "..."}` envelope with a 2xx status.
fn interpret_response(status: StatusCode, body: &str) -> Result<Value, RemoteError> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if !status.is_success() {
        let message = parsed
            .as_ref()
            .and_then(|value| value.get("error").or_else(|| value.get("message")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("business service returned HTTP {}", status.as_u16())
                } else {
                    trimmed.to_string()
                }
            });
        return Err(RemoteError::Rejected { status: status.as_u16(), message });
    }

    let value = parsed.ok_or_else(|| RemoteError::Decode(body.chars().take(200).collect()))?;
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("business service reported a failure")
            .to_string();
        return Err(RemoteError::Rejected { status: status.as_u16(), message });
    }

    Ok(value)
}

#[async_trait]
impl BusinessApi for HttpBusinessApi {
    async fn create_buyer(&self, request: &NewBuyerRequest) -> Result<Value, RemoteError> {
        self.send(Method::POST, "buyers", request).await
    }

    async fn update_buyer(&self, request: &BuyerUpdateRequest) -> Result<Value, RemoteError> {
        self.send(Method::PUT, "buyers", request).await
    }

    async fn create_expense(&self, request: &NewExpenseRequest) -> Result<Value, RemoteError> {
        self.send(Method::POST, "expenses", request).await
    }
}
