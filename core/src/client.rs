use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::ChatConfig;
use crate::errors::{ChatError, ChatResult};
use crate::types::*;

/// The remote completion collaborator.
///
/// Implementations send one request and hand back the provider's response
/// object; any failure along the way is reported as a [`ChatError`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn create_response(&self, request: ResponsesRequest) -> ChatResult<ResponseObject>;
}

/// Client for the OpenAI Responses API
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    config: ChatConfig,
}

impl OpenAiClient {
    /// Create a new client. Missing credentials are not an error here; they
    /// surface as [`ChatError::ConfigError`] on the first request.
    pub fn new(config: ChatConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Create a client on top of a preconfigured HTTP client
    pub fn with_http_client(config: ChatConfig, client: Client) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    fn responses_url(&self) -> String {
        format!("{}/responses", self.config.base_url())
    }

    fn api_key(&self) -> ChatResult<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ChatError::ConfigError(format!("{} is not set", crate::config::API_KEY_ENV))
            })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn create_response(&self, request: ResponsesRequest) -> ChatResult<ResponseObject> {
        let api_key = self.api_key()?;
        let url = self.responses_url();
        debug!(url = %url, model = %request.model, chained = request.previous_response_id.is_some(), "Sending Responses API request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.map_err(|e| {
                ChatError::ResponseError(format!("Failed to read error response: {}", e))
            })?;

            return Err(ChatError::HttpError {
                status_code: status.as_u16(),
                message: error_message(&error_body),
            });
        }

        let body = response
            .json::<ResponseObject>()
            .await
            .map_err(|e| ChatError::ParsingError(format!("Failed to parse response: {}", e)))?;

        check_response_status(body)
    }
}

/// Pull the provider's human-readable message out of an error body,
/// falling back to the raw body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(ApiErrorEnvelope {
            error: ApiErrorBody {
                message: Some(message),
                ..
            },
        }) => message,
        _ => body.to_string(),
    }
}

/// Reject 2xx bodies that still describe a failed response
fn check_response_status(response: ResponseObject) -> ChatResult<ResponseObject> {
    if response.status.as_deref() == Some("failed") || response.error.is_some() {
        let message = response
            .error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "response failed without an error message".to_string());
        return Err(ChatError::ResponseError(message));
    }
    Ok(response)
}

/// Aggregate the assistant's textual output.
///
/// Prefers the top-level `output_text` when the provider supplies it,
/// otherwise concatenates every `output_text` item of every message. A
/// response without text yields an empty string.
pub fn extract_text(response: &ResponseObject) -> String {
    if let Some(text) = &response.output_text {
        return text.clone();
    }

    response
        .output
        .iter()
        .filter(|item| item.item_type == "message")
        .flat_map(|item| item.content.iter())
        .filter(|content| content.content_type == "output_text")
        .filter_map(|content| content.text.as_deref())
        .collect()
}

/// The identifier to chain the next turn on, if the provider issued one
pub fn extract_continuation_token(response: &ResponseObject) -> Option<String> {
    response.id.clone().filter(|id| !id.is_empty())
}

impl From<&ResponseObject> for CompletionResponse {
    fn from(response: &ResponseObject) -> Self {
        Self {
            text: extract_text(response),
            continuation_id: extract_continuation_token(response),
        }
    }
}
