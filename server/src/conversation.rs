//! Conversation state and the per-turn session controller.
//!
//! [`ConversationState`] is the history plus the provider's continuation
//! token. [`SessionController::submit_turn`] runs one request/response
//! cycle against it. Taking the state by `&mut` keeps submissions on the
//! same conversation strictly sequential.

use std::sync::Arc;

use finchat_core::client::CompletionProvider;
use finchat_core::errors::ChatResult;
use finchat_core::request::{build_parts, RequestSettings};
use finchat_core::types::{CompletionResponse, ContentPart, ImageUpload, ResponseObject, Turn};
use tracing::{debug, info, warn};

/// History and continuation token of one conversation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    history: Vec<Turn>,
    continuation_token: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.continuation_token.is_none()
    }

    /// Drop all history and forget the continuation token
    pub fn reset(&mut self) {
        self.history.clear();
        self.continuation_token = None;
    }
}

/// Result of a submission that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No text and no images: nothing was sent and the state is untouched
    NothingToSend,
    /// The assistant's answer, possibly empty
    Answered(String),
}

/// Drives request/response cycles against a completion provider
#[derive(Clone)]
pub struct SessionController {
    provider: Arc<dyn CompletionProvider>,
    settings: RequestSettings,
}

impl SessionController {
    pub fn new(provider: Arc<dyn CompletionProvider>, settings: RequestSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// Submit one user turn.
    ///
    /// The user turn is recorded before the remote call. The assistant turn
    /// and the new continuation token are recorded only when the call
    /// succeeds; on failure the previous token is kept so a resubmission
    /// still chains on the last good response.
    pub async fn submit_turn(
        &self,
        state: &mut ConversationState,
        text: &str,
        images: &[ImageUpload],
    ) -> ChatResult<TurnOutcome> {
        let parts = build_parts(text, images);
        if parts.is_empty() {
            debug!("Empty submission, skipping remote call");
            return Ok(TurnOutcome::NothingToSend);
        }

        info!(
            parts = parts.len(),
            images = images.len(),
            chained = state.continuation_token.is_some(),
            "Submitting turn"
        );
        state.history.push(Turn::user(parts.clone()));

        let response = match self.call(parts, state.continuation_token.clone()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Remote call failed, user turn left unanswered");
                return Err(e);
            }
        };

        let CompletionResponse {
            text: answer,
            continuation_id: token,
        } = CompletionResponse::from(&response);
        if token.is_none() {
            warn!("Response carried no id, next turn starts a fresh context");
        }

        state.history.push(Turn::assistant(answer.clone()));
        state.continuation_token = token;
        info!(
            answer_len = answer.len(),
            continuation = state.continuation_token.as_deref().unwrap_or("none"),
            "Turn answered"
        );

        Ok(TurnOutcome::Answered(answer))
    }

    async fn call(
        &self,
        parts: Vec<ContentPart>,
        previous_response_id: Option<String>,
    ) -> ChatResult<ResponseObject> {
        let request = self.settings.build_request(parts, previous_response_id)?;
        self.provider.create_response(request).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use finchat_core::errors::ChatError;
    use finchat_core::types::ResponsesRequest;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays scripted results and records every request
    #[derive(Default)]
    pub struct ScriptedProvider {
        replies: Mutex<VecDeque<ChatResult<ResponseObject>>>,
        pub requests: Mutex<Vec<ResponsesRequest>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, id: &str, text: &str) -> Self {
            self.push(Ok(ResponseObject {
                id: Some(id.to_string()),
                output_text: Some(text.to_string()),
                ..ResponseObject::default()
            }))
        }

        pub fn fail(self, error: ChatError) -> Self {
            self.push(Err(error))
        }

        pub fn push(self, reply: ChatResult<ResponseObject>) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        pub fn previous_ids(&self) -> Vec<Option<String>> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.previous_response_id.clone())
                .collect()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn create_response(&self, request: ResponsesRequest) -> ChatResult<ResponseObject> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ChatError::RequestError("no scripted reply".to_string())))
        }
    }

    pub fn settings() -> RequestSettings {
        RequestSettings {
            model: "gpt-5-nano".to_string(),
            instructions: "Answer from the filings.".to_string(),
            vector_store_id: Some("vs_test".to_string()),
            max_num_results: 20,
        }
    }

    pub fn controller(provider: Arc<ScriptedProvider>) -> SessionController {
        SessionController::new(provider, settings())
    }
}
