use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::config::{ChatConfig, VECTOR_STORE_ENV};
use crate::errors::{ChatError, ChatResult};
use crate::types::{ContentPart, ImageUpload, InputItem, ResponsesRequest, ToolSpec};

/// Build the ordered content parts for one outgoing user turn.
///
/// The trimmed text, when non-empty, always comes first, followed by one
/// image part per upload in upload order. An empty result means there is
/// nothing to send.
pub fn build_parts(text: &str, images: &[ImageUpload]) -> Vec<ContentPart> {
    let mut parts = Vec::with_capacity(images.len() + 1);

    let text = text.trim();
    if !text.is_empty() {
        parts.push(ContentPart::text(text));
    }

    parts.extend(images.iter().map(|image| ContentPart::image(data_url(image))));
    parts
}

/// Encode an upload as `data:<mime>;base64,<payload>`
pub fn data_url(image: &ImageUpload) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_or_default(),
        STANDARD.encode(&image.bytes)
    )
}

/// Wrap content parts in the single user message the Responses API expects
pub fn build_input(parts: Vec<ContentPart>) -> Vec<InputItem> {
    if parts.is_empty() {
        Vec::new()
    } else {
        vec![InputItem::user_message(parts)]
    }
}

/// Static per-process settings attached to every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSettings {
    pub model: String,
    pub instructions: String,
    pub vector_store_id: Option<String>,
    pub max_num_results: u32,
}

impl From<&ChatConfig> for RequestSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            model: config.model().to_string(),
            instructions: config.instructions().to_string(),
            vector_store_id: config
                .vector_store_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
            max_num_results: config.max_results(),
        }
    }
}

impl RequestSettings {
    /// The retrieval tool; fails when no vector store is configured
    pub fn file_search_tool(&self) -> ChatResult<ToolSpec> {
        let vector_store_id = self
            .vector_store_id
            .clone()
            .ok_or_else(|| ChatError::ConfigError(format!("{} is not set", VECTOR_STORE_ENV)))?;

        Ok(ToolSpec::FileSearch {
            vector_store_ids: vec![vector_store_id],
            max_num_results: self.max_num_results,
        })
    }

    /// Assemble the request for one user turn, chained on `previous_response_id`
    pub fn build_request(
        &self,
        parts: Vec<ContentPart>,
        previous_response_id: Option<String>,
    ) -> ChatResult<ResponsesRequest> {
        Ok(ResponsesRequest {
            model: self.model.clone(),
            input: build_input(parts),
            instructions: Some(self.instructions.clone()),
            tools: vec![self.file_search_tool()?],
            previous_response_id,
        })
    }
}
