use serde::{Deserialize, Serialize};

/// Default MIME type assumed for uploads that carry none
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// One unit of multi-modal input within a single turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "input_text")]
    Text { text: String },
    /// `image_url` is either a self-describing `data:` URI or a plain URL.
    #[serde(rename = "input_image")]
    Image { image_url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>) -> Self {
        ContentPart::Image {
            image_url: image_url.into(),
        }
    }
}

/// A raw uploaded image before it is turned into a content part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self { mime_type, bytes }
    }

    /// The declared MIME type, falling back to `image/png` when absent or blank
    pub fn mime_or_default(&self) -> &str {
        match self.mime_type.as_deref().map(str::trim) {
            Some(mime) if !mime.is_empty() => mime,
            _ => DEFAULT_IMAGE_MIME,
        }
    }
}

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Body of a turn: plain text for answers, structured parts for user input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One message exchanged in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Parts(parts),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: TurnContent::Text(text.into()),
        }
    }
}

/// Input envelope item for the Responses API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputItem {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl InputItem {
    pub fn user_message(content: Vec<ContentPart>) -> Self {
        Self {
            item_type: "message",
            role: Role::User,
            content,
        }
    }
}

/// Tool definition attached to every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolSpec {
    FileSearch {
        vector_store_ids: Vec<String>,
        max_num_results: u32,
    },
}

/// Request to the Responses API to create a response
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

/// Response object returned by the Responses API.
///
/// Every field is optional so that partial or unexpected payloads still
/// deserialize; extraction helpers degrade to empty values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResponseObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output_text: Option<String>,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

/// One item of the response `output` array
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub content: Vec<OutputContent>,
}

/// Content of an output message item
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputContent {
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Error object the provider embeds in failed responses
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Wrapper used by the provider for non-2xx bodies
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

/// Normalised view of a response: the answer and the next continuation id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionResponse {
    pub text: String,
    pub continuation_id: Option<String>,
}
