use thiserror::Error;

/// Errors raised while configuring or talking to the completion provider
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Request Error: {0}")]
    RequestError(String),

    #[error("Response Error: {0}")]
    ResponseError(String),

    #[error("Parsing Error: {0}")]
    ParsingError(String),

    #[error("HTTP Error: {status_code} - {message}")]
    HttpError { status_code: u16, message: String },
}

impl ChatError {
    /// True when the failure came from missing or invalid local configuration
    /// rather than from the provider itself.
    pub fn is_config(&self) -> bool {
        matches!(self, ChatError::ConfigError(_))
    }
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
