use crate::errors::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-5-nano";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MAX_NUM_RESULTS: u32 = 20;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const VECTOR_STORE_ENV: &str = "VECTOR_STORE_ID";
pub const MODEL_ENV: &str = "OPENAI_MODEL";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a very helpful fund manager assistant that can help with the financial data of a company.
You are given a file that contains the financial data of a company.
You are also given a question about the financial data of the company.
You need to answer the question based on the financial data of the company.
You need to use the file to answer the question.";

/// Configuration for the completion provider
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub vector_store_id: Option<String>,
    pub model_name: Option<String>,
    pub system_prompt: Option<String>,
    pub max_num_results: Option<u32>,
    pub api_base: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            vector_store_id: None,
            model_name: Some(DEFAULT_MODEL.to_string()),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            max_num_results: Some(DEFAULT_MAX_NUM_RESULTS),
            api_base: Some(DEFAULT_API_BASE.to_string()),
        }
    }
}

/// A required setting that is absent from the merged configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSetting {
    ApiKey,
    VectorStoreId,
}

impl MissingSetting {
    pub fn env_var(&self) -> &'static str {
        match self {
            MissingSetting::ApiKey => API_KEY_ENV,
            MissingSetting::VectorStoreId => VECTOR_STORE_ENV,
        }
    }
}

impl fmt::Display for MissingSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not set", self.env_var())
    }
}

/// Treat empty or whitespace-only values as unset
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ChatConfig {
    /// Reads secrets and overrides from the process environment.
    ///
    /// A `.env` file in the working directory (or a parent) is loaded first
    /// when present; variables already set in the environment win.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds an override-only config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_key: non_blank(lookup(API_KEY_ENV)),
            vector_store_id: non_blank(lookup(VECTOR_STORE_ENV)),
            model_name: non_blank(lookup(MODEL_ENV)),
            system_prompt: None,
            max_num_results: None,
            api_base: None,
        }
    }

    /// Merges this config with another config, preferring values from the other config if present
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            api_key: other.api_key.clone().or_else(|| self.api_key.clone()),
            vector_store_id: other
                .vector_store_id
                .clone()
                .or_else(|| self.vector_store_id.clone()),
            model_name: other.model_name.clone().or_else(|| self.model_name.clone()),
            system_prompt: other
                .system_prompt
                .clone()
                .or_else(|| self.system_prompt.clone()),
            max_num_results: other.max_num_results.or(self.max_num_results),
            api_base: other.api_base.clone().or_else(|| self.api_base.clone()),
        }
    }

    /// Required settings that are missing. Startup reports these as warnings
    /// and keeps running; the first remote call fails instead.
    pub fn missing_settings(&self) -> Vec<MissingSetting> {
        let mut missing = Vec::new();
        if non_blank(self.api_key.clone()).is_none() {
            missing.push(MissingSetting::ApiKey);
        }
        if non_blank(self.vector_store_id.clone()).is_none() {
            missing.push(MissingSetting::VectorStoreId);
        }
        missing
    }

    pub fn model(&self) -> &str {
        self.model_name.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn instructions(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    pub fn max_results(&self) -> u32 {
        self.max_num_results.unwrap_or(DEFAULT_MAX_NUM_RESULTS)
    }

    pub fn base_url(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }
}

/// Helper function to get default config directory
pub fn get_default_config_dir(app_name: &str) -> ChatResult<PathBuf> {
    let home_dir = dirs::home_dir().ok_or_else(|| {
        ChatError::ConfigError("Could not determine home directory".to_string())
    })?;

    Ok(home_dir.join(".config").join(app_name))
}

/// Helper function to get default config file path
pub fn get_default_config_file(app_name: &str) -> ChatResult<PathBuf> {
    let config_dir = get_default_config_dir(app_name)?;
    Ok(config_dir.join("config.toml"))
}
