// Core chat functionality shared by the server:
// - Provider request/response data structures
// - Request building for multi-modal user turns
// - Responses API client and response extraction
// - Configuration loading
// - Shared error types

// Export client module - Responses API client and extraction helpers
pub mod client;
pub use client::*;

// Export types module - Request/response data structures
pub mod types;
pub use types::*;

// Export request module - Content part construction
pub mod request;
pub use request::{build_input, build_parts, RequestSettings};

// Export config module - Configuration loading
pub mod config;
pub use config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;
