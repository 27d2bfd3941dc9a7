// Chat server for the financial-data assistant:
// - Conversation state and the per-turn controller
// - Per-browser session storage
// - HTML rendering of the chat page
// - HTTP routes and server startup

pub mod config;
pub mod conversation;
pub mod http_server;
pub mod render;
pub mod session;
