//! Session management for the chat server
//!
//! Every browser tab gets its own session holding one conversation. The
//! `SessionStore` trait can be implemented by different storage backends;
//! only the in-memory one exists, since conversations do not outlive the
//! process.

pub mod adapters;
pub mod store;

pub use adapters::InMemorySessionStore;
pub use store::{Notice, Session, SessionHandle, SessionStore, SessionStoreError, SessionStoreRef};
