pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use services::registry::ChatRegistry;
use services::session_store::MemorySessionStore;
use std::sync::Arc;

/// Shared application state: the per-session chat registry and the browser
/// session records that point into it.
#[derive(Clone)]
pub struct AppState {
    pub chats: Arc<ChatRegistry>,
    pub sessions: MemorySessionStore,
}

impl AppState {
    pub fn new(chats: Arc<ChatRegistry>) -> Self {
        Self {
            chats,
            sessions: MemorySessionStore::new(),
        }
    }
}
