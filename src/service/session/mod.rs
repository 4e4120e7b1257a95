//! Conversation-session storage.
//!
//! A session holds the turns of one user's conversation with the root agent:
//! the user's messages and the agent's final replies.  Tool traffic is not kept.

use std::{
    collections::{HashMap, VecDeque},
    ops::Deref,
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    base::types::{Res, Void},
    service::llm::ChatMessage,
};

// Traits.

/// Generic session store trait that stores must implement.
#[async_trait]
pub trait GenericSessionStore: Send + Sync + 'static {
    /// Register a session.  Creating a session that already exists is a no-op.
    async fn create_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Void;

    /// Get the stored turns of a session, oldest first.
    async fn history(&self, session_id: &str) -> Res<Vec<ChatMessage>>;

    /// Append turns to a session.
    async fn append(&self, session_id: &str, messages: Vec<ChatMessage>) -> Void;
}

// Structs.

/// Session store for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<dyn GenericSessionStore>,
}

impl Deref for SessionStore {
    type Target = dyn GenericSessionStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl SessionStore {
    pub fn new(inner: Arc<dyn GenericSessionStore>) -> Self {
        Self { inner }
    }

    /// An in-process store keeping at most `max_messages` turns per session.
    pub fn memory(max_messages: usize) -> Self {
        Self::new(Arc::new(MemorySessionStore::new(max_messages)))
    }
}

#[derive(Debug)]
struct Session {
    app_name: String,
    user_id: String,
    messages: VecDeque<ChatMessage>,
}

/// In-process session store; everything is lost on restart.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    max_messages: usize,
}

impl MemorySessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_messages,
        }
    }
}

#[async_trait]
impl GenericSessionStore for MemorySessionStore {
    async fn create_session(&self, app_name: &str, user_id: &str, session_id: &str) -> Void {
        let mut sessions = self.sessions.lock().await;

        if let Some(existing) = sessions.get(session_id) {
            debug!("Session `{session_id}` already exists (app `{}`, user `{}`).", existing.app_name, existing.user_id);
            return Ok(());
        }

        sessions.insert(
            session_id.to_string(),
            Session {
                app_name: app_name.to_string(),
                user_id: user_id.to_string(),
                messages: VecDeque::new(),
            },
        );

        Ok(())
    }

    async fn history(&self, session_id: &str) -> Res<Vec<ChatMessage>> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(session_id).ok_or_else(|| anyhow::anyhow!("Session `{session_id}` not found."))?;

        Ok(session.messages.iter().cloned().collect())
    }

    async fn append(&self, session_id: &str, messages: Vec<ChatMessage>) -> Void {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(session_id).ok_or_else(|| anyhow::anyhow!("Session `{session_id}` not found."))?;

        session.messages.extend(messages);

        while session.messages.len() > self.max_messages {
            session.messages.pop_front();
        }

        // History always starts with a user turn.
        while session.messages.front().is_some_and(|m| !matches!(m, ChatMessage::User { .. })) {
            session.messages.pop_front();
        }

        Ok(())
    }
}

// Tests.
