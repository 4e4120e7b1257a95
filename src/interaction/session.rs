use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::info;

use crate::{base::types::Res, service::session::SessionStore};

/// The session id of a chat user.
pub fn session_id_for(user_id: &str) -> String {
    format!("slack_{user_id}")
}

/// Maps chat users to conversation sessions, creating them on first contact.
#[derive(Clone)]
pub struct SessionManager {
    app_name: String,
    store: SessionStore,
    sessions: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionManager {
    pub fn new(app_name: &str, store: SessionStore) -> Self {
        Self {
            app_name: app_name.to_string(),
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get the session id for `user_id`, creating the session if needed.
    ///
    /// The map lock is held while the store creates the session, so concurrent
    /// first messages from one user create it once.
    pub async fn get_or_create_session(&self, user_id: &str) -> Res<String> {
        let mut sessions = self.sessions.lock().await;

        if let Some(session_id) = sessions.get(user_id) {
            return Ok(session_id.clone());
        }

        let session_id = session_id_for(user_id);
        self.store.create_session(&self.app_name, user_id, &session_id).await?;
        sessions.insert(user_id.to_string(), session_id.clone());

        info!("Created session `{session_id}` for user `{user_id}`.");

        Ok(session_id)
    }

    /// Number of known sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

// Tests.
