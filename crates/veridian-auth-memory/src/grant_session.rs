//! In-memory grant session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use veridian_auth::AuthResult;
use veridian_auth::session::GrantSession;
use veridian_auth::storage::GrantSessionStore;

/// Grant sessions keyed by id.
#[derive(Default)]
pub struct MemoryGrantSessionStore {
    sessions: RwLock<HashMap<String, GrantSession>>,
}

impl MemoryGrantSessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions; test-suite convenience.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl GrantSessionStore for MemoryGrantSessionStore {
    async fn save(&self, session: &GrantSession) -> AuthResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> AuthResult<Option<GrantSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn get_by_token_id(&self, token_id: &str) -> AuthResult<Option<GrantSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.token_id == token_id)
            .cloned())
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> AuthResult<Option<GrantSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| {
                s.refresh_token.as_deref() == Some(refresh_token)
                    || s.previous_refresh_token.as_deref() == Some(refresh_token)
            })
            .cloned())
    }

    async fn delete(&self, id: &str) -> AuthResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}
