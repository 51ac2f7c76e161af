//! In-memory authentication session store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use veridian_auth::AuthResult;
use veridian_auth::session::AuthnSession;
use veridian_auth::storage::AuthnSessionStore;

/// Sessions keyed by id; the secondary handles are searched on demand.
///
/// The `take_*` operations hold the write lock for the whole find-and-
/// remove, so a handle is observed by exactly one caller.
#[derive(Default)]
pub struct MemoryAuthnSessionStore {
    sessions: RwLock<HashMap<String, AuthnSession>>,
}

impl MemoryAuthnSessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthnSessionStore for MemoryAuthnSessionStore {
    async fn save(&self, session: &AuthnSession) -> AuthResult<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> AuthResult<Option<AuthnSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn get_by_callback_id(&self, callback_id: &str) -> AuthResult<Option<AuthnSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.callback_id.as_deref() == Some(callback_id))
            .cloned())
    }

    async fn take_by_request_uri(&self, request_uri: &str) -> AuthResult<Option<AuthnSession>> {
        let mut sessions = self.sessions.write().await;
        let id = sessions
            .values()
            .find(|s| s.request_uri.as_deref() == Some(request_uri))
            .map(|s| s.id.clone());
        Ok(id.and_then(|id| sessions.remove(&id)))
    }

    async fn take_by_authorization_code(&self, code: &str) -> AuthResult<Option<AuthnSession>> {
        let mut sessions = self.sessions.write().await;
        let id = sessions
            .values()
            .find(|s| s.authorization_code.as_deref() == Some(code))
            .map(|s| s.id.clone());
        Ok(id.and_then(|id| sessions.remove(&id)))
    }

    async fn delete(&self, id: &str) -> AuthResult<()> {
        self.sessions.write().await.remove(id);
        Ok(())
    }
}
