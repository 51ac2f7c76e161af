//! Grant session storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::session::GrantSession;

/// Storage operations for long-lived grant sessions.
#[async_trait]
pub trait GrantSessionStore: Send + Sync {
    /// Persists a session, replacing any existing record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, session: &GrantSession) -> AuthResult<()>;

    /// Finds a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, id: &str) -> AuthResult<Option<GrantSession>>;

    /// Finds the session whose live access token has this id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_token_id(&self, token_id: &str) -> AuthResult<Option<GrantSession>>;

    /// Finds the session holding this refresh token, matching both the
    /// live value and the one retired by the latest rotation (so a replay
    /// can be told apart from an unknown token).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_refresh_token(&self, refresh_token: &str) -> AuthResult<Option<GrantSession>>;

    /// Deletes a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: &str) -> AuthResult<()>;
}
