//! Authentication session storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::session::AuthnSession;

/// Storage operations for transient authentication sessions.
///
/// Sessions are indexed by id and by three runtime handles: the PAR
/// `request_uri`, the interactive `callback_id` and the
/// `authorization_code`. The `take_*` operations load and delete in one
/// step and must be atomic per key; a second take of the same handle
/// observes `None`.
#[async_trait]
pub trait AuthnSessionStore: Send + Sync {
    /// Persists a session, replacing any existing record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, session: &AuthnSession) -> AuthResult<()>;

    /// Finds a session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, id: &str) -> AuthResult<Option<AuthnSession>>;

    /// Finds a session by callback id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get_by_callback_id(&self, callback_id: &str) -> AuthResult<Option<AuthnSession>>;

    /// Loads and deletes the session holding this request URI.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn take_by_request_uri(&self, request_uri: &str) -> AuthResult<Option<AuthnSession>>;

    /// Loads and deletes the session holding this authorization code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn take_by_authorization_code(&self, code: &str) -> AuthResult<Option<AuthnSession>>;

    /// Deletes a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: &str) -> AuthResult<()>;
}
