//! Client storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Storage operations for registered clients.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Persists a client, replacing any existing record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn save(&self, client: &Client) -> AuthResult<()>;

    /// Finds a client by id. Returns `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Deletes a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, client_id: &str) -> AuthResult<()>;
}
