//! In-memory client store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use veridian_auth::AuthResult;
use veridian_auth::storage::ClientStore;
use veridian_auth::types::Client;

/// Clients in a map keyed by client id.
#[derive(Default)]
pub struct MemoryClientStore {
    clients: RwLock<HashMap<String, Client>>,
}

impl MemoryClientStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with clients.
    #[must_use]
    pub fn with_clients(clients: Vec<Client>) -> Self {
        let map = clients.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            clients: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn save(&self, client: &Client) -> AuthResult<()> {
        self.clients
            .write()
            .await
            .insert(client.id.clone(), client.clone());
        Ok(())
    }

    async fn get(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn delete(&self, client_id: &str) -> AuthResult<()> {
        self.clients.write().await.remove(client_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veridian_auth::types::ClientMetaInfo;

    fn client(id: &str) -> Client {
        Client {
            id: id.to_string(),
            hashed_secret: None,
            secret: None,
            hashed_registration_access_token: None,
            meta: ClientMetaInfo::default(),
        }
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let store = MemoryClientStore::new();
        store.save(&client("cid1")).await.unwrap();

        assert!(store.get("cid1").await.unwrap().is_some());
        assert!(store.get("missing").await.unwrap().is_none());

        store.delete("cid1").await.unwrap();
        assert!(store.get("cid1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces() {
        let store = MemoryClientStore::new();
        store.save(&client("cid1")).await.unwrap();

        let mut updated = client("cid1");
        updated.meta.scope = "openid".to_string();
        store.save(&updated).await.unwrap();

        assert_eq!(store.get("cid1").await.unwrap().unwrap().meta.scope, "openid");
    }
}
