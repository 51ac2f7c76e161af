//! The authorization server handle.
//!
//! An [`AuthServer`] bundles the immutable configuration with the three
//! store implementations and the client JWKS cache. Every protocol
//! operation is a method on it, defined next to the machinery it drives:
//! PAR in [`crate::oauth::par`], the flow engine in
//! [`crate::oauth::engine`], token issuance in [`crate::token::service`],
//! and so on. Handlers clone the handle; all state is shared.

use std::sync::Arc;

use crate::config::Configuration;
use crate::oauth::jwks_cache::ClientJwksCache;
use crate::storage::{AuthnSessionStore, ClientStore, GrantSessionStore};

/// A running authorization server.
#[derive(Clone)]
pub struct AuthServer {
    pub(crate) config: Arc<Configuration>,
    pub(crate) clients: Arc<dyn ClientStore>,
    pub(crate) authn_sessions: Arc<dyn AuthnSessionStore>,
    pub(crate) grant_sessions: Arc<dyn GrantSessionStore>,
    pub(crate) jwks_cache: Arc<ClientJwksCache>,
}

impl AuthServer {
    /// Assembles a server from configuration and stores.
    #[must_use]
    pub fn new(
        config: Configuration,
        clients: Arc<dyn ClientStore>,
        authn_sessions: Arc<dyn AuthnSessionStore>,
        grant_sessions: Arc<dyn GrantSessionStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            clients,
            authn_sessions,
            grant_sessions,
            jwks_cache: Arc::new(ClientJwksCache::with_defaults()),
        }
    }

    /// Replaces the JWKS cache (custom TTLs, timeouts).
    #[must_use]
    pub fn with_jwks_cache(mut self, cache: ClientJwksCache) -> Self {
        self.jwks_cache = Arc::new(cache);
        self
    }

    /// The configuration this server runs with.
    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }
}
