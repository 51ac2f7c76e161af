//! # veridian-auth
//!
//! An OAuth 2.1 / OpenID Connect authorization server engine.
//!
//! This crate is the protocol core: the state machine that drives a
//! user-agent through authorization, turns authorization artifacts into
//! tokens, authenticates clients on every protected endpoint, and issues,
//! introspects and revokes access, refresh and ID tokens.
//!
//! Supported profiles and mechanisms:
//! - Authorization code with PKCE, implicit and hybrid response types
//! - Pushed authorization requests (RFC 9126)
//! - JWT-secured authorization requests and responses (JAR, JARM)
//! - Demonstrating proof-of-possession (DPoP, RFC 9449) and mutual-TLS
//!   bound tokens
//! - Seven client authentication methods, from `none` to
//!   `self_signed_tls_client_auth`
//! - Dynamic client registration and management (RFC 7591/7592)
//! - FAPI 2.0 baseline enforcement
//!
//! ## What stays outside
//!
//! TLS termination, template rendering, persistence backends and user
//! credential verification are host concerns. Stores arrive as the three
//! traits in [`storage`]; interactive login arrives as
//! [`oauth::AuthnPolicy`] implementations; the HTTP handlers in [`http`]
//! are a thin axum skin over the engine and can be replaced wholesale.
//!
//! ## Modules
//!
//! - [`config`] - Process-wide immutable configuration
//! - [`jose`] - Signing, encryption, thumbprints, random tokens
//! - [`types`] - Clients, scopes, protocol constants, parameters
//! - [`session`] - Authentication and grant sessions
//! - [`storage`] - Store traits
//! - [`oauth`] - Client authentication, PAR, JAR, JARM, DPoP, the flow
//!   engine
//! - [`token`] - Token issuance, lookup, introspection, revocation
//! - [`registration`] - Dynamic client registration
//! - [`discovery`] - Discovery document and public JWKS
//! - [`userinfo`] - The OIDC UserInfo endpoint
//! - [`http`] - Axum handlers and middleware

pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod http;
pub mod jose;
pub mod oauth;
pub mod registration;
pub mod server;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;
pub mod userinfo;

pub use config::{Configuration, LifetimeConfig, Profile};
pub use context::HttpRequestInfo;
pub use error::OAuthError;
pub use server::AuthServer;

/// Result alias used across the crate.
pub type AuthResult<T> = Result<T, OAuthError>;

/// Convenient imports for embedders.
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{Configuration, DcrPlugin, LifetimeConfig, Profile};
    pub use crate::context::HttpRequestInfo;
    pub use crate::error::OAuthError;
    pub use crate::jose::{EncryptionKey, ServerKeySet, SigningKey};
    pub use crate::oauth::{AuthnPolicy, CallbackRequest, PolicyOutcome};
    pub use crate::server::AuthServer;
    pub use crate::session::{AuthnSession, GrantSession, TokenOptions};
    pub use crate::storage::{AuthnSessionStore, ClientStore, GrantSessionStore};
    pub use crate::types::{AuthMethod, Client, ClientMetaInfo, GrantType, ResponseType, Scope};
}
