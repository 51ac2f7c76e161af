//! Storage traits.
//!
//! The engine consumes persistence through three repository interfaces:
//! clients, authentication sessions and grant sessions. Implementations are
//! provided by backend crates (`veridian-auth-memory` ships the in-memory
//! one); each backend supplies its own locking or transaction discipline.
//!
//! Not-found is expressed as `Ok(None)`. Single-use reads (`take_*`) are
//! get-and-delete and must be atomic per key: that is the conditional-delete
//! primitive the single-use guarantees of authorization codes and PAR
//! request URIs rely on.

pub mod authn_session;
pub mod client;
pub mod grant_session;

pub use authn_session::AuthnSessionStore;
pub use client::ClientStore;
pub use grant_session::GrantSessionStore;
