//! # veridian-auth-memory
//!
//! In-memory implementations of the `veridian-auth` storage traits.
//!
//! Intended for tests, examples and single-process deployments. All maps
//! live behind a `tokio` `RwLock`; the single-use `take_*` operations run
//! under the write lock, which gives them the per-key atomicity the
//! engine's replay guarantees rely on.

mod authn_session;
mod client;
mod grant_session;

pub use authn_session::MemoryAuthnSessionStore;
pub use client::MemoryClientStore;
pub use grant_session::MemoryGrantSessionStore;
