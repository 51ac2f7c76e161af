//! Session entities.
//!
//! Two lifetimes of state: [`AuthnSession`] is the transient record driving
//! one user-agent through the authorization flow; [`GrantSession`] is the
//! long-lived record behind issued tokens.

pub mod authn;
pub mod grant;

pub use authn::AuthnSession;
pub use grant::{GrantOptions, GrantSession, Token, TokenFormat, TokenOptions, TokenType};
