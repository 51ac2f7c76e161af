//! Authentication policies.
//!
//! The server never verifies user credentials itself: the host supplies
//! [`AuthnPolicy`] implementations, and the flow engine drives the selected
//! one through as many user-agent round-trips as it needs.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::session::AuthnSession;
use crate::types::Client;

/// What a policy step decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The user is authenticated; the engine finishes the flow.
    Success,

    /// The policy rendered an HTML page (login form, consent screen) and
    /// needs another round-trip. The engine parks the session under its
    /// callback id and sends the page to the user-agent.
    InProgress(String),

    /// Authentication failed; the engine fails the flow.
    Failure {
        /// Sent to the client as the `error_description`.
        description: String,
    },
}

/// Form data posted back by the user-agent on a callback.
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    /// Decoded `application/x-www-form-urlencoded` fields.
    pub form: HashMap<String, String>,
}

impl CallbackRequest {
    /// Reads one form field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }
}

/// A host-supplied interactive authentication policy.
///
/// Policies are registered in configuration order; the first whose
/// [`AuthnPolicy::set_up`] accepts the session runs the flow. `set_up` may
/// initialize the session (scratch data, step marker). `authenticate` runs
/// once per user-agent round-trip and may read form data, set the subject,
/// grant scopes and add claims.
#[async_trait]
pub trait AuthnPolicy: Send + Sync {
    /// Stable policy identifier, recorded on the session.
    fn id(&self) -> &str;

    /// Decides whether this policy handles the session.
    fn set_up(&self, client: &Client, session: &mut AuthnSession) -> bool;

    /// Runs one authentication step.
    async fn authenticate(
        &self,
        session: &mut AuthnSession,
        request: &CallbackRequest,
    ) -> PolicyOutcome;
}
