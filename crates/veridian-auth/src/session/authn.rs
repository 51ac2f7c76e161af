//! The authentication session.
//!
//! Created by PAR or the authorization endpoint, mutated by every policy
//! step, deleted on terminal success (after code redemption) or failure.
//! Indexed by `request_uri`, `callback_id` and `authorization_code`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{AuthorizationDetail, AuthorizationParameters};

/// Transient state for one authorization flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthnSession {
    /// Unique session id.
    pub id: String,

    /// The client that started the flow.
    pub client_id: String,

    /// The validated authorization parameters.
    pub parameters: AuthorizationParameters,

    /// PAR handle, present between `/par` and `/authorize`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_uri: Option<String>,

    /// Handle under which the session is parked between user-agent
    /// round-trips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,

    /// The outstanding authorization code, single-use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<String>,

    /// When the code was issued.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub auth_code_issued_at: Option<OffsetDateTime>,

    /// The authenticated subject, set by the policy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Scopes the policy granted, space-delimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_scopes: Option<String>,

    /// Authorization details the policy granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_authorization_details: Option<Vec<AuthorizationDetail>>,

    /// The policy driving this session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    /// Free-form step marker for multi-step policies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,

    /// Claims the policy adds to access tokens.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_token_claims: serde_json::Map<String, serde_json::Value>,

    /// Claims the policy adds to ID tokens.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_id_token_claims: serde_json::Map<String, serde_json::Value>,

    /// Claims the policy adds to userinfo responses.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_userinfo_claims: serde_json::Map<String, serde_json::Value>,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the session expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Scratch space for policies.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub store: serde_json::Map<String, serde_json::Value>,
}

impl AuthnSession {
    /// Creates a session for a client with validated parameters.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        parameters: AuthorizationParameters,
        lifetime: time::Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            parameters,
            request_uri: None,
            callback_id: None,
            authorization_code: None,
            auth_code_issued_at: None,
            subject: None,
            granted_scopes: None,
            granted_authorization_details: None,
            policy_id: None,
            step: None,
            additional_token_claims: serde_json::Map::new(),
            additional_id_token_claims: serde_json::Map::new(),
            additional_userinfo_claims: serde_json::Map::new(),
            created_at: now,
            expires_at: now + lifetime,
            store: serde_json::Map::new(),
        }
    }

    /// Whether the session itself has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Whether the outstanding authorization code has expired.
    #[must_use]
    pub fn is_authorization_code_expired(&self, code_lifetime: time::Duration) -> bool {
        match self.auth_code_issued_at {
            Some(issued_at) => OffsetDateTime::now_utc() > issued_at + code_lifetime,
            None => true,
        }
    }

    /// Sets the authenticated subject.
    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.subject = Some(subject.into());
    }

    /// Grants the requested scopes verbatim.
    pub fn grant_requested_scopes(&mut self) {
        self.granted_scopes = self.parameters.scope.clone();
    }

    /// Grants an explicit set of scopes.
    pub fn grant_scopes(&mut self, scopes: impl Into<String>) {
        self.granted_scopes = Some(scopes.into());
    }

    /// Grants the requested authorization details verbatim.
    pub fn grant_requested_authorization_details(&mut self) {
        self.granted_authorization_details = self.parameters.authorization_details.clone();
    }

    /// Adds a claim to issued access tokens.
    pub fn add_token_claim(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.additional_token_claims.insert(name.into(), value);
    }

    /// Adds a claim to issued ID tokens.
    pub fn add_id_token_claim(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.additional_id_token_claims.insert(name.into(), value);
    }

    /// Adds a claim to userinfo responses.
    pub fn add_userinfo_claim(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.additional_userinfo_claims.insert(name.into(), value);
    }

    /// Saves a policy scratch value.
    pub fn store_value(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.store.insert(key.into(), value);
    }

    /// Reads a policy scratch value.
    #[must_use]
    pub fn stored_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.store.get(key)
    }

    /// The scopes to embed in issued tokens: what the policy granted, or
    /// the requested scopes when the policy granted nothing narrower.
    #[must_use]
    pub fn effective_scopes(&self) -> String {
        self.granted_scopes
            .clone()
            .or_else(|| self.parameters.scope.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseType;

    fn session() -> AuthnSession {
        AuthnSession::new(
            "cid1",
            AuthorizationParameters {
                response_type: Some(ResponseType::Code),
                scope: Some("openid profile".to_string()),
                ..AuthorizationParameters::default()
            },
            time::Duration::seconds(600),
        )
    }

    #[test]
    fn test_new_session() {
        let session = session();
        assert!(!session.is_expired());
        assert!(session.authorization_code.is_none());
        assert!(session.is_authorization_code_expired(time::Duration::seconds(60)));
    }

    #[test]
    fn test_code_expiry() {
        let mut session = session();
        session.authorization_code = Some("code".to_string());
        session.auth_code_issued_at = Some(OffsetDateTime::now_utc());
        assert!(!session.is_authorization_code_expired(time::Duration::seconds(60)));

        session.auth_code_issued_at =
            Some(OffsetDateTime::now_utc() - time::Duration::seconds(61));
        assert!(session.is_authorization_code_expired(time::Duration::seconds(60)));
    }

    #[test]
    fn test_effective_scopes() {
        let mut session = session();
        assert_eq!(session.effective_scopes(), "openid profile");

        session.grant_scopes("openid");
        assert_eq!(session.effective_scopes(), "openid");
    }

    #[test]
    fn test_policy_mutations_survive_serde() {
        let mut session = session();
        session.set_subject("user-7");
        session.add_id_token_claim("acr", serde_json::json!("urn:mace:silver"));
        session.store_value("attempts", serde_json::json!(2));

        let json = serde_json::to_string(&session).unwrap();
        let parsed: AuthnSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.subject.as_deref(), Some("user-7"));
        assert_eq!(
            parsed.additional_id_token_claims["acr"],
            serde_json::json!("urn:mace:silver")
        );
        assert_eq!(parsed.stored_value("attempts"), Some(&serde_json::json!(2)));
    }
}
