//! Presented-token resolution.
//!
//! Userinfo, introspection and revocation all receive a token value and
//! need the grant session behind it. JWTs are verified against the server
//! keys and looked up by their `jti`; anything else is tried as a refresh
//! token (where allowed) and then as an opaque token id.

use crate::AuthResult;
use crate::jose;
use crate::server::AuthServer;
use crate::session::GrantSession;

/// What kind of token a presented value turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentedTokenKind {
    /// A live access token (JWT or opaque).
    Access,
    /// A refresh token.
    Refresh,
}

/// A resolved token and its grant session.
#[derive(Debug, Clone)]
pub struct ResolvedToken {
    /// The grant session behind the token.
    pub grant: GrantSession,

    /// What the presented value was.
    pub kind: PresentedTokenKind,
}

impl AuthServer {
    /// Resolves a presented token value to its grant session. Returns
    /// `None` for anything unverifiable or unknown; callers decide whether
    /// that is `invalid_token` or `{active: false}`.
    ///
    /// # Errors
    ///
    /// Returns storage errors only.
    pub(crate) async fn resolve_token(
        &self,
        value: &str,
        allow_refresh: bool,
    ) -> AuthResult<Option<ResolvedToken>> {
        if value.contains('.') {
            return self.resolve_jwt(value).await;
        }

        if allow_refresh {
            if let Some(grant) = self.grant_sessions.get_by_refresh_token(value).await? {
                return Ok(Some(ResolvedToken {
                    grant,
                    kind: PresentedTokenKind::Refresh,
                }));
            }
        }

        Ok(self
            .grant_sessions
            .get_by_token_id(value)
            .await?
            .map(|grant| ResolvedToken {
                grant,
                kind: PresentedTokenKind::Access,
            }))
    }

    /// Verifies a JWT access token with the server keys and resolves its
    /// `jti`. Expiry is judged by the grant session timestamps, not the
    /// JWT `exp`, so introspection can report on expired tokens.
    async fn resolve_jwt(&self, value: &str) -> AuthResult<Option<ResolvedToken>> {
        let Ok(header) = jose::jwt::peek_header(value) else {
            return Ok(None);
        };

        let key = match header.kid.as_deref() {
            Some(kid) => self.config.keys.signing_key(kid),
            None => self.config.keys.default_signing_key().ok(),
        };
        let Some(key) = key else {
            return Ok(None);
        };

        let options = jose::VerifyOptions::new(vec![key.algorithm])
            .with_issuer(&self.config.host)
            .allow_expired();
        let Ok(claims) =
            jose::jwt::verify::<serde_json::Value>(value, key.decoding_key(), &options)
        else {
            return Ok(None);
        };

        let Some(jti) = claims.get("jti").and_then(serde_json::Value::as_str) else {
            return Ok(None);
        };

        Ok(self
            .grant_sessions
            .get_by_token_id(jti)
            .await?
            .map(|grant| ResolvedToken {
                grant,
                kind: PresentedTokenKind::Access,
            }))
    }
}
