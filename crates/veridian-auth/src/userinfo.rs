//! The OIDC UserInfo endpoint.
//!
//! Resolves a presented bearer or DPoP-bound access token, enforces its
//! binding, and returns the subject's claims filtered down to what the
//! grant carries. The response is plain JSON unless the client registered
//! a signed (and optionally encrypted) userinfo format.

use serde_json::json;

use crate::AuthResult;
use crate::context::{HttpRequestInfo, PresentedTokenScheme};
use crate::error::OAuthError;
use crate::jose::{self, encrypt_compact, rsa_public_key_from_jwk};
use crate::oauth::dpop;
use crate::server::AuthServer;
use crate::session::GrantSession;
use crate::token::lookup::PresentedTokenKind;
use crate::types::Client;

/// A userinfo response, plain or JOSE-wrapped.
#[derive(Debug, Clone, PartialEq)]
pub enum UserInfoResponse {
    /// `application/json`
    Json(serde_json::Value),
    /// `application/jwt`, signed and possibly encrypted.
    Jwt(String),
}

impl AuthServer {
    /// Handles `GET`/`POST /userinfo`.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` for every token failure, including binding
    /// mismatches.
    pub async fn userinfo(&self, http: &HttpRequestInfo) -> AuthResult<UserInfoResponse> {
        let (value, scheme) = http
            .presented_token()
            .ok_or_else(|| OAuthError::invalid_token("No access token presented"))?;

        let resolved = self
            .resolve_token(value, false)
            .await?
            .filter(|r| r.kind == PresentedTokenKind::Access)
            .ok_or_else(|| OAuthError::invalid_token("Unknown access token"))?;
        let grant = resolved.grant;

        if grant.is_expired() || grant.has_last_token_expired() {
            return Err(OAuthError::invalid_token("The access token has expired"));
        }
        if !grant.has_openid_scope() {
            return Err(OAuthError::invalid_token(
                "The access token has no openid scope",
            ));
        }

        self.enforce_binding(&grant, value, scheme, http)?;

        let client = self.load_client(&grant.options.client_id).await?;

        let mut claims = json!({ "sub": grant.options.subject });
        for (name, value) in &grant.options.additional_userinfo_claims {
            claims[name] = value.clone();
        }

        match client.meta.userinfo_signed_response_alg {
            Some(_) => self.signed_userinfo(claims, &client),
            None => Ok(UserInfoResponse::Json(claims)),
        }
    }

    /// A DPoP- or certificate-bound token is only good with the matching
    /// proof.
    fn enforce_binding(
        &self,
        grant: &GrantSession,
        token_value: &str,
        scheme: PresentedTokenScheme,
        http: &HttpRequestInfo,
    ) -> AuthResult<()> {
        if let Some(expected) = &grant.jwk_thumbprint {
            if scheme != PresentedTokenScheme::DPoP {
                return Err(OAuthError::invalid_token(
                    "DPoP-bound tokens require the DPoP scheme",
                ));
            }
            let proof = http
                .dpop_proof
                .as_deref()
                .ok_or_else(|| OAuthError::invalid_token("Missing DPoP proof"))?;
            let proof = dpop::validate_proof(
                proof,
                &http.method,
                &http.url,
                &self.config,
                Some(token_value),
            )
            .map_err(|e| OAuthError::invalid_token(e.public_description().to_string()))?;

            if &proof.thumbprint != expected {
                return Err(OAuthError::invalid_token(
                    "DPoP proof key does not match the token binding",
                ));
            }
        }

        if let Some(expected) = &grant.client_certificate_thumbprint {
            let presented = http
                .client_certificate
                .as_ref()
                .map(crate::oauth::mtls::ClientCertificate::thumbprint_sha256);
            if presented.as_deref() != Some(expected.as_str()) {
                return Err(OAuthError::invalid_token(
                    "Certificate does not match the token binding",
                ));
            }
        }

        Ok(())
    }

    fn signed_userinfo(
        &self,
        mut claims: serde_json::Value,
        client: &Client,
    ) -> AuthResult<UserInfoResponse> {
        claims["iss"] = json!(self.config.host);
        claims["aud"] = json!(client.id);

        let key = self
            .config
            .keys
            .resolve_signing_key(self.config.default_id_token_signature_key_id.as_deref())
            .map_err(|e| OAuthError::server_error(format!("Userinfo key: {e}")))?;
        let signed = jose::sign(key, None, &claims)
            .map_err(|e| OAuthError::server_error(format!("Userinfo signing: {e}")))?;

        match (
            client.meta.userinfo_encrypted_response_alg,
            client.meta.userinfo_encrypted_response_enc,
        ) {
            (Some(alg), enc) => {
                let jwk = client
                    .meta
                    .jwks
                    .as_ref()
                    .and_then(|jwks| {
                        jwks.keys.iter().find(|k| {
                            matches!(k.algorithm, jsonwebtoken::jwk::AlgorithmParameters::RSA(_))
                        })
                    })
                    .ok_or_else(|| {
                        OAuthError::invalid_client("Client has no RSA key for userinfo encryption")
                    })?;
                let public_key = rsa_public_key_from_jwk(jwk).map_err(|e| {
                    OAuthError::invalid_client(format!("Userinfo encryption key: {e}"))
                })?;

                let jwe = encrypt_compact(
                    signed.as_bytes(),
                    &public_key,
                    alg,
                    enc.unwrap_or(jose::ContentEncryption::A256Gcm),
                    jwk.common.key_id.as_deref(),
                    Some("JWT"),
                )
                .map_err(|e| OAuthError::server_error(format!("Userinfo encryption: {e}")))?;
                Ok(UserInfoResponse::Jwt(jwe))
            }
            (None, _) => Ok(UserInfoResponse::Jwt(signed)),
        }
    }
}
