//! Access and ID token minting.
//!
//! Access tokens come in two formats: signed JWTs (`typ=at+jwt`, RFC 9068
//! claim set) and opaque reference strings whose value doubles as the token
//! id. ID tokens are signed JWTs carrying the OIDC half-hash claims and any
//! client-specific additions, optionally encrypted to the client.

use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::Configuration;
use crate::error::OAuthError;
use crate::jose::{self, encrypt_compact, half_hash, random_token, rsa_public_key_from_jwk};
use crate::session::{GrantOptions, Token, TokenFormat, TokenType};
use crate::types::Client;

/// Proof-of-possession binding for a token issuance.
#[derive(Debug, Clone, Default)]
pub struct TokenBinding {
    /// DPoP proof key thumbprint.
    pub jwk_thumbprint: Option<String>,

    /// Client certificate thumbprint.
    pub certificate_thumbprint: Option<String>,
}

impl TokenBinding {
    /// Whether any binding is present.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.jwk_thumbprint.is_some() || self.certificate_thumbprint.is_some()
    }
}

/// Mints an access token per the grant options.
///
/// # Errors
///
/// Returns `server_error` when the signing key cannot be resolved or
/// signing fails.
pub fn mint_access_token(
    options: &GrantOptions,
    binding: &TokenBinding,
    config: &Configuration,
) -> AuthResult<Token> {
    let token_type = if binding.jwk_thumbprint.is_some() {
        TokenType::DPoP
    } else {
        TokenType::Bearer
    };

    match options.token_options.format {
        TokenFormat::Opaque => {
            let length = if options.token_options.opaque_length > 0 {
                options.token_options.opaque_length
            } else {
                config.opaque_token_length
            };
            let value = random_token(length);
            Ok(Token {
                id: value.clone(),
                format: TokenFormat::Opaque,
                value,
                token_type,
                jwk_thumbprint: binding.jwk_thumbprint.clone(),
                certificate_thumbprint: binding.certificate_thumbprint.clone(),
            })
        }
        TokenFormat::Jwt => {
            let key = config
                .keys
                .resolve_signing_key(options.token_options.signature_key_id.as_deref())
                .map_err(|e| OAuthError::server_error(format!("Access token key: {e}")))?;

            let id = Uuid::new_v4().to_string();
            let now = OffsetDateTime::now_utc().unix_timestamp();
            let mut claims = json!({
                "jti": id,
                "iss": config.host,
                "sub": options.subject,
                "client_id": options.client_id,
                "scope": options.granted_scopes,
                "iat": now,
                "exp": now + options.token_options.lifetime_secs,
            });

            if let Some(details) = &options.granted_authorization_details {
                claims["authorization_details"] = json!(details);
            }

            let mut cnf = serde_json::Map::new();
            if let Some(jkt) = &binding.jwk_thumbprint {
                cnf.insert("jkt".to_string(), json!(jkt));
            }
            if let Some(x5t) = &binding.certificate_thumbprint {
                cnf.insert("x5t#S256".to_string(), json!(x5t));
            }
            if !cnf.is_empty() {
                claims["cnf"] = serde_json::Value::Object(cnf);
            }

            for (name, value) in &options.token_options.additional_claims {
                claims[name] = value.clone();
            }

            let value = jose::sign(key, Some(jose::JWT_TYPE_ACCESS_TOKEN), &claims)
                .map_err(|e| OAuthError::server_error(format!("Access token signing: {e}")))?;

            Ok(Token {
                id,
                format: TokenFormat::Jwt,
                value,
                token_type,
                jwk_thumbprint: binding.jwk_thumbprint.clone(),
                certificate_thumbprint: binding.certificate_thumbprint.clone(),
            })
        }
    }
}

/// Raw material for the ID token half-hash claims.
#[derive(Debug, Clone, Default)]
pub struct IdTokenInputs<'a> {
    /// The access token issued alongside, hashed into `at_hash`.
    pub access_token: Option<&'a str>,

    /// The authorization code issued alongside, hashed into `c_hash`.
    pub code: Option<&'a str>,

    /// The state parameter, hashed into `s_hash`.
    pub state: Option<&'a str>,

    /// The request nonce, echoed verbatim.
    pub nonce: Option<&'a str>,
}

/// Mints an ID token for a subject and client.
///
/// The signing key follows the client's registered algorithm when one is
/// set; the half-hash family follows that key's algorithm. When the client
/// registered encryption metadata the signed token is nested in a JWE.
///
/// # Errors
///
/// Returns `server_error` on key or signing problems, `invalid_client`
/// when requested encryption is impossible.
pub fn mint_id_token(
    subject: &str,
    client: &Client,
    config: &Configuration,
    inputs: &IdTokenInputs<'_>,
    additional_claims: &serde_json::Map<String, serde_json::Value>,
) -> AuthResult<String> {
    let key = match client.meta.id_token_signed_response_alg {
        Some(alg) => config
            .keys
            .resolve_signing_key(config.default_id_token_signature_key_id.as_deref())
            .ok()
            .filter(|k| k.algorithm == alg)
            .ok_or_else(|| {
                OAuthError::server_error(format!("No ID token key for algorithm {alg:?}"))
            })?,
        None => config
            .keys
            .resolve_signing_key(config.default_id_token_signature_key_id.as_deref())
            .map_err(|e| OAuthError::server_error(format!("ID token key: {e}")))?,
    };

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut claims = json!({
        "iss": config.host,
        "sub": subject,
        "aud": client.id,
        "iat": now,
        "exp": now + config.lifetimes.id_token.as_secs() as i64,
    });

    if let Some(nonce) = inputs.nonce {
        claims["nonce"] = json!(nonce);
    }
    if let Some(token) = inputs.access_token {
        claims["at_hash"] = json!(half_hash(key.algorithm, token));
    }
    if let Some(code) = inputs.code {
        claims["c_hash"] = json!(half_hash(key.algorithm, code));
    }
    if let Some(state) = inputs.state {
        claims["s_hash"] = json!(half_hash(key.algorithm, state));
    }
    for (name, value) in additional_claims {
        claims[name] = value.clone();
    }

    let signed = jose::sign(key, None, &claims)
        .map_err(|e| OAuthError::server_error(format!("ID token signing: {e}")))?;

    match (
        client.meta.id_token_encrypted_response_alg,
        client.meta.id_token_encrypted_response_enc,
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
                    OAuthError::invalid_client("Client has no RSA key for ID token encryption")
                })?;
            let public_key = rsa_public_key_from_jwk(jwk)
                .map_err(|e| OAuthError::invalid_client(format!("ID token encryption key: {e}")))?;

            encrypt_compact(
                signed.as_bytes(),
                &public_key,
                alg,
                enc.unwrap_or(jose::ContentEncryption::A256Gcm),
                jwk.common.key_id.as_deref(),
                Some("JWT"),
            )
            .map_err(|e| OAuthError::server_error(format!("ID token encryption: {e}")))
        }
        (None, _) => Ok(signed),
    }
}
