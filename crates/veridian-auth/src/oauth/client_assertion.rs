//! Client assertion validation (RFC 7523).
//!
//! Both JWT-based client authentication methods land here:
//! `private_key_jwt` verifies against the client's public JWKS and
//! `client_secret_jwt` verifies the HMAC with the client's raw secret.
//! The claim rules are identical: `iss = sub = client_id`, the audience
//! must name this server, `exp` must be present and close.

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::Configuration;
use crate::error::OAuthError;
use crate::jose::{self, is_symmetric};
use crate::oauth::jwks_cache::ClientJwksCache;
use crate::types::Client;

/// The assertion type registered for JWT bearer client assertions.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// An audience claim: single string or array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrArray {
    /// Single audience.
    String(String),
    /// Multiple audiences.
    Array(Vec<String>),
}

impl StringOrArray {
    /// Whether the audience names the given value.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::String(s) => s == value,
            Self::Array(values) => values.iter().any(|s| s == value),
        }
    }
}

/// Claims of a client assertion JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Issuer, must equal the client id.
    pub iss: String,

    /// Subject, must equal the client id.
    pub sub: String,

    /// Audience, must name the token endpoint or the issuer host.
    pub aud: StringOrArray,

    /// Expiration, required.
    pub exp: i64,

    /// Issued-at, bounds the assertion lifetime when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Assertion id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Reads the unverified `iss` claim to discover the claimed client id.
///
/// # Errors
///
/// Returns `invalid_client` when the assertion is not parseable or carries
/// no issuer.
pub fn extract_unverified_issuer(assertion: &str) -> AuthResult<String> {
    let claims = jose::peek_claims(assertion)
        .map_err(|_| OAuthError::invalid_client("Malformed client assertion"))?;
    claims
        .get("iss")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OAuthError::invalid_client("Client assertion has no issuer"))
}

/// Validates a `private_key_jwt` assertion against the client's JWKS.
///
/// # Errors
///
/// Returns `invalid_client` on any signature or claim failure.
pub async fn validate_private_key_jwt(
    assertion: &str,
    client: &Client,
    config: &Configuration,
    jwks_cache: &ClientJwksCache,
) -> AuthResult<AssertionClaims> {
    let header = jose::peek_header(assertion)
        .map_err(|_| OAuthError::invalid_client("Malformed client assertion"))?;

    let algorithms = accepted_algorithms(client, config)?;
    if !algorithms.contains(&header.alg) {
        return Err(OAuthError::invalid_client(format!(
            "Assertion algorithm {:?} not accepted",
            header.alg
        )));
    }
    if is_symmetric(header.alg) {
        return Err(OAuthError::invalid_client(
            "private_key_jwt requires an asymmetric algorithm",
        ));
    }

    let decoding_key = jwks_cache
        .decoding_key_for_client(client, header.kid.as_deref(), &algorithms)
        .await?;

    verify_assertion_claims(
        assertion,
        &decoding_key,
        header.alg,
        client,
        config,
        config.lifetimes.private_key_jwt_assertion.as_secs() as i64,
    )
}

/// Validates a `client_secret_jwt` assertion with the client's raw secret.
///
/// # Errors
///
/// Returns `invalid_client` on any signature or claim failure, or when the
/// client has no plaintext secret on record.
pub fn validate_client_secret_jwt(
    assertion: &str,
    client: &Client,
    config: &Configuration,
) -> AuthResult<AssertionClaims> {
    let header = jose::peek_header(assertion)
        .map_err(|_| OAuthError::invalid_client("Malformed client assertion"))?;

    if !is_symmetric(header.alg) {
        return Err(OAuthError::invalid_client(
            "client_secret_jwt requires an HMAC algorithm",
        ));
    }

    let secret = client.secret.as_deref().ok_or_else(|| {
        OAuthError::invalid_client("Client has no secret usable for client_secret_jwt")
    })?;
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    verify_assertion_claims(
        assertion,
        &decoding_key,
        header.alg,
        client,
        config,
        config.lifetimes.client_secret_jwt_assertion.as_secs() as i64,
    )
}

fn accepted_algorithms(client: &Client, config: &Configuration) -> AuthResult<Vec<Algorithm>> {
    match client.meta.token_endpoint_auth_signing_alg {
        Some(alg) => Ok(vec![alg]),
        None => Ok(config.client_signing_algorithms.clone()),
    }
}

fn verify_assertion_claims(
    assertion: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    client: &Client,
    config: &Configuration,
    max_lifetime_secs: i64,
) -> AuthResult<AssertionClaims> {
    let options = jose::VerifyOptions::new(vec![algorithm]);
    let claims: AssertionClaims = jose::jwt::verify(assertion, key, &options).map_err(|e| {
        tracing::debug!(client_id = %client.id, error = %e, "client assertion rejected");
        OAuthError::invalid_client(format!("Invalid client assertion: {e}"))
    })?;

    if claims.iss != client.id {
        return Err(OAuthError::invalid_client(
            "Assertion issuer must equal client_id",
        ));
    }
    if claims.sub != client.id {
        return Err(OAuthError::invalid_client(
            "Assertion subject must equal client_id",
        ));
    }

    let token_endpoint = config.token_endpoint();
    if !claims.aud.contains(&token_endpoint) && !claims.aud.contains(&config.host) {
        return Err(OAuthError::invalid_client(
            "Assertion audience must name this server",
        ));
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    match claims.iat {
        Some(iat) if claims.exp - iat > max_lifetime_secs => {
            return Err(OAuthError::invalid_client(format!(
                "Assertion lifetime exceeds {max_lifetime_secs} seconds"
            )));
        }
        None if claims.exp > now + max_lifetime_secs => {
            return Err(OAuthError::invalid_client(format!(
                "Assertion expiry more than {max_lifetime_secs} seconds away"
            )));
        }
        _ => {}
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use crate::jose::{ServerKeySet, SigningKey};
    use crate::types::ClientMetaInfo;

    fn config() -> Configuration {
        let keys = ServerKeySet::new()
            .with_signing_key(SigningKey::generate_rsa("sig-1", Algorithm::RS256).unwrap());
        Configuration::new("https://server.example.com", keys)
    }

    fn hmac_client(secret: &str) -> Client {
        Client {
            id: "cid1".to_string(),
            hashed_secret: None,
            secret: Some(secret.to_string()),
            hashed_registration_access_token: None,
            meta: ClientMetaInfo::default(),
        }
    }

    fn hmac_assertion(secret: &str, claims: &serde_json::Value) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims(exp_offset: i64, iat_offset: i64) -> serde_json::Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": "cid1",
            "sub": "cid1",
            "aud": "https://server.example.com/token",
            "exp": now + exp_offset,
            "iat": now + iat_offset,
            "jti": "assert-1"
        })
    }

    #[test]
    fn test_client_secret_jwt_accepts_valid_assertion() {
        let config = config();
        let client = hmac_client("top-secret");
        let assertion = hmac_assertion("top-secret", &valid_claims(60, 0));

        let claims = validate_client_secret_jwt(&assertion, &client, &config).unwrap();
        assert_eq!(claims.iss, "cid1");
        assert_eq!(claims.jti.as_deref(), Some("assert-1"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let config = config();
        let client = hmac_client("top-secret");
        let assertion = hmac_assertion("other-secret", &valid_claims(60, 0));

        let result = validate_client_secret_jwt(&assertion, &client, &config);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_issuer_mismatch_rejected() {
        let config = config();
        let client = hmac_client("top-secret");
        let mut claims = valid_claims(60, 0);
        claims["iss"] = json!("other-client");
        let assertion = hmac_assertion("top-secret", &claims);

        let result = validate_client_secret_jwt(&assertion, &client, &config);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_foreign_audience_rejected() {
        let config = config();
        let client = hmac_client("top-secret");
        let mut claims = valid_claims(60, 0);
        claims["aud"] = json!("https://other.example.com/token");
        let assertion = hmac_assertion("top-secret", &claims);

        let result = validate_client_secret_jwt(&assertion, &client, &config);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_issuer_host_audience_accepted() {
        let config = config();
        let client = hmac_client("top-secret");
        let mut claims = valid_claims(60, 0);
        claims["aud"] = json!(["https://server.example.com"]);
        let assertion = hmac_assertion("top-secret", &claims);

        assert!(validate_client_secret_jwt(&assertion, &client, &config).is_ok());
    }

    #[test]
    fn test_excessive_lifetime_rejected() {
        let config = config();
        let client = hmac_client("top-secret");
        // exp - iat = 301 exceeds the 300 second default.
        let assertion = hmac_assertion("top-secret", &valid_claims(301, 0));

        let result = validate_client_secret_jwt(&assertion, &client, &config);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_expired_assertion_rejected() {
        let config = config();
        let client = hmac_client("top-secret");
        let assertion = hmac_assertion("top-secret", &valid_claims(-10, -60));

        let result = validate_client_secret_jwt(&assertion, &client, &config);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_extract_unverified_issuer() {
        let assertion = hmac_assertion("whatever", &valid_claims(60, 0));
        assert_eq!(extract_unverified_issuer(&assertion).unwrap(), "cid1");

        assert!(extract_unverified_issuer("garbage").is_err());
    }

    #[test]
    fn test_asymmetric_assertion_rejected_for_secret_jwt() {
        let config = config();
        let client = hmac_client("top-secret");
        let key = SigningKey::generate_rsa("k", Algorithm::RS256).unwrap();
        let assertion = jose::sign(&key, None, &valid_claims(60, 0)).unwrap();

        let result = validate_client_secret_jwt(&assertion, &client, &config);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }
}
