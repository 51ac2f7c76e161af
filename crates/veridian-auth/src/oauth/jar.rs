//! JWT-secured authorization requests (RFC 9101).
//!
//! A request object is a JWS — optionally nested in a JWE addressed to one
//! of the server's `use=enc` keys — signed by the client. Its claims are
//! the authorization parameters, which take precedence over anything sent
//! in the query string.

use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::Configuration;
use crate::error::OAuthError;
use crate::jose::{self, decrypt_compact, is_symmetric};
use crate::oauth::jwks_cache::ClientJwksCache;
use crate::types::{AuthorizationParameters, Client};

/// Parses, decrypts and verifies a request object, returning the inner
/// authorization parameters.
///
/// # Errors
///
/// Returns `invalid_request_object` on any parse, decryption, signature or
/// claim failure.
pub async fn parse_request_object(
    request_object: &str,
    client: &Client,
    config: &Configuration,
    jwks_cache: &ClientJwksCache,
) -> AuthResult<AuthorizationParameters> {
    let jws = match request_object.matches('.').count() {
        // Three dots: a plain JWS.
        2 => request_object.to_string(),
        // Five parts: a JWE whose payload is the JWS.
        4 => decrypt_request_object(request_object, config)?,
        _ => {
            return Err(OAuthError::invalid_request_object(
                "Request object is neither a JWS nor a compact JWE",
            ));
        }
    };

    verify_request_object(&jws, client, config, jwks_cache).await
}

fn decrypt_request_object(compact: &str, config: &Configuration) -> AuthResult<String> {
    if !config.jar_encryption_enabled {
        return Err(OAuthError::invalid_request_object(
            "Encrypted request objects are not enabled",
        ));
    }

    let header = compact
        .split('.')
        .next()
        .and_then(|h| {
            use base64::Engine;
            base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(h).ok()
        })
        .and_then(|raw| serde_json::from_slice::<serde_json::Value>(&raw).ok())
        .ok_or_else(|| OAuthError::invalid_request_object("Malformed JWE header"))?;

    let kid = header.get("kid").and_then(serde_json::Value::as_str);

    let keys: Vec<_> = match kid {
        Some(kid) => config
            .keys
            .encryption_key(kid)
            .into_iter()
            .collect(),
        None => config.keys.encryption_keys().iter().collect(),
    };
    if keys.is_empty() {
        return Err(OAuthError::invalid_request_object(
            "No server encryption key matches the request object",
        ));
    }

    for key in keys {
        if let Ok((plaintext, _)) = decrypt_compact(compact, key.private_key()) {
            return String::from_utf8(plaintext).map_err(|_| {
                OAuthError::invalid_request_object("Decrypted request object is not UTF-8")
            });
        }
    }

    Err(OAuthError::invalid_request_object(
        "Request object decryption failed",
    ))
}

async fn verify_request_object(
    jws: &str,
    client: &Client,
    config: &Configuration,
    jwks_cache: &ClientJwksCache,
) -> AuthResult<AuthorizationParameters> {
    let header = jose::peek_header(jws)
        .map_err(|_| OAuthError::invalid_request_object("Malformed request object"))?;

    let algorithms = match client.meta.request_object_signing_alg {
        Some(alg) => vec![alg],
        None => config.jar_signing_algorithms.clone(),
    };
    if !algorithms.contains(&header.alg) {
        return Err(OAuthError::invalid_request_object(format!(
            "Request object algorithm {:?} not accepted",
            header.alg
        )));
    }
    if is_symmetric(header.alg) {
        return Err(OAuthError::invalid_request_object(
            "Request objects must use an asymmetric algorithm",
        ));
    }

    let kid = header.kid.as_deref().ok_or_else(|| {
        OAuthError::invalid_request_object("Request object header must carry a kid")
    })?;

    let decoding_key = jwks_cache
        .decoding_key_for_client(client, Some(kid), &algorithms)
        .await
        .map_err(|e| OAuthError::invalid_request_object(e.public_description().to_string()))?;

    let options = jose::VerifyOptions::new(vec![header.alg]);
    let claims: serde_json::Value = jose::jwt::verify(jws, &decoding_key, &options)
        .map_err(|e| OAuthError::invalid_request_object(format!("Request object: {e}")))?;

    // iss must be the client, aud must name this server.
    if claims.get("iss").and_then(serde_json::Value::as_str) != Some(client.id.as_str()) {
        return Err(OAuthError::invalid_request_object(
            "Request object issuer must be the client",
        ));
    }
    let aud_ok = match claims.get("aud") {
        Some(serde_json::Value::String(aud)) => aud == &config.host,
        Some(serde_json::Value::Array(auds)) => auds
            .iter()
            .filter_map(serde_json::Value::as_str)
            .any(|aud| aud == config.host),
        _ => false,
    };
    if !aud_ok {
        return Err(OAuthError::invalid_request_object(
            "Request object audience must be the issuer",
        ));
    }

    let exp = claims
        .get("exp")
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| OAuthError::invalid_request_object("Request object must carry exp"))?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    if exp > now + config.lifetimes.jar.as_secs() as i64 {
        return Err(OAuthError::invalid_request_object(
            "Request object expiry is too far in the future",
        ));
    }

    serde_json::from_value(claims)
        .map_err(|e| OAuthError::invalid_request_object(format!("Request object parameters: {e}")))
}
