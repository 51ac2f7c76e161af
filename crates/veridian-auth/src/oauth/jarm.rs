//! JWT-secured authorization response mode (JARM).
//!
//! Response parameters are wrapped in a signed JWT — optionally encrypted
//! to the client — and delivered as the single `response` parameter through
//! the chosen `*.jwt` response mode.

use serde_json::json;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::Configuration;
use crate::error::OAuthError;
use crate::jose::{self, encrypt_compact, rsa_public_key_from_jwk};
use crate::types::Client;

/// Wraps authorization response parameters into the JARM `response` JWT.
///
/// # Errors
///
/// Returns `server_error` when no JARM key is configured or signing fails,
/// `invalid_client` when the client requests encryption but publishes no
/// usable key.
pub fn create_response_jwt(
    parameters: &[(String, String)],
    client: &Client,
    config: &Configuration,
) -> AuthResult<String> {
    let key = config
        .keys
        .resolve_signing_key(config.default_jarm_signature_key_id.as_deref())
        .map_err(|e| OAuthError::server_error(format!("JARM key: {e}")))?;

    if let Some(expected) = client.meta.authorization_signed_response_alg {
        if expected != key.algorithm {
            return Err(OAuthError::server_error(format!(
                "Client expects JARM algorithm {expected:?}, server key uses {:?}",
                key.algorithm
            )));
        }
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut claims = json!({
        "iss": config.host,
        "aud": client.id,
        "iat": now,
        "exp": now + config.lifetimes.jarm.as_secs() as i64,
    });
    for (name, value) in parameters {
        claims[name] = json!(value);
    }

    let signed = jose::sign(key, None, &claims)
        .map_err(|e| OAuthError::server_error(format!("JARM signing: {e}")))?;

    match (
        client.meta.authorization_encrypted_response_alg,
        client.meta.authorization_encrypted_response_enc,
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
                    OAuthError::invalid_client("Client has no RSA key for JARM encryption")
                })?;
            let public_key = rsa_public_key_from_jwk(jwk)
                .map_err(|e| OAuthError::invalid_client(format!("JARM encryption key: {e}")))?;

            encrypt_compact(
                signed.as_bytes(),
                &public_key,
                alg,
                enc.unwrap_or(jose::ContentEncryption::A256Gcm),
                jwk.common.key_id.as_deref(),
                Some("JWT"),
            )
            .map_err(|e| OAuthError::server_error(format!("JARM encryption: {e}")))
        }
        (None, _) => Ok(signed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;

    use crate::jose::{ServerKeySet, SigningKey, VerifyOptions};
    use crate::types::ClientMetaInfo;

    fn config() -> Configuration {
        let keys = ServerKeySet::new()
            .with_signing_key(SigningKey::generate_rsa("jarm-1", Algorithm::RS256).unwrap());
        Configuration::new("https://server.example.com", keys).with_jarm("jarm-1")
    }

    fn client() -> Client {
        Client {
            id: "cid1".to_string(),
            hashed_secret: None,
            secret: None,
            hashed_registration_access_token: None,
            meta: ClientMetaInfo::default(),
        }
    }

    #[test]
    fn test_response_jwt_carries_parameters() {
        let config = config();
        let parameters = vec![
            ("code".to_string(), "auth-code-1".to_string()),
            ("state".to_string(), "s-1".to_string()),
        ];

        let jwt = create_response_jwt(&parameters, &client(), &config).unwrap();

        let key = config.keys.signing_key("jarm-1").unwrap();
        let claims: serde_json::Value = jose::jwt::verify(
            &jwt,
            key.decoding_key(),
            &VerifyOptions::new(vec![Algorithm::RS256]),
        )
        .unwrap();

        assert_eq!(claims["iss"], "https://server.example.com");
        assert_eq!(claims["aud"], "cid1");
        assert_eq!(claims["code"], "auth-code-1");
        assert_eq!(claims["state"], "s-1");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
    }

    #[test]
    fn test_algorithm_pin_mismatch_fails() {
        let config = config();
        let mut client = client();
        client.meta.authorization_signed_response_alg = Some(Algorithm::ES256);

        let result = create_response_jwt(&[], &client, &config);
        assert!(matches!(result, Err(OAuthError::ServerError { .. })));
    }

    #[test]
    fn test_encryption_requires_client_key() {
        let config = config();
        let mut client = client();
        client.meta.authorization_encrypted_response_alg = Some(jose::KeyEncryption::RsaOaep256);

        let result = create_response_jwt(&[], &client, &config);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_encrypted_response_round_trip() {
        use crate::jose::EncryptionKey;

        let config = config();

        // The "client" keeps an RSA decryption key and registers its public
        // half in its JWKS.
        let client_enc = EncryptionKey::generate("client-enc-1").unwrap();
        let public = client_enc.to_jwk();
        let jwks: jsonwebtoken::jwk::JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": public.kid,
                "use": "enc",
                "n": public.n.unwrap(),
                "e": public.e.unwrap(),
            }]
        }))
        .unwrap();

        let mut client = client();
        client.meta.jwks = Some(jwks);
        client.meta.authorization_encrypted_response_alg = Some(jose::KeyEncryption::RsaOaep256);
        client.meta.authorization_encrypted_response_enc = Some(jose::ContentEncryption::A256Gcm);

        let parameters = vec![("code".to_string(), "c-1".to_string())];
        let jwe = create_response_jwt(&parameters, &client, &config).unwrap();
        assert_eq!(jwe.matches('.').count(), 4);

        let (inner, _) = crate::jose::decrypt_compact(&jwe, client_enc.private_key()).unwrap();
        let inner_jwt = String::from_utf8(inner).unwrap();

        let key = config.keys.signing_key("jarm-1").unwrap();
        let claims: serde_json::Value = jose::jwt::verify(
            &inner_jwt,
            key.decoding_key(),
            &VerifyOptions::new(vec![Algorithm::RS256]),
        )
        .unwrap();
        assert_eq!(claims["code"], "c-1");
    }
}
