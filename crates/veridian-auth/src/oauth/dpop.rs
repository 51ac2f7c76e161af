//! DPoP proof validation (RFC 9449).
//!
//! A proof is a JWT of type `dpop+jwt` carrying exactly one public JWK in
//! its header and signed by that key. The engine checks the proof against
//! the request it accompanies and hands back the key thumbprint, which
//! becomes the `cnf.jkt` binding of issued tokens.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use url::Url;

use crate::AuthResult;
use crate::config::Configuration;
use crate::error::OAuthError;
use crate::jose::{self, jwk_thumbprint_sha256};

/// Claims of a DPoP proof JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopClaims {
    /// Unique proof id.
    pub jti: String,

    /// HTTP method of the request the proof covers.
    pub htm: String,

    /// HTTP URI of the request, without query and fragment.
    pub htu: String,

    /// When the proof was created.
    pub iat: i64,

    /// Hash of the access token, present when the proof accompanies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,

    /// Server-provided nonce, when challenged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// A validated DPoP proof.
#[derive(Debug, Clone)]
pub struct DpopProof {
    /// The proof key from the header.
    pub jwk: Jwk,

    /// RFC 7638 thumbprint of the proof key (the `cnf.jkt` value).
    pub thumbprint: String,

    /// The verified claims.
    pub claims: DpopClaims,
}

/// Computes the `ath` value for an access token: base64url SHA-256.
#[must_use]
pub fn access_token_hash(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

/// Validates a DPoP proof against the covered request.
///
/// `expected_access_token` is set when the proof accompanies a token
/// presentation (userinfo, introspection); the proof must then carry a
/// matching `ath`.
///
/// # Errors
///
/// Returns `invalid_request` at the token endpoint semantics for malformed
/// proofs (callers presenting access tokens map it to `invalid_token`).
pub fn validate_proof(
    proof: &str,
    method: &str,
    request_url: &str,
    config: &Configuration,
    expected_access_token: Option<&str>,
) -> AuthResult<DpopProof> {
    let header =
        jose::peek_header(proof).map_err(|_| OAuthError::invalid_request("Malformed DPoP proof"))?;

    if header.typ.as_deref() != Some(jose::JWT_TYPE_DPOP) {
        return Err(OAuthError::invalid_request(
            "DPoP proof must have typ dpop+jwt",
        ));
    }
    if !config.dpop_signing_algorithms.contains(&header.alg) {
        return Err(OAuthError::invalid_request(format!(
            "DPoP algorithm {:?} not accepted",
            header.alg
        )));
    }

    let jwk = header
        .jwk
        .ok_or_else(|| OAuthError::invalid_request("DPoP proof carries no JWK"))?;
    if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
        return Err(OAuthError::invalid_request(
            "DPoP proof key must be asymmetric",
        ));
    }

    let decoding_key = DecodingKey::from_jwk(&jwk)
        .map_err(|e| OAuthError::invalid_request(format!("Unusable DPoP proof key: {e}")))?;

    // Proof freshness is judged on iat, not exp.
    let options = jose::VerifyOptions::new(vec![header.alg]).allow_expired();
    let claims: DpopClaims = jose::jwt::verify(proof, &decoding_key, &options)
        .map_err(|e| OAuthError::invalid_request(format!("Invalid DPoP proof: {e}")))?;

    if !claims.htm.eq_ignore_ascii_case(method) {
        return Err(OAuthError::invalid_request("DPoP htm does not match request"));
    }
    if !htu_matches(&claims.htu, request_url) {
        return Err(OAuthError::invalid_request("DPoP htu does not match request"));
    }

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let window = config.lifetimes.dpop.as_secs() as i64;
    if (now - claims.iat).abs() > window {
        return Err(OAuthError::invalid_request("DPoP proof iat is not fresh"));
    }

    if let Some(token) = expected_access_token {
        let expected = access_token_hash(token);
        if claims.ath.as_deref() != Some(expected.as_str()) {
            return Err(OAuthError::invalid_request(
                "DPoP ath does not match the presented access token",
            ));
        }
    }

    let thumbprint = jwk_thumbprint_sha256(&jwk)
        .map_err(|e| OAuthError::invalid_request(format!("DPoP proof key: {e}")))?;

    Ok(DpopProof {
        jwk,
        thumbprint,
        claims,
    })
}

/// Compares `htu` with the request URL, ignoring query and fragment,
/// case-insensitively for scheme and host.
fn htu_matches(htu: &str, request_url: &str) -> bool {
    let (Ok(a), Ok(b)) = (Url::parse(htu), Url::parse(request_url)) else {
        return false;
    };
    a.scheme().eq_ignore_ascii_case(b.scheme())
        && a.host_str()
            .zip(b.host_str())
            .is_some_and(|(x, y)| x.eq_ignore_ascii_case(y))
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path() == b.path()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use rand::rngs::OsRng;
    use serde_json::json;

    use crate::jose::{ServerKeySet, SigningKey};

    fn config() -> Configuration {
        let keys = ServerKeySet::new()
            .with_signing_key(SigningKey::generate_rsa("sig-1", Algorithm::RS256).unwrap());
        let mut config = Configuration::new("https://server.example.com", keys);
        config.dpop_enabled = true;
        config
    }

    /// An ES256 proof key with its public JWK.
    struct ProofKey {
        encoding_key: EncodingKey,
        jwk: Jwk,
    }

    fn proof_key() -> ProofKey {
        use p256::pkcs8::EncodePrivateKey;

        let secret = p256::SecretKey::random(&mut OsRng);
        let signing = p256::ecdsa::SigningKey::from(&secret);
        let point = signing.verifying_key().to_encoded_point(false);

        let pem = secret.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes()).unwrap();

        let jwk: Jwk = serde_json::from_value(json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
            "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
        }))
        .unwrap();

        ProofKey { encoding_key, jwk }
    }

    fn proof_with(key: &ProofKey, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some("dpop+jwt".to_string());
        header.jwk = Some(key.jwk.clone());
        jsonwebtoken::encode(&header, claims, &key.encoding_key).unwrap()
    }

    fn claims(htm: &str, htu: &str, iat_offset: i64) -> serde_json::Value {
        json!({
            "jti": "proof-1",
            "htm": htm,
            "htu": htu,
            "iat": OffsetDateTime::now_utc().unix_timestamp() + iat_offset,
        })
    }

    #[test]
    fn test_valid_proof() {
        let key = proof_key();
        let proof = proof_with(
            &key,
            &claims("POST", "https://server.example.com/token", 0),
        );

        let result = validate_proof(
            &proof,
            "POST",
            "https://server.example.com/token",
            &config(),
            None,
        )
        .unwrap();

        assert_eq!(result.claims.jti, "proof-1");
        assert_eq!(result.thumbprint.len(), 43);
        assert_eq!(result.thumbprint, jwk_thumbprint_sha256(&key.jwk).unwrap());
    }

    #[test]
    fn test_htu_ignores_query_and_case() {
        let key = proof_key();
        let proof = proof_with(
            &key,
            &claims("POST", "https://SERVER.example.com/token", 0),
        );

        assert!(
            validate_proof(
                &proof,
                "POST",
                "https://server.example.com/token?debug=1",
                &config(),
                None,
            )
            .is_ok()
        );
    }

    #[test]
    fn test_wrong_method_rejected() {
        let key = proof_key();
        let proof = proof_with(&key, &claims("GET", "https://server.example.com/token", 0));

        let result = validate_proof(
            &proof,
            "POST",
            "https://server.example.com/token",
            &config(),
            None,
        );
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }

    #[test]
    fn test_wrong_url_rejected() {
        let key = proof_key();
        let proof = proof_with(&key, &claims("POST", "https://other.example.com/token", 0));

        let result = validate_proof(
            &proof,
            "POST",
            "https://server.example.com/token",
            &config(),
            None,
        );
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }

    #[test]
    fn test_stale_proof_rejected() {
        let key = proof_key();
        let proof = proof_with(
            &key,
            &claims("POST", "https://server.example.com/token", -301),
        );

        let result = validate_proof(
            &proof,
            "POST",
            "https://server.example.com/token",
            &config(),
            None,
        );
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }

    #[test]
    fn test_missing_typ_rejected() {
        let key = proof_key();
        let mut header = Header::new(Algorithm::ES256);
        header.jwk = Some(key.jwk.clone());
        let proof = jsonwebtoken::encode(
            &header,
            &claims("POST", "https://server.example.com/token", 0),
            &key.encoding_key,
        )
        .unwrap();

        let result = validate_proof(
            &proof,
            "POST",
            "https://server.example.com/token",
            &config(),
            None,
        );
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }

    #[test]
    fn test_missing_jwk_rejected() {
        let key = proof_key();
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some("dpop+jwt".to_string());
        let proof = jsonwebtoken::encode(
            &header,
            &claims("POST", "https://server.example.com/token", 0),
            &key.encoding_key,
        )
        .unwrap();

        let result = validate_proof(
            &proof,
            "POST",
            "https://server.example.com/token",
            &config(),
            None,
        );
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }

    #[test]
    fn test_ath_binding() {
        let key = proof_key();
        let token = "issued-access-token";

        let mut with_ath = claims("GET", "https://server.example.com/userinfo", 0);
        with_ath["ath"] = json!(access_token_hash(token));
        let proof = proof_with(&key, &with_ath);

        assert!(
            validate_proof(
                &proof,
                "GET",
                "https://server.example.com/userinfo",
                &config(),
                Some(token),
            )
            .is_ok()
        );

        // Same proof against a different token fails.
        let result = validate_proof(
            &proof,
            "GET",
            "https://server.example.com/userinfo",
            &config(),
            Some("another-token"),
        );
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }

    #[test]
    fn test_disallowed_algorithm_rejected() {
        let key = proof_key();
        let proof = proof_with(
            &key,
            &claims("POST", "https://server.example.com/token", 0),
        );

        let mut config = config();
        config.dpop_signing_algorithms = vec![Algorithm::RS256];

        let result = validate_proof(
            &proof,
            "POST",
            "https://server.example.com/token",
            &config,
            None,
        );
        assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
    }
}
