//! JWT signing and verification against the server keyset.
//!
//! Helpers here are claim-shape agnostic: the token issuance engine and the
//! request-object verifier both hand in `serde` values and decide the claim
//! semantics themselves. Validation defaults to zero leeway; per-call
//! overrides are possible through [`VerifyOptions`].

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256, Sha384, Sha512};

use super::JoseError;
use super::keys::SigningKey;

/// `typ` header value for access tokens (RFC 9068).
pub const JWT_TYPE_ACCESS_TOKEN: &str = "at+jwt";

/// `typ` header value for DPoP proofs (RFC 9449).
pub const JWT_TYPE_DPOP: &str = "dpop+jwt";

/// Signs claims with a server signing key.
///
/// # Errors
///
/// Returns an error if serialization or signing fails.
pub fn sign<T: Serialize>(
    key: &SigningKey,
    typ: Option<&str>,
    claims: &T,
) -> Result<String, JoseError> {
    let mut header = Header::new(key.algorithm);
    header.kid = Some(key.kid.clone());
    if let Some(typ) = typ {
        header.typ = Some(typ.to_string());
    }

    jsonwebtoken::encode(&header, claims, key.encoding_key())
        .map_err(|e| JoseError::encoding(e.to_string()))
}

/// Verification options.
///
/// Leeway is zero unless overridden; issuer/audience checks run only when a
/// value is supplied.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Accepted signature algorithms.
    pub algorithms: Vec<Algorithm>,

    /// Expected issuer, when checked.
    pub issuer: Option<String>,

    /// Expected audience, when checked.
    pub audience: Option<String>,

    /// Whether `exp` must be present and in the future.
    pub validate_exp: bool,

    /// Per-claim leeway in seconds.
    pub leeway: u64,
}

impl VerifyOptions {
    /// Creates options accepting the given algorithms, with expiry
    /// validation on and zero leeway.
    #[must_use]
    pub fn new(algorithms: Vec<Algorithm>) -> Self {
        Self {
            algorithms,
            issuer: None,
            audience: None,
            validate_exp: true,
            leeway: 0,
        }
    }

    /// Requires the given issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Requires the given audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Disables expiry validation.
    #[must_use]
    pub fn allow_expired(mut self) -> Self {
        self.validate_exp = false;
        self
    }

    /// Sets the validation leeway.
    #[must_use]
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    fn to_validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.algorithms = self.algorithms.clone();
        validation.leeway = self.leeway;
        validation.validate_exp = self.validate_exp;
        validation.validate_aud = self.audience.is_some();
        validation.required_spec_claims.clear();
        if self.validate_exp {
            validation.required_spec_claims.insert("exp".to_string());
        }
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        }
        validation
    }
}

/// Verifies a JWT and deserializes its claims.
///
/// # Errors
///
/// Returns an error on signature, algorithm or claim failures.
pub fn verify<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    options: &VerifyOptions,
) -> Result<T, JoseError> {
    let data = jsonwebtoken::decode::<T>(token, key, &options.to_validation())?;
    Ok(data.claims)
}

/// Reads a JWT header without verifying the signature.
///
/// # Errors
///
/// Returns an error if the token is not a well-formed JWS.
pub fn peek_header(token: &str) -> Result<Header, JoseError> {
    jsonwebtoken::decode_header(token).map_err(|e| JoseError::decoding(e.to_string()))
}

/// Reads JWT claims without verifying the signature.
///
/// Used only to discover the claimed `iss`/`client_id` before the real
/// verification runs against that client's keys.
///
/// # Errors
///
/// Returns an error if the token is not a well-formed JWS.
pub fn peek_claims(token: &str) -> Result<serde_json::Value, JoseError> {
    let mut parts = token.split('.');
    let (_, payload) = (
        parts
            .next()
            .ok_or_else(|| JoseError::decoding("Missing JWT header"))?,
        parts
            .next()
            .ok_or_else(|| JoseError::decoding("Missing JWT payload"))?,
    );
    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| JoseError::decoding(e.to_string()))?;
    serde_json::from_slice(&raw).map_err(|e| JoseError::decoding(e.to_string()))
}

/// Computes a half-hash claim value (`at_hash`, `c_hash`, `s_hash`).
///
/// The hash family tracks the signing algorithm's strength: SHA-256 for
/// `*256`, SHA-384 for `*384`, SHA-512 for `*512`. The claim is the
/// base64url encoding of the left half of the digest.
#[must_use]
pub fn half_hash(algorithm: Algorithm, value: &str) -> String {
    let digest: Vec<u8> = match algorithm {
        Algorithm::HS384 | Algorithm::RS384 | Algorithm::ES384 | Algorithm::PS384 => {
            Sha384::digest(value.as_bytes()).to_vec()
        }
        Algorithm::HS512 | Algorithm::RS512 | Algorithm::PS512 => {
            Sha512::digest(value.as_bytes()).to_vec()
        }
        _ => Sha256::digest(value.as_bytes()).to_vec(),
    };
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}
