//! RFC 7638 JWK thumbprints.
//!
//! A thumbprint is the base64url SHA-256 digest of the canonical JSON
//! containing only the key's required members, in lexicographic order.
//! Used for DPoP `cnf.jkt` binding and self-signed mTLS key matching.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use sha2::{Digest, Sha256};

use super::JoseError;

/// Builds the canonical thumbprint input from ordered `(member, value)`
/// pairs. The caller supplies members already in lexicographic order.
pub(crate) fn thumbprint_input(members: &[(&str, &str)]) -> String {
    let mut out = String::from("{");
    for (i, (k, v)) in members.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(k);
        out.push_str("\":\"");
        out.push_str(v);
        out.push('"');
    }
    out.push('}');
    out
}

/// Computes the RFC 7638 SHA-256 thumbprint of a client-supplied JWK.
///
/// # Errors
///
/// Returns an error for key types the server does not bind to.
pub fn jwk_thumbprint_sha256(jwk: &Jwk) -> Result<String, JoseError> {
    let input = match &jwk.algorithm {
        AlgorithmParameters::RSA(params) => {
            thumbprint_input(&[("e", &params.e), ("kty", "RSA"), ("n", &params.n)])
        }
        AlgorithmParameters::EllipticCurve(params) => {
            let crv = curve_name(&params.curve)?;
            thumbprint_input(&[("crv", crv), ("kty", "EC"), ("x", &params.x), ("y", &params.y)])
        }
        AlgorithmParameters::OctetKeyPair(params) => {
            let crv = curve_name(&params.curve)?;
            thumbprint_input(&[("crv", crv), ("kty", "OKP"), ("x", &params.x)])
        }
        AlgorithmParameters::OctetKey(_) => Err(JoseError::invalid_key(
            "Symmetric keys cannot be thumbprint-bound",
        ))?,
    };

    let digest = Sha256::digest(input.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

fn curve_name(curve: &EllipticCurve) -> Result<&'static str, JoseError> {
    match curve {
        EllipticCurve::P256 => Ok("P-256"),
        EllipticCurve::P384 => Ok("P-384"),
        EllipticCurve::P521 => Ok("P-521"),
        EllipticCurve::Ed25519 => Ok("Ed25519"),
    }
}
