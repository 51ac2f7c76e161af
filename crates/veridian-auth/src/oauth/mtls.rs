//! Mutual-TLS client verification and certificate binding.
//!
//! TLS termination is external: the host hands the engine a pre-parsed
//! [`ClientCertificate`]. Two verification styles exist: PKI clients match
//! their registered subject DN or SAN entries; self-signed clients match a
//! key in their JWKS whose certificate is the presented one.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::JwkSet;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::AuthResult;
use crate::error::OAuthError;
use crate::types::Client;

/// The peer certificate, parsed by the TLS terminator.
#[derive(Debug, Clone)]
pub struct ClientCertificate {
    /// RFC 4514 subject distinguished name.
    pub subject_dn: String,

    /// SAN DNS entries.
    pub san_dns: Vec<String>,

    /// SAN IP entries.
    pub san_ip: Vec<String>,

    /// The DER-encoded certificate.
    pub der: Vec<u8>,
}

impl ClientCertificate {
    /// The base64url SHA-256 thumbprint, the `cnf.x5t#S256` value.
    #[must_use]
    pub fn thumbprint_sha256(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(&self.der))
    }

    /// The base64url SHA-1 thumbprint (`x5t`).
    #[must_use]
    pub fn thumbprint_sha1(&self) -> String {
        URL_SAFE_NO_PAD.encode(Sha1::digest(&self.der))
    }
}

/// Verifies a PKI mTLS client: the certificate must carry one of the
/// registered identifiers.
///
/// # Errors
///
/// Returns `invalid_client` when nothing matches.
pub fn authenticate_tls_client(client: &Client, certificate: &ClientCertificate) -> AuthResult<()> {
    if let Some(expected) = &client.meta.tls_client_auth_subject_dn {
        if &certificate.subject_dn == expected {
            return Ok(());
        }
    }
    if let Some(expected) = &client.meta.tls_client_auth_san_dns {
        if certificate.san_dns.iter().any(|dns| dns == expected) {
            return Ok(());
        }
    }
    if let Some(expected) = &client.meta.tls_client_auth_san_ip {
        if certificate.san_ip.iter().any(|ip| ip == expected) {
            return Ok(());
        }
    }

    Err(OAuthError::invalid_client(
        "Client certificate matches no registered TLS identifier",
    ))
}

/// Verifies a self-signed mTLS client: some JWK in the client's set must
/// reference the presented certificate, by thumbprint or by embedded chain,
/// and the embedded certificate must be the presented one.
///
/// # Errors
///
/// Returns `invalid_client` when no key matches.
pub fn authenticate_self_signed_tls_client(
    client: &Client,
    certificate: &ClientCertificate,
    jwks: &JwkSet,
) -> AuthResult<()> {
    let thumb_sha1 = certificate.thumbprint_sha1();
    let thumb_sha256 = certificate.thumbprint_sha256();
    let der_b64 = STANDARD.encode(&certificate.der);

    for key in &jwks.keys {
        // x5c entries carry the certificate itself; comparing the leaf is
        // the public-key equality check.
        if let Some(chain) = &key.common.x509_chain {
            match chain.first() {
                Some(leaf) if *leaf == der_b64 => return Ok(()),
                Some(_) => continue,
                None => {}
            }
        }

        if let Some(x5t) = &key.common.x509_sha1_fingerprint {
            if *x5t == thumb_sha1 || *x5t == thumb_sha256 {
                return Ok(());
            }
        }
    }

    Err(OAuthError::invalid_client(
        "No client JWK matches the presented certificate",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientMetaInfo;

    fn certificate() -> ClientCertificate {
        ClientCertificate {
            subject_dn: "CN=client.example.com,O=Example".to_string(),
            san_dns: vec!["client.example.com".to_string()],
            san_ip: vec!["192.0.2.7".to_string()],
            der: b"fake-der-bytes".to_vec(),
        }
    }

    fn client(meta: ClientMetaInfo) -> Client {
        Client {
            id: "cid1".to_string(),
            hashed_secret: None,
            secret: None,
            hashed_registration_access_token: None,
            meta,
        }
    }

    #[test]
    fn test_subject_dn_match() {
        let client = client(ClientMetaInfo {
            tls_client_auth_subject_dn: Some("CN=client.example.com,O=Example".to_string()),
            ..ClientMetaInfo::default()
        });
        assert!(authenticate_tls_client(&client, &certificate()).is_ok());
    }

    #[test]
    fn test_san_dns_match() {
        let client = client(ClientMetaInfo {
            tls_client_auth_san_dns: Some("client.example.com".to_string()),
            ..ClientMetaInfo::default()
        });
        assert!(authenticate_tls_client(&client, &certificate()).is_ok());
    }

    #[test]
    fn test_san_ip_match() {
        let client = client(ClientMetaInfo {
            tls_client_auth_san_ip: Some("192.0.2.7".to_string()),
            ..ClientMetaInfo::default()
        });
        assert!(authenticate_tls_client(&client, &certificate()).is_ok());
    }

    #[test]
    fn test_no_identifier_match_rejected() {
        let client = client(ClientMetaInfo {
            tls_client_auth_subject_dn: Some("CN=other.example.com".to_string()),
            tls_client_auth_san_dns: Some("other.example.com".to_string()),
            ..ClientMetaInfo::default()
        });
        let result = authenticate_tls_client(&client, &certificate());
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_self_signed_x5c_match() {
        let cert = certificate();
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "n": "AQAB",
                "e": "AQAB",
                "x5c": [STANDARD.encode(&cert.der)]
            }]
        }))
        .unwrap();

        assert!(authenticate_self_signed_tls_client(&client(ClientMetaInfo::default()), &cert, &jwks).is_ok());
    }

    #[test]
    fn test_self_signed_x5t_match() {
        let cert = certificate();
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "n": "AQAB",
                "e": "AQAB",
                "x5t": cert.thumbprint_sha1()
            }]
        }))
        .unwrap();

        assert!(authenticate_self_signed_tls_client(&client(ClientMetaInfo::default()), &cert, &jwks).is_ok());
    }

    #[test]
    fn test_self_signed_foreign_certificate_rejected() {
        let cert = certificate();
        let jwks: JwkSet = serde_json::from_value(serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "n": "AQAB",
                "e": "AQAB",
                "x5c": [STANDARD.encode(b"some-other-der")]
            }]
        }))
        .unwrap();

        let result = authenticate_self_signed_tls_client(&client(ClientMetaInfo::default()), &cert, &jwks);
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[test]
    fn test_thumbprints_are_base64url() {
        let cert = certificate();
        assert_eq!(cert.thumbprint_sha256().len(), 43);
        assert_eq!(cert.thumbprint_sha1().len(), 27);
        assert!(!cert.thumbprint_sha256().contains('='));
    }
}
