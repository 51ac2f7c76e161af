//! Crypto and JOSE primitives.
//!
//! Everything the protocol engine needs from the JOSE stack lives here:
//! signing and verifying JWTs against the server keyset, compact JWE for
//! encrypted request objects and ID tokens, RFC 7638 JWK thumbprints, the
//! half-hash claims (`at_hash`, `c_hash`, `s_hash`) and random token strings.
//!
//! The signature machinery is built on `jsonwebtoken`; key generation uses
//! the RustCrypto `rsa`/`p256`/`p384` crates; content encryption uses
//! `aes-gcm`.

pub mod jwe;
pub mod jwt;
pub mod keys;
pub mod thumbprint;

pub use jwe::{
    ContentEncryption, KeyEncryption, decrypt_compact, encrypt_compact, rsa_public_key_from_jwk,
};
pub use jwt::{
    JWT_TYPE_ACCESS_TOKEN, JWT_TYPE_DPOP, VerifyOptions, half_hash, peek_claims, peek_header, sign,
};
pub use keys::{
    EncryptionKey, Jwk, Jwks, ServerKeySet, SigningKey, algorithm_name, is_symmetric,
};
pub use thumbprint::jwk_thumbprint_sha256;

use rand::Rng;

/// Errors from JOSE operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JoseError {
    /// Failed to encode or sign a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode or parse a token.
    #[error("Failed to decode token: {message}")]
    Decoding {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// The referenced key was not found in the keyset.
    #[error("Key not found: {kid}")]
    KeyNotFound {
        /// The key id that was not found.
        kid: String,
    },

    /// Key generation or parsing failed.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of the key problem.
        message: String,
    },

    /// JWE encryption failed.
    #[error("Encryption error: {message}")]
    Encryption {
        /// Description of the encryption error.
        message: String,
    },

    /// JWE decryption failed.
    #[error("Decryption error: {message}")]
    Decryption {
        /// Description of the decryption error.
        message: String,
    },
}

impl JoseError {
    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a new `Decoding` error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: kid.into() }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a new `Encryption` error.
    #[must_use]
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption {
            message: message.into(),
        }
    }

    /// Creates a new `Decryption` error.
    #[must_use]
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation failure rather than a
    /// key or encoding problem.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JoseError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::invalid_key(err.to_string())
            }
            _ => Self::decoding(err.to_string()),
        }
    }
}

/// Character set for opaque token values.
///
/// Alphanumeric only, so token values survive URL encoding and the opaque
/// length check in the userinfo/introspection lookup stays unambiguous.
const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a random alphanumeric token string of the given length.
///
/// Used for authorization codes, refresh tokens, opaque access tokens,
/// callback ids and PAR request URIs.
#[must_use]
pub fn random_token(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..TOKEN_CHARSET.len());
            TOKEN_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_token_length_and_charset() {
        for length in [20, 30, 64] {
            let token = random_token(length);
            assert_eq!(token.len(), length);
            assert!(token.bytes().all(|b| TOKEN_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn test_random_token_uniqueness() {
        let a = random_token(30);
        let b = random_token(30);
        assert_ne!(a, b);
    }
}
