//! Compact JWE encryption and decryption.
//!
//! Supports the key-management algorithms `RSA-OAEP-256` and `RSA-OAEP` with
//! the content encryption algorithms `A128GCM` and `A256GCM`. This covers
//! encrypted request objects (JAR), encrypted ID tokens / userinfo responses
//! and encrypted JARM responses; anything else is rejected.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::JoseError;

/// Supported JWE key-management algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEncryption {
    /// RSAES OAEP using SHA-256.
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,

    /// RSAES OAEP using SHA-1 (legacy clients).
    #[serde(rename = "RSA-OAEP")]
    RsaOaep,
}

impl KeyEncryption {
    /// Returns the JWA name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsaOaep256 => "RSA-OAEP-256",
            Self::RsaOaep => "RSA-OAEP",
        }
    }
}

/// Supported JWE content-encryption algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncryption {
    /// AES-128 GCM.
    #[serde(rename = "A128GCM")]
    A128Gcm,

    /// AES-256 GCM.
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

impl ContentEncryption {
    /// Returns the JWA name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A128Gcm => "A128GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    fn key_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JweHeader {
    alg: KeyEncryption,
    enc: ContentEncryption,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cty: Option<String>,
}

/// Encrypts a payload into a compact JWE for the given RSA public key.
///
/// # Errors
///
/// Returns an error if key wrapping or content encryption fails.
pub fn encrypt_compact(
    payload: &[u8],
    recipient: &RsaPublicKey,
    alg: KeyEncryption,
    enc: ContentEncryption,
    kid: Option<&str>,
    cty: Option<&str>,
) -> Result<String, JoseError> {
    let header = JweHeader {
        alg,
        enc,
        kid: kid.map(str::to_string),
        cty: cty.map(str::to_string),
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| JoseError::encryption(e.to_string()))?,
    );

    let mut cek = vec![0u8; enc.key_len()];
    OsRng.fill_bytes(&mut cek);
    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);

    let encrypted_key = match alg {
        KeyEncryption::RsaOaep256 => recipient
            .encrypt(&mut OsRng, Oaep::new::<sha2::Sha256>(), &cek)
            .map_err(|e| JoseError::encryption(e.to_string()))?,
        KeyEncryption::RsaOaep => recipient
            .encrypt(&mut OsRng, Oaep::new::<sha1::Sha1>(), &cek)
            .map_err(|e| JoseError::encryption(e.to_string()))?,
    };

    // AAD is the ASCII of the protected header per RFC 7516.
    let sealed = match enc {
        ContentEncryption::A128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(&cek)
                .map_err(|e| JoseError::encryption(e.to_string()))?;
            cipher
                .encrypt(
                    Nonce::from_slice(&iv),
                    Payload {
                        msg: payload,
                        aad: header_b64.as_bytes(),
                    },
                )
                .map_err(|e| JoseError::encryption(e.to_string()))?
        }
        ContentEncryption::A256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(&cek)
                .map_err(|e| JoseError::encryption(e.to_string()))?;
            cipher
                .encrypt(
                    Nonce::from_slice(&iv),
                    Payload {
                        msg: payload,
                        aad: header_b64.as_bytes(),
                    },
                )
                .map_err(|e| JoseError::encryption(e.to_string()))?
        }
    };

    let (ciphertext, tag) = sealed.split_at(sealed.len() - 16);

    Ok(format!(
        "{}.{}.{}.{}.{}",
        header_b64,
        URL_SAFE_NO_PAD.encode(&encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ))
}

/// Decrypts a compact JWE with the server's RSA private key.
///
/// Returns the plaintext and the `kid` the sender addressed, when present.
///
/// # Errors
///
/// Returns an error if the serialization, the key unwrap or the content
/// decryption fails.
pub fn decrypt_compact(
    compact: &str,
    private_key: &RsaPrivateKey,
) -> Result<(Vec<u8>, Option<String>), JoseError> {
    let parts: Vec<&str> = compact.split('.').collect();
    if parts.len() != 5 {
        return Err(JoseError::decryption("Compact JWE must have five parts"));
    }

    let header_raw = URL_SAFE_NO_PAD
        .decode(parts[0])
        .map_err(|e| JoseError::decryption(e.to_string()))?;
    let header: JweHeader =
        serde_json::from_slice(&header_raw).map_err(|e| JoseError::decryption(e.to_string()))?;

    let encrypted_key = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| JoseError::decryption(e.to_string()))?;
    let iv = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|e| JoseError::decryption(e.to_string()))?;
    let ciphertext = URL_SAFE_NO_PAD
        .decode(parts[3])
        .map_err(|e| JoseError::decryption(e.to_string()))?;
    let tag = URL_SAFE_NO_PAD
        .decode(parts[4])
        .map_err(|e| JoseError::decryption(e.to_string()))?;

    if iv.len() != 12 || tag.len() != 16 {
        return Err(JoseError::decryption("Invalid IV or tag length"));
    }

    let cek = match header.alg {
        KeyEncryption::RsaOaep256 => private_key
            .decrypt(Oaep::new::<sha2::Sha256>(), &encrypted_key)
            .map_err(|e| JoseError::decryption(e.to_string()))?,
        KeyEncryption::RsaOaep => private_key
            .decrypt(Oaep::new::<sha1::Sha1>(), &encrypted_key)
            .map_err(|e| JoseError::decryption(e.to_string()))?,
    };
    if cek.len() != header.enc.key_len() {
        return Err(JoseError::decryption("Content key length mismatch"));
    }

    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);

    let plaintext = match header.enc {
        ContentEncryption::A128Gcm => {
            let cipher = Aes128Gcm::new_from_slice(&cek)
                .map_err(|e| JoseError::decryption(e.to_string()))?;
            cipher
                .decrypt(
                    Nonce::from_slice(&iv),
                    Payload {
                        msg: &sealed,
                        aad: parts[0].as_bytes(),
                    },
                )
                .map_err(|_| JoseError::decryption("Authenticated decryption failed"))?
        }
        ContentEncryption::A256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(&cek)
                .map_err(|e| JoseError::decryption(e.to_string()))?;
            cipher
                .decrypt(
                    Nonce::from_slice(&iv),
                    Payload {
                        msg: &sealed,
                        aad: parts[0].as_bytes(),
                    },
                )
                .map_err(|_| JoseError::decryption("Authenticated decryption failed"))?
        }
    };

    Ok((plaintext, header.kid))
}

/// Builds an RSA public key from a client-supplied JWK, for encrypting
/// responses (ID tokens, userinfo, JARM) to the client.
///
/// # Errors
///
/// Returns an error when the JWK is not an RSA key or its members do not
/// decode.
pub fn rsa_public_key_from_jwk(jwk: &jsonwebtoken::jwk::Jwk) -> Result<RsaPublicKey, JoseError> {
    use jsonwebtoken::jwk::AlgorithmParameters;

    let AlgorithmParameters::RSA(params) = &jwk.algorithm else {
        return Err(JoseError::invalid_key(
            "Response encryption requires an RSA key",
        ));
    };

    let n = URL_SAFE_NO_PAD
        .decode(&params.n)
        .map_err(|e| JoseError::invalid_key(e.to_string()))?;
    let e = URL_SAFE_NO_PAD
        .decode(&params.e)
        .map_err(|e| JoseError::invalid_key(e.to_string()))?;

    RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n),
        rsa::BigUint::from_bytes_be(&e),
    )
    .map_err(|e| JoseError::invalid_key(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jose::keys::EncryptionKey;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = EncryptionKey::generate("enc-1").unwrap();

        for (alg, enc) in [
            (KeyEncryption::RsaOaep256, ContentEncryption::A256Gcm),
            (KeyEncryption::RsaOaep256, ContentEncryption::A128Gcm),
            (KeyEncryption::RsaOaep, ContentEncryption::A256Gcm),
        ] {
            let compact = encrypt_compact(
                b"the quick brown fox",
                &key.public_key(),
                alg,
                enc,
                Some("enc-1"),
                Some("JWT"),
            )
            .unwrap();

            let (plaintext, kid) = decrypt_compact(&compact, key.private_key()).unwrap();
            assert_eq!(plaintext, b"the quick brown fox");
            assert_eq!(kid.as_deref(), Some("enc-1"));
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let key_a = EncryptionKey::generate("a").unwrap();
        let key_b = EncryptionKey::generate("b").unwrap();

        let compact = encrypt_compact(
            b"payload",
            &key_a.public_key(),
            KeyEncryption::RsaOaep256,
            ContentEncryption::A256Gcm,
            None,
            None,
        )
        .unwrap();

        assert!(decrypt_compact(&compact, key_b.private_key()).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = EncryptionKey::generate("a").unwrap();
        let compact = encrypt_compact(
            b"payload",
            &key.public_key(),
            KeyEncryption::RsaOaep256,
            ContentEncryption::A256Gcm,
            None,
            None,
        )
        .unwrap();

        // Flip a character in the ciphertext part.
        let mut parts: Vec<String> = compact.split('.').map(str::to_string).collect();
        let mut ct: Vec<u8> = parts[3].clone().into_bytes();
        ct[0] = if ct[0] == b'A' { b'B' } else { b'A' };
        parts[3] = String::from_utf8(ct).unwrap();
        let tampered = parts.join(".");

        assert!(decrypt_compact(&tampered, key.private_key()).is_err());
    }

    #[test]
    fn test_malformed_input_rejected() {
        let key = EncryptionKey::generate("a").unwrap();
        assert!(decrypt_compact("only.three.parts", key.private_key()).is_err());
        assert!(decrypt_compact("a.b.c.d.e", key.private_key()).is_err());
    }
}
