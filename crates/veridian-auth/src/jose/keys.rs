//! Server key material.
//!
//! The server receives a private keyset at construction time. Signing keys
//! back JWT issuance (access tokens, ID tokens, JARM responses); encryption
//! keys (`use=enc`) back JWE decryption of encrypted request objects.
//!
//! Key generation helpers exist mainly for tests and bootstrap tooling;
//! production deployments load PEM material.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use super::JoseError;
use super::thumbprint::thumbprint_input;

/// A public JSON Web Key as served from the JWKS endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key id.
    pub kid: String,

    /// Key use ("sig" or "enc").
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl Jwk {
    /// Computes the RFC 7638 SHA-256 thumbprint of this key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is missing its required members.
    pub fn thumbprint_sha256(&self) -> Result<String, JoseError> {
        use sha2::{Digest, Sha256};

        let input = match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(|| {
                    JoseError::invalid_key("RSA key missing modulus")
                })?;
                let e = self.e.as_deref().ok_or_else(|| {
                    JoseError::invalid_key("RSA key missing exponent")
                })?;
                thumbprint_input(&[("e", e), ("kty", "RSA"), ("n", n)])
            }
            "EC" => {
                let crv = self.crv.as_deref().ok_or_else(|| {
                    JoseError::invalid_key("EC key missing curve")
                })?;
                let x = self.x.as_deref().ok_or_else(|| {
                    JoseError::invalid_key("EC key missing x coordinate")
                })?;
                let y = self.y.as_deref().ok_or_else(|| {
                    JoseError::invalid_key("EC key missing y coordinate")
                })?;
                thumbprint_input(&[("crv", crv), ("kty", "EC"), ("x", x), ("y", y)])
            }
            other => {
                return Err(JoseError::invalid_key(format!(
                    "Unsupported key type: {other}"
                )));
            }
        };

        let digest = Sha256::digest(input.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(digest))
    }
}

/// A public JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// Internal representation of public key data for JWKS export.
#[derive(Clone)]
enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { crv: &'static str, x: Vec<u8>, y: Vec<u8> },
}

impl PublicKeyData {
    fn to_jwk(&self, kid: &str, use_: &str, alg: &str) -> Jwk {
        match self {
            Self::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: kid.to_string(),
                use_: use_.to_string(),
                alg: alg.to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            Self::Ec { crv, x, y } => Jwk {
                kty: "EC".to_string(),
                kid: kid.to_string(),
                use_: use_.to_string(),
                alg: alg.to_string(),
                n: None,
                e: None,
                crv: Some((*crv).to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

/// A private signing key with its public counterpart.
pub struct SigningKey {
    /// Key id.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: Algorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: PublicKeyData,
}

impl SigningKey {
    /// Generates a new RSA signing key.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not RSA-based or generation fails.
    pub fn generate_rsa(kid: impl Into<String>, algorithm: Algorithm) -> Result<Self, JoseError> {
        if !matches!(
            algorithm,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ) {
            return Err(JoseError::invalid_key(format!(
                "Algorithm {algorithm:?} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;
        Self::from_rsa_private_key(kid, algorithm, private_key)
    }

    /// Loads an RSA signing key from a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM data is invalid.
    pub fn from_rsa_pem(
        kid: impl Into<String>,
        algorithm: Algorithm,
        private_pem: &str,
    ) -> Result<Self, JoseError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;
        Self::from_rsa_private_key(kid, algorithm, private_key)
    }

    fn from_rsa_private_key(
        kid: impl Into<String>,
        algorithm: Algorithm,
        private_key: RsaPrivateKey,
    ) -> Result<Self, JoseError> {
        let public_key: RsaPublicKey = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;

        let n_b64 = URL_SAFE_NO_PAD.encode(&n);
        let e_b64 = URL_SAFE_NO_PAD.encode(&e);
        let decoding_key = DecodingKey::from_rsa_components(&n_b64, &e_b64)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
        })
    }

    /// Generates a new EC signing key (ES256 on P-256, ES384 on P-384).
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is not EC-based or generation fails.
    pub fn generate_ec(kid: impl Into<String>, algorithm: Algorithm) -> Result<Self, JoseError> {
        match algorithm {
            Algorithm::ES256 => Self::generate_p256(kid),
            Algorithm::ES384 => Self::generate_p384(kid),
            other => Err(JoseError::invalid_key(format!(
                "Algorithm {other:?} is not EC-based"
            ))),
        }
    }

    fn generate_p256(kid: impl Into<String>) -> Result<Self, JoseError> {
        let secret_key = p256::SecretKey::random(&mut OsRng);
        let signing_key = p256::ecdsa::SigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JoseError::invalid_key("Missing x coordinate"))?
            .to_vec();
        let y = point
            .y()
            .ok_or_else(|| JoseError::invalid_key("Missing y coordinate"))?
            .to_vec();

        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(&x);
        let y_b64 = URL_SAFE_NO_PAD.encode(&y);
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            algorithm: Algorithm::ES256,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                crv: "P-256",
                x,
                y,
            },
        })
    }

    fn generate_p384(kid: impl Into<String>) -> Result<Self, JoseError> {
        let secret_key = p384::SecretKey::random(&mut OsRng);
        let signing_key = p384::ecdsa::SigningKey::from(&secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JoseError::invalid_key("Missing x coordinate"))?
            .to_vec();
        let y = point
            .y()
            .ok_or_else(|| JoseError::invalid_key("Missing y coordinate"))?
            .to_vec();

        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(&x);
        let y_b64 = URL_SAFE_NO_PAD.encode(&y);
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid: kid.into(),
            algorithm: Algorithm::ES384,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                crv: "P-384",
                x,
                y,
            },
        })
    }

    /// The key used to sign tokens.
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// The public key used to verify signatures.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Exports the public half as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        self.public_key_data
            .to_jwk(&self.kid, "sig", algorithm_name(self.algorithm))
    }
}

/// A private RSA decryption key (`use=enc`) for encrypted request objects.
pub struct EncryptionKey {
    /// Key id.
    pub kid: String,

    private_key: RsaPrivateKey,
    public_key_data: PublicKeyData,
}

impl EncryptionKey {
    /// Generates a new RSA encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate(kid: impl Into<String>) -> Result<Self, JoseError> {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;
        Ok(Self::from_private_key(kid, private_key))
    }

    /// Loads an RSA encryption key from a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM data is invalid.
    pub fn from_pem(kid: impl Into<String>, private_pem: &str) -> Result<Self, JoseError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
            .map_err(|e| JoseError::invalid_key(e.to_string()))?;
        Ok(Self::from_private_key(kid, private_key))
    }

    fn from_private_key(kid: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        let public_key = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();
        Self {
            kid: kid.into(),
            private_key,
            public_key_data: PublicKeyData::Rsa { n, e },
        }
    }

    /// The private RSA key used to unwrap content-encryption keys.
    #[must_use]
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// The public RSA key clients encrypt to.
    #[must_use]
    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// Exports the public half as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        self.public_key_data.to_jwk(&self.kid, "enc", "RSA-OAEP-256")
    }
}

/// The server's private keyset.
///
/// Holds signing keys and decryption keys, looked up by kid. The first
/// signing key is the default when no per-role key id is configured.
#[derive(Default)]
pub struct ServerKeySet {
    signing_keys: Vec<SigningKey>,
    encryption_keys: Vec<EncryptionKey>,
}

impl ServerKeySet {
    /// Creates an empty keyset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signing key.
    #[must_use]
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_keys.push(key);
        self
    }

    /// Adds an encryption key.
    #[must_use]
    pub fn with_encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_keys.push(key);
        self
    }

    /// Looks up a signing key by kid.
    #[must_use]
    pub fn signing_key(&self, kid: &str) -> Option<&SigningKey> {
        self.signing_keys.iter().find(|k| k.kid == kid)
    }

    /// The default signing key (first in the set).
    ///
    /// # Errors
    ///
    /// Returns an error if the keyset holds no signing key.
    pub fn default_signing_key(&self) -> Result<&SigningKey, JoseError> {
        self.signing_keys
            .first()
            .ok_or_else(|| JoseError::invalid_key("Keyset holds no signing key"))
    }

    /// Resolves a signing key: by kid when given, the default otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the kid is unknown or the keyset is empty.
    pub fn resolve_signing_key(&self, kid: Option<&str>) -> Result<&SigningKey, JoseError> {
        match kid {
            Some(kid) => self
                .signing_key(kid)
                .ok_or_else(|| JoseError::key_not_found(kid)),
            None => self.default_signing_key(),
        }
    }

    /// Looks up an encryption key by kid. Only `use=enc` keys are eligible.
    #[must_use]
    pub fn encryption_key(&self, kid: &str) -> Option<&EncryptionKey> {
        self.encryption_keys.iter().find(|k| k.kid == kid)
    }

    /// All encryption keys.
    #[must_use]
    pub fn encryption_keys(&self) -> &[EncryptionKey] {
        &self.encryption_keys
    }

    /// Exports the public JWKS served from the JWKS endpoint.
    #[must_use]
    pub fn public_jwks(&self) -> Jwks {
        let mut keys: Vec<Jwk> = self.signing_keys.iter().map(SigningKey::to_jwk).collect();
        keys.extend(self.encryption_keys.iter().map(EncryptionKey::to_jwk));
        Jwks { keys }
    }
}

/// Returns the JWA name of a `jsonwebtoken` algorithm.
#[must_use]
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Returns `true` for HMAC algorithms, which are rejected wherever a
/// public-key method is required.
#[must_use]
pub fn is_symmetric(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    )
}
