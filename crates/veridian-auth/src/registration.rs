//! Dynamic client registration and management (RFC 7591 / 7592).
//!
//! `POST /register` mints a client id, a secret for secret-based methods
//! and a registration access token. Every later read, update or delete of
//! `/register/{client_id}` requires that token, verified against its
//! bcrypt hash. A host-supplied plugin may coerce defaults before
//! validation and decorate the record after.

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::OAuthError;
use crate::jose::random_token;
use crate::server::AuthServer;
use crate::types::{AuthMethod, Client, ClientMetaInfo, GrantType};

/// Length of generated secrets and registration access tokens.
const GENERATED_SECRET_LENGTH: usize = 30;

/// The registration response: the metadata echoed back plus the issued
/// credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// The issued client id.
    pub client_id: String,

    /// The issued secret, returned exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// The management token, returned exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,

    /// The management URI for this client.
    pub registration_client_uri: String,

    /// The registered metadata.
    #[serde(flatten)]
    pub meta: ClientMetaInfo,
}

impl AuthServer {
    /// Handles `POST /register`.
    ///
    /// # Errors
    ///
    /// Returns `invalid_request` for invalid metadata.
    pub async fn register_client(
        &self,
        mut meta: ClientMetaInfo,
    ) -> AuthResult<RegistrationResponse> {
        self.ensure_dcr_enabled()?;

        if let Some(plugin) = &self.config.dcr_plugin {
            plugin.before_validation(&mut meta);
        }
        self.validate_client_meta(&meta)?;

        let client_id = uuid::Uuid::new_v4().to_string();
        let (client_secret, hashed_secret, plaintext_kept) = self.generate_secret(&meta)?;
        let registration_access_token = random_token(GENERATED_SECRET_LENGTH);
        let hashed_registration_access_token = hash_secret(&registration_access_token)?;

        let mut client = Client {
            id: client_id.clone(),
            hashed_secret,
            secret: plaintext_kept,
            hashed_registration_access_token: Some(hashed_registration_access_token),
            meta,
        };

        if let Some(plugin) = &self.config.dcr_plugin {
            plugin.after_validation(&mut client);
        }

        self.clients.save(&client).await?;

        tracing::info!(client_id = %client.id, "client registered");

        Ok(RegistrationResponse {
            client_id: client.id.clone(),
            client_secret,
            registration_access_token: Some(registration_access_token),
            registration_client_uri: self.registration_client_uri(&client.id),
            meta: client.meta,
        })
    }

    /// Handles `GET /register/{client_id}`.
    ///
    /// # Errors
    ///
    /// Returns `access_denied` for a bad management token.
    pub async fn read_client(
        &self,
        client_id: &str,
        registration_access_token: &str,
    ) -> AuthResult<RegistrationResponse> {
        self.ensure_dcr_enabled()?;
        let client = self
            .managed_client(client_id, registration_access_token)
            .await?;

        Ok(RegistrationResponse {
            client_id: client.id.clone(),
            client_secret: None,
            registration_access_token: None,
            registration_client_uri: self.registration_client_uri(&client.id),
            meta: client.meta,
        })
    }

    /// Handles `PUT /register/{client_id}`. The metadata is replaced
    /// wholesale after re-validation; credentials are untouched.
    ///
    /// # Errors
    ///
    /// Returns `access_denied` for a bad management token and
    /// `invalid_request` for invalid metadata.
    pub async fn update_client(
        &self,
        client_id: &str,
        registration_access_token: &str,
        mut meta: ClientMetaInfo,
    ) -> AuthResult<RegistrationResponse> {
        self.ensure_dcr_enabled()?;
        let mut client = self
            .managed_client(client_id, registration_access_token)
            .await?;

        if let Some(plugin) = &self.config.dcr_plugin {
            plugin.before_validation(&mut meta);
        }
        self.validate_client_meta(&meta)?;

        client.meta = meta;
        if let Some(plugin) = &self.config.dcr_plugin {
            plugin.after_validation(&mut client);
        }
        self.clients.save(&client).await?;

        Ok(RegistrationResponse {
            client_id: client.id.clone(),
            client_secret: None,
            registration_access_token: None,
            registration_client_uri: self.registration_client_uri(&client.id),
            meta: client.meta,
        })
    }

    /// Handles `DELETE /register/{client_id}`.
    ///
    /// # Errors
    ///
    /// Returns `access_denied` for a bad management token.
    pub async fn delete_registered_client(
        &self,
        client_id: &str,
        registration_access_token: &str,
    ) -> AuthResult<()> {
        self.ensure_dcr_enabled()?;
        let client = self
            .managed_client(client_id, registration_access_token)
            .await?;
        self.clients.delete(&client.id).await?;
        tracing::info!(client_id = %client.id, "client deleted");
        Ok(())
    }

    fn ensure_dcr_enabled(&self) -> AuthResult<()> {
        if self.config.dcr_enabled {
            Ok(())
        } else {
            Err(OAuthError::invalid_request(
                "Dynamic client registration is not enabled",
            ))
        }
    }

    /// Loads a client and verifies its management token.
    async fn managed_client(
        &self,
        client_id: &str,
        registration_access_token: &str,
    ) -> AuthResult<Client> {
        let client = self
            .clients
            .get(client_id)
            .await?
            .ok_or_else(|| OAuthError::access_denied("Unknown client"))?;

        let hashed = client
            .hashed_registration_access_token
            .as_deref()
            .ok_or_else(|| OAuthError::access_denied("Client is not DCR-managed"))?;

        match bcrypt::verify(registration_access_token, hashed) {
            Ok(true) => Ok(client),
            _ => Err(OAuthError::access_denied(
                "Invalid registration access token",
            )),
        }
    }

    fn validate_client_meta(&self, meta: &ClientMetaInfo) -> AuthResult<()> {
        if meta.grant_types.is_empty() {
            return Err(OAuthError::invalid_request(
                "At least one grant type is required",
            ));
        }
        for grant_type in &meta.grant_types {
            if !self.config.is_grant_type_enabled(*grant_type) {
                return Err(OAuthError::invalid_request(format!(
                    "Grant type {grant_type} is not enabled"
                )));
            }
        }
        for response_type in &meta.response_types {
            if !self.config.response_types.contains(response_type) {
                return Err(OAuthError::invalid_request(format!(
                    "Response type {response_type} is not enabled"
                )));
            }
        }
        if !self
            .config
            .is_authn_method_enabled(meta.token_endpoint_auth_method)
        {
            return Err(OAuthError::invalid_request(format!(
                "Authentication method {} is not enabled",
                meta.token_endpoint_auth_method
            )));
        }
        if meta.grant_types.contains(&GrantType::AuthorizationCode) && meta.redirect_uris.is_empty()
        {
            return Err(OAuthError::invalid_request(
                "The authorization_code grant requires redirect URIs",
            ));
        }
        for uri in &meta.redirect_uris {
            if url::Url::parse(uri).is_err() {
                return Err(OAuthError::invalid_request(format!(
                    "Invalid redirect URI: {uri}"
                )));
            }
        }
        Ok(())
    }

    /// Generates credentials for the registered authentication method.
    /// Returns `(returned secret, stored hash, plaintext kept)` — the
    /// plaintext is persisted only for `client_secret_jwt`, which needs it
    /// to verify HMACs.
    fn generate_secret(
        &self,
        meta: &ClientMetaInfo,
    ) -> AuthResult<(Option<String>, Option<String>, Option<String>)> {
        match meta.token_endpoint_auth_method {
            AuthMethod::ClientSecretBasic | AuthMethod::ClientSecretPost => {
                let secret = random_token(GENERATED_SECRET_LENGTH);
                let hashed = hash_secret(&secret)?;
                Ok((Some(secret), Some(hashed), None))
            }
            AuthMethod::ClientSecretJwt => {
                let secret = random_token(GENERATED_SECRET_LENGTH);
                let hashed = hash_secret(&secret)?;
                Ok((Some(secret.clone()), Some(hashed), Some(secret)))
            }
            AuthMethod::None
            | AuthMethod::PrivateKeyJwt
            | AuthMethod::TlsClientAuth
            | AuthMethod::SelfSignedTlsClientAuth => Ok((None, None, None)),
        }
    }

    fn registration_client_uri(&self, client_id: &str) -> String {
        format!("{}/register/{client_id}", self.config.host)
    }
}

fn hash_secret(secret: &str) -> AuthResult<String> {
    bcrypt::hash(secret, bcrypt::DEFAULT_COST)
        .map_err(|e| OAuthError::server_error(format!("Secret hashing: {e}")))
}
