//! Discovery document and public JWKS.

use serde_json::json;

use crate::jose::{Jwks, algorithm_name};
use crate::server::AuthServer;
use crate::types::{AuthMethod, ResponseMode};

impl AuthServer {
    /// Builds the `/.well-known/openid-configuration` document.
    #[must_use]
    pub fn discovery_document(&self) -> serde_json::Value {
        let config = &self.config;
        let host = config.host.trim_end_matches('/');

        let mut doc = json!({
            "issuer": host,
            "authorization_endpoint": format!("{host}/authorize"),
            "token_endpoint": format!("{host}/token"),
            "userinfo_endpoint": format!("{host}/userinfo"),
            "introspection_endpoint": format!("{host}/introspect"),
            "revocation_endpoint": format!("{host}/revoke"),
            "jwks_uri": format!("{host}/jwks"),
            "scopes_supported": config.scopes.iter().map(|s| s.id().to_string()).collect::<Vec<_>>(),
            "grant_types_supported": config.grant_types,
            "response_types_supported": config.response_types,
            "response_modes_supported": config
                .response_modes
                .iter()
                .filter(|m| **m != ResponseMode::Jwt)
                .collect::<Vec<_>>(),
            "subject_types_supported": config.subject_types,
            "token_endpoint_auth_methods_supported": config.client_authn_methods,
            "code_challenge_methods_supported": config.code_challenge_methods,
            "id_token_signing_alg_values_supported": self
                .config
                .keys
                .public_jwks()
                .keys
                .iter()
                .filter(|k| k.use_ == "sig")
                .map(|k| k.alg.clone())
                .collect::<Vec<_>>(),
            "claims_parameter_supported": true,
            "request_parameter_supported": config.jar_enabled,
            "request_uri_parameter_supported": config.par_enabled,
        });

        if config
            .client_authn_methods
            .iter()
            .any(|m| matches!(m, AuthMethod::PrivateKeyJwt | AuthMethod::ClientSecretJwt))
        {
            doc["token_endpoint_auth_signing_alg_values_supported"] = json!(
                config
                    .client_signing_algorithms
                    .iter()
                    .map(|a| algorithm_name(*a))
                    .collect::<Vec<_>>()
            );
        }

        if config.par_enabled {
            doc["pushed_authorization_request_endpoint"] = json!(format!("{host}/par"));
            doc["require_pushed_authorization_requests"] = json!(config.par_required);
        }
        if config.jar_enabled {
            doc["request_object_signing_alg_values_supported"] = json!(
                config
                    .jar_signing_algorithms
                    .iter()
                    .map(|a| algorithm_name(*a))
                    .collect::<Vec<_>>()
            );
            doc["require_signed_request_object"] = json!(config.jar_required);
        }
        if config.jarm_enabled {
            doc["authorization_signing_alg_values_supported"] = json!(
                config
                    .default_jarm_signature_key_id
                    .as_deref()
                    .and_then(|kid| self.config.keys.signing_key(kid))
                    .map(|k| vec![algorithm_name(k.algorithm)])
                    .unwrap_or_default()
            );
        }
        if config.dpop_enabled {
            doc["dpop_signing_alg_values_supported"] = json!(
                config
                    .dpop_signing_algorithms
                    .iter()
                    .map(|a| algorithm_name(*a))
                    .collect::<Vec<_>>()
            );
        }
        if config.tls_bound_tokens_enabled {
            doc["tls_client_certificate_bound_access_tokens"] = json!(true);
        }
        if config.authorization_details_enabled {
            doc["authorization_details_supported"] = json!(true);
        }
        if config.dcr_enabled {
            doc["registration_endpoint"] = json!(format!("{host}/register"));
        }
        if config.issuer_response_parameter_enabled {
            doc["authorization_response_iss_parameter_supported"] = json!(true);
        }

        doc
    }

    /// The public JWKS served from `/jwks`.
    #[must_use]
    pub fn public_jwks(&self) -> Jwks {
        self.config.keys.public_jwks()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use jsonwebtoken::Algorithm;

    use super::*;
    use crate::config::Configuration;
    use crate::jose::{ServerKeySet, SigningKey};
    use crate::types::Scope;

    fn server(configure: impl FnOnce(Configuration) -> Configuration) -> AuthServer {
        let keys = ServerKeySet::new()
            .with_signing_key(SigningKey::generate_rsa("sig-1", Algorithm::RS256).unwrap());
        let config = configure(
            Configuration::new("https://server.example.com", keys)
                .with_scopes(vec![Scope::simple("openid"), Scope::simple("profile")]),
        );

        let clients = Arc::new(veridian_test_store::NullClientStore);
        let authn = Arc::new(veridian_test_store::NullAuthnStore);
        let grants = Arc::new(veridian_test_store::NullGrantStore);
        AuthServer::new(config, clients, authn, grants)
    }

    /// Empty stores; discovery never touches them.
    mod veridian_test_store {
        use async_trait::async_trait;

        use crate::AuthResult;
        use crate::session::{AuthnSession, GrantSession};
        use crate::storage::{AuthnSessionStore, ClientStore, GrantSessionStore};
        use crate::types::Client;

        pub struct NullClientStore;
        pub struct NullAuthnStore;
        pub struct NullGrantStore;

        #[async_trait]
        impl ClientStore for NullClientStore {
            async fn save(&self, _client: &Client) -> AuthResult<()> {
                Ok(())
            }
            async fn get(&self, _client_id: &str) -> AuthResult<Option<Client>> {
                Ok(None)
            }
            async fn delete(&self, _client_id: &str) -> AuthResult<()> {
                Ok(())
            }
        }

        #[async_trait]
        impl AuthnSessionStore for NullAuthnStore {
            async fn save(&self, _session: &AuthnSession) -> AuthResult<()> {
                Ok(())
            }
            async fn get(&self, _id: &str) -> AuthResult<Option<AuthnSession>> {
                Ok(None)
            }
            async fn get_by_callback_id(&self, _id: &str) -> AuthResult<Option<AuthnSession>> {
                Ok(None)
            }
            async fn take_by_request_uri(&self, _uri: &str) -> AuthResult<Option<AuthnSession>> {
                Ok(None)
            }
            async fn take_by_authorization_code(
                &self,
                _code: &str,
            ) -> AuthResult<Option<AuthnSession>> {
                Ok(None)
            }
            async fn delete(&self, _id: &str) -> AuthResult<()> {
                Ok(())
            }
        }

        #[async_trait]
        impl GrantSessionStore for NullGrantStore {
            async fn save(&self, _session: &GrantSession) -> AuthResult<()> {
                Ok(())
            }
            async fn get(&self, _id: &str) -> AuthResult<Option<GrantSession>> {
                Ok(None)
            }
            async fn get_by_token_id(&self, _id: &str) -> AuthResult<Option<GrantSession>> {
                Ok(None)
            }
            async fn get_by_refresh_token(&self, _t: &str) -> AuthResult<Option<GrantSession>> {
                Ok(None)
            }
            async fn delete(&self, _id: &str) -> AuthResult<()> {
                Ok(())
            }
        }
    }

    #[test]
    fn test_core_document_fields() {
        let server = server(|c| c);
        let doc = server.discovery_document();

        assert_eq!(doc["issuer"], "https://server.example.com");
        assert_eq!(
            doc["authorization_endpoint"],
            "https://server.example.com/authorize"
        );
        assert_eq!(doc["token_endpoint"], "https://server.example.com/token");
        assert_eq!(doc["jwks_uri"], "https://server.example.com/jwks");
        assert_eq!(doc["scopes_supported"][0], "openid");
        assert_eq!(doc["response_types_supported"][0], "code");
        assert_eq!(doc["code_challenge_methods_supported"][0], "S256");
        assert!(doc.get("pushed_authorization_request_endpoint").is_none());
        assert!(doc.get("registration_endpoint").is_none());
    }

    #[test]
    fn test_feature_flags_reflected() {
        let server = server(|c| {
            c.with_par(true)
                .with_jar(vec![Algorithm::RS256], false)
                .with_dpop(vec![Algorithm::ES256], false)
                .with_dcr()
        });
        let doc = server.discovery_document();

        assert_eq!(
            doc["pushed_authorization_request_endpoint"],
            "https://server.example.com/par"
        );
        assert_eq!(doc["require_pushed_authorization_requests"], true);
        assert_eq!(doc["request_object_signing_alg_values_supported"][0], "RS256");
        assert_eq!(doc["dpop_signing_alg_values_supported"][0], "ES256");
        assert_eq!(
            doc["registration_endpoint"],
            "https://server.example.com/register"
        );
    }

    #[test]
    fn test_public_jwks_exposes_signing_keys() {
        let server = server(|c| c);
        let jwks = server.public_jwks();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, "sig-1");
        assert_eq!(jwks.keys[0].use_, "sig");
    }
}
