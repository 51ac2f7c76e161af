//! End-to-end token endpoint flows over the in-memory stores.

mod common;

use common::{CLIENT_SECRET, DpopKey, ISSUER, harness, jwt_claims};
use veridian_auth::context::HttpRequestInfo;
use veridian_auth::error::OAuthError;
use veridian_auth::session::TokenType;
use veridian_auth::token::service::TokenRequest;
use veridian_auth::types::GrantType;

fn token_url() -> String {
    format!("{ISSUER}/token")
}

fn client_credentials_request(scope: Option<&str>) -> TokenRequest {
    TokenRequest {
        grant_type: Some("client_credentials".to_string()),
        client_id: Some("cid1".to_string()),
        client_secret: Some(CLIENT_SECRET.to_string()),
        scope: scope.map(str::to_string),
        ..TokenRequest::default()
    }
}

fn http() -> HttpRequestInfo {
    HttpRequestInfo::new("POST", token_url())
}

#[tokio::test]
async fn test_client_credentials_jwt_token() {
    let harness = harness(|c| c);

    let response = harness
        .server
        .token(client_credentials_request(Some("scope1")), &http())
        .await
        .unwrap();

    assert_eq!(response.token_type, TokenType::Bearer);
    assert_eq!(response.expires_in, 60);
    assert_eq!(response.scope.as_deref(), Some("scope1"));
    assert!(response.id_token.is_none());
    assert!(response.refresh_token.is_none());

    let claims = jwt_claims(&response.access_token);
    assert_eq!(claims["iss"], ISSUER);
    assert_eq!(claims["sub"], "cid1");
    assert_eq!(claims["client_id"], "cid1");
    assert_eq!(claims["scope"], "scope1");
    assert_eq!(
        claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
        60
    );

    // The JWT header advertises the access-token type.
    let header = veridian_auth::jose::jwt::peek_header(&response.access_token).unwrap();
    assert_eq!(header.typ.as_deref(), Some("at+jwt"));

    // Exactly one grant session was persisted.
    assert_eq!(harness.grant_sessions.len().await, 1);
}

#[tokio::test]
async fn test_invalid_secret_rejected_without_side_effects() {
    let harness = harness(|c| c);

    let mut request = client_credentials_request(Some("scope1"));
    request.client_secret = Some("wrong-secret".to_string());

    let result = harness.server.token(request, &http()).await;
    assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    let error = result.unwrap_err();
    assert_eq!(error.error_code(), "invalid_client");
    assert_eq!(error.status_code(), 400);

    assert!(harness.grant_sessions.is_empty().await);
}

#[tokio::test]
async fn test_unknown_grant_type_rejected() {
    let harness = harness(|c| c);

    let mut request = client_credentials_request(None);
    request.grant_type = Some("device_code".to_string());

    let result = harness.server.token(request, &http()).await;
    assert!(matches!(result, Err(OAuthError::UnsupportedGrantType { .. })));
}

#[tokio::test]
async fn test_disabled_grant_type_rejected() {
    let harness = harness(|c| c.with_grant_types(vec![GrantType::AuthorizationCode]));

    let result = harness
        .server
        .token(client_credentials_request(None), &http())
        .await;
    assert!(matches!(result, Err(OAuthError::UnsupportedGrantType { .. })));
}

#[tokio::test]
async fn test_scope_outside_client_registration_rejected() {
    let harness = harness(|c| c);

    let result = harness
        .server
        .token(client_credentials_request(Some("profile")), &http())
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidScope { .. })));
}

#[tokio::test]
async fn test_client_credentials_forbids_code_parameters() {
    let harness = harness(|c| c);

    let mut request = client_credentials_request(Some("scope1"));
    request.code = Some("some-code".to_string());

    let result = harness.server.token(request, &http()).await;
    assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
}

// ---------------------------------------------------------------------------
// DPoP binding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dpop_bound_token_issuance_and_binding_check() {
    let harness = harness(|c| {
        c.with_dpop(vec![jsonwebtoken::Algorithm::ES256], false)
    });

    let key = DpopKey::generate();
    let proof = key.proof("POST", &token_url(), None);
    let request_info = http().with_dpop_proof(proof);

    let response = harness
        .server
        .token(client_credentials_request(Some("scope1 openid")), &request_info)
        .await
        .unwrap();

    assert_eq!(response.token_type, TokenType::DPoP);
    let claims = jwt_claims(&response.access_token);
    assert_eq!(claims["cnf"]["jkt"], key.thumbprint());

    // Presenting the token at userinfo with the right key succeeds.
    let userinfo_url = format!("{ISSUER}/userinfo");
    let good = HttpRequestInfo::new("GET", userinfo_url.clone())
        .with_authorization(format!("DPoP {}", response.access_token))
        .with_dpop_proof(key.proof("GET", &userinfo_url, Some(&response.access_token)));
    assert!(harness.server.userinfo(&good).await.is_ok());

    // A proof from a different key is rejected with invalid_token.
    let other = DpopKey::generate();
    let bad = HttpRequestInfo::new("GET", userinfo_url.clone())
        .with_authorization(format!("DPoP {}", response.access_token))
        .with_dpop_proof(other.proof("GET", &userinfo_url, Some(&response.access_token)));
    let result = harness.server.userinfo(&bad).await;
    assert!(matches!(result, Err(OAuthError::InvalidToken { .. })));
}

#[tokio::test]
async fn test_stale_dpop_proof_rejected() {
    let harness = harness(|c| {
        c.with_dpop(vec![jsonwebtoken::Algorithm::ES256], true)
    });

    // Required but missing.
    let result = harness
        .server
        .token(client_credentials_request(Some("scope1")), &http())
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidRequest { .. })));
}

// ---------------------------------------------------------------------------
// Introspection and revocation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_introspection_reports_active_then_inactive() {
    use veridian_auth::token::introspection::IntrospectionRequest;
    use veridian_auth::token::revocation::RevocationRequest;

    let harness = harness(|c| c);

    let response = harness
        .server
        .token(client_credentials_request(Some("scope1")), &http())
        .await
        .unwrap();

    let introspect = |token: String| IntrospectionRequest {
        token: Some(token),
        client_id: Some("cid1".to_string()),
        client_secret: Some(CLIENT_SECRET.to_string()),
        ..IntrospectionRequest::default()
    };

    let info = HttpRequestInfo::new("POST", format!("{ISSUER}/introspect"));
    let result = harness
        .server
        .introspect(introspect(response.access_token.clone()), &info)
        .await
        .unwrap();
    assert!(result.active);
    assert_eq!(result.client_id.as_deref(), Some("cid1"));
    assert_eq!(result.scope.as_deref(), Some("scope1"));

    // Revoke, then the same token is inactive.
    let revoke = RevocationRequest {
        token: Some(response.access_token.clone()),
        client_id: Some("cid1".to_string()),
        client_secret: Some(CLIENT_SECRET.to_string()),
        ..RevocationRequest::default()
    };
    harness
        .server
        .revoke(revoke, &HttpRequestInfo::new("POST", format!("{ISSUER}/revoke")))
        .await
        .unwrap();
    assert!(harness.grant_sessions.is_empty().await);

    let result = harness
        .server
        .introspect(introspect(response.access_token), &info)
        .await
        .unwrap();
    assert!(!result.active);
}

#[tokio::test]
async fn test_revoking_unknown_token_succeeds_silently() {
    use veridian_auth::token::revocation::RevocationRequest;

    let harness = harness(|c| c);

    let revoke = RevocationRequest {
        token: Some("never-issued".to_string()),
        client_id: Some("cid1".to_string()),
        client_secret: Some(CLIENT_SECRET.to_string()),
        ..RevocationRequest::default()
    };

    let result = harness
        .server
        .revoke(revoke, &HttpRequestInfo::new("POST", format!("{ISSUER}/revoke")))
        .await;
    assert!(result.is_ok());
}
