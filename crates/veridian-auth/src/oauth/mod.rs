//! The OAuth protocol machinery.
//!
//! Client authentication, PKCE, request objects, DPoP and mTLS binding,
//! the authorization flow engine and the response encoders.

pub mod authorize;
pub mod client_assertion;
pub mod client_auth;
pub mod dpop;
pub mod engine;
pub mod jar;
pub mod jarm;
pub mod jwks_cache;
pub mod mtls;
pub mod par;
pub mod pkce;
pub mod policy;
pub mod response_mode;

pub use authorize::{AuthorizeError, AuthorizeRequest};
pub use client_auth::ClientCredentials;
pub use dpop::DpopProof;
pub use jwks_cache::{ClientJwksCache, JwksCacheConfig};
pub use mtls::ClientCertificate;
pub use par::PushedAuthorizationResponse;
pub use policy::{AuthnPolicy, CallbackRequest, PolicyOutcome};
pub use response_mode::AuthorizeResponse;
