//! OAuth 2.1 / OpenID Connect error types.
//!
//! This module defines the error taxonomy used across the authorization
//! server. Every validation function returns either success or a typed
//! [`OAuthError`]; endpoints translate the error into the RFC 6749 JSON body
//! or a redirect, depending on where the failure happened.

use std::fmt;

/// Errors surfaced by the authorization server.
///
/// The variants map one-to-one onto the registered OAuth 2.0 error codes.
/// Server-side failures are collapsed into [`OAuthError::ServerError`] so
/// internal detail never reaches a client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OAuthError {
    /// Malformed syntax, missing parameter, or an incompatible combination.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// Client authentication failed.
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// Authorization code, refresh token or assertion rejected.
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The client lacks the requested grant or response type.
    #[error("Unauthorized client: {message}")]
    UnauthorizedClient {
        /// Description of what the client is not allowed to do.
        message: String,
    },

    /// Scope not registered or not permitted for the client.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The policy refused, or a registration access token was invalid.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// JAR parse, decryption, signature or claims failure.
    #[error("Invalid request object: {message}")]
    InvalidRequestObject {
        /// Description of why the request object is invalid.
        message: String,
    },

    /// A presented access token was rejected (expired, revoked, unbound).
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The grant type is not enabled on the server.
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The response type is not enabled on the server.
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The token type hint or token type is not supported.
    #[error("Unsupported token type: {token_type}")]
    UnsupportedTokenType {
        /// The unsupported token type.
        token_type: String,
    },

    /// An unexpected internal failure. Logged with the correlation id;
    /// the description returned to clients is generic.
    #[error("Server error: {message}")]
    ServerError {
        /// Internal description, never sent to clients.
        message: String,
    },
}

impl OAuthError {
    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `UnauthorizedClient` error.
    #[must_use]
    pub fn unauthorized_client(message: impl Into<String>) -> Self {
        Self::UnauthorizedClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequestObject` error.
    #[must_use]
    pub fn invalid_request_object(message: impl Into<String>) -> Self {
        Self::InvalidRequestObject {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `UnsupportedTokenType` error.
    #[must_use]
    pub fn unsupported_token_type(token_type: impl Into<String>) -> Self {
        Self::UnsupportedTokenType {
            token_type: token_type.into(),
        }
    }

    /// Creates a new `ServerError`.
    #[must_use]
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    /// Returns the registered OAuth 2.0 error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::UnauthorizedClient { .. } => "unauthorized_client",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::AccessDenied { .. } => "access_denied",
            Self::InvalidRequestObject { .. } => "invalid_request_object",
            Self::InvalidToken { .. } => "invalid_token",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::UnsupportedTokenType { .. } => "unsupported_token_type",
            Self::ServerError { .. } => "server_error",
        }
    }

    /// Returns the HTTP status code for this error per RFC 6749.
    ///
    /// `invalid_client` maps to 400 here; the HTTP layer upgrades it to 401
    /// with a `WWW-Authenticate` challenge when the request carried Basic
    /// credentials.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidToken { .. } => 401,
            Self::AccessDenied { .. } => 403,
            Self::ServerError { .. } => 500,
            _ => 400,
        }
    }

    /// The description safe to send to clients.
    ///
    /// Internal errors return a fixed string so implementation detail never
    /// leaks; everything else echoes its message.
    #[must_use]
    pub fn public_description(&self) -> &str {
        match self {
            Self::ServerError { .. } => "internal error",
            Self::InvalidRequest { message }
            | Self::InvalidClient { message }
            | Self::InvalidGrant { message }
            | Self::UnauthorizedClient { message }
            | Self::InvalidScope { message }
            | Self::AccessDenied { message }
            | Self::InvalidRequestObject { message }
            | Self::InvalidToken { message } => message,
            Self::UnsupportedGrantType { grant_type } => grant_type,
            Self::UnsupportedResponseType { response_type } => response_type,
            Self::UnsupportedTokenType { token_type } => token_type,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::ServerError { .. })
    }

    /// Returns `true` if this error is reported when client authentication
    /// fails.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::InvalidClient { .. })
    }
}

impl From<crate::jose::JoseError> for OAuthError {
    fn from(err: crate::jose::JoseError) -> Self {
        Self::server_error(err.to_string())
    }
}

/// Category used for structured logging of error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Request validation failures.
    Validation,
    /// Client authentication failures.
    Authentication,
    /// Grant and token failures.
    Grant,
    /// Internal failures.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Authentication => write!(f, "authentication"),
            Self::Grant => write!(f, "grant"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl OAuthError {
    /// Returns the logging category for this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidRequest { .. }
            | Self::InvalidScope { .. }
            | Self::InvalidRequestObject { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::UnsupportedResponseType { .. }
            | Self::UnsupportedTokenType { .. } => ErrorCategory::Validation,
            Self::InvalidClient { .. } => ErrorCategory::Authentication,
            Self::InvalidGrant { .. }
            | Self::InvalidToken { .. }
            | Self::UnauthorizedClient { .. }
            | Self::AccessDenied { .. } => ErrorCategory::Grant,
            Self::ServerError { .. } => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            OAuthError::invalid_request("x").error_code(),
            "invalid_request"
        );
        assert_eq!(
            OAuthError::invalid_client("x").error_code(),
            "invalid_client"
        );
        assert_eq!(OAuthError::invalid_grant("x").error_code(), "invalid_grant");
        assert_eq!(
            OAuthError::unsupported_grant_type("device_code").error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(OAuthError::server_error("x").error_code(), "server_error");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OAuthError::invalid_request("x").status_code(), 400);
        assert_eq!(OAuthError::invalid_client("x").status_code(), 400);
        assert_eq!(OAuthError::invalid_token("x").status_code(), 401);
        assert_eq!(OAuthError::invalid_grant("x").status_code(), 400);
        assert_eq!(OAuthError::access_denied("x").status_code(), 403);
        assert_eq!(OAuthError::server_error("x").status_code(), 500);
    }

    #[test]
    fn test_server_error_never_leaks_detail() {
        let err = OAuthError::server_error("database connection refused");
        assert_eq!(err.public_description(), "internal error");
        assert!(err.to_string().contains("database connection refused"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            OAuthError::invalid_request("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            OAuthError::invalid_client("x").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            OAuthError::invalid_grant("x").category(),
            ErrorCategory::Grant
        );
        assert_eq!(
            OAuthError::server_error("x").category(),
            ErrorCategory::Internal
        );
    }
}
