//! PKCE (RFC 7636).
//!
//! Verifier syntax checks and challenge comparison for the `plain` and
//! `S256` methods. Which methods are accepted is configuration: FAPI 2.0
//! forces `S256`, and public clients without a secret must send a challenge
//! whenever PKCE is enabled.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::error::OAuthError;
use crate::types::CodeChallengeMethod;

/// Validates the RFC 7636 verifier syntax.
///
/// # Errors
///
/// Returns `invalid_request` when the length is outside 43–128 characters
/// or a character is outside the unreserved set.
pub fn validate_verifier(verifier: &str) -> Result<(), OAuthError> {
    let len = verifier.len();
    if !(43..=128).contains(&len) {
        return Err(OAuthError::invalid_request(format!(
            "code_verifier must be 43-128 characters, got {len}"
        )));
    }

    if !verifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
    {
        return Err(OAuthError::invalid_request(
            "code_verifier contains invalid characters",
        ));
    }

    Ok(())
}

/// Computes the S256 challenge: `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Checks a verifier against the stored challenge under the stored method.
#[must_use]
pub fn is_valid(verifier: &str, challenge: &str, method: CodeChallengeMethod) -> bool {
    match method {
        CodeChallengeMethod::Plain => verifier == challenge,
        CodeChallengeMethod::S256 => s256_challenge(verifier) == challenge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_test_vector() {
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            s256_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(is_valid(
            verifier,
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
            CodeChallengeMethod::S256
        ));
    }

    #[test]
    fn test_plain_method() {
        assert!(is_valid("a".repeat(43).as_str(), "a".repeat(43).as_str(), CodeChallengeMethod::Plain));
        assert!(!is_valid("verifier", "other", CodeChallengeMethod::Plain));
    }

    #[test]
    fn test_wrong_verifier_rejected() {
        let challenge = s256_challenge("4ea556349fa98a54a1dd0e2ef7bd4ed8ab93c4fe99d7a1f36787169fa9fa98");
        assert!(!is_valid(
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            &challenge,
            CodeChallengeMethod::S256
        ));
    }

    #[test]
    fn test_verifier_length_bounds() {
        assert!(validate_verifier(&"a".repeat(42)).is_err());
        assert!(validate_verifier(&"a".repeat(43)).is_ok());
        assert!(validate_verifier(&"a".repeat(128)).is_ok());
        assert!(validate_verifier(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_verifier_charset() {
        assert!(validate_verifier(&format!("{}-._~", "a".repeat(43))).is_ok());
        assert!(validate_verifier(&format!("{}!@#", "a".repeat(43))).is_err());
    }
}
