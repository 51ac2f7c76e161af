//! Authorization response emission.
//!
//! Response parameters reach the user-agent through the chosen response
//! mode: encoded into the redirect URI query, into the fragment, or as an
//! auto-submitting HTML form. The JARM variants deliver a single `response`
//! parameter through the same three encodings; wrapping happens in the
//! flow engine before this module runs.

use url::Url;

use crate::AuthResult;
use crate::error::OAuthError;
use crate::types::ResponseMode;

/// What the HTTP layer should send back for an authorization response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeResponse {
    /// 303 redirect to this URL.
    Redirect(String),
    /// 200 with this HTML body (form_post modes, policy pages).
    Html(String),
}

/// Encodes response parameters per the response mode.
///
/// # Errors
///
/// Returns `server_error` when the redirect URI does not parse; callers
/// validated it long before this point.
pub fn build_response(
    redirect_uri: &str,
    mode: ResponseMode,
    parameters: &[(String, String)],
) -> AuthResult<AuthorizeResponse> {
    match mode {
        ResponseMode::Query | ResponseMode::QueryJwt => {
            let mut url = parse_redirect(redirect_uri)?;
            url.query_pairs_mut().extend_pairs(parameters);
            Ok(AuthorizeResponse::Redirect(url.to_string()))
        }
        ResponseMode::Fragment | ResponseMode::FragmentJwt | ResponseMode::Jwt => {
            let mut url = parse_redirect(redirect_uri)?;
            let fragment = serde_urlencoded::to_string(parameters)
                .map_err(|e| OAuthError::server_error(format!("Fragment encoding: {e}")))?;
            url.set_fragment(Some(&fragment));
            Ok(AuthorizeResponse::Redirect(url.to_string()))
        }
        ResponseMode::FormPost | ResponseMode::FormPostJwt => {
            Ok(AuthorizeResponse::Html(form_post_page(redirect_uri, parameters)))
        }
    }
}

fn parse_redirect(redirect_uri: &str) -> AuthResult<Url> {
    Url::parse(redirect_uri)
        .map_err(|e| OAuthError::server_error(format!("Invalid redirect URI: {e}")))
}

/// Renders the RFC-style auto-submitting form.
fn form_post_page(redirect_uri: &str, parameters: &[(String, String)]) -> String {
    let mut inputs = String::new();
    for (name, value) in parameters {
        inputs.push_str(&format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\"/>\n",
            escape_html(name),
            escape_html(value)
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Submitting...</title></head>\n\
         <body onload=\"document.forms[0].submit()\">\n\
         <form method=\"post\" action=\"{}\">\n{}\
         <noscript><button type=\"submit\">Continue</button></noscript>\n\
         </form>\n</body>\n</html>",
        escape_html(redirect_uri),
        inputs
    )
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        vec![
            ("code".to_string(), "auth-code".to_string()),
            ("state".to_string(), "xyz".to_string()),
        ]
    }

    #[test]
    fn test_query_mode() {
        let response = build_response(
            "https://app.example.com/cb",
            ResponseMode::Query,
            &params(),
        )
        .unwrap();

        let AuthorizeResponse::Redirect(url) = response else {
            panic!("expected redirect");
        };
        assert!(url.starts_with("https://app.example.com/cb?"));
        assert!(url.contains("code=auth-code"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn test_query_mode_preserves_existing_query() {
        let response = build_response(
            "https://app.example.com/cb?tenant=a",
            ResponseMode::Query,
            &params(),
        )
        .unwrap();

        let AuthorizeResponse::Redirect(url) = response else {
            panic!("expected redirect");
        };
        assert!(url.contains("tenant=a"));
        assert!(url.contains("code=auth-code"));
    }

    #[test]
    fn test_fragment_mode() {
        let response = build_response(
            "https://app.example.com/cb",
            ResponseMode::Fragment,
            &params(),
        )
        .unwrap();

        let AuthorizeResponse::Redirect(url) = response else {
            panic!("expected redirect");
        };
        assert!(url.contains("#code=auth-code&state=xyz"));
    }

    #[test]
    fn test_form_post_mode() {
        let response = build_response(
            "https://app.example.com/cb",
            ResponseMode::FormPost,
            &params(),
        )
        .unwrap();

        let AuthorizeResponse::Html(html) = response else {
            panic!("expected html");
        };
        assert!(html.contains("method=\"post\""));
        assert!(html.contains("action=\"https://app.example.com/cb\""));
        assert!(html.contains("name=\"code\" value=\"auth-code\""));
        assert!(html.contains("document.forms[0].submit()"));
    }

    #[test]
    fn test_form_post_escapes_values() {
        let response = build_response(
            "https://app.example.com/cb",
            ResponseMode::FormPost,
            &[("state".to_string(), "\"/><script>".to_string())],
        )
        .unwrap();

        let AuthorizeResponse::Html(html) = response else {
            panic!("expected html");
        };
        assert!(!html.contains("<script>"));
        assert!(html.contains("&quot;/&gt;&lt;script&gt;"));
    }

    #[test]
    fn test_invalid_redirect_uri() {
        let result = build_response("not a url", ResponseMode::Query, &params());
        assert!(matches!(result, Err(OAuthError::ServerError { .. })));
    }
}
