use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use tracing::warn;

use crate::error::AuthError;

use super::claims::Claims;
use super::jwt::SessionKeys;

/// Guard for authenticated routes: pulls the session token from the `token`
/// cookie (set at login) or an `Authorization: Bearer` header, verifies it,
/// and hands the claims to the handler. Rejects with the standard 401
/// envelope on any failure.
pub struct AuthUser(pub Claims);

fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|v| !v.is_empty())
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let cookie_token = parts
            .headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(token_from_cookie_header);

        let token = cookie_token
            .or_else(|| bearer_token(parts))
            .ok_or(AuthError::Unauthorized)?;

        let keys = SessionKeys::from_ref(state);
        match keys.verify(token) {
            Ok(claims) => Ok(AuthUser(claims)),
            Err(_) => {
                warn!("invalid or expired session token");
                Err(AuthError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn finds_token_among_cookies() {
        let header = "theme=dark; token=abc123; lang=en";
        assert_eq!(token_from_cookie_header(header), Some("abc123"));
    }

    #[test]
    fn ignores_cleared_cookie() {
        assert_eq!(token_from_cookie_header("token=; theme=dark"), None);
    }

    #[test]
    fn ignores_prefixed_names() {
        assert_eq!(token_from_cookie_header("csrf_token=abc"), None);
    }

    #[tokio::test]
    async fn rejects_request_without_credentials() {
        let state = crate::state::AppState::for_tests();
        let request = Request::builder().uri("/me").body(()).expect("request");
        let (mut parts, _) = request.into_parts();

        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("extractor should reject");
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn rejection_carries_the_json_envelope() {
        let state = crate::state::AppState::for_tests();
        let request = Request::builder()
            .uri("/me")
            .header(header::COOKIE, "token=not-a-jwt")
            .body(())
            .expect("request");
        let (mut parts, _) = request.into_parts();

        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .expect("extractor should reject");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn accepts_cookie_and_bearer_tokens() {
        let state = crate::state::AppState::for_tests();
        let keys = SessionKeys::from_ref(&state);
        let token = keys
            .sign(uuid::Uuid::new_v4(), crate::store::Role::User)
            .expect("sign");

        for header_pair in [
            (header::COOKIE.as_str(), format!("token={token}")),
            (header::AUTHORIZATION.as_str(), format!("Bearer {token}")),
        ] {
            let request = Request::builder()
                .uri("/me")
                .header(header_pair.0, header_pair.1)
                .body(())
                .expect("request");
            let (mut parts, _) = request.into_parts();
            let AuthUser(claims) = AuthUser::from_request_parts(&mut parts, &state)
                .await
                .expect("extractor should accept");
            assert_eq!(claims.iss, "test-issuer");
        }
    }
}
