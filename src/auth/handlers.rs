use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::AppendHeaders,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::error::AuthError;
use crate::state::AppState;

use super::dto::{
    ApiMessage, ForgotPasswordRequest, LoginRequest, LoginResponse, MeResponse, RegisterRequest,
    ResetPasswordRequest,
};
use super::extractors::AuthUser;
use super::services;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/verify/:token", get(verify_email))
        .route("/users/login", post(login))
        .route("/users/logout", get(logout))
        .route("/users/forgot", post(forgot_password))
        .route("/users/reset/:token", post(reset_password))
        .route("/users/me", get(me))
}

/// Session cookie mirrors the JWT: same lifetime, HttpOnly so scripts never
/// see it, `Secure` when the deployment says so.
fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("token={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Expire-in-the-past marker; stateless sessions have nothing to revoke
/// server-side, the client just forgets the token.
fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiMessage>), AuthError> {
    let body = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip(state))]
async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiMessage>, AuthError> {
    let body = services::verify_email(&state, &token).await?;
    Ok(Json(body))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<
    (
        AppendHeaders<[(header::HeaderName, String); 1]>,
        Json<LoginResponse>,
    ),
    AuthError,
> {
    let (token, user) = services::login(&state, payload).await?;
    let cookie = session_cookie(
        &token,
        state.config.jwt.ttl_minutes * 60,
        state.config.cookie_secure,
    );
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(LoginResponse {
            success: true,
            message: "Login successful".into(),
            token,
            user,
        }),
    ))
}

#[instrument(skip(state, _user))]
async fn logout(
    State(state): State<AppState>,
    _user: AuthUser,
) -> (
    AppendHeaders<[(header::HeaderName, String); 1]>,
    Json<ApiMessage>,
) {
    (
        AppendHeaders([(
            header::SET_COOKIE,
            clear_session_cookie(state.config.cookie_secure),
        )]),
        Json(ApiMessage::ok("Logged out successfully")),
    )
}

#[instrument(skip(state, payload))]
async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiMessage>, AuthError> {
    let body = services::forgot_password(&state, payload).await?;
    Ok(Json(body))
}

#[instrument(skip(state, payload))]
async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiMessage>, AuthError> {
    let body = services::reset_password(&state, &token, payload).await?;
    Ok(Json(body))
}

#[instrument(skip(state))]
async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MeResponse>, AuthError> {
    let user = services::current_user(&state, claims.sub).await?;
    Ok(Json(MeResponse {
        success: true,
        user,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_carries_flags() {
        let cookie = session_cookie("abc", 86400, false);
        assert_eq!(
            cookie,
            "token=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400"
        );
    }

    #[test]
    fn secure_flag_is_appended_in_production() {
        let cookie = session_cookie("abc", 60, true);
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie(false);
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
