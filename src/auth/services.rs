use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::mailer::EmailMessage;
use crate::state::AppState;
use crate::store::NewUser;

use super::dto::{
    ApiMessage, ForgotPasswordRequest, LoginRequest, PublicUser, RegisterRequest,
    ResetPasswordRequest,
};
use super::jwt::SessionKeys;
use super::{password, token};

const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Registration: validate, hash, create the record with its verification
/// token in one store call, then send the link. The message is built before
/// anything is written; a send failure after the write surfaces as
/// `Internal` while the token stays consumable, so delivery is
/// at-least-once and consumption stays idempotent.
pub async fn register(
    state: &AppState,
    mut payload: RegisterRequest,
) -> Result<ApiMessage, AuthError> {
    payload.name = payload.name.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.name.is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err(AuthError::Validation("All fields are required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation("Password too short".into()));
    }

    let verification_token = token::issue();
    let message =
        EmailMessage::verification(&state.config.base_url, &payload.email, &verification_token);

    let password_hash = password::hash_password(&payload.password).map_err(AuthError::Internal)?;
    let user = state
        .store
        .create(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
            verification_token,
        })
        .await?;

    state
        .mailer
        .send(message)
        .await
        .map_err(AuthError::Internal)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(ApiMessage::ok("User registered successfully"))
}

/// Email verification: a single atomic consume. Replaying a consumed link
/// fails because the token was cleared with the same write that set
/// `is_verified`.
pub async fn verify_email(state: &AppState, token: &str) -> Result<ApiMessage, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Validation("Invalid token".into()));
    }

    let user = state
        .store
        .consume_verification_token(token)
        .await?
        .ok_or(AuthError::InvalidToken)?;

    info!(user_id = %user.id, email = %user.email, "email verified");
    Ok(ApiMessage::ok("Email verified successfully"))
}

/// Login: unknown email and wrong password fall through to the identical
/// `InvalidCredentials` error so the endpoint cannot be used to probe for
/// registered addresses.
pub async fn login(
    state: &AppState,
    mut payload: LoginRequest,
) -> Result<(String, PublicUser), AuthError> {
    payload.email = payload.email.trim().to_lowercase();
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AuthError::Validation("All fields are required".into()));
    }

    let user = state
        .store
        .find_by_email(&payload.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    let ok = password::verify_password(&payload.password, &user.password_hash)
        .map_err(AuthError::Internal)?;
    if !ok {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    if !user.is_verified {
        warn!(user_id = %user.id, "login before email verification");
        return Err(AuthError::NotVerified);
    }

    let keys = SessionKeys::from_ref(state);
    let token = keys.sign(user.id, user.role).map_err(AuthError::Internal)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((token, PublicUser::from(&user)))
}

/// Forgot-password: issues a short-lived reset token, persists it, then
/// emails the link. Unknown emails fail `NotFound`; the endpoint therefore
/// confirms account existence, which is accepted here in exchange for an
/// actionable error (see DESIGN.md).
pub async fn forgot_password(
    state: &AppState,
    mut payload: ForgotPasswordRequest,
) -> Result<ApiMessage, AuthError> {
    payload.email = payload.email.trim().to_lowercase();
    if payload.email.is_empty() {
        return Err(AuthError::Validation("All fields are required".into()));
    }

    let user = state
        .store
        .find_by_email(&payload.email)
        .await?
        .ok_or(AuthError::NotFound)?;

    let (reset_token, expires_at) =
        token::issue_with_expiry(state.config.reset_token_ttl_minutes);
    let message = EmailMessage::password_reset(&state.config.base_url, &user.email, &reset_token);

    state
        .store
        .set_reset_token(user.id, &reset_token, expires_at)
        .await?;
    state
        .mailer
        .send(message)
        .await
        .map_err(AuthError::Internal)?;

    info!(user_id = %user.id, "password reset requested");
    Ok(ApiMessage::ok("Password reset email sent"))
}

/// Reset: hashes the new password once, then atomically swaps it in while
/// clearing the token, gated on `expires_at > now` evaluated at consumption.
pub async fn reset_password(
    state: &AppState,
    token: &str,
    payload: ResetPasswordRequest,
) -> Result<ApiMessage, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Validation("Invalid token".into()));
    }
    if payload.password.is_empty() || payload.confirm_password.is_empty() {
        return Err(AuthError::Validation("All fields are required".into()));
    }
    if payload.password != payload.confirm_password {
        return Err(AuthError::Validation("Passwords do not match".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation("Password too short".into()));
    }

    let new_hash = password::hash_password(&payload.password).map_err(AuthError::Internal)?;
    let user = state
        .store
        .consume_reset_token(token, &new_hash, OffsetDateTime::now_utc())
        .await?
        .ok_or(AuthError::InvalidToken)?;

    info!(user_id = %user.id, "password reset completed");
    Ok(ApiMessage::ok("Password reset successfully"))
}

/// Resolves verified session claims back to the public user record.
pub async fn current_user(state: &AppState, user_id: Uuid) -> Result<PublicUser, AuthError> {
    let user = state
        .store
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    Ok(PublicUser::from(&user))
}
