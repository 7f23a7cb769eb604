use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

use super::{
    dto::{
        AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
        ResetPasswordRequest, VerifyEmailRequest,
    },
    extractors::AuthUser,
    jwt::JwtKeys,
    services::{is_valid_email, is_valid_username, password_problem},
};
use crate::{
    error::{ApiError, ApiResult},
    extract::ApiJson,
    state::AppState,
    users::{
        repo_types::{User, UserProfile},
        services::user_view,
    },
};

const BAD_TOKEN: &str = "Invalid or expired token";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/verify-email", post(verify_email))
        .route("/resend-verification", post(resend_verification))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

/// Tokens are only handed out by mail, which is not wired up; outside
/// production they are logged so the flows can be exercised.
fn log_token(state: &AppState, user: &User, purpose: &str, token: &str) {
    if !state.config.env.is_production() {
        debug!(user_id = %user.id, purpose, token, "one-time token issued");
    }
}

async fn auth_response(state: &AppState, user: &User) -> ApiResult<AuthResponse> {
    let tokens = JwtKeys::from_ref(state).issue_pair(user)?;
    let mut conn = state.db.acquire().await?;
    let user = user_view(&mut conn, user, true).await?;
    Ok(AuthResponse { tokens, user })
}

fn validate_registration(payload: &RegisterRequest) -> ApiResult<()> {
    if !is_valid_username(&payload.username) {
        return Err(ApiError::BadRequest(
            "Username must be 3-80 letters, digits, '_' or '-'".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if let Some(problem) = password_problem(&payload.password) {
        return Err(ApiError::BadRequest(problem.into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    payload.normalize();
    validate_registration(&payload)?;

    let (username_taken, email_taken) = User::conflicts(&state.db, &payload.username, &payload.email).await?;
    if username_taken {
        warn!(username = %payload.username, "username already taken");
        return Err(ApiError::Conflict("Username already taken".into()));
    }
    if email_taken {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let now = OffsetDateTime::now_utc();
    let mut user = User::new_unsaved(&payload.username, &payload.email, "", now);
    user.set_password(&payload.password, now)?;
    let token = user.generate_verification_token(now);

    let mut tx = state.db.begin().await?;
    user.insert(&mut tx).await?;
    UserProfile::empty_for(user.id, now).insert(&mut tx).await?;
    tx.commit().await?;

    log_token(&state, &user, "email_verification", &token);
    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(auth_response(&state, &user).await?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let login = payload.login.trim();
    if login.is_empty() || payload.password.is_empty() {
        return Err(ApiError::BadRequest("Login and password are required".into()));
    }

    let Some(mut user) = User::find_by_login(&state.db, login).await? else {
        warn!(login, "login for unknown account");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    };
    if !user.check_password(&payload.password) {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }
    if !user.is_active {
        warn!(user_id = %user.id, "login to disabled account");
        return Err(ApiError::Forbidden("Account disabled".into()));
    }

    user.update_last_login(OffsetDateTime::now_utc());
    user.save(&state.db).await?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(auth_response(&state, &user).await?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let claims = JwtKeys::from_ref(&state)
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| {
            warn!(error = %e, "refresh rejected");
            ApiError::Unauthorized(BAD_TOKEN.into())
        })?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::Unauthorized("User not found or disabled".into()))?;

    Ok(Json(auth_response(&state, &user).await?))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyEmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    let mut user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::BadRequest(BAD_TOKEN.into()))?;

    if !user.verify_email(payload.token.trim(), OffsetDateTime::now_utc()) {
        return Err(ApiError::BadRequest(BAD_TOKEN.into()));
    }
    user.save(&state.db).await?;

    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse::new("Email verified")))
}

#[instrument(skip(state))]
pub async fn resend_verification(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<MessageResponse>> {
    let mut user = User::find_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    if user.is_verified {
        return Err(ApiError::BadRequest("Email already verified".into()));
    }

    let token = user.generate_verification_token(OffsetDateTime::now_utc());
    user.save(&state.db).await?;

    log_token(&state, &user, "email_verification", &token);
    Ok(Json(MessageResponse::new("Verification email sent")))
}

/// Answers the same way whether or not the address exists.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    if let Some(mut user) = User::find_by_email(&state.db, &email).await? {
        if user.is_active {
            let token = user.generate_password_reset_token(OffsetDateTime::now_utc());
            user.save(&state.db).await?;
            log_token(&state, &user, "password_reset", &token);
            info!(user_id = %user.id, "password reset requested");
        }
    }
    Ok(Json(MessageResponse::new(
        "If the address is registered, a reset link has been sent",
    )))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if let Some(problem) = password_problem(&payload.new_password) {
        return Err(ApiError::BadRequest(problem.into()));
    }
    let email = payload.email.trim().to_lowercase();
    let mut user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(|| ApiError::BadRequest(BAD_TOKEN.into()))?;

    if !user.reset_password(payload.token.trim(), &payload.new_password, OffsetDateTime::now_utc())? {
        return Err(ApiError::BadRequest(BAD_TOKEN.into()));
    }
    user.save(&state.db).await?;

    info!(user_id = %user.id, "password reset");
    Ok(Json(MessageResponse::new("Password has been reset")))
}
