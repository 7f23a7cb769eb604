use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{ChangePasswordRequest, MeResponse, ProfileView, SubmissionItem, UpdateProfileRequest},
    repo::{self, submission_history},
    repo_types::{User, UserProfile},
    services::user_view,
    stats::Statistics,
};
use crate::{
    auth::{extractors::{ActiveUser, AuthUser}, services::password_problem},
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery, Pagination},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/profile", put(update_profile))
        .route("/me/password", post(change_password))
        .route("/me/statistics", post(refresh_statistics))
        .route("/:id", get(get_user))
        .route("/:id/submissions", get(list_submissions))
}

async fn load_user(state: &AppState, id: Uuid) -> ApiResult<User> {
    User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

#[instrument(skip(state))]
pub async fn get_me(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<MeResponse>> {
    let user = load_user(&state, auth.id).await?;
    let mut conn = state.db.acquire().await?;
    let view = user_view(&mut conn, &user, true).await?;
    let profile = UserProfile::find_by_user(&mut conn, user.id).await?;
    Ok(Json(MeResponse {
        user: view,
        profile: profile.as_ref().map(ProfileView::from),
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: ActiveUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileView>> {
    let mut conn = state.db.acquire().await?;
    let mut profile = UserProfile::find_by_user(&mut conn, auth.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile"))?;
    payload.apply(&mut profile, OffsetDateTime::now_utc());
    profile.save_personal(&mut conn).await?;
    info!(user_id = %auth.id, "profile updated");
    Ok(Json(ProfileView::from(&profile)))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    auth: ActiveUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if let Some(problem) = password_problem(&payload.new_password) {
        return Err(ApiError::BadRequest(problem.into()));
    }
    let mut user = load_user(&state, auth.id).await?;
    if !user.check_password(&payload.current_password) {
        warn!(user_id = %user.id, "password change with wrong current password");
        return Err(ApiError::Unauthorized("Current password is incorrect".into()));
    }
    let now = OffsetDateTime::now_utc();
    user.set_password(&payload.new_password, now)?;
    // an outstanding reset link must not undo this change
    user.password_reset_token = None;
    user.password_reset_sent_at = None;
    user.save(&state.db).await?;
    info!(user_id = %user.id, "password changed");
    Ok(Json(serde_json::json!({ "message": "Password updated" })))
}

#[instrument(skip(state))]
pub async fn refresh_statistics(State(state): State<AppState>, auth: ActiveUser) -> ApiResult<Json<Statistics>> {
    let mut conn = state.db.acquire().await?;
    let stats = repo::update_statistics(&mut conn, auth.id, OffsetDateTime::now_utc()).await?;
    Ok(Json(stats))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<super::dto::UserView>> {
    let user = load_user(&state, id).await?;
    let include_sensitive = auth.id == user.id || auth.is_admin;
    let mut conn = state.db.acquire().await?;
    Ok(Json(user_view(&mut conn, &user, include_sensitive).await?))
}

#[instrument(skip(state))]
pub async fn list_submissions(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(page): ApiQuery<Pagination>,
) -> ApiResult<Json<Vec<SubmissionItem>>> {
    if auth.id != id && !auth.is_admin {
        return Err(ApiError::Forbidden("Submissions are private".into()));
    }
    let rows = submission_history(&state.db, id, page.limit(), page.offset()).await?;
    Ok(Json(rows.into_iter().map(SubmissionItem::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtKeys;
    use axum::{
        body::Body,
        extract::FromRef,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn other_users_submissions_are_forbidden_before_db() {
        let state = AppState::fake();
        let me = User::new_unsaved("eve", "eve@ctf.local", "hash", OffsetDateTime::now_utc());
        let token = JwtKeys::from_ref(&state).sign_access(&me).unwrap();
        let app = user_routes().with_state(state);
        let res = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{}/submissions", Uuid::new_v4()))
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_id_is_bad_request_envelope() {
        let state = AppState::fake();
        let me = User::new_unsaved("eve", "eve@ctf.local", "hash", OffsetDateTime::now_utc());
        let token = JwtKeys::from_ref(&state).sign_access(&me).unwrap();
        let res = user_routes()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .uri("/not-a-uuid")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["code"], 400);
    }
}
