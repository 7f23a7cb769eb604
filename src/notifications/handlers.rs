use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo::Notification;
use crate::{
    admin::repo_types::AdminLog,
    auth::extractors::{AdminUser, AuthUser},
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery, Pagination},
    state::AppState,
    users::repo_types::User,
};

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/:id/read", post(mark_read))
}

/// Mounted under `/api/admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/notifications", post(send_notification))
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    /// Omit for a broadcast.
    pub user_id: Option<Uuid>,
    pub title: String,
    pub content: String,
}

impl SendNotificationRequest {
    fn validate(&self) -> ApiResult<(&str, &str)> {
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() || title.chars().count() > 200 {
            return Err(ApiError::BadRequest("Title must be 1-200 characters".into()));
        }
        if content.is_empty() {
            return Err(ApiError::BadRequest("Content is required".into()));
        }
        Ok((title, content))
    }
}

#[instrument(skip(state))]
pub async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(p): ApiQuery<Pagination>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(Notification::list_for(&state.db, auth.id, p.limit(), p.offset()).await?))
}

#[instrument(skip(state))]
pub async fn unread_count(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<serde_json::Value>> {
    let count = Notification::unread_count(&state.db, auth.id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Notification>> {
    Notification::mark_read(&state.db, id, auth.id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Notification"))
}

#[instrument(skip(state, payload))]
pub async fn send_notification(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiJson(payload): ApiJson<SendNotificationRequest>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let (title, content) = payload.validate()?;
    if let Some(user_id) = payload.user_id {
        if User::find_by_id(&state.db, user_id).await?.is_none() {
            return Err(ApiError::not_found("User"));
        }
    }
    let mut tx = state.db.begin().await?;
    let note = Notification::insert(&mut tx, payload.user_id, title, content).await?;
    AdminLog::record(
        &mut tx,
        admin_id,
        "notification.send",
        "notification",
        Some(note.id.to_string()),
        json!({ "user_id": note.user_id, "title": note.title }),
    )
    .await?;
    tx.commit().await?;

    info!(notification_id = %note.id, broadcast = note.user_id.is_none(), "notification sent");
    Ok((StatusCode::CREATED, Json(note)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[test]
    fn send_request_requires_title_and_content() {
        let ok = SendNotificationRequest { user_id: None, title: " Hint ".into(), content: "check robots.txt".into() };
        assert_eq!(ok.validate().unwrap(), ("Hint", "check robots.txt"));

        let blank = SendNotificationRequest { user_id: None, title: "x".into(), content: "  ".into() };
        assert!(blank.validate().is_err());
    }

    #[tokio::test]
    async fn unread_count_requires_token() {
        let res = notification_routes()
            .with_state(AppState::fake())
            .oneshot(Request::builder().uri("/unread-count").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
