use std::collections::HashMap;

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use super::repo_types::AdminLog;
use crate::{
    auth::extractors::AdminUser,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery, Pagination},
    ranking::{board::rank, repo::user_lines},
    state::AppState,
    users::{
        dto::UserView,
        repo::update_statistics,
        repo_types::{User, UserProfile},
        services::user_view,
    },
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", put(update_user_flags))
        .route("/statistics/recompute", post(recompute_statistics))
        .route("/logs", get(list_logs))
}

#[derive(Debug, Deserialize)]
pub struct UserFlagsRequest {
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
}

impl UserFlagsRequest {
    /// An admin may not lock themselves out.
    fn check(&self, admin_id: Uuid, target: Uuid) -> ApiResult<()> {
        if self.is_active.is_none() && self.is_admin.is_none() {
            return Err(ApiError::BadRequest("Nothing to update".into()));
        }
        if admin_id == target && (self.is_active == Some(false) || self.is_admin == Some(false)) {
            return Err(ApiError::BadRequest("Cannot deactivate or demote yourself".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct RecomputeSummary {
    pub users: usize,
    pub ranked: usize,
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin_id): AdminUser,
    ApiQuery(p): ApiQuery<Pagination>,
) -> ApiResult<Json<Vec<UserView>>> {
    let users = User::list(&state.db, p.limit(), p.offset()).await?;
    let mut conn = state.db.acquire().await?;
    let mut out = Vec::with_capacity(users.len());
    for user in &users {
        out.push(user_view(&mut conn, user, true).await?);
    }
    Ok(Json(out))
}

#[instrument(skip(state, payload))]
pub async fn update_user_flags(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UserFlagsRequest>,
) -> ApiResult<Json<UserView>> {
    payload.check(admin_id, id)?;
    let mut tx = state.db.begin().await?;
    let user = User::set_flags(&mut tx, id, payload.is_active, payload.is_admin)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    AdminLog::record(
        &mut tx,
        admin_id,
        "user.update_flags",
        "user",
        Some(id.to_string()),
        json!({ "is_active": payload.is_active, "is_admin": payload.is_admin }),
    )
    .await?;
    let view = user_view(&mut tx, &user, true).await?;
    tx.commit().await?;

    info!(user_id = %id, %admin_id, "user flags updated");
    Ok(Json(view))
}

/// Recomputes every profile from the submissions table and reassigns ranks.
/// Users outside the scoreboard (inactive, admins) get no rank.
#[instrument(skip(state))]
pub async fn recompute_statistics(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
) -> ApiResult<Json<RecomputeSummary>> {
    let now = OffsetDateTime::now_utc();
    let mut tx = state.db.begin().await?;

    let ids = User::all_ids(&mut tx).await?;
    for id in &ids {
        update_statistics(&mut tx, *id, now).await?;
    }

    let ranked = rank(user_lines(&mut tx).await?);
    let positions: HashMap<Uuid, i32> = ranked
        .iter()
        .map(|r| (r.line.id, i32::try_from(r.rank).unwrap_or(i32::MAX)))
        .collect();
    for id in &ids {
        UserProfile::set_rank(&mut tx, *id, positions.get(id).copied()).await?;
    }

    let summary = RecomputeSummary {
        users: ids.len(),
        ranked: positions.len(),
    };
    AdminLog::record(
        &mut tx,
        admin_id,
        "statistics.recompute",
        "user",
        None,
        json!({ "users": summary.users, "ranked": summary.ranked }),
    )
    .await?;
    tx.commit().await?;

    info!(users = summary.users, ranked = summary.ranked, "statistics recomputed");
    Ok(Json(summary))
}

#[instrument(skip(state))]
pub async fn list_logs(
    State(state): State<AppState>,
    AdminUser(_admin_id): AdminUser,
    ApiQuery(p): ApiQuery<Pagination>,
) -> ApiResult<Json<Vec<AdminLog>>> {
    Ok(Json(AdminLog::list(&state.db, p.limit(), p.offset()).await?))
}
