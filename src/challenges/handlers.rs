use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AttachmentView, CategoryRequest, ChallengeFilter, ChallengeRequest, ChallengeView, FlagRequest, FlagView,
        SubmitFlagRequest, SubmitFlagResponse, TagRequest,
    },
    repo_types::{Attachment, Category, Challenge, ChallengeRow, Flag, Tag},
    services::{self, UploadItem},
};
use crate::{
    admin::repo_types::AdminLog,
    auth::extractors::{AdminUser, AuthUser},
    config::CompetitionPhase,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
};

pub fn challenge_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_challenges))
        .route("/categories", get(list_categories))
        .route("/tags", get(list_tags))
        .route("/:id", get(get_challenge))
        .route("/:id/submit", post(submit_flag))
        .route("/:id/attachments", get(list_attachments))
}

/// Mounted under `/api/admin`.
pub fn admin_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/challenges", get(admin_list_challenges).post(create_challenge))
        .route("/challenges/:id", put(update_challenge).delete(delete_challenge))
        .route("/challenges/:id/flags", get(list_flags).post(add_flag))
        .route(
            "/challenges/:id/attachments",
            post(upload_attachment).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/flags/:id", delete(delete_flag))
        .route("/attachments/:id", delete(delete_attachment))
        .route("/categories", post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/tags", post(create_tag))
        .route("/tags/:id", delete(delete_tag))
}

async fn render_rows(state: &AppState, rows: Vec<ChallengeRow>, for_admin: bool) -> ApiResult<Vec<ChallengeView>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut tags = Tag::names_for(&state.db, &ids).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let names = tags.remove(&row.id).unwrap_or_default();
            ChallengeView::render(row, names, for_admin)
        })
        .collect())
}

/// Hidden challenges answer 404 to players.
async fn visible_challenge(state: &AppState, auth: &AuthUser, id: Uuid) -> ApiResult<Challenge> {
    Challenge::find(&state.db, id)
        .await?
        .filter(|c| c.is_visible || auth.is_admin)
        .ok_or_else(|| ApiError::not_found("Challenge"))
}

// ---- player routes ----

#[instrument(skip(state))]
pub async fn list_challenges(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(filter): ApiQuery<ChallengeFilter>,
) -> ApiResult<Json<Vec<ChallengeView>>> {
    let rows = Challenge::list_rows(&state.db, auth.id, filter.category_id, false).await?;
    Ok(Json(render_rows(&state, rows, false).await?))
}

pub async fn list_categories(State(state): State<AppState>, _auth: AuthUser) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(Category::list(&state.db).await?))
}

pub async fn list_tags(State(state): State<AppState>, _auth: AuthUser) -> ApiResult<Json<Vec<Tag>>> {
    Ok(Json(Tag::list(&state.db).await?))
}

#[instrument(skip(state))]
pub async fn get_challenge(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ChallengeView>> {
    let row = Challenge::find_row(&state.db, auth.id, id, auth.is_admin)
        .await?
        .ok_or_else(|| ApiError::not_found("Challenge"))?;
    let mut views = render_rows(&state, vec![row], auth.is_admin).await?;
    views.pop().map(Json).ok_or_else(|| ApiError::not_found("Challenge"))
}

#[instrument(skip(state, payload))]
pub async fn submit_flag(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<SubmitFlagRequest>,
) -> ApiResult<Json<SubmitFlagResponse>> {
    let now = OffsetDateTime::now_utc();
    match state.config.competition.phase_at(now) {
        CompetitionPhase::NotStarted => return Err(ApiError::Forbidden("Competition has not started".into())),
        CompetitionPhase::Ended => return Err(ApiError::Forbidden("Competition has ended".into())),
        CompetitionPhase::Running => {}
    }
    let flag = payload.normalized()?;
    let challenge = visible_challenge(&state, &auth, id).await?;

    let (outcome, stats) = services::submit_flag(&state.db, auth.id, &challenge, flag, now).await?;
    Ok(Json(SubmitFlagResponse::new(
        outcome,
        challenge.points,
        stats.total_score,
        stats.solved_count,
    )))
}

#[instrument(skip(state))]
pub async fn list_attachments(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<AttachmentView>>> {
    let challenge = visible_challenge(&state, &auth, id).await?;
    let rows = Attachment::for_challenge(&state.db, challenge.id).await?;
    let mut out = Vec::with_capacity(rows.len());
    for a in rows {
        let url = services::presign(&state, &a.s3_key).await?;
        out.push(AttachmentView::new(a, url));
    }
    Ok(Json(out))
}

// ---- admin routes ----

#[instrument(skip(state))]
pub async fn admin_list_challenges(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiQuery(filter): ApiQuery<ChallengeFilter>,
) -> ApiResult<Json<Vec<ChallengeView>>> {
    let rows = Challenge::list_rows(&state.db, admin_id, filter.category_id, true).await?;
    Ok(Json(render_rows(&state, rows, true).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_challenge(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiJson(payload): ApiJson<ChallengeRequest>,
) -> ApiResult<(StatusCode, Json<ChallengeView>)> {
    let fields = payload.validate()?;
    let mut tx = state.db.begin().await?;
    if let Some(category_id) = fields.category_id {
        if !Category::exists(&mut tx, category_id).await? {
            return Err(ApiError::not_found("Category"));
        }
    }
    let challenge = Challenge::insert(&mut tx, &fields, admin_id).await?;
    if let Some(names) = payload.tag_names() {
        Tag::set_for_challenge(&mut tx, challenge.id, &names).await?;
    }
    AdminLog::record(
        &mut tx,
        admin_id,
        "challenge.create",
        "challenge",
        Some(challenge.id.to_string()),
        json!({ "title": challenge.title, "points": challenge.points }),
    )
    .await?;
    tx.commit().await?;

    info!(challenge_id = %challenge.id, %admin_id, "challenge created");
    let row = Challenge::find_row(&state.db, admin_id, challenge.id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("Challenge"))?;
    let mut views = render_rows(&state, vec![row], true).await?;
    let view = views.pop().ok_or_else(|| ApiError::not_found("Challenge"))?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state, payload))]
pub async fn update_challenge(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ChallengeRequest>,
) -> ApiResult<Json<ChallengeView>> {
    let fields = payload.validate()?;
    let mut tx = state.db.begin().await?;
    if let Some(category_id) = fields.category_id {
        if !Category::exists(&mut tx, category_id).await? {
            return Err(ApiError::not_found("Category"));
        }
    }
    let challenge = Challenge::update(&mut tx, id, &fields, OffsetDateTime::now_utc())
        .await?
        .ok_or_else(|| ApiError::not_found("Challenge"))?;
    if let Some(names) = payload.tag_names() {
        Tag::set_for_challenge(&mut tx, challenge.id, &names).await?;
    }
    AdminLog::record(
        &mut tx,
        admin_id,
        "challenge.update",
        "challenge",
        Some(challenge.id.to_string()),
        json!({ "title": challenge.title, "points": challenge.points, "is_visible": challenge.is_visible }),
    )
    .await?;
    tx.commit().await?;

    let row = Challenge::find_row(&state.db, admin_id, challenge.id, true)
        .await?
        .ok_or_else(|| ApiError::not_found("Challenge"))?;
    let mut views = render_rows(&state, vec![row], true).await?;
    views.pop().map(Json).ok_or_else(|| ApiError::not_found("Challenge"))
}

/// Deleting a challenge cascades to its flags, submissions and attachments.
/// Cached profile aggregates stay stale until the next recompute.
#[instrument(skip(state))]
pub async fn delete_challenge(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;
    let keys = Attachment::keys_for_challenge(&mut tx, id).await?;
    if !Challenge::delete(&mut tx, id).await? {
        return Err(ApiError::not_found("Challenge"));
    }
    AdminLog::record(&mut tx, admin_id, "challenge.delete", "challenge", Some(id.to_string()), json!({})).await?;
    tx.commit().await?;

    services::remove_objects(state.storage.as_ref(), &keys).await;
    info!(challenge_id = %id, %admin_id, "challenge deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_flags(
    State(state): State<AppState>,
    AdminUser(_admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<FlagView>>> {
    let mut conn = state.db.acquire().await?;
    let flags = Flag::for_challenge(&mut conn, id).await?;
    Ok(Json(flags.into_iter().map(FlagView::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn add_flag(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<FlagRequest>,
) -> ApiResult<(StatusCode, Json<FlagView>)> {
    let kind = payload.validate()?;
    if Challenge::find(&state.db, id).await?.is_none() {
        return Err(ApiError::not_found("Challenge"));
    }
    let mut tx = state.db.begin().await?;
    let flag = Flag::insert(&mut tx, id, payload.content(), kind.as_str(), payload.case_sensitive).await?;
    AdminLog::record(
        &mut tx,
        admin_id,
        "flag.create",
        "challenge",
        Some(id.to_string()),
        json!({ "flag_id": flag.id, "kind": flag.kind }),
    )
    .await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(FlagView::from(flag))))
}

#[instrument(skip(state))]
pub async fn delete_flag(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;
    if !Flag::delete(&mut tx, id).await? {
        return Err(ApiError::not_found("Flag"));
    }
    AdminLog::record(&mut tx, admin_id, "flag.delete", "flag", Some(id.to_string()), json!({})).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart field `file`; the extension must be on the allow-list.
#[instrument(skip(state, multipart))]
pub async fn upload_attachment(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<AttachmentView>)> {
    let mut multipart = multipart?;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::BadRequest("file needs a filename".into()))?;
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field.bytes().await?;
        upload = Some(UploadItem {
            filename,
            content_type,
            body,
        });
        break;
    }
    let item = upload.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;

    let limits = &state.config.upload;
    if !limits.is_allowed(&item.filename) {
        warn!(filename = %item.filename, "attachment extension rejected");
        return Err(ApiError::BadRequest("File type not allowed".into()));
    }
    if item.body.len() > limits.max_bytes {
        return Err(ApiError::PayloadTooLarge("File too large".into()));
    }
    if Challenge::find(&state.db, id).await?.is_none() {
        return Err(ApiError::not_found("Challenge"));
    }

    let mut tx = state.db.begin().await?;
    let attachment = services::store_attachment(state.storage.as_ref(), &mut tx, id, item).await?;
    AdminLog::record(
        &mut tx,
        admin_id,
        "attachment.upload",
        "challenge",
        Some(id.to_string()),
        json!({ "attachment_id": attachment.id, "filename": attachment.filename, "size_bytes": attachment.size_bytes }),
    )
    .await?;
    if let Err(e) = tx.commit().await {
        services::remove_objects(state.storage.as_ref(), &[attachment.s3_key.clone()]).await;
        return Err(e.into());
    }

    info!(challenge_id = %id, attachment_id = %attachment.id, "attachment uploaded");
    let url = services::presign(&state, &attachment.s3_key).await?;
    Ok((StatusCode::CREATED, Json(AttachmentView::new(attachment, url))))
}

#[instrument(skip(state))]
pub async fn delete_attachment(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;
    let attachment = Attachment::delete(&mut tx, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Attachment"))?;
    AdminLog::record(
        &mut tx,
        admin_id,
        "attachment.delete",
        "challenge",
        Some(attachment.challenge_id.to_string()),
        json!({ "attachment_id": attachment.id, "filename": attachment.filename }),
    )
    .await?;
    tx.commit().await?;
    services::remove_objects(state.storage.as_ref(), &[attachment.s3_key]).await;
    Ok(StatusCode::NO_CONTENT)
}

fn category_fields(payload: &CategoryRequest) -> ApiResult<(String, Option<String>)> {
    let name = payload.name.trim();
    if name.is_empty() || name.chars().count() > 80 {
        return Err(ApiError::BadRequest("Category name must be 1-80 characters".into()));
    }
    let description = payload
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    Ok((name.to_string(), description))
}

#[instrument(skip(state, payload))]
pub async fn create_category(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiJson(payload): ApiJson<CategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let (name, description) = category_fields(&payload)?;
    let mut tx = state.db.begin().await?;
    if Category::name_taken(&mut tx, &name, None).await? {
        return Err(ApiError::Conflict("Category already exists".into()));
    }
    let category = Category::insert(&mut tx, &name, description.as_deref()).await?;
    AdminLog::record(
        &mut tx,
        admin_id,
        "category.create",
        "category",
        Some(category.id.to_string()),
        json!({ "name": category.name }),
    )
    .await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[instrument(skip(state, payload))]
pub async fn update_category(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CategoryRequest>,
) -> ApiResult<Json<Category>> {
    let (name, description) = category_fields(&payload)?;
    let mut tx = state.db.begin().await?;
    if Category::name_taken(&mut tx, &name, Some(id)).await? {
        return Err(ApiError::Conflict("Category already exists".into()));
    }
    let category = Category::update(&mut tx, id, &name, description.as_deref())
        .await?
        .ok_or_else(|| ApiError::not_found("Category"))?;
    AdminLog::record(
        &mut tx,
        admin_id,
        "category.update",
        "category",
        Some(id.to_string()),
        json!({ "name": category.name }),
    )
    .await?;
    tx.commit().await?;
    Ok(Json(category))
}

#[instrument(skip(state))]
pub async fn delete_category(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;
    if !Category::delete(&mut tx, id).await? {
        return Err(ApiError::not_found("Category"));
    }
    AdminLog::record(&mut tx, admin_id, "category.delete", "category", Some(id.to_string()), json!({})).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiJson(payload): ApiJson<TagRequest>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let name = payload.name.trim().to_lowercase();
    if name.is_empty() || name.chars().count() > 50 {
        return Err(ApiError::BadRequest("Tag name must be 1-50 characters".into()));
    }
    let mut tx = state.db.begin().await?;
    let tag = Tag::ensure(&mut tx, &name).await?;
    AdminLog::record(&mut tx, admin_id, "tag.create", "tag", Some(tag.id.to_string()), json!({ "name": tag.name }))
        .await?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

#[instrument(skip(state))]
pub async fn delete_tag(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    let mut tx = state.db.begin().await?;
    if !Tag::delete(&mut tx, id).await? {
        return Err(ApiError::not_found("Tag"));
    }
    AdminLog::record(&mut tx, admin_id, "tag.delete", "tag", Some(id.to_string()), json!({})).await?;
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}
