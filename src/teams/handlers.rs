use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateTeamRequest, JoinTeamRequest, TeamView},
    membership::{ROLE_CAPTAIN, ROLE_MEMBER},
    repo_types::{Team, TeamMember},
};
use crate::{
    auth::{extractors::{ActiveUser, AuthUser}, services::random_alphanumeric},
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    state::AppState,
};

const INVITE_CODE_LEN: usize = 12;

pub fn team_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_team))
        .route("/join", post(join_team))
        .route("/leave", post(leave_team))
        .route("/me", get(my_team))
        .route("/:id", get(get_team))
}

fn validate_name(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(2..=100).contains(&len) {
        return Err(ApiError::BadRequest("Team name must be 2-100 characters".into()));
    }
    Ok(name.to_string())
}

#[instrument(skip(state, payload))]
pub async fn create_team(
    State(state): State<AppState>,
    auth: ActiveUser,
    ApiJson(payload): ApiJson<CreateTeamRequest>,
) -> ApiResult<Json<TeamView>> {
    let name = validate_name(&payload.name)?;
    let description = payload
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let mut tx = state.db.begin().await?;
    if Team::current_for_user(&mut tx, auth.id).await?.is_some() {
        return Err(ApiError::Conflict("Leave your current team first".into()));
    }
    if Team::name_taken(&mut tx, &name).await? {
        return Err(ApiError::Conflict("Team name already taken".into()));
    }
    let invite_code = random_alphanumeric(INVITE_CODE_LEN);
    let team = Team::insert(&mut tx, &name, description.as_deref(), &invite_code, auth.id).await?;
    TeamMember::insert(&mut tx, team.id, auth.id, ROLE_CAPTAIN).await?;
    let members = Team::members(&mut tx, team.id).await?;
    tx.commit().await?;

    info!(team_id = %team.id, user_id = %auth.id, "team created");
    Ok(Json(TeamView::render(team, members, auth.id)))
}

#[instrument(skip(state, payload))]
pub async fn join_team(
    State(state): State<AppState>,
    auth: ActiveUser,
    ApiJson(payload): ApiJson<JoinTeamRequest>,
) -> ApiResult<Json<TeamView>> {
    let mut tx = state.db.begin().await?;
    if Team::current_for_user(&mut tx, auth.id).await?.is_some() {
        return Err(ApiError::Conflict("Leave your current team first".into()));
    }
    let team = Team::find_by_invite_code(&mut tx, payload.invite_code.trim())
        .await?
        .ok_or_else(|| {
            warn!(user_id = %auth.id, "join with unknown invite code");
            ApiError::not_found("Team")
        })?;
    TeamMember::insert(&mut tx, team.id, auth.id, ROLE_MEMBER).await?;
    let members = Team::members(&mut tx, team.id).await?;
    tx.commit().await?;

    info!(team_id = %team.id, user_id = %auth.id, "team joined");
    Ok(Json(TeamView::render(team, members, auth.id)))
}

/// Deactivates the current membership; a leaving captain hands over to the
/// longest-standing remaining member.
#[instrument(skip(state))]
pub async fn leave_team(State(state): State<AppState>, auth: ActiveUser) -> ApiResult<Json<serde_json::Value>> {
    let mut tx = state.db.begin().await?;
    let (team, membership) = Team::current_for_user(&mut tx, auth.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("You are not in a team".into()))?;
    membership.deactivate(&mut tx).await?;

    if team.captain_id == Some(auth.id) {
        let successor = Team::members(&mut tx, team.id).await?.into_iter().next();
        let successor_id = successor.map(|m| m.user_id);
        if let Some(next) = successor_id {
            TeamMember::promote(&mut tx, team.id, next).await?;
        }
        Team::set_captain(&mut tx, team.id, successor_id).await?;
    }
    tx.commit().await?;

    info!(team_id = %team.id, user_id = %auth.id, "team left");
    Ok(Json(serde_json::json!({ "message": "Left team", "team_id": team.id })))
}

#[instrument(skip(state))]
pub async fn my_team(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<TeamView>> {
    let mut conn = state.db.acquire().await?;
    let (team, _) = Team::current_for_user(&mut conn, auth.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("You are not in a team".into()))?;
    let members = Team::members(&mut conn, team.id).await?;
    Ok(Json(TeamView::render(team, members, auth.id)))
}

#[instrument(skip(state))]
pub async fn get_team(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<TeamView>> {
    let team = Team::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Team"))?;
    let mut conn = state.db.acquire().await?;
    let members = Team::members(&mut conn, team.id).await?;
    Ok(Json(TeamView::render(team, members, auth.id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  r3kt  ").unwrap(), "r3kt");
        assert!(validate_name(" x ").is_err());
        assert!(validate_name(&"y".repeat(101)).is_err());
    }
}
