use axum::{extract::State, routing::get, Json, Router};
use tracing::instrument;

use super::{
    board::{page, rank, Board},
    repo::{team_lines, user_lines},
};
use crate::{
    error::ApiResult,
    extract::{ApiQuery, Pagination},
    state::AppState,
};

pub fn ranking_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(user_ranking))
        .route("/teams", get(team_ranking))
}

#[instrument(skip(state))]
pub async fn user_ranking(State(state): State<AppState>, ApiQuery(p): ApiQuery<Pagination>) -> ApiResult<Json<Board>> {
    let mut conn = state.db.acquire().await?;
    let lines = user_lines(&mut conn).await?;
    Ok(Json(page(rank(lines), p.limit(), p.offset())))
}

#[instrument(skip(state))]
pub async fn team_ranking(State(state): State<AppState>, ApiQuery(p): ApiQuery<Pagination>) -> ApiResult<Json<Board>> {
    let mut conn = state.db.acquire().await?;
    let lines = team_lines(&mut conn).await?;
    Ok(Json(page(rank(lines), p.limit(), p.offset())))
}
