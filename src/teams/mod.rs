mod dto;
pub mod handlers;
pub mod membership;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::team_routes()
}
