pub mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

/// Every admin route, including the ones owned by other areas.
pub fn router(upload_limit: usize) -> Router<AppState> {
    handlers::admin_routes()
        .merge(crate::challenges::handlers::admin_routes(upload_limit))
        .merge(crate::notifications::handlers::admin_routes())
}
