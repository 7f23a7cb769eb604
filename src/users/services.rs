use sqlx::PgConnection;

use super::{
    dto::UserView,
    repo::submission_records,
    repo_types::{User, UserProfile},
    stats,
};
use crate::teams::repo_types::Team;

/// Loads profile, current team and live statistics and renders the user.
pub async fn user_view(conn: &mut PgConnection, user: &User, include_sensitive: bool) -> anyhow::Result<UserView> {
    let records = submission_records(conn, user.id).await?;
    let stats = stats::compute(&records);
    let profile = UserProfile::find_by_user(conn, user.id).await?;
    let team = Team::current_for_user(conn, user.id).await?.map(|(team, _)| team);
    Ok(UserView::render(user, profile.as_ref(), team.as_ref(), &stats, include_sensitive))
}
