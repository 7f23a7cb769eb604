use anyhow::Context;
use sqlx::PgConnection;

use super::board::ScoreLine;

/// Active non-admin users with their distinct first solves.
pub async fn user_lines(conn: &mut PgConnection) -> anyhow::Result<Vec<ScoreLine>> {
    let rows = sqlx::query_as::<_, ScoreLine>(
        r#"
        WITH solves AS (
            SELECT s.user_id, s.challenge_id, MIN(s.submitted_at) AS solved_at
              FROM submissions s
             WHERE s.is_correct
             GROUP BY s.user_id, s.challenge_id
        )
        SELECT u.id,
               u.username AS name,
               COALESCE(SUM(c.points), 0)::BIGINT AS score,
               COUNT(c.id) AS solved_count,
               MAX(sv.solved_at) AS last_solve_at
          FROM users u
          LEFT JOIN solves sv ON sv.user_id = u.id
          LEFT JOIN challenges c ON c.id = sv.challenge_id
         WHERE u.is_active AND NOT u.is_admin
         GROUP BY u.id, u.username
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("load user score lines")?;
    Ok(rows)
}

/// Teams with at least one active member; a challenge counts once per team,
/// at the time its first active member solved it.
pub async fn team_lines(conn: &mut PgConnection) -> anyhow::Result<Vec<ScoreLine>> {
    let rows = sqlx::query_as::<_, ScoreLine>(
        r#"
        WITH solves AS (
            SELECT tm.team_id, s.challenge_id, MIN(s.submitted_at) AS solved_at
              FROM submissions s
              JOIN team_members tm ON tm.user_id = s.user_id AND tm.is_active
             WHERE s.is_correct
             GROUP BY tm.team_id, s.challenge_id
        )
        SELECT t.id,
               t.name,
               COALESCE(SUM(c.points), 0)::BIGINT AS score,
               COUNT(c.id) AS solved_count,
               MAX(sv.solved_at) AS last_solve_at
          FROM teams t
          LEFT JOIN solves sv ON sv.team_id = t.id
          LEFT JOIN challenges c ON c.id = sv.challenge_id
         WHERE EXISTS (SELECT 1 FROM team_members m WHERE m.team_id = t.id AND m.is_active)
         GROUP BY t.id, t.name
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("load team score lines")?;
    Ok(rows)
}
