use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    membership::current_membership,
    repo_types::{MemberRow, Team, TeamMember},
};

const TEAM_COLUMNS: &str = "id, name, description, invite_code, captain_id, created_at";

impl Team {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find team by id")?;
        Ok(team)
    }

    pub async fn find_by_invite_code(conn: &mut PgConnection, code: &str) -> anyhow::Result<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(&format!(
            "SELECT {TEAM_COLUMNS} FROM teams WHERE invite_code = $1"
        ))
        .bind(code)
        .fetch_optional(&mut *conn)
        .await
        .context("find team by invite code")?;
        Ok(team)
    }

    pub async fn name_taken(conn: &mut PgConnection, name: &str) -> anyhow::Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM teams WHERE lower(name) = lower($1))",
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .context("check team name")?;
        Ok(taken)
    }

    pub async fn insert(
        conn: &mut PgConnection,
        name: &str,
        description: Option<&str>,
        invite_code: &str,
        captain_id: Uuid,
    ) -> anyhow::Result<Team> {
        let team = sqlx::query_as::<_, Team>(&format!(
            r#"
            INSERT INTO teams (name, description, invite_code, captain_id)
            VALUES ($1, $2, $3, $4)
            RETURNING {TEAM_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(description)
        .bind(invite_code)
        .bind(captain_id)
        .fetch_one(&mut *conn)
        .await
        .context("insert team")?;
        Ok(team)
    }

    pub async fn set_captain(conn: &mut PgConnection, team_id: Uuid, captain_id: Option<Uuid>) -> anyhow::Result<()> {
        sqlx::query("UPDATE teams SET captain_id = $2 WHERE id = $1")
            .bind(team_id)
            .bind(captain_id)
            .execute(&mut *conn)
            .await
            .context("set team captain")?;
        Ok(())
    }

    /// Active members, oldest first.
    pub async fn members(conn: &mut PgConnection, team_id: Uuid) -> anyhow::Result<Vec<MemberRow>> {
        let rows = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT tm.user_id, u.username, tm.role, tm.joined_at
              FROM team_members tm
              JOIN users u ON u.id = tm.user_id
             WHERE tm.team_id = $1 AND tm.is_active
             ORDER BY tm.joined_at ASC
            "#,
        )
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await
        .context("list team members")?;
        Ok(rows)
    }

    /// Team of the user's current membership, if any.
    pub async fn current_for_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> anyhow::Result<Option<(Team, TeamMember)>> {
        let memberships = TeamMember::for_user(conn, user_id).await?;
        let Some(current) = current_membership(&memberships).cloned() else {
            return Ok(None);
        };
        let team = sqlx::query_as::<_, Team>(&format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1"))
            .bind(current.team_id)
            .fetch_one(&mut *conn)
            .await
            .context("load current team")?;
        Ok(Some((team, current)))
    }
}

impl TeamMember {
    pub async fn for_user(conn: &mut PgConnection, user_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
        let rows = sqlx::query_as::<_, TeamMember>(
            r#"
            SELECT id, team_id, is_active
              FROM team_members
             WHERE user_id = $1
             ORDER BY joined_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .context("list memberships")?;
        Ok(rows)
    }

    pub async fn insert(conn: &mut PgConnection, team_id: Uuid, user_id: Uuid, role: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO team_members (team_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(team_id)
            .bind(user_id)
            .bind(role)
            .execute(&mut *conn)
            .await
            .context("insert membership")?;
        Ok(())
    }

    pub async fn promote(conn: &mut PgConnection, team_id: Uuid, user_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE team_members SET role = $3 WHERE team_id = $1 AND user_id = $2 AND is_active")
            .bind(team_id)
            .bind(user_id)
            .bind(super::membership::ROLE_CAPTAIN)
            .execute(&mut *conn)
            .await
            .context("promote member")?;
        Ok(())
    }

    pub async fn deactivate(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query("UPDATE team_members SET is_active = FALSE WHERE id = $1")
            .bind(self.id)
            .execute(&mut *conn)
            .await
            .context("deactivate membership")?;
        Ok(())
    }
}
