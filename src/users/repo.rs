use anyhow::Context;
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo_types::{SubmissionRecord, User, UserProfile, PROFILE_COLUMNS, USER_COLUMNS},
    stats::{self, Statistics},
};

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    /// Login accepts either the username or the email address.
    pub async fn find_by_login(db: &PgPool, login: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = lower($1) LIMIT 1"
        ))
        .bind(login)
        .fetch_optional(db)
        .await
        .context("find user by login")?;
        Ok(user)
    }

    /// Returns (username taken, email taken).
    pub async fn conflicts(db: &PgPool, username: &str, email: &str) -> anyhow::Result<(bool, bool)> {
        let row: (bool, bool) = sqlx::query_as(
            r#"
            SELECT EXISTS(SELECT 1 FROM users WHERE username = $1),
                   EXISTS(SELECT 1 FROM users WHERE email = $2)
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(db)
        .await
        .context("check user conflicts")?;
        Ok(row)
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, is_active, is_admin,
                               is_verified, created_at, updated_at, last_login,
                               email_verification_token, email_verification_sent_at,
                               password_reset_token, password_reset_sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(self.id)
        .bind(&self.username)
        .bind(&self.email)
        .bind(&self.password_hash)
        .bind(self.is_active)
        .bind(self.is_admin)
        .bind(self.is_verified)
        .bind(self.created_at)
        .bind(self.updated_at)
        .bind(self.last_login)
        .bind(&self.email_verification_token)
        .bind(self.email_verification_sent_at)
        .bind(&self.password_reset_token)
        .bind(self.password_reset_sent_at)
        .execute(&mut *conn)
        .await
        .context("insert user")?;
        Ok(())
    }

    /// Persists credential, token and flag columns after an in-memory change.
    pub async fn save(&self, db: &PgPool) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET password_hash = $2, is_active = $3, is_admin = $4, is_verified = $5,
                   updated_at = $6, last_login = $7,
                   email_verification_token = $8, email_verification_sent_at = $9,
                   password_reset_token = $10, password_reset_sent_at = $11
             WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&self.password_hash)
        .bind(self.is_active)
        .bind(self.is_admin)
        .bind(self.is_verified)
        .bind(self.updated_at)
        .bind(self.last_login)
        .bind(&self.email_verification_token)
        .bind(self.email_verification_sent_at)
        .bind(&self.password_reset_token)
        .bind(self.password_reset_sent_at)
        .execute(db)
        .await
        .context("save user")?;
        Ok(())
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list users")?;
        Ok(users)
    }

    pub async fn set_flags(
        conn: &mut PgConnection,
        id: Uuid,
        is_active: Option<bool>,
        is_admin: Option<bool>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET is_active = COALESCE($2, is_active),
                   is_admin = COALESCE($3, is_admin),
                   updated_at = now()
             WHERE id = $1
         RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .bind(is_admin)
        .fetch_optional(&mut *conn)
        .await
        .context("set user flags")?;
        Ok(user)
    }

    pub async fn all_ids(conn: &mut PgConnection) -> anyhow::Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users ORDER BY created_at")
            .fetch_all(&mut *conn)
            .await
            .context("list user ids")?;
        Ok(ids)
    }
}

impl UserProfile {
    pub async fn insert(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (id, user_id, preferred_language, timezone,
                                       email_notifications, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(self.id)
        .bind(self.user_id)
        .bind(&self.preferred_language)
        .bind(&self.timezone)
        .bind(self.email_notifications)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await
        .context("insert profile")?;
        Ok(())
    }

    pub async fn find_by_user(conn: &mut PgConnection, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .context("find profile")?;
        Ok(profile)
    }

    pub async fn save_personal(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE user_profiles
               SET nickname = $2, real_name = $3, avatar_url = $4, bio = $5, school = $6,
                   major = $7, grade = $8, student_id = $9, phone = $10, qq = $11,
                   wechat = $12, github = $13, preferred_language = $14, timezone = $15,
                   email_notifications = $16, updated_at = $17
             WHERE user_id = $1
            "#,
        )
        .bind(self.user_id)
        .bind(&self.nickname)
        .bind(&self.real_name)
        .bind(&self.avatar_url)
        .bind(&self.bio)
        .bind(&self.school)
        .bind(&self.major)
        .bind(&self.grade)
        .bind(&self.student_id)
        .bind(&self.phone)
        .bind(&self.qq)
        .bind(&self.wechat)
        .bind(&self.github)
        .bind(&self.preferred_language)
        .bind(&self.timezone)
        .bind(self.email_notifications)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await
        .context("save profile")?;
        Ok(())
    }

    async fn save_statistics(&self, conn: &mut PgConnection) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE user_profiles
               SET total_score = $2, solved_count = $3, submission_count = $4, updated_at = $5
             WHERE user_id = $1
            "#,
        )
        .bind(self.user_id)
        .bind(self.total_score)
        .bind(self.solved_count)
        .bind(self.submission_count)
        .bind(self.updated_at)
        .execute(&mut *conn)
        .await
        .context("save profile statistics")?;
        Ok(())
    }

    pub async fn set_rank(conn: &mut PgConnection, user_id: Uuid, rank: Option<i32>) -> anyhow::Result<()> {
        sqlx::query("UPDATE user_profiles SET rank = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(rank)
            .execute(&mut *conn)
            .await
            .context("set profile rank")?;
        Ok(())
    }
}

pub async fn submission_records(conn: &mut PgConnection, user_id: Uuid) -> anyhow::Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query_as::<_, SubmissionRecord>(
        r#"
        SELECT s.challenge_id, s.is_correct, c.points, s.submitted_at
          FROM submissions s
          JOIN challenges c ON c.id = s.challenge_id
         WHERE s.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .context("load submission records")?;
    Ok(rows)
}

/// Recomputes the cached aggregates of one profile from the submissions table.
/// Creates the profile if it is missing.
pub async fn update_statistics(
    conn: &mut PgConnection,
    user_id: Uuid,
    now: OffsetDateTime,
) -> anyhow::Result<Statistics> {
    let records = submission_records(conn, user_id).await?;
    let stats = stats::compute(&records);

    let mut profile = match UserProfile::find_by_user(conn, user_id).await? {
        Some(p) => p,
        None => {
            let p = UserProfile::empty_for(user_id, now);
            p.insert(conn).await?;
            p
        }
    };
    profile.apply_statistics(&stats, now);
    profile.save_statistics(conn).await?;
    Ok(stats)
}

#[derive(Debug, Clone, FromRow)]
pub struct SubmissionHistoryRow {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub challenge_title: String,
    pub flag: String,
    pub is_correct: bool,
    pub submitted_at: OffsetDateTime,
}

pub async fn submission_history(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<SubmissionHistoryRow>> {
    let rows = sqlx::query_as::<_, SubmissionHistoryRow>(
        r#"
        SELECT s.id, s.challenge_id, c.title AS challenge_title, s.flag, s.is_correct, s.submitted_at
          FROM submissions s
          JOIN challenges c ON c.id = s.challenge_id
         WHERE s.user_id = $1
         ORDER BY s.submitted_at DESC
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list submission history")?;
    Ok(rows)
}
