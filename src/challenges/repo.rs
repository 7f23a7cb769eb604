use std::collections::HashMap;

use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Attachment, Category, Challenge, ChallengeRow, Flag, Tag, CHALLENGE_COLUMNS};

const ROW_SELECT: &str = r#"
    SELECT c.id, c.title, c.description, c.category_id, cat.name AS category,
           c.points, c.difficulty, c.is_visible, c.created_at,
           (SELECT COUNT(DISTINCT s.user_id) FROM submissions s
             WHERE s.challenge_id = c.id AND s.is_correct) AS solve_count,
           EXISTS(SELECT 1 FROM submissions s
                   WHERE s.challenge_id = c.id AND s.user_id = $1 AND s.is_correct) AS solved
      FROM challenges c
      LEFT JOIN categories cat ON cat.id = c.category_id
"#;

const FLAG_COLUMNS: &str = "id, challenge_id, content, kind, case_sensitive, created_at";
const ATTACHMENT_COLUMNS: &str = "id, challenge_id, filename, s3_key, content_type, size_bytes, created_at";

/// Fields written by create and update.
#[derive(Debug, Clone)]
pub struct ChallengeFields {
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub points: i32,
    pub difficulty: String,
    pub is_visible: bool,
}

impl Challenge {
    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Challenge>> {
        let row = sqlx::query_as::<_, Challenge>(&format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find challenge")?;
        Ok(row)
    }

    /// Visible challenges (all of them when `include_hidden`), optionally in one category.
    pub async fn list_rows(
        db: &PgPool,
        viewer: Uuid,
        category_id: Option<Uuid>,
        include_hidden: bool,
    ) -> anyhow::Result<Vec<ChallengeRow>> {
        let rows = sqlx::query_as::<_, ChallengeRow>(&format!(
            r#"{ROW_SELECT}
             WHERE ($2 OR c.is_visible)
               AND ($3::uuid IS NULL OR c.category_id = $3)
             ORDER BY cat.name ASC NULLS LAST, c.points ASC, c.title ASC
            "#
        ))
        .bind(viewer)
        .bind(include_hidden)
        .bind(category_id)
        .fetch_all(db)
        .await
        .context("list challenges")?;
        Ok(rows)
    }

    pub async fn find_row(
        db: &PgPool,
        viewer: Uuid,
        id: Uuid,
        include_hidden: bool,
    ) -> anyhow::Result<Option<ChallengeRow>> {
        let row = sqlx::query_as::<_, ChallengeRow>(&format!(
            "{ROW_SELECT} WHERE c.id = $2 AND ($3 OR c.is_visible)"
        ))
        .bind(viewer)
        .bind(id)
        .bind(include_hidden)
        .fetch_optional(db)
        .await
        .context("find challenge row")?;
        Ok(row)
    }

    pub async fn insert(
        conn: &mut PgConnection,
        fields: &ChallengeFields,
        author_id: Uuid,
    ) -> anyhow::Result<Challenge> {
        let row = sqlx::query_as::<_, Challenge>(&format!(
            r#"
            INSERT INTO challenges (title, description, category_id, points, difficulty, is_visible, author_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {CHALLENGE_COLUMNS}
            "#
        ))
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.category_id)
        .bind(fields.points)
        .bind(&fields.difficulty)
        .bind(fields.is_visible)
        .bind(author_id)
        .fetch_one(&mut *conn)
        .await
        .context("insert challenge")?;
        Ok(row)
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        fields: &ChallengeFields,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<Challenge>> {
        let row = sqlx::query_as::<_, Challenge>(&format!(
            r#"
            UPDATE challenges
               SET title = $2, description = $3, category_id = $4, points = $5,
                   difficulty = $6, is_visible = $7, updated_at = $8
             WHERE id = $1
            RETURNING {CHALLENGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.title)
        .bind(&fields.description)
        .bind(fields.category_id)
        .bind(fields.points)
        .bind(&fields.difficulty)
        .bind(fields.is_visible)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .context("update challenge")?;
        Ok(row)
    }

    /// Returns false when nothing was deleted.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM challenges WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("delete challenge")?;
        Ok(res.rows_affected() > 0)
    }
}

impl Category {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories ORDER BY name")
            .fetch_all(db)
            .await
            .context("list categories")?;
        Ok(rows)
    }

    pub async fn exists(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<bool> {
        let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .context("check category")?;
        Ok(found)
    }

    pub async fn name_taken(conn: &mut PgConnection, name: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM categories WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(name)
        .bind(except)
        .fetch_one(&mut *conn)
        .await
        .context("check category name")?;
        Ok(taken)
    }

    pub async fn insert(conn: &mut PgConnection, name: &str, description: Option<&str>) -> anyhow::Result<Category> {
        let row = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, description) VALUES ($1, $2) RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&mut *conn)
        .await
        .context("insert category")?;
        Ok(row)
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> anyhow::Result<Option<Category>> {
        let row = sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $2, description = $3 WHERE id = $1 RETURNING id, name, description",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(&mut *conn)
        .await
        .context("update category")?;
        Ok(row)
    }

    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("delete category")?;
        Ok(res.rows_affected() > 0)
    }
}

impl Tag {
    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Tag>> {
        let rows = sqlx::query_as::<_, Tag>("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(db)
            .await
            .context("list tags")?;
        Ok(rows)
    }

    /// Returns the tag with this name, creating it if needed.
    pub async fn ensure(conn: &mut PgConnection, name: &str) -> anyhow::Result<Tag> {
        let row = sqlx::query_as::<_, Tag>(
            r#"
            INSERT INTO tags (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .context("ensure tag")?;
        Ok(row)
    }

    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("delete tag")?;
        Ok(res.rows_affected() > 0)
    }

    /// Tag names keyed by challenge id.
    pub async fn names_for(db: &PgPool, challenge_ids: &[Uuid]) -> anyhow::Result<HashMap<Uuid, Vec<String>>> {
        let rows = sqlx::query_as::<_, (Uuid, String)>(
            r#"
            SELECT ct.challenge_id, t.name
              FROM challenge_tags ct
              JOIN tags t ON t.id = ct.tag_id
             WHERE ct.challenge_id = ANY($1)
             ORDER BY t.name
            "#,
        )
        .bind(challenge_ids)
        .fetch_all(db)
        .await
        .context("load challenge tags")?;

        let mut out: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (challenge_id, name) in rows {
            out.entry(challenge_id).or_default().push(name);
        }
        Ok(out)
    }

    /// Replaces the tag set of a challenge.
    pub async fn set_for_challenge(conn: &mut PgConnection, challenge_id: Uuid, names: &[String]) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM challenge_tags WHERE challenge_id = $1")
            .bind(challenge_id)
            .execute(&mut *conn)
            .await
            .context("clear challenge tags")?;
        for name in names {
            let tag = Tag::ensure(conn, name).await?;
            sqlx::query("INSERT INTO challenge_tags (challenge_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(challenge_id)
                .bind(tag.id)
                .execute(&mut *conn)
                .await
                .context("link challenge tag")?;
        }
        Ok(())
    }
}

impl Flag {
    pub async fn for_challenge(conn: &mut PgConnection, challenge_id: Uuid) -> anyhow::Result<Vec<Flag>> {
        let rows = sqlx::query_as::<_, Flag>(&format!(
            "SELECT {FLAG_COLUMNS} FROM flags WHERE challenge_id = $1 ORDER BY created_at"
        ))
        .bind(challenge_id)
        .fetch_all(&mut *conn)
        .await
        .context("load flags")?;
        Ok(rows)
    }

    pub async fn insert(
        conn: &mut PgConnection,
        challenge_id: Uuid,
        content: &str,
        kind: &str,
        case_sensitive: bool,
    ) -> anyhow::Result<Flag> {
        let row = sqlx::query_as::<_, Flag>(&format!(
            r#"
            INSERT INTO flags (challenge_id, content, kind, case_sensitive)
            VALUES ($1, $2, $3, $4)
            RETURNING {FLAG_COLUMNS}
            "#
        ))
        .bind(challenge_id)
        .bind(content)
        .bind(kind)
        .bind(case_sensitive)
        .fetch_one(&mut *conn)
        .await
        .context("insert flag")?;
        Ok(row)
    }

    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM flags WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("delete flag")?;
        Ok(res.rows_affected() > 0)
    }
}

impl Attachment {
    pub async fn for_challenge(db: &PgPool, challenge_id: Uuid) -> anyhow::Result<Vec<Attachment>> {
        let rows = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM challenge_attachments WHERE challenge_id = $1 ORDER BY created_at"
        ))
        .bind(challenge_id)
        .fetch_all(db)
        .await
        .context("list attachments")?;
        Ok(rows)
    }

    pub async fn insert(
        conn: &mut PgConnection,
        challenge_id: Uuid,
        filename: &str,
        s3_key: &str,
        content_type: &str,
        size_bytes: i64,
    ) -> anyhow::Result<Attachment> {
        let row = sqlx::query_as::<_, Attachment>(&format!(
            r#"
            INSERT INTO challenge_attachments (challenge_id, filename, s3_key, content_type, size_bytes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ATTACHMENT_COLUMNS}
            "#
        ))
        .bind(challenge_id)
        .bind(filename)
        .bind(s3_key)
        .bind(content_type)
        .bind(size_bytes)
        .fetch_one(&mut *conn)
        .await
        .context("insert attachment")?;
        Ok(row)
    }

    /// Deletes the row and returns it so the stored object can be removed.
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<Option<Attachment>> {
        let row = sqlx::query_as::<_, Attachment>(&format!(
            "DELETE FROM challenge_attachments WHERE id = $1 RETURNING {ATTACHMENT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("delete attachment")?;
        Ok(row)
    }

    pub async fn keys_for_challenge(conn: &mut PgConnection, challenge_id: Uuid) -> anyhow::Result<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>("SELECT s3_key FROM challenge_attachments WHERE challenge_id = $1")
            .bind(challenge_id)
            .fetch_all(&mut *conn)
            .await
            .context("list attachment keys")?;
        Ok(keys)
    }
}

pub async fn already_solved(conn: &mut PgConnection, user_id: Uuid, challenge_id: Uuid) -> anyhow::Result<bool> {
    let solved = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM submissions WHERE user_id = $1 AND challenge_id = $2 AND is_correct)",
    )
    .bind(user_id)
    .bind(challenge_id)
    .fetch_one(&mut *conn)
    .await
    .context("check solved")?;
    Ok(solved)
}

pub async fn insert_submission(
    conn: &mut PgConnection,
    user_id: Uuid,
    challenge_id: Uuid,
    flag: &str,
    is_correct: bool,
    now: OffsetDateTime,
) -> anyhow::Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO submissions (user_id, challenge_id, flag, is_correct, submitted_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(challenge_id)
    .bind(flag)
    .bind(is_correct)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .context("insert submission")?;
    Ok(id)
}
