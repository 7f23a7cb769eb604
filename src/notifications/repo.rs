use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

const COLUMNS: &str = "id, user_id, title, content, is_read, created_at";

/// `user_id = None` is a broadcast visible to everyone.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub content: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    /// Own and broadcast notifications, newest first.
    pub async fn list_for(db: &PgPool, user_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {COLUMNS} FROM notifications
             WHERE user_id = $1 OR user_id IS NULL
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list notifications")?;
        Ok(rows)
    }

    pub async fn unread_count(db: &PgPool, user_id: Uuid) -> anyhow::Result<i64> {
        let n = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE (user_id = $1 OR user_id IS NULL) AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(db)
        .await
        .context("count unread notifications")?;
        Ok(n)
    }

    /// Marks one notification read if the user can see it.
    pub async fn mark_read(db: &PgPool, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Notification>> {
        let row = sqlx::query_as::<_, Notification>(&format!(
            r#"
            UPDATE notifications SET is_read = TRUE
             WHERE id = $1 AND (user_id = $2 OR user_id IS NULL)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
        .context("mark notification read")?;
        Ok(row)
    }

    pub async fn insert(
        conn: &mut PgConnection,
        user_id: Option<Uuid>,
        title: &str,
        content: &str,
    ) -> anyhow::Result<Notification> {
        let row = sqlx::query_as::<_, Notification>(&format!(
            "INSERT INTO notifications (user_id, title, content) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        ))
        .bind(user_id)
        .bind(title)
        .bind(content)
        .fetch_one(&mut *conn)
        .await
        .context("insert notification")?;
        Ok(row)
    }
}
