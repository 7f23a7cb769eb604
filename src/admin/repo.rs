use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::repo_types::AdminLog;

impl AdminLog {
    /// Appends an audit row; call inside the transaction of the mutation it describes.
    pub async fn record(
        conn: &mut PgConnection,
        admin_id: Uuid,
        action: &str,
        target_type: &str,
        target_id: Option<String>,
        details: serde_json::Value,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_logs (admin_id, action, target_type, target_id, details)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(admin_id)
        .bind(action)
        .bind(target_type)
        .bind(target_id)
        .bind(details)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("record admin action {action}"))?;
        Ok(())
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<AdminLog>> {
        let rows = sqlx::query_as::<_, AdminLog>(
            r#"
            SELECT id, admin_id, action, target_type, target_id, details, created_at
              FROM admin_logs
             ORDER BY created_at DESC
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list admin logs")?;
        Ok(rows)
    }
}
