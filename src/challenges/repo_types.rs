use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const CHALLENGE_COLUMNS: &str = "id, title, points, is_visible";

/// Columns the submission and admin paths act on; listings and detail
/// views go through `ChallengeRow`.
#[derive(Debug, Clone, FromRow)]
pub struct Challenge {
    pub id: Uuid,
    pub title: String,
    pub points: i32,
    pub is_visible: bool,
}

/// Challenge joined with its category name and solve figures for one viewer.
#[derive(Debug, Clone, FromRow)]
pub struct ChallengeRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub category: Option<String>,
    pub points: i32,
    pub difficulty: String,
    pub is_visible: bool,
    pub created_at: OffsetDateTime,
    pub solve_count: i64,
    pub solved: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Flag {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub content: String,
    pub kind: String,
    pub case_sensitive: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub filename: String,
    pub s3_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: OffsetDateTime,
}
