use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub invite_code: String,
    pub captain_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
}

/// Membership row as needed to resolve the current team; roles and join
/// times are read through `MemberRow`.
#[derive(Debug, Clone, FromRow)]
pub struct TeamMember {
    pub id: Uuid,
    pub team_id: Uuid,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MemberRow {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}
