use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String, // argon2 PHC string
    pub is_active: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub last_login: Option<OffsetDateTime>,
    pub email_verification_token: Option<String>,
    pub email_verification_sent_at: Option<OffsetDateTime>,
    pub password_reset_token: Option<String>,
    pub password_reset_sent_at: Option<OffsetDateTime>,
}

pub(crate) const USER_COLUMNS: &str = "id, username, email, password_hash, is_active, is_admin, \
     is_verified, created_at, updated_at, last_login, email_verification_token, \
     email_verification_sent_at, password_reset_token, password_reset_sent_at";

impl User {
    /// A fresh, not yet inserted account.
    pub fn new_unsaved(username: &str, email: &str, password_hash: &str, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_active: true,
            is_admin: false,
            is_verified: false,
            created_at: now,
            updated_at: now,
            last_login: None,
            email_verification_token: None,
            email_verification_sent_at: None,
            password_reset_token: None,
            password_reset_sent_at: None,
        }
    }

    #[cfg(test)]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

/// Personal details and cached competition statistics, one row per user.
#[derive(Debug, Clone, FromRow)]
pub struct UserProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub nickname: Option<String>,
    pub real_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub school: Option<String>,
    pub major: Option<String>,
    pub grade: Option<String>,
    pub student_id: Option<String>,
    pub phone: Option<String>,
    pub qq: Option<String>,
    pub wechat: Option<String>,
    pub github: Option<String>,
    pub total_score: i64,
    pub rank: Option<i32>,
    pub solved_count: i64,
    pub submission_count: i64,
    pub preferred_language: String,
    pub timezone: String,
    pub email_notifications: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub(crate) const PROFILE_COLUMNS: &str = "id, user_id, nickname, real_name, avatar_url, bio, \
     school, major, grade, student_id, phone, qq, wechat, github, total_score, rank, \
     solved_count, submission_count, preferred_language, timezone, email_notifications, \
     created_at, updated_at";

impl UserProfile {
    pub fn empty_for(user_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            nickname: None,
            real_name: None,
            avatar_url: None,
            bio: None,
            school: None,
            major: None,
            grade: None,
            student_id: None,
            phone: None,
            qq: None,
            wechat: None,
            github: None,
            total_score: 0,
            rank: None,
            solved_count: 0,
            submission_count: 0,
            preferred_language: "zh-CN".into(),
            timezone: "Asia/Shanghai".into(),
            email_notifications: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One submission joined with the current point value of its challenge.
#[derive(Debug, Clone, FromRow)]
pub struct SubmissionRecord {
    pub challenge_id: Uuid,
    pub is_correct: bool,
    pub points: i32,
    pub submitted_at: OffsetDateTime,
}
