use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo::SubmissionHistoryRow,
    repo_types::{User, UserProfile},
    stats::Statistics,
};
use crate::teams::repo_types::Team;

/// Client-facing user. Scores are live aggregates, not the cached profile columns.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub total_score: i64,
    pub solved_challenges: i64,
    #[serde(flatten)]
    pub profile: Option<PublicProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamRef>,
}

#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub school: Option<String>,
    pub major: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TeamRef {
    pub id: Uuid,
    pub name: String,
}

impl UserView {
    /// `include_sensitive` controls whether the email address is rendered.
    pub fn render(
        user: &User,
        profile: Option<&UserProfile>,
        team: Option<&Team>,
        stats: &Statistics,
        include_sensitive: bool,
    ) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: include_sensitive.then(|| user.email.clone()),
            is_active: user.is_active,
            is_admin: user.is_admin,
            is_verified: user.is_verified,
            created_at: user.created_at,
            last_login: user.last_login,
            total_score: stats.total_score,
            solved_challenges: stats.solved_count,
            profile: profile.map(|p| PublicProfile {
                nickname: p.nickname.clone(),
                avatar_url: p.avatar_url.clone(),
                bio: p.bio.clone(),
                school: p.school.clone(),
                major: p.major.clone(),
            }),
            team: team.map(|t| TeamRef {
                id: t.id,
                name: t.name.clone(),
            }),
        }
    }
}

/// Full profile, shown to its owner.
#[derive(Debug, Serialize)]
pub struct ProfileView {
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
}

impl From<&UserProfile> for ProfileView {
    fn from(p: &UserProfile) -> Self {
        Self {
            nickname: p.nickname.clone(),
            real_name: p.real_name.clone(),
            avatar_url: p.avatar_url.clone(),
            bio: p.bio.clone(),
            school: p.school.clone(),
            major: p.major.clone(),
            grade: p.grade.clone(),
            student_id: p.student_id.clone(),
            phone: p.phone.clone(),
            qq: p.qq.clone(),
            wechat: p.wechat.clone(),
            github: p.github.clone(),
            total_score: p.total_score,
            rank: p.rank,
            solved_count: p.solved_count,
            submission_count: p.submission_count,
            preferred_language: p.preferred_language.clone(),
            timezone: p.timezone.clone(),
            email_notifications: p.email_notifications,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserView,
    pub profile: Option<ProfileView>,
}

/// Absent fields are left untouched; an empty string clears the field.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
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
    pub preferred_language: Option<String>,
    pub timezone: Option<String>,
    pub email_notifications: Option<bool>,
}

fn patch(field: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value {
        let v = v.trim().to_string();
        *field = (!v.is_empty()).then_some(v);
    }
}

impl UpdateProfileRequest {
    pub fn apply(self, profile: &mut UserProfile, now: OffsetDateTime) {
        patch(&mut profile.nickname, self.nickname);
        patch(&mut profile.real_name, self.real_name);
        patch(&mut profile.avatar_url, self.avatar_url);
        patch(&mut profile.bio, self.bio);
        patch(&mut profile.school, self.school);
        patch(&mut profile.major, self.major);
        patch(&mut profile.grade, self.grade);
        patch(&mut profile.student_id, self.student_id);
        patch(&mut profile.phone, self.phone);
        patch(&mut profile.qq, self.qq);
        patch(&mut profile.wechat, self.wechat);
        patch(&mut profile.github, self.github);
        if let Some(lang) = self.preferred_language.filter(|l| !l.trim().is_empty()) {
            profile.preferred_language = lang.trim().to_string();
        }
        if let Some(tz) = self.timezone.filter(|t| !t.trim().is_empty()) {
            profile.timezone = tz.trim().to_string();
        }
        if let Some(on) = self.email_notifications {
            profile.email_notifications = on;
        }
        profile.updated_at = now;
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct SubmissionItem {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub challenge_title: String,
    pub flag: String,
    pub is_correct: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
}

impl From<SubmissionHistoryRow> for SubmissionItem {
    fn from(r: SubmissionHistoryRow) -> Self {
        Self {
            id: r.id,
            challenge_id: r.challenge_id,
            challenge_title: r.challenge_title,
            flag: r.flag,
            is_correct: r.is_correct,
            submitted_at: r.submitted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2025-04-01 10:00 UTC);

    fn user() -> User {
        User::new_unsaved("dave", "Dave@Example.org", "hash", T0)
    }

    fn stats() -> Statistics {
        Statistics {
            submission_count: 9,
            solved_count: 3,
            total_score: 750,
            last_solve_at: None,
        }
    }

    #[test]
    fn email_hidden_unless_sensitive() {
        let u = user();
        let public = serde_json::to_value(UserView::render(&u, None, None, &stats(), false)).unwrap();
        assert!(public.get("email").is_none());

        let private = serde_json::to_value(UserView::render(&u, None, None, &stats(), true)).unwrap();
        assert_eq!(private["email"], "Dave@Example.org");
    }

    #[test]
    fn scores_come_from_live_statistics() {
        let u = user();
        let mut profile = UserProfile::empty_for(u.id, T0);
        profile.total_score = 1; // stale cache
        profile.solved_count = 0;
        let json = serde_json::to_value(UserView::render(&u, Some(&profile), None, &stats(), false)).unwrap();
        assert_eq!(json["total_score"], 750);
        assert_eq!(json["solved_challenges"], 3);
    }

    #[test]
    fn profile_and_team_are_merged_when_present() {
        let u = user();
        let mut profile = UserProfile::empty_for(u.id, T0);
        profile.nickname = Some("d4ve".into());
        profile.school = Some("Tsinghua".into());
        profile.phone = Some("123".into());
        let team = Team {
            id: uuid::Uuid::new_v4(),
            name: "0xDEADBEEF".into(),
            description: None,
            invite_code: "SECRET12".into(),
            captain_id: Some(u.id),
            created_at: T0,
        };
        let json =
            serde_json::to_value(UserView::render(&u, Some(&profile), Some(&team), &stats(), false)).unwrap();
        assert_eq!(json["nickname"], "d4ve");
        assert_eq!(json["school"], "Tsinghua");
        assert!(json.get("phone").is_none());
        assert_eq!(json["team"]["name"], "0xDEADBEEF");
        assert_eq!(json["team"]["id"], team.id.to_string());
        assert!(!json.to_string().contains("SECRET12"));
    }

    #[test]
    fn bare_user_has_no_profile_or_team_keys() {
        let json = serde_json::to_value(UserView::render(&user(), None, None, &stats(), true)).unwrap();
        assert!(json.get("nickname").is_none());
        assert!(json.get("team").is_none());
        assert_eq!(json["created_at"], "2025-04-01T10:00:00Z");
        assert!(json["last_login"].is_null());
    }

    #[test]
    fn profile_patch_semantics() {
        let mut profile = UserProfile::empty_for(uuid::Uuid::new_v4(), T0);
        profile.bio = Some("old".into());
        profile.github = Some("octo".into());
        let req = UpdateProfileRequest {
            nickname: Some("  n1ck ".into()),
            bio: Some("".into()),
            timezone: Some("UTC".into()),
            preferred_language: Some("   ".into()),
            email_notifications: Some(false),
            ..Default::default()
        };
        req.apply(&mut profile, T0);
        assert_eq!(profile.nickname.as_deref(), Some("n1ck"));
        assert!(profile.bio.is_none());
        assert_eq!(profile.github.as_deref(), Some("octo"));
        assert_eq!(profile.timezone, "UTC");
        assert_eq!(profile.preferred_language, "zh-CN");
        assert!(!profile.email_notifications);
    }
}
