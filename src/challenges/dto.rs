use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    flags::{compile, FlagKind},
    repo::ChallengeFields,
    repo_types::{Attachment, ChallengeRow, Flag},
    services::{SubmissionOutcome, MAX_FLAG_LEN},
};
use crate::error::{ApiError, ApiResult};

pub const DIFFICULTIES: [&str; 4] = ["easy", "medium", "hard", "insane"];

#[derive(Debug, Deserialize)]
pub struct ChallengeFilter {
    pub category_id: Option<Uuid>,
}

/// Challenge as players see it. Flags are never part of this view.
#[derive(Debug, Serialize)]
pub struct ChallengeView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: Option<Uuid>,
    pub category: Option<String>,
    pub points: i32,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub solved: bool,
    pub solve_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ChallengeView {
    pub fn render(row: ChallengeRow, tags: Vec<String>, for_admin: bool) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category_id: row.category_id,
            category: row.category,
            points: row.points,
            difficulty: row.difficulty,
            tags,
            solved: row.solved,
            solve_count: row.solve_count,
            is_visible: for_admin.then_some(row.is_visible),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitFlagRequest {
    pub flag: String,
}

impl SubmitFlagRequest {
    pub fn normalized(&self) -> ApiResult<&str> {
        let flag = self.flag.trim();
        if flag.is_empty() {
            return Err(ApiError::BadRequest("Flag is required".into()));
        }
        if flag.len() > MAX_FLAG_LEN {
            return Err(ApiError::BadRequest("Flag too long".into()));
        }
        Ok(flag)
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitFlagResponse {
    pub correct: bool,
    pub already_solved: bool,
    pub message: &'static str,
    pub points_awarded: i32,
    pub total_score: i64,
    pub solved_count: i64,
}

impl SubmitFlagResponse {
    pub fn new(outcome: SubmissionOutcome, points: i32, total_score: i64, solved_count: i64) -> Self {
        let (correct, already_solved, message, points_awarded) = match outcome {
            SubmissionOutcome::Correct => (true, false, "Correct flag", points),
            SubmissionOutcome::AlreadySolved => (true, true, "Challenge already solved", 0),
            SubmissionOutcome::Incorrect => (false, false, "Incorrect flag", 0),
        };
        Self {
            correct,
            already_solved,
            message,
            points_awarded,
            total_score,
            solved_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AttachmentView {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AttachmentView {
    pub fn new(a: Attachment, url: String) -> Self {
        Self {
            id: a.id,
            filename: a.filename,
            content_type: a.content_type,
            size_bytes: a.size_bytes,
            url,
            created_at: a.created_at,
        }
    }
}

// ---- admin ----

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category_id: Option<Uuid>,
    pub points: i32,
    pub difficulty: Option<String>,
    #[serde(default)]
    pub is_visible: bool,
    pub tags: Option<Vec<String>>,
}

impl ChallengeRequest {
    pub fn validate(&self) -> ApiResult<ChallengeFields> {
        let title = self.title.trim();
        if title.is_empty() || title.chars().count() > 200 {
            return Err(ApiError::BadRequest("Title must be 1-200 characters".into()));
        }
        if self.points <= 0 {
            return Err(ApiError::BadRequest("Points must be positive".into()));
        }
        let difficulty = self.difficulty.as_deref().unwrap_or("medium").to_lowercase();
        if !DIFFICULTIES.contains(&difficulty.as_str()) {
            return Err(ApiError::BadRequest(format!("Difficulty must be one of {}", DIFFICULTIES.join(", "))));
        }
        Ok(ChallengeFields {
            title: title.to_string(),
            description: self.description.clone(),
            category_id: self.category_id,
            points: self.points,
            difficulty,
            is_visible: self.is_visible,
        })
    }

    /// Trimmed, de-duplicated tag names.
    pub fn tag_names(&self) -> Option<Vec<String>> {
        self.tags.as_ref().map(|tags| {
            let mut names: Vec<String> = tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty() && t.len() <= 50)
                .collect();
            names.sort();
            names.dedup();
            names
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub content: String,
    pub kind: Option<String>,
    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

impl FlagRequest {
    /// Stored content; trimmed the same way submissions are.
    pub fn content(&self) -> &str {
        self.content.trim()
    }

    pub fn validate(&self) -> ApiResult<FlagKind> {
        if self.content().is_empty() {
            return Err(ApiError::BadRequest("Flag content is required".into()));
        }
        let kind = FlagKind::parse(self.kind.as_deref().unwrap_or("static"))
            .ok_or_else(|| ApiError::BadRequest("Flag kind must be static or regex".into()))?;
        if kind == FlagKind::Regex && compile(self.content(), self.case_sensitive).is_none() {
            return Err(ApiError::BadRequest("Flag regex does not compile".into()));
        }
        Ok(kind)
    }
}

#[derive(Debug, Serialize)]
pub struct FlagView {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub content: String,
    pub kind: String,
    pub case_sensitive: bool,
}

impl From<Flag> for FlagView {
    fn from(f: Flag) -> Self {
        Self {
            id: f.id,
            challenge_id: f.challenge_id,
            content: f.content,
            kind: f.kind,
            case_sensitive: f.case_sensitive,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::flags::flag_matches;

    fn request(points: i32, difficulty: Option<&str>) -> ChallengeRequest {
        ChallengeRequest {
            title: "  baby rop ".into(),
            description: String::new(),
            category_id: None,
            points,
            difficulty: difficulty.map(str::to_string),
            is_visible: false,
            tags: Some(vec!["PWN".into(), " pwn".into(), "".into(), "rop".into()]),
        }
    }

    #[test]
    fn challenge_request_validation() {
        let fields = request(100, None).validate().unwrap();
        assert_eq!(fields.title, "baby rop");
        assert_eq!(fields.difficulty, "medium");

        assert!(request(0, None).validate().is_err());
        assert!(request(100, Some("nightmare")).validate().is_err());
        assert_eq!(request(100, Some("Hard")).validate().unwrap().difficulty, "hard");
    }

    #[test]
    fn tags_are_normalized() {
        assert_eq!(request(1, None).tag_names(), Some(vec!["pwn".to_string(), "rop".to_string()]));
    }

    #[test]
    fn flag_request_rejects_broken_regex() {
        let req = FlagRequest { content: "flag{(".into(), kind: Some("regex".into()), case_sensitive: true };
        assert!(req.validate().is_err());
        let req = FlagRequest { content: "flag{(".into(), kind: None, case_sensitive: true };
        assert_eq!(req.validate().unwrap(), FlagKind::Static);
        let req = FlagRequest { content: "x".into(), kind: Some("glob".into()), case_sensitive: true };
        assert!(req.validate().is_err());
    }

    #[test]
    fn padded_flag_content_is_stored_trimmed() {
        let req = FlagRequest { content: " flag{x} \n".into(), kind: None, case_sensitive: true };
        assert_eq!(req.validate().unwrap(), FlagKind::Static);
        assert_eq!(req.content(), "flag{x}");

        let stored = Flag {
            id: Uuid::new_v4(),
            challenge_id: Uuid::new_v4(),
            content: req.content().to_string(),
            kind: "static".into(),
            case_sensitive: req.case_sensitive,
            created_at: OffsetDateTime::now_utc(),
        };
        let submitted = SubmitFlagRequest { flag: "flag{x} ".into() };
        assert!(flag_matches(&stored, submitted.normalized().unwrap()));

        let blank = FlagRequest { content: " \t ".into(), kind: None, case_sensitive: true };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn submit_response_grants_no_points_twice() {
        let again = SubmitFlagResponse::new(SubmissionOutcome::AlreadySolved, 300, 300, 1);
        assert!(again.correct && again.already_solved);
        assert_eq!(again.points_awarded, 0);

        let first = SubmitFlagResponse::new(SubmissionOutcome::Correct, 300, 300, 1);
        assert_eq!(first.points_awarded, 300);
    }

    #[test]
    fn submitted_flag_is_trimmed() {
        let req = SubmitFlagRequest { flag: "  flag{x}\n".into() };
        assert_eq!(req.normalized().unwrap(), "flag{x}");
        assert!(SubmitFlagRequest { flag: "   ".into() }.normalized().is_err());
    }
}
