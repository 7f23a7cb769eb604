use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{MemberRow, Team};

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JoinTeamRequest {
    pub invite_code: String,
}

#[derive(Debug, Serialize)]
pub struct TeamView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub captain_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    pub members: Vec<MemberRow>,
}

impl TeamView {
    /// The invite code is only rendered for members of the team.
    pub fn render(team: Team, members: Vec<MemberRow>, viewer: Uuid) -> Self {
        let is_member = members.iter().any(|m| m.user_id == viewer);
        Self {
            id: team.id,
            name: team.name,
            description: team.description,
            captain_id: team.captain_id,
            created_at: team.created_at,
            invite_code: is_member.then_some(team.invite_code),
            members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn team() -> Team {
        Team {
            id: Uuid::new_v4(),
            name: "pwnies".into(),
            description: Some("we pwn".into()),
            invite_code: "INV1TE".into(),
            captain_id: None,
            created_at: datetime!(2025-02-02 2:02 UTC),
        }
    }

    fn member(user_id: Uuid) -> MemberRow {
        MemberRow {
            user_id,
            username: "m".into(),
            role: "member".into(),
            joined_at: datetime!(2025-02-02 3:00 UTC),
        }
    }

    #[test]
    fn invite_code_only_for_members() {
        let viewer = Uuid::new_v4();
        let inside = TeamView::render(team(), vec![member(viewer)], viewer);
        assert_eq!(inside.invite_code.as_deref(), Some("INV1TE"));

        let outside = TeamView::render(team(), vec![member(Uuid::new_v4())], viewer);
        let json = serde_json::to_value(&outside).unwrap();
        assert!(json.get("invite_code").is_none());
        assert_eq!(json["members"].as_array().unwrap().len(), 1);
    }
}
