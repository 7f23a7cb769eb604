use super::repo_types::TeamMember;

pub const ROLE_CAPTAIN: &str = "captain";
pub const ROLE_MEMBER: &str = "member";

/// The user's current membership: the first active row in load order.
///
/// The schema does not prevent several active rows; in that case the
/// earliest loaded one wins and nothing is repaired.
pub fn current_membership(memberships: &[TeamMember]) -> Option<&TeamMember> {
    memberships.iter().find(|m| m.is_active)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // rows arrive ordered by join time
    fn membership(active: bool) -> TeamMember {
        TeamMember {
            id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            is_active: active,
        }
    }

    #[test]
    fn none_without_memberships() {
        assert!(current_membership(&[]).is_none());
    }

    #[test]
    fn skips_inactive_rows() {
        let rows = vec![membership(false), membership(true), membership(false)];
        assert_eq!(current_membership(&rows).map(|m| m.id), Some(rows[1].id));
    }

    #[test]
    fn all_inactive_is_none() {
        let rows = vec![membership(false), membership(false)];
        assert!(current_membership(&rows).is_none());
    }

    #[test]
    fn first_active_wins_when_several() {
        let rows = vec![membership(true), membership(true)];
        assert_eq!(current_membership(&rows).map(|m| m.id), Some(rows[0].id));
    }
}
