//! Solve and score aggregation over a user's submission history.

use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{SubmissionRecord, UserProfile};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub submission_count: i64,
    pub solved_count: i64,
    pub total_score: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_solve_at: Option<OffsetDateTime>,
}

/// Earliest correct submission per challenge.
fn first_solves(records: &[SubmissionRecord]) -> HashMap<Uuid, &SubmissionRecord> {
    let mut solves: HashMap<Uuid, &SubmissionRecord> = HashMap::new();
    for rec in records.iter().filter(|r| r.is_correct) {
        solves
            .entry(rec.challenge_id)
            .and_modify(|seen| {
                if rec.submitted_at < seen.submitted_at {
                    *seen = rec;
                }
            })
            .or_insert(rec);
    }
    solves
}

/// Distinct challenges with at least one correct submission.
pub fn solved_challenges(records: &[SubmissionRecord]) -> i64 {
    first_solves(records).len() as i64
}

pub fn compute(records: &[SubmissionRecord]) -> Statistics {
    let solves = first_solves(records);
    Statistics {
        submission_count: records.len() as i64,
        solved_count: solved_challenges(records),
        total_score: solves.values().map(|r| i64::from(r.points)).sum(),
        last_solve_at: solves.values().map(|r| r.submitted_at).max(),
    }
}

impl UserProfile {
    /// Copies recomputed aggregates onto the cached profile columns.
    pub fn apply_statistics(&mut self, stats: &Statistics, now: OffsetDateTime) {
        self.submission_count = stats.submission_count;
        self.solved_count = stats.solved_count;
        self.total_score = stats.total_score;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{macros::datetime, Duration};

    const T0: OffsetDateTime = datetime!(2025-05-01 09:00 UTC);

    fn rec(challenge: Uuid, correct: bool, points: i32, minute: i64) -> SubmissionRecord {
        SubmissionRecord {
            challenge_id: challenge,
            is_correct: correct,
            points,
            submitted_at: T0 + Duration::minutes(minute),
        }
    }

    #[test]
    fn duplicates_count_once() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        // 5 correct submissions across 2 challenges, plus misses
        let records = vec![
            rec(a, false, 100, 0),
            rec(a, true, 100, 1),
            rec(a, true, 100, 2),
            rec(b, true, 250, 3),
            rec(a, true, 100, 4),
            rec(b, true, 250, 5),
            rec(c, false, 500, 6),
        ];
        assert_eq!(solved_challenges(&records), 2);

        let stats = compute(&records);
        assert_eq!(stats.submission_count, 7);
        assert_eq!(stats.solved_count, 2);
        assert_eq!(stats.total_score, 350);
        assert_eq!(stats.last_solve_at, Some(T0 + Duration::minutes(3)));
    }

    #[test]
    fn order_does_not_matter() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut records = vec![
            rec(b, true, 300, 10),
            rec(a, true, 50, 2),
            rec(a, true, 50, 1),
            rec(b, false, 300, 0),
        ];
        let forward = compute(&records);
        records.reverse();
        assert_eq!(compute(&records), forward);
        assert_eq!(forward.total_score, 350);
        assert_eq!(forward.last_solve_at, Some(T0 + Duration::minutes(10)));
    }

    #[test]
    fn no_history_is_zero() {
        assert_eq!(compute(&[]), Statistics::default());
        assert_eq!(solved_challenges(&[]), 0);
    }

    #[test]
    fn only_misses_score_nothing() {
        let a = Uuid::new_v4();
        let stats = compute(&[rec(a, false, 100, 0), rec(a, false, 100, 1)]);
        assert_eq!(stats.submission_count, 2);
        assert_eq!(stats.solved_count, 0);
        assert_eq!(stats.total_score, 0);
        assert!(stats.last_solve_at.is_none());
    }

    #[test]
    fn apply_overwrites_cached_columns() {
        let mut profile = UserProfile::empty_for(Uuid::new_v4(), T0);
        profile.total_score = 9_999;
        let stats = Statistics {
            submission_count: 4,
            solved_count: 1,
            total_score: 200,
            last_solve_at: None,
        };
        profile.apply_statistics(&stats, T0 + Duration::hours(1));
        assert_eq!(profile.total_score, 200);
        assert_eq!(profile.solved_count, 1);
        assert_eq!(profile.submission_count, 4);
        assert_eq!(profile.updated_at, T0 + Duration::hours(1));
    }
}
