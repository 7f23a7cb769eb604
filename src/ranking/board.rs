//! Scoreboard ordering.

use std::cmp::Ordering;

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// One contestant (user or team) before ranking.
#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
pub struct ScoreLine {
    pub id: Uuid,
    pub name: String,
    pub score: i64,
    pub solved_count: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_solve_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedLine {
    pub rank: i64,
    #[serde(flatten)]
    pub line: ScoreLine,
}

#[derive(Debug, Serialize)]
pub struct Board {
    pub total: usize,
    pub items: Vec<RankedLine>,
}

/// Higher score first; on equal score whoever reached it earlier; then name.
/// A contestant without solves sorts after everyone who has one.
fn standing(a: &ScoreLine, b: &ScoreLine) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| match (a.last_solve_at, b.last_solve_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts and numbers from 1.
pub fn rank(mut lines: Vec<ScoreLine>) -> Vec<RankedLine> {
    lines.sort_by(standing);
    lines
        .into_iter()
        .zip(1..)
        .map(|(line, rank)| RankedLine { rank, line })
        .collect()
}

pub fn page(ranked: Vec<RankedLine>, limit: i64, offset: i64) -> Board {
    let total = ranked.len();
    let items = ranked
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(0))
        .take(usize::try_from(limit).unwrap_or(0))
        .collect();
    Board { total, items }
}
