use anyhow::Context;
use bytes::Bytes;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    flags::check_submission,
    repo::{already_solved, insert_submission},
    repo_types::{Attachment, Challenge, Flag},
};
use crate::{
    auth::extractors::ensure_active,
    error::ApiResult,
    state::AppState,
    storage::StorageClient,
    users::{repo::update_statistics, stats::Statistics},
};

pub const MAX_FLAG_LEN: usize = 1024;
pub const PRESIGN_TTL_SECS: u64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Correct,
    Incorrect,
    AlreadySolved,
}

impl SubmissionOutcome {
    pub fn classify(is_correct: bool, solved_before: bool) -> Self {
        match (is_correct, solved_before) {
            (false, _) => SubmissionOutcome::Incorrect,
            (true, true) => SubmissionOutcome::AlreadySolved,
            (true, false) => SubmissionOutcome::Correct,
        }
    }
}

/// Records the attempt and refreshes the submitter's statistics in one
/// transaction. Disabled accounts are turned away before anything is written.
pub async fn submit_flag(
    db: &PgPool,
    user_id: Uuid,
    challenge: &Challenge,
    submitted: &str,
    now: OffsetDateTime,
) -> ApiResult<(SubmissionOutcome, Statistics)> {
    let mut tx = db.begin().await.context("begin tx")?;
    ensure_active(&mut tx, user_id).await?;

    let flags = Flag::for_challenge(&mut tx, challenge.id).await?;
    let is_correct = check_submission(&flags, submitted);
    let solved_before = already_solved(&mut tx, user_id, challenge.id).await?;
    let submission_id = insert_submission(&mut tx, user_id, challenge.id, submitted, is_correct, now).await?;
    let stats = update_statistics(&mut tx, user_id, now).await?;

    tx.commit().await.context("commit tx")?;

    let outcome = SubmissionOutcome::classify(is_correct, solved_before);
    match outcome {
        SubmissionOutcome::Correct => {
            info!(%user_id, challenge_id = %challenge.id, %submission_id, points = challenge.points, "challenge solved")
        }
        _ => debug!(%user_id, challenge_id = %challenge.id, ?outcome, "submission recorded"),
    }
    Ok((outcome, stats))
}

/// `challenges/{challenge}/{uuid}-{filename}` with path separators stripped.
pub fn attachment_key(challenge_id: Uuid, object_id: Uuid, filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("challenges/{challenge_id}/{object_id}-{safe}")
}

pub struct UploadItem {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

/// Stores the object first, then the row; a failed insert removes the object again.
pub async fn store_attachment(
    storage: &dyn StorageClient,
    conn: &mut PgConnection,
    challenge_id: Uuid,
    item: UploadItem,
) -> anyhow::Result<Attachment> {
    let key = attachment_key(challenge_id, Uuid::new_v4(), &item.filename);
    let size = i64::try_from(item.body.len()).context("attachment size")?;
    storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {key}"))?;

    match Attachment::insert(conn, challenge_id, &item.filename, &key, &item.content_type, size).await {
        Ok(row) => Ok(row),
        Err(e) => {
            remove_objects(storage, &[key]).await;
            Err(e)
        }
    }
}

/// Best-effort removal; failures only leave orphaned objects behind.
pub async fn remove_objects(storage: &dyn StorageClient, keys: &[String]) {
    for key in keys {
        if let Err(e) = storage.delete_object(key).await {
            warn!(error = %e, %key, "orphaned attachment object");
        }
    }
}

pub async fn presign(st: &AppState, s3_key: &str) -> anyhow::Result<String> {
    st.storage
        .presign_get(s3_key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {s3_key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageClient};
    use std::sync::Arc;

    #[test]
    fn outcome_classification() {
        assert_eq!(SubmissionOutcome::classify(true, false), SubmissionOutcome::Correct);
        assert_eq!(SubmissionOutcome::classify(true, true), SubmissionOutcome::AlreadySolved);
        assert_eq!(SubmissionOutcome::classify(false, true), SubmissionOutcome::Incorrect);
        assert_eq!(SubmissionOutcome::classify(false, false), SubmissionOutcome::Incorrect);
    }

    #[test]
    fn attachment_keys_cannot_escape_prefix() {
        let c = Uuid::nil();
        let o = Uuid::from_u128(1);
        let key = attachment_key(c, o, "../../etc/passwd");
        assert_eq!(key, format!("challenges/{c}/{o}-.._.._etc_passwd"));
        assert_eq!(attachment_key(c, o, "task.zip"), format!("challenges/{c}/{o}-task.zip"));
    }

    #[tokio::test]
    async fn remove_objects_skips_missing_keys() {
        let store = MemoryStorage::default();
        store
            .put_object("challenges/a/1-x.txt", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();
        remove_objects(&store, &["challenges/a/1-x.txt".into(), "challenges/a/never".into()]).await;
        assert!(!store.contains("challenges/a/1-x.txt"));
    }

    #[tokio::test]
    async fn presign_uses_storage_ttl() {
        let store = Arc::new(MemoryStorage::default());
        store
            .put_object("challenges/x/y-a.txt", Bytes::from_static(b"hi"), "text/plain")
            .await
            .unwrap();
        let mut state = AppState::fake();
        state.storage = store;
        let url = presign(&state, "challenges/x/y-a.txt").await.unwrap();
        assert!(url.contains("challenges/x/y-a.txt"));
        assert!(url.contains(&format!("expires={PRESIGN_TTL_SECS}")));
        assert!(presign(&state, "missing").await.is_err());
    }
}
