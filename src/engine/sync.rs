//! Reconciliation of the remote directory into the local store.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{users, DbPool};
use crate::media::{MediaDirectory, MediaError};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("failed to list users on the media server: {0}")]
    ListFailed(#[source] MediaError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    pub inserted: usize,
    pub updated: usize,
}

impl SyncOutcome {
    pub fn summary(&self) -> String {
        format!(
            "synced {} new users from the media server, updated {} existing users",
            self.inserted, self.updated
        )
    }
}

/// Pull the remote user directory into the local store.
///
/// The initial listing is the only fatal step: if it fails, nothing is
/// written. Per-user detail fetches degrade to defaults instead (no
/// registration time, active), so one unreadable account cannot sink the
/// batch. Rows are written as the loop goes; the pass is not one
/// transaction, and re-running it reconciles whatever an interrupted run
/// left behind.
pub async fn sync_users(
    db: &DbPool,
    media: &dyn MediaDirectory,
) -> Result<SyncOutcome, SyncError> {
    let remote_users = media.list_users().await.map_err(SyncError::ListFailed)?;

    let mut outcome = SyncOutcome::default();
    for summary in &remote_users {
        let (created_at, is_active) = match media.get_user(&summary.id).await {
            Ok(detail) => {
                let created = detail
                    .date_created
                    .as_deref()
                    .and_then(normalize_timestamp);
                (created, detail.is_active())
            }
            Err(e) => {
                warn!(
                    user = %summary.name,
                    remote_id = %summary.id,
                    error = %e,
                    "could not fetch user details, syncing with defaults"
                );
                (None, true)
            }
        };

        match users::find_by_remote_id(db, &summary.id).await? {
            None => {
                users::insert_synced(db, &summary.id, &summary.name, is_active, created_at.as_deref())
                    .await?;
                outcome.inserted += 1;
            }
            Some(_) => {
                users::apply_sync(db, &summary.id, &summary.name, is_active, created_at.as_deref())
                    .await?;
                outcome.updated += 1;
            }
        }
    }

    info!(
        inserted = outcome.inserted,
        updated = outcome.updated,
        "user sync finished"
    );
    Ok(outcome)
}

/// Normalize the directory's ISO 8601 registration time to the storage
/// format. Malformed input becomes None rather than an error; a bad
/// timestamp on one account is not worth failing a sync over.
fn normalize_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
}
