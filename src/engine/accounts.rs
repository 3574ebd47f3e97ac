//! Account provisioning and removal, remote-first in both directions.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;

use super::EngineError;
use crate::db::{users, DbPool, User};
use crate::media::MediaDirectory;

/// Provision an account on the media server, then mirror it locally.
///
/// The local row is only inserted after the remote creation succeeded, so a
/// remote failure never leaves an orphan row behind.
pub async fn create_user(
    db: &DbPool,
    media: &dyn MediaDirectory,
    name: &str,
    password: &str,
    email: Option<&str>,
    expire_date: Option<DateTime<Utc>>,
) -> Result<User, EngineError> {
    let remote = media.create_user(name, password).await?;

    let stored_expiry = expire_date.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true));
    let user = users::insert_created(
        db,
        &remote.id,
        name,
        email,
        Some(password),
        stored_expiry.as_deref(),
    )
    .await?;

    info!(user = name, remote_id = %remote.id, "created user");
    Ok(user)
}

/// Delete the remote account, then soft-delete the local row.
///
/// A failed remote delete leaves the row fully live; the admin can retry.
pub async fn delete_user(
    db: &DbPool,
    media: &dyn MediaDirectory,
    id: i64,
) -> Result<(), EngineError> {
    let user = users::find_by_id(db, id)
        .await?
        .ok_or(EngineError::UserNotFound)?;

    media.delete_user(&user.remote_id).await?;
    users::soft_delete(db, id).await?;

    info!(user = %user.name, remote_id = %user.remote_id, "deleted user");
    Ok(())
}
