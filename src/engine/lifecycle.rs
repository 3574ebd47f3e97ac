//! Activation state changes and the expiration sweep.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{info, warn};

use super::EngineError;
use crate::db::{users, DbPool};
use crate::media::{MediaDirectory, MediaError};

/// Enable or disable a user, remote-first.
///
/// The media server's policy endpoint replaces the whole object, so the
/// current policy is fetched, only `IsDisabled` is flipped, and the full
/// object is pushed back. The local flag is persisted only after the remote
/// accepted the update; on any remote failure the local row is untouched.
pub async fn toggle_status(
    db: &DbPool,
    media: &dyn MediaDirectory,
    id: i64,
    new_active: bool,
) -> Result<(), EngineError> {
    let user = users::find_by_id(db, id)
        .await?
        .ok_or(EngineError::UserNotFound)?;

    let remote = media.get_user(&user.remote_id).await?;
    let mut policy = remote.policy.ok_or_else(|| {
        MediaError::Protocol(format!("user {} has no policy object", user.remote_id))
    })?;
    let fields = policy.as_object_mut().ok_or_else(|| {
        MediaError::Protocol(format!("policy of user {} is not an object", user.remote_id))
    })?;
    fields.insert("IsDisabled".to_string(), Value::Bool(!new_active));

    media.update_policy(&user.remote_id, &policy).await?;
    users::set_active(db, id, new_active).await?;

    info!(
        user = %user.name,
        remote_id = %user.remote_id,
        active = new_active,
        "updated user activation"
    );
    Ok(())
}

/// Change a user's expiration date.
///
/// The date decides the activation state: no date or a future date means
/// active. When the computed state differs from the current flag the change
/// goes through [`toggle_status`] (remote-first); either way the new date is
/// persisted afterwards. No remote call happens when the state is unchanged.
pub async fn update_expiry(
    db: &DbPool,
    media: &dyn MediaDirectory,
    id: i64,
    new_expire: Option<DateTime<Utc>>,
) -> Result<(), EngineError> {
    let user = users::find_by_id(db, id)
        .await?
        .ok_or(EngineError::UserNotFound)?;

    let new_active = match new_expire {
        None => true,
        Some(ts) => ts > Utc::now(),
    };

    if new_active != user.is_active {
        toggle_status(db, media, id, new_active).await?;
    }

    let stored = new_expire.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true));
    users::set_expire_date(db, id, stored.as_deref()).await?;
    Ok(())
}

/// Disable every live, active user whose expiration has passed.
///
/// Each user is handled independently; a remote failure for one is logged
/// and skipped so the rest of the sweep still runs. Returns how many users
/// were actually disabled. Re-running is harmless: a second sweep simply
/// finds fewer expired-active rows.
pub async fn sweep_expired(db: &DbPool, media: &dyn MediaDirectory) -> Result<usize, EngineError> {
    let expired = users::expired_active(db).await?;
    let mut disabled = 0;

    for user in expired {
        match toggle_status(db, media, user.id, false).await {
            Ok(()) => {
                disabled += 1;
                info!(user = %user.name, "disabled expired user");
            }
            Err(e) => {
                warn!(user = %user.name, error = %e, "failed to disable expired user");
            }
        }
    }

    Ok(disabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::media::testing::FakeDirectory;
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    async fn seed_user(pool: &DbPool, remote_id: &str, name: &str, active: bool) -> i64 {
        users::insert_synced(pool, remote_id, name, active, None)
            .await
            .unwrap();
        users::find_by_remote_id(pool, remote_id)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn failed_remote_write_leaves_local_flag_alone() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![FakeDirectory::user("r1", "Alice", false)]);
        let id = seed_user(&pool, "r1", "Alice", true).await;

        media.fail_updates.store(true, Ordering::SeqCst);
        let err = toggle_status(&pool, &media, id, false).await.unwrap_err();
        assert!(matches!(err, EngineError::Media(MediaError::UpdateFailed { .. })));

        let user = users::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(user.is_active, "local flag must not lead the remote state");
    }

    #[tokio::test]
    async fn toggle_flips_only_the_disabled_field() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![FakeDirectory::user("r1", "Alice", false)]);
        let id = seed_user(&pool, "r1", "Alice", true).await;

        toggle_status(&pool, &media, id, false).await.unwrap();

        let user = users::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(!user.is_active);

        let remote = media.users.lock().unwrap()[0].clone();
        let policy = remote.policy.unwrap();
        assert_eq!(policy["IsDisabled"], serde_json::json!(true));
        // The rest of the policy object rode along untouched.
        assert_eq!(policy["EnableMediaPlayback"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn toggle_unknown_user_is_not_found() {
        let pool = test_pool().await;
        let media = FakeDirectory::default();
        let err = toggle_status(&pool, &media, 42, false).await.unwrap_err();
        assert!(matches!(err, EngineError::UserNotFound));
    }

    #[tokio::test]
    async fn future_expiry_reactivates_with_one_remote_write() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![FakeDirectory::user("r1", "Alice", true)]);
        let id = seed_user(&pool, "r1", "Alice", false).await;
        users::set_expire_date(&pool, id, Some("2020-01-01T00:00:00Z"))
            .await
            .unwrap();

        let future = Utc::now() + Duration::days(30);
        update_expiry(&pool, &media, id, Some(future)).await.unwrap();

        let user = users::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(user.is_active);
        assert!(user.expire_date.is_some());
        assert_eq!(media.policy_updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unchanged_state_skips_the_remote_entirely() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![FakeDirectory::user("r1", "Alice", false)]);
        let id = seed_user(&pool, "r1", "Alice", true).await;

        let future = Utc::now() + Duration::days(7);
        update_expiry(&pool, &media, id, Some(future)).await.unwrap();

        assert_eq!(media.policy_updates.load(Ordering::SeqCst), 0);
        let user = users::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(user.expire_date.is_some());
    }

    #[tokio::test]
    async fn clearing_the_expiry_reactivates() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![FakeDirectory::user("r1", "Alice", true)]);
        let id = seed_user(&pool, "r1", "Alice", false).await;
        users::set_expire_date(&pool, id, Some("2020-01-01T00:00:00Z"))
            .await
            .unwrap();

        update_expiry(&pool, &media, id, None).await.unwrap();

        let user = users::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(user.is_active);
        assert!(user.expire_date.is_none());
    }

    #[tokio::test]
    async fn failed_remote_write_keeps_the_old_expiry() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![FakeDirectory::user("r1", "Alice", true)]);
        let id = seed_user(&pool, "r1", "Alice", false).await;
        users::set_expire_date(&pool, id, Some("2020-01-01T00:00:00Z"))
            .await
            .unwrap();

        media.fail_updates.store(true, Ordering::SeqCst);
        let future = Utc::now() + Duration::days(30);
        assert!(update_expiry(&pool, &media, id, Some(future)).await.is_err());

        let user = users::find_by_id(&pool, id).await.unwrap().unwrap();
        assert!(!user.is_active);
        assert_eq!(user.expire_date.as_deref(), Some("2020-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn sweep_disables_each_expired_user_exactly_once() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![
            FakeDirectory::user("r1", "Lapsed", false),
            FakeDirectory::user("r2", "Fine", false),
        ]);
        let lapsed = seed_user(&pool, "r1", "Lapsed", true).await;
        seed_user(&pool, "r2", "Fine", true).await;
        users::set_expire_date(&pool, lapsed, Some("2020-01-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(sweep_expired(&pool, &media).await.unwrap(), 1);
        let user = users::find_by_id(&pool, lapsed).await.unwrap().unwrap();
        assert!(!user.is_active);

        // The second sweep finds nothing left to do.
        assert_eq!(sweep_expired(&pool, &media).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_survives_individual_failures() {
        let pool = test_pool().await;
        let media = FakeDirectory::with_users(vec![FakeDirectory::user("r1", "Lapsed", false)]);
        let id = seed_user(&pool, "r1", "Lapsed", true).await;
        seed_user(&pool, "r-ghost", "Ghost", true).await;
        users::set_expire_date(&pool, id, Some("2020-01-01T00:00:00Z"))
            .await
            .unwrap();
        let ghost = users::find_by_remote_id(&pool, "r-ghost")
            .await
            .unwrap()
            .unwrap();
        users::set_expire_date(&pool, ghost.id, Some("2020-01-01T00:00:00Z"))
            .await
            .unwrap();

        // Ghost is unknown to the directory, so its toggle fails; the sweep
        // still disables the user it can reach.
        assert_eq!(sweep_expired(&pool, &media).await.unwrap(), 1);
        let ghost = users::find_by_id(&pool, ghost.id).await.unwrap().unwrap();
        assert!(ghost.is_active);
    }
}
