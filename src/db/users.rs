//! Store operations for the local user mirror.
//!
//! Every query except [`find_by_remote_id`] sees only live rows
//! (`state = 1`); soft-deleted rows are retained but logically absent.
//! Timestamps are RFC 3339 text, compared through sqlite's `datetime()` so
//! mixed historical formats still order correctly.

use sqlx::Result;

use super::{now_timestamp, DbPool, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireFilter {
    /// No expiry set, or expiry still in the future.
    Active,
    /// Expiry in the past.
    Expired,
}

#[derive(Debug, Default)]
pub struct UserFilter {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub expire: Option<ExpireFilter>,
}

/// List live users matching the filter, newest page layout first by id.
pub async fn list(
    pool: &DbPool,
    filter: &UserFilter,
    page: i64,
    page_size: i64,
) -> Result<(Vec<User>, i64)> {
    let mut where_sql = String::from("state = 1");
    if filter.search.is_some() {
        where_sql.push_str(" AND name LIKE ?");
    }
    if filter.is_active.is_some() {
        where_sql.push_str(" AND is_active = ?");
    }
    match filter.expire {
        Some(ExpireFilter::Expired) => {
            where_sql.push_str(" AND expire_date IS NOT NULL AND datetime(expire_date) < datetime('now')");
        }
        Some(ExpireFilter::Active) => {
            where_sql.push_str(" AND (expire_date IS NULL OR datetime(expire_date) >= datetime('now'))");
        }
        None => {}
    }

    let count_sql = format!("SELECT COUNT(*) FROM users WHERE {where_sql}");
    let list_sql = format!("SELECT * FROM users WHERE {where_sql} ORDER BY id LIMIT ? OFFSET ?");

    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    let mut list_query = sqlx::query_as::<_, User>(&list_sql);

    if let Some(search) = &filter.search {
        let pattern = format!("%{search}%");
        count_query = count_query.bind(pattern.clone());
        list_query = list_query.bind(pattern);
    }
    if let Some(active) = filter.is_active {
        count_query = count_query.bind(active);
        list_query = list_query.bind(active);
    }

    let (total,) = count_query.fetch_one(pool).await?;
    let users = list_query
        .bind(page_size)
        .bind((page - 1) * page_size)
        .fetch_all(pool)
        .await?;

    Ok((users, total))
}

/// Look up a live user by its local id.
pub async fn find_by_id(pool: &DbPool, id: i64) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ? AND state = 1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Look up by the remote account id, regardless of state. The sync uses this
/// to decide insert-vs-update, and an update resurrects a soft-deleted row.
pub async fn find_by_remote_id(pool: &DbPool, remote_id: &str) -> Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE remote_id = ?")
        .bind(remote_id)
        .fetch_optional(pool)
        .await
}

/// Insert a row for an account just provisioned on the media server.
pub async fn insert_created(
    pool: &DbPool,
    remote_id: &str,
    name: &str,
    email: Option<&str>,
    password: Option<&str>,
    expire_date: Option<&str>,
) -> Result<User> {
    let now = now_timestamp();
    sqlx::query(
        r#"
        INSERT INTO users (remote_id, name, email, password, is_active, state, expire_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, 1, 1, ?, ?, ?)
        "#,
    )
    .bind(remote_id)
    .bind(name)
    .bind(email)
    .bind(password)
    .bind(expire_date)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query_as("SELECT * FROM users WHERE remote_id = ?")
        .bind(remote_id)
        .fetch_one(pool)
        .await
}

/// Insert a row discovered by the sync. A missing registration timestamp
/// falls back to the insert time.
pub async fn insert_synced(
    pool: &DbPool,
    remote_id: &str,
    name: &str,
    is_active: bool,
    created_at: Option<&str>,
) -> Result<()> {
    let now = now_timestamp();
    sqlx::query(
        r#"
        INSERT INTO users (remote_id, name, is_active, state, created_at, updated_at)
        VALUES (?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(remote_id)
    .bind(name)
    .bind(is_active)
    .bind(created_at.unwrap_or(&now))
    .bind(&now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite a known row with the remote directory's view: name, active flag
/// and registration time all follow the remote, and the row comes back live.
pub async fn apply_sync(
    pool: &DbPool,
    remote_id: &str,
    name: &str,
    is_active: bool,
    created_at: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET name = ?, is_active = ?, state = 1, created_at = ?, updated_at = ?
        WHERE remote_id = ?
        "#,
    )
    .bind(name)
    .bind(is_active)
    .bind(created_at)
    .bind(now_timestamp())
    .bind(remote_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_active(pool: &DbPool, id: i64, is_active: bool) -> Result<()> {
    sqlx::query("UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?")
        .bind(is_active)
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_expire_date(pool: &DbPool, id: i64, expire_date: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE users SET expire_date = ?, updated_at = ? WHERE id = ?")
        .bind(expire_date)
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Flip the row to deleted. The row itself is never removed.
pub async fn soft_delete(pool: &DbPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE users SET state = 0, updated_at = ? WHERE id = ?")
        .bind(now_timestamp())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Live, still-active rows whose expiration has passed: the sweep's input.
pub async fn expired_active(pool: &DbPool) -> Result<Vec<User>> {
    sqlx::query_as(
        r#"
        SELECT * FROM users
        WHERE state = 1 AND is_active = 1
          AND expire_date IS NOT NULL AND datetime(expire_date) < datetime('now')
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed(pool: &DbPool, remote_id: &str, name: &str, active: bool) -> User {
        insert_synced(pool, remote_id, name, active, Some("2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        find_by_remote_id(pool, remote_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn list_filters_compose() {
        let pool = test_pool().await;
        seed(&pool, "r1", "Alice", true).await;
        seed(&pool, "r2", "alina", false).await;
        seed(&pool, "r3", "Bob", true).await;

        let filter = UserFilter {
            search: Some("ali".to_string()),
            ..Default::default()
        };
        let (users, total) = list(&pool, &filter, 1, 10).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(users.len(), 2);

        let filter = UserFilter {
            search: Some("ali".to_string()),
            is_active: Some(true),
            ..Default::default()
        };
        let (users, total) = list(&pool, &filter, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(users[0].name, "Alice");
    }

    #[tokio::test]
    async fn expiry_filter_splits_expired_from_active() {
        let pool = test_pool().await;
        let expired = seed(&pool, "r1", "Old", true).await;
        let current = seed(&pool, "r2", "New", true).await;
        let open_ended = seed(&pool, "r3", "Forever", true).await;
        set_expire_date(&pool, expired.id, Some("2020-01-01T00:00:00Z"))
            .await
            .unwrap();
        set_expire_date(&pool, current.id, Some("2999-01-01T00:00:00Z"))
            .await
            .unwrap();

        let filter = UserFilter {
            expire: Some(ExpireFilter::Expired),
            ..Default::default()
        };
        let (users, _) = list(&pool, &filter, 1, 10).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, expired.id);

        let filter = UserFilter {
            expire: Some(ExpireFilter::Active),
            ..Default::default()
        };
        let (users, _) = list(&pool, &filter, 1, 10).await.unwrap();
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![current.id, open_ended.id]);
    }

    #[tokio::test]
    async fn pagination_limits_rows_but_not_total() {
        let pool = test_pool().await;
        for i in 0..5 {
            seed(&pool, &format!("r{i}"), &format!("user{i}"), true).await;
        }
        let (users, total) = list(&pool, &UserFilter::default(), 2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "user2");
    }

    #[tokio::test]
    async fn soft_delete_hides_but_keeps_the_row() {
        let pool = test_pool().await;
        let user = seed(&pool, "r1", "Alice", true).await;

        soft_delete(&pool, user.id).await.unwrap();

        let (users, total) = list(&pool, &UserFilter::default(), 1, 10).await.unwrap();
        assert!(users.is_empty());
        assert_eq!(total, 0);
        assert!(find_by_id(&pool, user.id).await.unwrap().is_none());

        // The row is still there for the sync to find and resurrect.
        let row = find_by_remote_id(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(row.state, 0);

        apply_sync(&pool, "r1", "Alice", true, None).await.unwrap();
        let row = find_by_remote_id(&pool, "r1").await.unwrap().unwrap();
        assert_eq!(row.state, 1);
    }

    #[tokio::test]
    async fn expired_active_ignores_disabled_and_deleted_rows() {
        let pool = test_pool().await;
        let lapsed = seed(&pool, "r1", "Lapsed", true).await;
        let already_off = seed(&pool, "r2", "Off", false).await;
        let deleted = seed(&pool, "r3", "Gone", true).await;
        for id in [lapsed.id, already_off.id, deleted.id] {
            set_expire_date(&pool, id, Some("2020-01-01T00:00:00Z"))
                .await
                .unwrap();
        }
        soft_delete(&pool, deleted.id).await.unwrap();

        let rows = expired_active(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, lapsed.id);
    }
}
