//! User management endpoints: listing, provisioning, expiry edits, status
//! toggles, deletion, the directory sync and the expiration sweep.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{
    users, CreateUserRequest, SweepResponse, SyncResponse, UpdateStatusRequest, UpdateUserRequest,
    User, UserListResponse,
};
use crate::db::users::{ExpireFilter, UserFilter};
use crate::engine;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

// Users created without an explicit password get this one, matching the
// behavior admins expect from the media server's own invite flows.
const DEFAULT_PASSWORD: &str = "123456";

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub expire_status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Parse an expiration date from a request. Accepts RFC 3339 with `Z` or an
/// explicit offset, the format the admin UI sends.
fn parse_expire_date(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::validation_field("expire_date", "expire_date must be an RFC 3339 timestamp")
        })
}

/// List live users with optional search, status and expiry filters
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let expire = match query.expire_status.as_deref() {
        None | Some("") => None,
        Some("active") => Some(ExpireFilter::Active),
        Some("expired") => Some(ExpireFilter::Expired),
        Some(other) => {
            return Err(ApiError::validation_field(
                "expire_status",
                format!("Unknown expire_status '{other}', expected 'active' or 'expired'"),
            ));
        }
    };

    let filter = UserFilter {
        search: query.search.filter(|s| !s.is_empty()),
        is_active: query
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.eq_ignore_ascii_case("true")),
        expire,
    };

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let (data, total) = users::list(&state.db, &filter, page, page_size).await?;

    Ok(Json(UserListResponse {
        data,
        total,
        page,
        page_size,
    }))
}

/// Create a user: provision on the media server first, then mirror locally
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if req.name.trim().is_empty() {
        errors.add("name", "Name is required");
    }
    errors.finish()?;

    let expire_date = match req.expire_date.as_deref() {
        Some(raw) if !raw.is_empty() => Some(parse_expire_date(raw)?),
        _ => None,
    };
    let password = req.password.as_deref().unwrap_or(DEFAULT_PASSWORD);

    let user = engine::create_user(
        &state.db,
        state.media.as_ref(),
        req.name.trim(),
        password,
        req.email.as_deref().filter(|e| !e.is_empty()),
        expire_date,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Edit a user's expiration date. The date drives the activation state, so
/// this may perform a remote-first status toggle.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let expire_date = match req.expire_date.as_deref() {
        Some(raw) if !raw.is_empty() => Some(parse_expire_date(raw)?),
        _ => None,
    };

    engine::update_expiry(&state.db, state.media.as_ref(), id, expire_date).await?;

    let user = users::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}

/// Enable or disable a user, remote-first
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<User>, ApiError> {
    engine::toggle_status(&state.db, state.media.as_ref(), id, req.is_active).await?;

    let user = users::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}

/// Delete a user on the media server, then soft-delete the local row
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    engine::delete_user(&state.db, state.media.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Pull the remote user directory into the local store
pub async fn sync_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncResponse>, ApiError> {
    let outcome = engine::sync_users(&state.db, state.media.as_ref()).await?;
    Ok(Json(SyncResponse {
        inserted: outcome.inserted,
        updated: outcome.updated,
        message: outcome.summary(),
    }))
}

/// Disable every user whose expiration date has passed
pub async fn check_expire(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let disabled = engine::sweep_expired(&state.db, state.media.as_ref()).await?;
    Ok(Json(SweepResponse {
        disabled,
        message: format!("disabled {disabled} expired users"),
    }))
}
