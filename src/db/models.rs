use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Local mirror of a media-server account.
///
/// `is_active` follows the remote disabled flag and is only ever written
/// after a successful remote policy update. `state` is the soft-delete flag:
/// 0 means the row is logically gone but kept for bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub remote_id: String,
    pub name: String,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: bool,
    pub state: i64,
    pub expire_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Admin {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminResponse {
    pub id: String,
    pub username: String,
    pub name: String,
}

impl From<Admin> for AdminResponse {
    fn from(admin: Admin) -> Self {
        Self {
            id: admin.id,
            username: admin.username,
            name: admin.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub admin_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub admin: AdminResponse,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub password: Option<String>,
    pub email: Option<String>,
    pub expire_date: Option<String>,
}

/// Expiry edit. A missing or null `expire_date` clears the expiration,
/// which re-activates the account.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub expire_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub data: Vec<User>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub inserted: usize,
    pub updated: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub disabled: usize,
    pub message: String,
}
