//! Client for the media server's user directory.
//!
//! The media server is the system of record for account existence and the
//! enabled/disabled policy flag; everything here surfaces its responses
//! verbatim so an admin can diagnose failures from the error message alone.

mod client;

pub use client::MediaServerClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("media server unreachable: {0}")]
    Unavailable(String),

    #[error("unexpected response from media server: {0}")]
    Protocol(String),

    #[error("user {0} not found on media server")]
    NotFound(String),

    #[error("media server rejected user creation: status {status}, body: {body}")]
    CreateFailed { status: u16, body: String },

    #[error("media server rejected policy update: status {status}, body: {body}")]
    UpdateFailed { status: u16, body: String },

    #[error("media server rejected user deletion: status {status}, body: {body}")]
    DeleteFailed { status: u16, body: String },

    #[error("media.template_user_id is not configured; user creation clones a template account's policy")]
    TemplateNotConfigured,
}

/// Server identity returned by the connectivity probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub operating_system: String,
}

/// Entry of the directory listing. Only the fields the sync needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteUserSummary {
    pub id: String,
    pub name: String,
}

/// Full remote user record.
///
/// The policy is kept as opaque JSON: the server replaces the whole object on
/// update, so every field it sent must be round-tripped untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub policy: Option<Value>,
}

impl RemoteUser {
    /// Active means "not disabled". Missing policy or flag counts as active.
    pub fn is_active(&self) -> bool {
        self.policy
            .as_ref()
            .and_then(|p| p.get("IsDisabled"))
            .and_then(Value::as_bool)
            .map(|disabled| !disabled)
            .unwrap_or(true)
    }
}

#[async_trait]
pub trait MediaDirectory: Send + Sync {
    /// Connectivity probe against `GET /System/Info`.
    async fn system_info(&self) -> Result<SystemInfo, MediaError>;

    /// List every account known to the directory.
    async fn list_users(&self) -> Result<Vec<RemoteUserSummary>, MediaError>;

    /// Fetch one account, including its registration time and policy.
    async fn get_user(&self, remote_id: &str) -> Result<RemoteUser, MediaError>;

    /// Provision an account by cloning the configured template's policy, then
    /// set its password. A password-set failure does not roll back the
    /// creation; the account is returned anyway and the password must be
    /// corrected manually.
    async fn create_user(&self, name: &str, password: &str) -> Result<RemoteUser, MediaError>;

    /// Replace the account's policy wholesale. Callers must pass the complete
    /// object fetched via `get_user` with only the intended field changed;
    /// a partial object would silently reset everything unspecified.
    async fn update_policy(&self, remote_id: &str, policy: &Value) -> Result<(), MediaError>;

    /// Remove the account from the directory.
    async fn delete_user(&self, remote_id: &str) -> Result<(), MediaError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory directory used by the engine tests.
    #[derive(Default)]
    pub struct FakeDirectory {
        pub users: Mutex<Vec<RemoteUser>>,
        pub fail_list: AtomicBool,
        pub fail_details: AtomicBool,
        pub fail_updates: AtomicBool,
        pub fail_create: AtomicBool,
        pub fail_delete: AtomicBool,
        pub policy_updates: AtomicUsize,
        next_id: AtomicUsize,
    }

    impl FakeDirectory {
        pub fn with_users(users: Vec<RemoteUser>) -> Self {
            Self {
                users: Mutex::new(users),
                ..Self::default()
            }
        }

        pub fn user(id: &str, name: &str, disabled: bool) -> RemoteUser {
            RemoteUser {
                id: id.to_string(),
                name: name.to_string(),
                date_created: Some("2024-03-01T12:00:00.0000000Z".to_string()),
                policy: Some(serde_json::json!({
                    "IsAdministrator": false,
                    "IsDisabled": disabled,
                    "EnableMediaPlayback": true,
                })),
            }
        }
    }

    #[async_trait]
    impl MediaDirectory for FakeDirectory {
        async fn system_info(&self) -> Result<SystemInfo, MediaError> {
            Ok(SystemInfo {
                server_name: "fake".to_string(),
                version: "0.0".to_string(),
                operating_system: "test".to_string(),
            })
        }

        async fn list_users(&self) -> Result<Vec<RemoteUserSummary>, MediaError> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(MediaError::Unavailable("connection refused".to_string()));
            }
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .map(|u| RemoteUserSummary {
                    id: u.id.clone(),
                    name: u.name.clone(),
                })
                .collect())
        }

        async fn get_user(&self, remote_id: &str) -> Result<RemoteUser, MediaError> {
            if self.fail_details.load(Ordering::SeqCst) {
                return Err(MediaError::Unavailable("timed out".to_string()));
            }
            self.users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == remote_id)
                .cloned()
                .ok_or_else(|| MediaError::NotFound(remote_id.to_string()))
        }

        async fn create_user(&self, name: &str, _password: &str) -> Result<RemoteUser, MediaError> {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(MediaError::CreateFailed {
                    status: 400,
                    body: "template rejected".to_string(),
                });
            }
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let user = Self::user(&format!("fake-{n}"), name, false);
            self.users.lock().unwrap().push(user.clone());
            Ok(user)
        }

        async fn update_policy(&self, remote_id: &str, policy: &Value) -> Result<(), MediaError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(MediaError::UpdateFailed {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let mut users = self.users.lock().unwrap();
            let user = users
                .iter_mut()
                .find(|u| u.id == remote_id)
                .ok_or_else(|| MediaError::NotFound(remote_id.to_string()))?;
            user.policy = Some(policy.clone());
            self.policy_updates.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete_user(&self, remote_id: &str) -> Result<(), MediaError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(MediaError::DeleteFailed {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.users.lock().unwrap().retain(|u| u.id != remote_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_policy_counts_as_active() {
        let user = RemoteUser {
            id: "a".to_string(),
            name: "a".to_string(),
            date_created: None,
            policy: None,
        };
        assert!(user.is_active());
    }

    #[test]
    fn disabled_flag_is_inverted() {
        let user = testing::FakeDirectory::user("a", "a", true);
        assert!(!user.is_active());
        let user = testing::FakeDirectory::user("a", "a", false);
        assert!(user.is_active());
    }
}
