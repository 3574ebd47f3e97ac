//! HTTP implementation of [`MediaDirectory`] against an Emby-compatible API.
//!
//! Every request carries the `X-Emby-Token` API key header and a 10 second
//! timeout. Writes are synchronous and never retried; the caller decides
//! whether to re-invoke.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{MediaDirectory, MediaError, RemoteUser, RemoteUserSummary, SystemInfo};
use crate::config::MediaConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MediaServerClient {
    base_url: String,
    api_key: String,
    template_user_id: String,
    client: reqwest::Client,
}

impl MediaServerClient {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            template_user_id: config.template_user_id.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, MediaError> {
        self.client
            .get(self.url(path))
            .header("X-Emby-Token", &self.api_key)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MediaError::Unavailable(e.to_string()))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, MediaError> {
        self.client
            .post(self.url(path))
            .header("X-Emby-Token", &self.api_key)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| MediaError::Unavailable(e.to_string()))
    }

    /// Read the body as text for error reporting; an unreadable body is not
    /// worth a second error.
    async fn body_text(response: reqwest::Response) -> String {
        response.text().await.unwrap_or_default()
    }
}

#[async_trait]
impl MediaDirectory for MediaServerClient {
    async fn system_info(&self) -> Result<SystemInfo, MediaError> {
        let response = self.get("/System/Info").await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = Self::body_text(response).await;
            return Err(MediaError::Protocol(format!(
                "system info returned status {status}: {body}"
            )));
        }
        response
            .json::<SystemInfo>()
            .await
            .map_err(|e| MediaError::Protocol(e.to_string()))
    }

    async fn list_users(&self) -> Result<Vec<RemoteUserSummary>, MediaError> {
        let response = self.get("/Users").await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = Self::body_text(response).await;
            return Err(MediaError::Protocol(format!(
                "user listing returned status {status}: {body}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| MediaError::Protocol(e.to_string()))?;

        // Some server versions return a bare array, others wrap it in Items.
        let items = if payload.is_array() {
            payload
        } else if let Some(items) = payload.get("Items").filter(|v| v.is_array()) {
            items.clone()
        } else {
            return Err(MediaError::Protocol(
                "user listing is neither an array nor an Items envelope".to_string(),
            ));
        };

        serde_json::from_value(items).map_err(|e| MediaError::Protocol(e.to_string()))
    }

    async fn get_user(&self, remote_id: &str) -> Result<RemoteUser, MediaError> {
        let response = self.get(&format!("/Users/{remote_id}")).await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!(%status, remote_id, "user lookup failed");
            return Err(MediaError::NotFound(remote_id.to_string()));
        }
        response
            .json::<RemoteUser>()
            .await
            .map_err(|e| MediaError::Protocol(e.to_string()))
    }

    async fn create_user(&self, name: &str, password: &str) -> Result<RemoteUser, MediaError> {
        if self.template_user_id.is_empty() {
            return Err(MediaError::TemplateNotConfigured);
        }

        let body = json!({
            "Name": name,
            "CopyFromUserId": self.template_user_id,
            "UserCopyOptions": ["UserPolicy"],
        });

        let response = self.post("/Users/New", &body).await?;
        let status = response.status();

        // 204 is a success for most endpoints, but here it means the server
        // did not return the new account's id, which we cannot work without.
        if status == StatusCode::NO_CONTENT {
            return Err(MediaError::CreateFailed {
                status: status.as_u16(),
                body: "server returned no content, new user id unknown".to_string(),
            });
        }
        if status != StatusCode::OK {
            let body = Self::body_text(response).await;
            return Err(MediaError::CreateFailed {
                status: status.as_u16(),
                body,
            });
        }

        let user: RemoteUser = response
            .json()
            .await
            .map_err(|e| MediaError::Protocol(e.to_string()))?;
        info!(remote_id = %user.id, name, "created user on media server");

        // Set the initial password. The account already exists, so a failure
        // here is reported but not rolled back; the password stays unset
        // until an admin corrects it on the server.
        let password_body = json!({ "NewPw": password });
        match self
            .post(&format!("/Users/{}/Password", user.id), &password_body)
            .await
        {
            Ok(response) if response.status() == StatusCode::OK
                || response.status() == StatusCode::NO_CONTENT => {}
            Ok(response) => {
                warn!(
                    remote_id = %user.id,
                    status = %response.status(),
                    "user created but setting the password failed"
                );
            }
            Err(e) => {
                warn!(remote_id = %user.id, error = %e, "user created but setting the password failed");
            }
        }

        Ok(user)
    }

    async fn update_policy(&self, remote_id: &str, policy: &Value) -> Result<(), MediaError> {
        let response = self
            .post(&format!("/Users/{remote_id}/Policy"), policy)
            .await?;
        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::NO_CONTENT {
            return Ok(());
        }
        let body = Self::body_text(response).await;
        Err(MediaError::UpdateFailed {
            status: status.as_u16(),
            body,
        })
    }

    async fn delete_user(&self, remote_id: &str) -> Result<(), MediaError> {
        let response = self
            .client
            .delete(self.url(&format!("/Users/{remote_id}")))
            .header("X-Emby-Token", &self.api_key)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| MediaError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::OK {
            info!(remote_id, "deleted user on media server");
            return Ok(());
        }
        let body = Self::body_text(response).await;
        Err(MediaError::DeleteFailed {
            status: status.as_u16(),
            body,
        })
    }
}
