use leetsync_core::{Result, SyncError};
use serde::Deserialize;

use crate::http::{remote_error, GitHubHttp};

pub const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

fn default_interval() -> u64 {
    5
}

/// Device code response from GitHub
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

/// Access token response from GitHub. GitHub answers 200 for pending
/// authorizations and reports the state in `error`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of one call to the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPoll {
    Granted(String),
    Pending,
    SlowDown,
    Expired,
    Rejected {
        error: String,
        description: Option<String>,
    },
    /// Transport failure or a body that could not be read; worth retrying.
    Transient(String),
}

impl AccessTokenResponse {
    pub fn classify(self) -> TokenPoll {
        if let Some(token) = self.access_token.filter(|token| !token.trim().is_empty()) {
            return TokenPoll::Granted(token);
        }

        match self.error.as_deref() {
            Some("authorization_pending") => TokenPoll::Pending,
            Some("slow_down") => TokenPoll::SlowDown,
            Some("expired_token") => TokenPoll::Expired,
            Some(error) => TokenPoll::Rejected {
                error: error.to_string(),
                description: self.error_description,
            },
            None => TokenPoll::Transient("token response carried neither token nor error".into()),
        }
    }
}

pub async fn request_device_code(
    http: &GitHubHttp,
    login_base: &str,
    client_id: &str,
    scope: &str,
) -> Result<DeviceCodeResponse> {
    let params = [("client_id", client_id), ("scope", scope)];
    let url = format!("{}/login/device/code", login_base);

    let response = http
        .writer()
        .post(&url)
        .header("Accept", "application/json")
        .header("User-Agent", http.user_agent())
        .form(&params)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(remote_error(response).await);
    }

    let device_code = response.json::<DeviceCodeResponse>().await.map_err(|e| {
        SyncError::Http(format!("Failed to parse device code response: {}", e))
    })?;
    Ok(device_code)
}

/// One poll of the token endpoint. Never fails: transport problems come
/// back as `TokenPoll::Transient`.
pub async fn request_access_token(
    http: &GitHubHttp,
    login_base: &str,
    client_id: &str,
    device_code: &str,
) -> TokenPoll {
    let params = [
        ("client_id", client_id),
        ("device_code", device_code),
        ("grant_type", DEVICE_GRANT_TYPE),
    ];
    let url = format!("{}/login/oauth/access_token", login_base);

    // No transport retry: the caller owns the polling cadence.
    let response = match http
        .writer()
        .post(&url)
        .header("Accept", "application/json")
        .header("User-Agent", http.user_agent())
        .form(&params)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return TokenPoll::Transient(e.to_string()),
    };

    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return TokenPoll::Transient(e.to_string()),
    };

    match serde_json::from_str::<AccessTokenResponse>(&body) {
        Ok(parsed) => parsed.classify(),
        Err(e) => TokenPoll::Transient(format!("HTTP {} with unreadable body: {}", status, e)),
    }
}
