use leetsync_core::{Identity, Result, SyncConfig, SyncError, SyncState};
use serde::Deserialize;

use crate::http::GitHubHttp;

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

/// Answers "who is logged in" against the stored credential.
#[derive(Clone)]
pub struct SessionQuery {
    http: GitHubHttp,
    state: SyncState,
    api_base: String,
}

impl SessionQuery {
    pub fn new(config: &SyncConfig, http: GitHubHttp, state: SyncState) -> Self {
        Self {
            http,
            state,
            api_base: config.api_base().to_string(),
        }
    }

    /// True only when a credential is stored and GitHub still accepts it.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.current_identity().await?.is_some())
    }

    /// The identity behind the stored credential, or `None` when there is no
    /// credential or GitHub no longer accepts it. The stored value is kept
    /// either way.
    pub async fn current_identity(&self) -> Result<Option<Identity>> {
        let Some(credential) = self.state.credential().await? else {
            return Ok(None);
        };

        match self.fetch_identity(&credential).await {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                log::warn!("Stored credential failed validation: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn fetch_identity(&self, credential: &str) -> Result<Identity> {
        let url = format!("{}/user", self.api_base);
        let response = self
            .http
            .api_request(self.http.reader().get(&url), credential)
            .send()
            .await
            .map_err(|e| SyncError::IdentityFetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::IdentityFetchFailed(format!("HTTP {}", status)));
        }

        let user = response
            .json::<UserResponse>()
            .await
            .map_err(|e| SyncError::IdentityFetchFailed(e.to_string()))?;

        Ok(Identity {
            login: user.login,
            name: user.name,
            avatar_url: user.avatar_url,
        })
    }

    /// Forgets the credential and any flow in progress.
    pub async fn logout(&self) -> Result<()> {
        self.state.clear_credential().await?;
        self.state.clear_device_flow().await?;
        log::info!("Logged out and cleared stored credential");
        Ok(())
    }
}
