use leetsync_core::{RepoSummary, Result, SyncConfig};

use crate::http::{remote_error, GitHubHttp};

#[derive(Clone)]
pub struct RepoClient {
    http: GitHubHttp,
    api_base: String,
}

impl RepoClient {
    pub fn new(config: &SyncConfig, http: GitHubHttp) -> Self {
        Self {
            http,
            api_base: config.api_base().to_string(),
        }
    }

    /// Repositories the credential can see, most recently updated first.
    pub async fn list_repositories(&self, credential: &str) -> Result<Vec<RepoSummary>> {
        let url = format!("{}/user/repos", self.api_base);
        let response = self
            .http
            .api_request(self.http.reader().get(&url), credential)
            .query(&[("per_page", "100"), ("sort", "updated")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_error(response).await);
        }

        let repos = response.json::<Vec<RepoSummary>>().await?;
        log::debug!("Fetched {} repositories", repos.len());
        Ok(repos)
    }
}
