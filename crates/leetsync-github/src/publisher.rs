use base64::{engine::general_purpose::STANDARD, Engine};
use leetsync_core::{
    Clock, CommitResult, ExtractedSolution, RepositoryTarget, Result, SyncConfig, SyncError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http::{remote_error, GitHubHttp};

/// File extension for a normalized language label. Unknown languages get `txt`.
pub fn language_extension(language: &str) -> &'static str {
    match language.trim().to_ascii_lowercase().as_str() {
        "python" | "python3" | "pandas" => "py",
        "java" => "java",
        "cpp" | "c++" => "cpp",
        "c" => "c",
        "csharp" | "c#" => "cs",
        "javascript" => "js",
        "typescript" => "ts",
        "go" | "golang" => "go",
        "rust" => "rs",
        "ruby" => "rb",
        "swift" => "swift",
        "kotlin" => "kt",
        "scala" => "scala",
        "php" => "php",
        "dart" => "dart",
        "elixir" => "ex",
        "erlang" => "erl",
        "racket" => "rkt",
        "mysql" | "mssql" | "oraclesql" | "postgresql" | "sql" => "sql",
        "bash" | "shell" => "sh",
        _ => "txt",
    }
}

/// `prefix/` with surrounding slashes collapsed; empty for the repository root.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// `{prefix}/{problem_id}_{unix_ms}.{ext}`
pub fn destination_path(
    target: &RepositoryTarget,
    solution: &ExtractedSolution,
    unix_millis: i64,
) -> String {
    format!(
        "{}{}_{}.{}",
        normalize_prefix(&target.path_prefix),
        solution.problem_id,
        unix_millis,
        language_extension(&solution.language)
    )
}

#[derive(Debug, Serialize)]
struct CreateFileRequest<'a> {
    message: String,
    content: String,
    branch: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ContentInfo {
    path: Option<String>,
    html_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CommitInfo {
    sha: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CreateFileResponse {
    #[serde(default)]
    content: Option<ContentInfo>,
    #[serde(default)]
    commit: Option<CommitInfo>,
}

/// Commits solutions through the contents API.
pub struct CommitPublisher {
    http: GitHubHttp,
    api_base: String,
    clock: Arc<dyn Clock>,
}

impl CommitPublisher {
    pub fn new(config: &SyncConfig, http: GitHubHttp, clock: Arc<dyn Clock>) -> Self {
        Self {
            http,
            api_base: config.api_base().to_string(),
            clock,
        }
    }

    /// Creates a new file for `solution`. The timestamp in the name keeps
    /// paths unique, so this never reads or updates an existing file.
    pub async fn publish(
        &self,
        credential: &str,
        target: &RepositoryTarget,
        solution: &ExtractedSolution,
    ) -> Result<CommitResult> {
        if target.owner.trim().is_empty() {
            return Err(SyncError::MissingConfiguration(
                "repository owner is not set".to_string(),
            ));
        }
        if target.repo.trim().is_empty() {
            return Err(SyncError::MissingConfiguration(
                "repository name is not set".to_string(),
            ));
        }

        let path = destination_path(target, solution, self.clock.now_millis());
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base,
            target.owner.trim(),
            target.repo.trim(),
            path
        );
        let title = if solution.problem_name.trim().is_empty() {
            solution.problem_id.as_str()
        } else {
            solution.problem_name.as_str()
        };
        let body = CreateFileRequest {
            message: format!("Add solution for {} ({})", title, solution.language),
            content: STANDARD.encode(solution.source_code.as_bytes()),
            branch: target.branch.as_str(),
        };

        log::info!(
            "Publishing {} to {}/{}@{}",
            path,
            target.owner,
            target.repo,
            target.branch
        );

        let response = self
            .http
            .api_request(self.http.writer().put(&url), credential)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = remote_error(response).await;
            log::error!("Publishing {} failed: {}", path, err);
            return Err(err);
        }

        let created = response
            .json::<CreateFileResponse>()
            .await
            .unwrap_or_default();
        let content = created.content.unwrap_or_default();

        Ok(CommitResult {
            path: content.path.unwrap_or(path),
            html_url: content.html_url,
            commit_sha: created.commit.and_then(|commit| commit.sha),
        })
    }
}
