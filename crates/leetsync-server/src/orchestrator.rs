//! Command router between the UI and the sync core.
//!
//! Every command resolves to a JSON object with a `success` flag. Failures
//! carry the error text and its [`ErrorKind`](leetsync_core::ErrorKind)
//! label instead of propagating.

use std::sync::Arc;

use async_trait::async_trait;
use leetsync_core::model::{DEFAULT_BRANCH, DEFAULT_PATH_PREFIX};
use leetsync_core::{
    Clock, CommitResult, ExtractedSolution, RepositoryTarget, Result, SyncConfig, SyncError,
    SyncState,
};
use leetsync_github::{
    CommitPublisher, DeviceFlowManager, FlowState, GitHubHttp, PollHandle, RepoClient,
    SessionQuery,
};
use leetsync_page::SolutionSink;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Command {
    GithubLogin,
    CheckDeviceFlow,
    CancelDeviceFlow,
    CheckAuthStatus,
    GithubLogout,
    OpenVerificationPage,
    FetchGithubRepos,
    GetRepoConfig,
    SaveRepoConfig {
        owner: String,
        repo: String,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        path_prefix: Option<String>,
    },
    UpdateRepoPath {
        path: String,
    },
    SubmitLeetcodeSolution {
        solution: ExtractedSolution,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::GithubLogin => "github-login",
            Command::CheckDeviceFlow => "check-device-flow",
            Command::CancelDeviceFlow => "cancel-device-flow",
            Command::CheckAuthStatus => "check-auth-status",
            Command::GithubLogout => "github-logout",
            Command::OpenVerificationPage => "open-verification-page",
            Command::FetchGithubRepos => "fetch-github-repos",
            Command::GetRepoConfig => "get-repo-config",
            Command::SaveRepoConfig { .. } => "save-repo-config",
            Command::UpdateRepoPath { .. } => "update-repo-path",
            Command::SubmitLeetcodeSolution { .. } => "submit-leetcode-solution",
        }
    }
}

pub fn success(fields: Value) -> Value {
    let mut body = json!({ "success": true });
    if let (Some(body), Value::Object(fields)) = (body.as_object_mut(), fields) {
        body.extend(fields);
    }
    body
}

pub fn failure(err: &SyncError) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "kind": err.kind().as_str(),
    })
}

pub struct Orchestrator {
    state: SyncState,
    flow: Arc<DeviceFlowManager>,
    session: SessionQuery,
    repos: RepoClient,
    publisher: CommitPublisher,
    headless: bool,
    poll: Mutex<Option<PollHandle>>,
}

impl Orchestrator {
    pub fn new(
        config: &SyncConfig,
        state: SyncState,
        http: GitHubHttp,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            flow: Arc::new(DeviceFlowManager::new(
                config,
                http.clone(),
                state.clone(),
                clock.clone(),
            )),
            session: SessionQuery::new(config, http.clone(), state.clone()),
            repos: RepoClient::new(config, http.clone()),
            publisher: CommitPublisher::new(config, http, clock),
            headless: config.headless,
            state,
            poll: Mutex::new(None),
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub async fn dispatch(&self, command: Command) -> Value {
        let name = command.name();
        log::debug!("Dispatching {}", name);
        match self.execute(command).await {
            Ok(fields) => success(fields),
            Err(e) => {
                log::error!("{} failed: {}", name, e);
                failure(&e)
            }
        }
    }

    async fn execute(&self, command: Command) -> Result<Value> {
        match command {
            Command::GithubLogin => self.login().await,
            Command::CheckDeviceFlow => self.check_device_flow().await,
            Command::CancelDeviceFlow => {
                self.flow.cancel_flow().await?;
                Ok(json!({ "state": FlowState::Cancelled }))
            }
            Command::CheckAuthStatus => {
                let identity = self.session.current_identity().await?;
                Ok(json!({
                    "authenticated": identity.is_some(),
                    "user": identity,
                }))
            }
            Command::GithubLogout => {
                self.session.logout().await?;
                Ok(json!({}))
            }
            Command::OpenVerificationPage => self.open_verification_page().await,
            Command::FetchGithubRepos => {
                let credential = self.require_credential().await?;
                let repos = self.repos.list_repositories(&credential).await?;
                Ok(json!({ "repos": repos }))
            }
            Command::GetRepoConfig => {
                let target = self.state.repository_target().await?;
                Ok(json!({ "config": target }))
            }
            Command::SaveRepoConfig {
                owner,
                repo,
                branch,
                path_prefix,
            } => {
                let target = repository_target(owner, repo, branch, path_prefix)?;
                self.state.save_repository_target(&target).await?;
                log::info!("Repository set to {}/{}@{}", target.owner, target.repo, target.branch);
                Ok(json!({ "config": target }))
            }
            Command::UpdateRepoPath { path } => {
                let target = self.state.update_path_prefix(&path).await?;
                Ok(json!({ "config": target }))
            }
            Command::SubmitLeetcodeSolution { solution } => {
                let commit = self.publish(&solution).await?;
                Ok(json!({ "commit": commit }))
            }
        }
    }

    async fn login(&self) -> Result<Value> {
        let (session, already_active) = match self.flow.start_flow().await {
            Ok(session) => (session, false),
            Err(SyncError::FlowAlreadyActive(session)) => (session, true),
            Err(e) => return Err(e),
        };

        let mut poll = self.poll.lock().await;
        let running = poll.as_ref().is_some_and(|handle| {
            handle.device_code == session.device_code && !handle.task.is_finished()
        });
        if !running {
            // Also covers a session left behind by an earlier process.
            *poll = Some(self.flow.spawn_poll(session.clone()));
        }

        Ok(json!({
            "already_active": already_active,
            "device": session.user_facing(),
        }))
    }

    async fn check_device_flow(&self) -> Result<Value> {
        let active = self.flow.active_flow().await?;
        let last = {
            let poll = self.poll.lock().await;
            poll.as_ref().map(|handle| handle.status.borrow().clone())
        };
        let authenticated = self.state.credential().await?.is_some();

        // The poller only notices a cancel or logout on its next pass, so the
        // store wins over its last report.
        let state = match last {
            None => FlowState::Idle,
            Some(FlowState::Authenticated) if !authenticated => FlowState::Idle,
            Some(state) if active.is_none() && !state.is_terminal() => FlowState::Cancelled,
            Some(state) => state,
        };

        Ok(json!({
            "state": state,
            "authenticated": authenticated,
            "device": active.map(|session| session.user_facing()),
        }))
    }

    async fn open_verification_page(&self) -> Result<Value> {
        let session = self
            .flow
            .active_flow()
            .await?
            .ok_or(SyncError::NoActiveFlow)?;

        let opened = if self.headless {
            false
        } else {
            match webbrowser::open(&session.verification_uri) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Could not open {}: {}", session.verification_uri, e);
                    false
                }
            }
        };

        Ok(json!({
            "opened": opened,
            "verification_uri": session.verification_uri,
            "user_code": session.user_code,
        }))
    }

    async fn require_credential(&self) -> Result<String> {
        self.state
            .credential()
            .await?
            .ok_or(SyncError::NotAuthenticated)
    }

    /// Commits with the stored credential and repository.
    pub async fn publish(&self, solution: &ExtractedSolution) -> Result<CommitResult> {
        let credential = self.require_credential().await?;
        let target = self.state.repository_target().await?.ok_or_else(|| {
            SyncError::MissingConfiguration("no repository has been selected".to_string())
        })?;
        self.publisher.publish(&credential, &target, solution).await
    }
}

#[async_trait]
impl SolutionSink for Orchestrator {
    async fn submit_solution(&self, solution: ExtractedSolution) -> Result<CommitResult> {
        self.publish(&solution).await
    }
}

fn repository_target(
    owner: String,
    repo: String,
    branch: Option<String>,
    path_prefix: Option<String>,
) -> Result<RepositoryTarget> {
    let target = RepositoryTarget::new(owner.trim(), repo.trim())
        .with_branch(
            branch
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        )
        .with_path_prefix(
            path_prefix
                .map(|p| p.trim().to_string())
                .unwrap_or_else(|| DEFAULT_PATH_PREFIX.to_string()),
        );
    if !target.is_complete() {
        return Err(SyncError::MissingConfiguration(
            "owner and repo are required".to_string(),
        ));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_kebab_case_tags() {
        let command: Command = serde_json::from_value(json!({
            "type": "save-repo-config",
            "owner": "u",
            "repo": "r"
        }))
        .unwrap();
        assert_eq!(
            command,
            Command::SaveRepoConfig {
                owner: "u".to_string(),
                repo: "r".to_string(),
                branch: None,
                path_prefix: None,
            }
        );
        assert_eq!(command.name(), "save-repo-config");

        let login: Command = serde_json::from_str(r#"{"type":"github-login"}"#).unwrap();
        assert_eq!(login, Command::GithubLogin);
    }

    #[test]
    fn success_merges_fields() {
        let body = success(json!({ "config": { "owner": "u" } }));
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["config"]["owner"], json!("u"));
    }

    #[test]
    fn failure_carries_kind() {
        let body = failure(&SyncError::NotAuthenticated);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["kind"], json!("authentication"));
        assert_eq!(body["error"], json!("Not authenticated with GitHub"));
    }

    #[test]
    fn repository_target_applies_defaults() {
        let target = repository_target("u".into(), " r ".into(), Some("  ".into()), None).unwrap();
        assert_eq!(target.repo, "r");
        assert_eq!(target.branch, DEFAULT_BRANCH);
        assert_eq!(target.path_prefix, DEFAULT_PATH_PREFIX);

        assert!(matches!(
            repository_target("".into(), "r".into(), None, None),
            Err(SyncError::MissingConfiguration(_))
        ));
    }
}
