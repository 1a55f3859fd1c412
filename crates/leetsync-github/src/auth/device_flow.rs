use chrono::Duration as ChronoDuration;
use leetsync_core::{
    poll_until, Attempt, Clock, DeviceFlowSession, Result, RetryError, RetryPolicy, SyncConfig,
    SyncError, SyncState,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::device_code::{request_access_token, request_device_code, TokenPoll};
use crate::http::GitHubHttp;

/// Extra seconds added to the interval when the server answers `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Where the device flow stands, as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    AwaitingUserCode,
    Polling,
    Authenticated,
    Expired,
    Cancelled,
    Rejected(String),
    TimedOut,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Authenticated
                | FlowState::Expired
                | FlowState::Cancelled
                | FlowState::Rejected(_)
                | FlowState::TimedOut
        )
    }

    /// Only an idle or finished flow may be replaced by a new one.
    pub fn allows_start(&self) -> bool {
        matches!(self, FlowState::Idle) || self.is_terminal()
    }

    fn from_outcome(outcome: &Result<()>) -> Self {
        match outcome {
            Ok(()) => FlowState::Authenticated,
            Err(SyncError::FlowExpired) => FlowState::Expired,
            Err(SyncError::FlowCancelled) => FlowState::Cancelled,
            Err(SyncError::AuthTimeout { .. }) => FlowState::TimedOut,
            Err(other) => FlowState::Rejected(other.to_string()),
        }
    }
}

/// A poller running in the background. Dropping the handle detaches it.
pub struct PollHandle {
    pub device_code: String,
    pub status: watch::Receiver<FlowState>,
    pub task: JoinHandle<Result<()>>,
}

/// Drives the GitHub device authorization flow.
///
/// 1. `start_flow` requests a device code and persists the session
/// 2. The user enters the code at the verification page
/// 3. `poll_for_token` polls until GitHub hands out a token
/// 4. The token is stored as the credential and the session is cleared
///
/// Single-flight is enforced through the persisted session record, so two
/// callers sharing a store never run two flows at once.
pub struct DeviceFlowManager {
    http: GitHubHttp,
    state: SyncState,
    clock: Arc<dyn Clock>,
    client_id: String,
    scope: String,
    login_base: String,
    max_attempts: u32,
}

impl DeviceFlowManager {
    pub fn new(
        config: &SyncConfig,
        http: GitHubHttp,
        state: SyncState,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            state,
            clock,
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
            login_base: config.login_base().to_string(),
            max_attempts: config.max_poll_attempts,
        }
    }

    /// Requests a new device code. Fails with `FlowAlreadyActive` carrying
    /// the live session when one exists.
    pub async fn start_flow(&self) -> Result<DeviceFlowSession> {
        if let Some(active) = self.active_flow().await? {
            log::info!("Device flow already active (code {})", active.user_code);
            return Err(SyncError::FlowAlreadyActive(active));
        }

        let response =
            request_device_code(&self.http, &self.login_base, &self.client_id, &self.scope)
                .await?;

        let now = self.clock.now();
        let expires_in = i64::try_from(response.expires_in).unwrap_or(i64::MAX / 1000);
        let session = DeviceFlowSession {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            interval: response.interval,
            expires_at: now + ChronoDuration::seconds(expires_in),
        };

        match self.state.store_device_flow_if_idle(&session, now).await? {
            Ok(()) => {
                log::info!(
                    "Device flow started: code {} expires at {}",
                    session.user_code,
                    session.expires_at
                );
                Ok(session)
            }
            Err(existing) => {
                log::info!(
                    "Another caller started a device flow first (code {})",
                    existing.user_code
                );
                Err(SyncError::FlowAlreadyActive(existing))
            }
        }
    }

    /// Returns the stored session while it is live. An expired session is
    /// cleared as a side effect.
    pub async fn active_flow(&self) -> Result<Option<DeviceFlowSession>> {
        match self.state.device_flow().await? {
            Some(session) if session.is_expired_at(self.clock.now()) => {
                log::info!("Device flow {} expired, clearing it", session.user_code);
                self.state.clear_device_flow_for(&session.device_code).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub async fn cancel_flow(&self) -> Result<()> {
        self.state.clear_device_flow().await?;
        log::info!("Device flow cancelled");
        Ok(())
    }

    /// Polls the token endpoint until the user authorizes, the server
    /// rejects the code, or `max_attempts` polls have gone by.
    ///
    /// Cancellation is cooperative: the stored session is re-read before
    /// every poll and when a token arrives. A request already in flight is
    /// allowed to finish; its token is discarded if the flow was cancelled.
    pub async fn poll_for_token(
        &self,
        session: &DeviceFlowSession,
        cancel: &CancellationToken,
        status: Option<&watch::Sender<FlowState>>,
    ) -> Result<()> {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_secs(session.interval));
        if let Some(status) = status {
            status.send_replace(FlowState::Polling);
        }

        let outcome = poll_until(policy, cancel, |attempt| async move {
            if let Err(stop) = self.check_still_current(session).await {
                return Attempt::Failed(stop);
            }

            match request_access_token(
                &self.http,
                &self.login_base,
                &self.client_id,
                &session.device_code,
            )
            .await
            {
                TokenPoll::Granted(token) => match self.check_still_current(session).await {
                    Ok(()) => Attempt::Ready(token),
                    Err(stop) => {
                        log::info!("Discarding token that arrived after the flow ended");
                        Attempt::Failed(stop)
                    }
                },
                TokenPoll::Pending => {
                    log::debug!("Authorization pending (attempt {})", attempt);
                    Attempt::Pending
                }
                TokenPoll::SlowDown => {
                    log::warn!("Server requested slower polling");
                    Attempt::SlowDown(SLOW_DOWN_STEP)
                }
                TokenPoll::Expired => Attempt::Failed(SyncError::FlowExpired),
                TokenPoll::Rejected { error, description } => {
                    Attempt::Failed(SyncError::OAuthRejected { error, description })
                }
                TokenPoll::Transient(reason) => {
                    log::warn!("Token poll attempt {} failed, retrying: {}", attempt, reason);
                    Attempt::Pending
                }
            }
        })
        .await;

        let result = match outcome {
            Ok(token) => {
                self.state.set_credential(&token).await?;
                self.state.clear_device_flow_for(&session.device_code).await?;
                log::info!("Device flow completed, credential stored");
                Ok(())
            }
            Err(RetryError::Cancelled) | Err(RetryError::Failed(SyncError::FlowCancelled)) => {
                log::info!("Device flow {} stopped after cancellation", session.user_code);
                Err(SyncError::FlowCancelled)
            }
            Err(RetryError::Failed(err)) => {
                log::error!("Device flow failed: {}", err);
                self.state.clear_device_flow_for(&session.device_code).await?;
                Err(err)
            }
            Err(RetryError::Exhausted { attempts }) => {
                log::error!("Device flow timed out after {} attempts", attempts);
                self.state.clear_device_flow_for(&session.device_code).await?;
                Err(SyncError::AuthTimeout { attempts })
            }
        };

        if let Some(status) = status {
            status.send_replace(FlowState::from_outcome(&result));
        }
        result
    }

    /// Runs `poll_for_token` as a detached task. Completion is observable
    /// through the returned status channel and through the store.
    pub fn spawn_poll(self: &Arc<Self>, session: DeviceFlowSession) -> PollHandle {
        let (tx, rx) = watch::channel(FlowState::AwaitingUserCode);
        let manager = Arc::clone(self);
        let device_code = session.device_code.clone();

        let task = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            manager.poll_for_token(&session, &cancel, Some(&tx)).await
        });

        PollHandle {
            device_code,
            status: rx,
            task,
        }
    }

    async fn check_still_current(&self, session: &DeviceFlowSession) -> Result<()> {
        let stored = match self.state.device_flow().await {
            Ok(stored) => stored,
            Err(e) => {
                // Store hiccups should not end the flow.
                log::warn!("Could not re-read device flow state: {}", e);
                return Ok(());
            }
        };

        match stored {
            Some(stored) if stored.device_code == session.device_code => {
                if stored.is_expired_at(self.clock.now()) {
                    Err(SyncError::FlowExpired)
                } else {
                    Ok(())
                }
            }
            _ => Err(SyncError::FlowCancelled),
        }
    }
}
