//! Device flow tests against a mocked GitHub login server

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use leetsync_core::{FixedClock, KeyValueStore, MemoryStore, SyncConfig, SyncError, SyncState};
use leetsync_github::{DeviceFlowManager, FlowState, GitHubHttp};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer, max_poll_attempts: u32) -> SyncConfig {
    SyncConfig {
        login_base_url: server.uri(),
        api_base_url: server.uri(),
        max_poll_attempts,
        http_max_retries: 0,
        ..SyncConfig::default()
    }
}

struct Harness {
    manager: Arc<DeviceFlowManager>,
    state: SyncState,
    clock: Arc<FixedClock>,
}

fn harness(server: &MockServer, max_poll_attempts: u32) -> Harness {
    let config = test_config(server, max_poll_attempts);
    harness_with(&config, GitHubHttp::without_retry("LeetSyncTest/1.0"))
}

fn harness_with(config: &SyncConfig, http: GitHubHttp) -> Harness {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let state = SyncState::new(store);
    let clock = Arc::new(FixedClock::from_millis(1_700_000_000_000));
    let manager = Arc::new(DeviceFlowManager::new(
        config,
        http,
        state.clone(),
        clock.clone(),
    ));
    Harness {
        manager,
        state,
        clock,
    }
}

async fn mount_device_code(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/login/device/code"))
        .and(header("Accept", "application/json"))
        .and(body_string_contains("client_id="))
        .and(body_string_contains("scope=repo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "device_code": "D1",
            "user_code": "ABCD-1234",
            "verification_uri": "https://example/activate",
            "expires_in": 900,
            "interval": 0
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn pending_twice_then_token_stores_credential() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;

    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains("device_code=D1"))
        .and(body_string_contains("grant_type=urn"))
        .respond_with(move |_req: &wiremock::Request| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"error": "authorization_pending"}))
            } else {
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "tok",
                    "token_type": "bearer",
                    "scope": "repo"
                }))
            }
        })
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server, 60);
    let session = h.manager.start_flow().await.expect("start flow");
    assert_eq!(session.device_code, "D1");
    assert_eq!(session.user_code, "ABCD-1234");
    assert_eq!(session.verification_uri, "https://example/activate");
    assert_eq!(h.state.device_flow().await.unwrap(), Some(session.clone()));

    h.manager
        .poll_for_token(&session, &CancellationToken::new(), None)
        .await
        .expect("poll succeeds");

    assert_eq!(h.state.credential().await.unwrap().as_deref(), Some("tok"));
    assert_eq!(h.state.device_flow().await.unwrap(), None);
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn second_start_surfaces_existing_session() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;

    let h = harness(&server, 60);
    let first = h.manager.start_flow().await.expect("first start");

    for _ in 0..3 {
        match h.manager.start_flow().await {
            Err(SyncError::FlowAlreadyActive(existing)) => {
                assert_eq!(existing.user_code, first.user_code);
                assert_eq!(existing.verification_uri, first.verification_uri);
                assert_eq!(existing.expires_at, first.expires_at);
            }
            other => panic!("expected FlowAlreadyActive, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn expired_session_is_cleared_lazily_and_restart_is_allowed() {
    let server = MockServer::start().await;
    mount_device_code(&server, 2).await;

    let h = harness(&server, 60);
    h.manager.start_flow().await.expect("start");

    h.clock.advance(Duration::seconds(900));
    assert_eq!(h.manager.active_flow().await.unwrap(), None);
    assert_eq!(h.state.device_flow().await.unwrap(), None);

    h.manager.start_flow().await.expect("restart after expiry");
}

#[tokio::test]
async fn rejection_stops_immediately_and_clears_session() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": "access_denied",
            "error_description": "The user has denied your application access."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, 60);
    let session = h.manager.start_flow().await.expect("start");
    let err = h
        .manager
        .poll_for_token(&session, &CancellationToken::new(), None)
        .await
        .expect_err("rejected");

    assert!(matches!(err, SyncError::OAuthRejected { ref error, .. } if error == "access_denied"));
    assert_eq!(h.state.device_flow().await.unwrap(), None);
    assert_eq!(h.state.credential().await.unwrap(), None);
}

#[tokio::test]
async fn attempts_are_capped() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"error": "authorization_pending"})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server, 3);
    let session = h.manager.start_flow().await.expect("start");
    let err = h
        .manager
        .poll_for_token(&session, &CancellationToken::new(), None)
        .await
        .expect_err("times out");

    assert!(matches!(err, SyncError::AuthTimeout { attempts: 3 }));
    assert_eq!(h.state.device_flow().await.unwrap(), None);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;

    let polls = Arc::new(AtomicUsize::new(0));
    let counter = polls.clone();
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(move |_req: &wiremock::Request| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>")
            } else {
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "tok"}))
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, 60);
    let session = h.manager.start_flow().await.expect("start");
    h.manager
        .poll_for_token(&session, &CancellationToken::new(), None)
        .await
        .expect("recovers");

    assert_eq!(h.state.credential().await.unwrap().as_deref(), Some("tok"));
}

#[tokio::test]
async fn cancelled_flow_stops_before_polling() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok"})))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server, 60);
    let session = h.manager.start_flow().await.expect("start");
    h.manager.cancel_flow().await.expect("cancel");
    h.manager.cancel_flow().await.expect("cancel is idempotent");

    let err = h
        .manager
        .poll_for_token(&session, &CancellationToken::new(), None)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, SyncError::FlowCancelled));
    assert_eq!(h.state.credential().await.unwrap(), None);
}

#[tokio::test]
async fn spawned_poll_reports_completion_on_status_channel() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok"})))
        .mount(&server)
        .await;

    let h = harness(&server, 60);
    let session = h.manager.start_flow().await.expect("start");
    let handle = h.manager.spawn_poll(session);

    let mut status = handle.status.clone();
    handle.task.await.expect("join").expect("poll");
    let final_state = status.borrow_and_update().clone();
    assert_eq!(final_state, FlowState::Authenticated);
    assert_eq!(h.state.credential().await.unwrap().as_deref(), Some("tok"));
}

#[tokio::test]
async fn token_poll_is_sent_once_per_attempt_even_with_retrying_reads() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let config = SyncConfig {
        http_max_retries: 3,
        ..test_config(&server, 1)
    };
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client");
    let h = harness_with(&config, GitHubHttp::with_client(client, &config));

    let session = h.manager.start_flow().await.expect("start");
    let err = h
        .manager
        .poll_for_token(&session, &CancellationToken::new(), None)
        .await
        .expect_err("times out");

    assert!(matches!(err, SyncError::AuthTimeout { attempts: 1 }));
}

#[tokio::test]
async fn token_arriving_after_cancel_is_discarded() {
    let server = MockServer::start().await;
    mount_device_code(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "tok"}))
                .set_delay(StdDuration::from_millis(500)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, 60);
    let session = h.manager.start_flow().await.expect("start");

    let manager = h.manager.clone();
    let polling = session.clone();
    let poll = tokio::spawn(async move {
        manager
            .poll_for_token(&polling, &CancellationToken::new(), None)
            .await
    });

    for _ in 0..200 {
        let in_flight = server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .any(|r| r.url.path() == "/login/oauth/access_token");
        if in_flight {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(5)).await;
    }
    h.manager.cancel_flow().await.expect("cancel");

    let err = poll.await.expect("join").expect_err("cancelled");
    assert!(matches!(err, SyncError::FlowCancelled));
    assert_eq!(h.state.credential().await.unwrap(), None);
    assert_eq!(h.state.device_flow().await.unwrap(), None);
}
