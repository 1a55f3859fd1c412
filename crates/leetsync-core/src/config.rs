use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::{config_json_path, store_json_path};

pub const DEFAULT_CLIENT_ID: &str = "Ov23liLeetSyncDevice";
pub const DEFAULT_SCOPE: &str = "repo";
pub const GITHUB_LOGIN_BASE_URL: &str = "https://github.com";
pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "LeetSync/0.1";
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub client_id: String,
    pub scope: String,
    pub login_base_url: String,
    pub api_base_url: String,
    pub user_agent: String,
    pub max_poll_attempts: u32,
    pub http_max_retries: u32,
    pub store_path: Option<PathBuf>,
    /// Never launch a browser; the verification URI is only returned.
    pub headless: bool,
    pub page: PageConfig,
}

/// Selectors and timings for the submission page. They describe a
/// third-party page, so every one of them is overridable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub submit_selector: String,
    pub submit_text: String,
    pub result_selector: String,
    pub success_marker: String,
    pub title_selector: String,
    pub submission_id_attribute: String,
    pub editor_container_selector: String,
    pub language_selector: String,
    pub arm_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub wait_interval_ms: u64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            submit_selector: r#"[data-e2e-locator="console-submit-button"]"#.to_string(),
            submit_text: "Submit".to_string(),
            result_selector: r#"[data-e2e-locator="submission-result"]"#.to_string(),
            success_marker: "Accepted".to_string(),
            title_selector: r#"[data-cy="question-title"], .text-title-large"#.to_string(),
            submission_id_attribute: "data-submission-id".to_string(),
            editor_container_selector: ".monaco-editor".to_string(),
            language_selector: r#"[data-e2e-locator="lang-select"], button.lang-btn"#
                .to_string(),
            arm_timeout_ms: 30_000,
            wait_timeout_ms: 10_000,
            wait_interval_ms: 100,
        }
    }
}

impl PageConfig {
    pub fn arm_timeout(&self) -> Duration {
        Duration::from_millis(self.arm_timeout_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            login_base_url: GITHUB_LOGIN_BASE_URL.to_string(),
            api_base_url: GITHUB_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            http_max_retries: 3,
            store_path: None,
            headless: false,
            page: PageConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Loads `~/.leetsync/config.json` when present, then applies environment overrides.
    pub fn load() -> Self {
        Self::load_from(&config_json_path())
    }

    pub fn load_from(path: &Path) -> Self {
        let mut config = SyncConfig::default();

        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<SyncConfig>(&content) {
                    Ok(file_config) => config = file_config,
                    Err(e) => log::warn!("Ignoring malformed config {:?}: {}", path, e),
                },
                Err(e) => log::warn!("Failed to read config {:?}: {}", path, e),
            }
        }

        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(client_id) = std::env::var("LEETSYNC_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Ok(api_base) = std::env::var("LEETSYNC_API_BASE") {
            self.api_base_url = api_base;
        }
        if let Ok(login_base) = std::env::var("LEETSYNC_LOGIN_BASE") {
            self.login_base_url = login_base;
        }
        if let Ok(store_path) = std::env::var("LEETSYNC_STORE") {
            self.store_path = Some(PathBuf::from(store_path));
        }
        if let Ok(headless) = std::env::var("LEETSYNC_HEADLESS") {
            self.headless = parse_bool_env(&headless);
        }
        if let Ok(no_retry) = std::env::var("LEETSYNC_NO_RETRY") {
            if parse_bool_env(&no_retry) {
                self.http_max_retries = 0;
            }
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(store_json_path)
    }

    /// Base URLs without a trailing slash, for joining with absolute paths.
    pub fn login_base(&self) -> &str {
        self.login_base_url.trim_end_matches('/')
    }

    pub fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}
