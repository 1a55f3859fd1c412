use std::sync::Arc;

use leetsync_core::{
    Clock, JsonFileStore, KeyValueStore, Result, SyncConfig, SyncError, SyncState, SystemClock,
};
use leetsync_github::GitHubHttp;
use leetsync_page::{
    CodeExtractor, EditorSlot, PageSignal, SnapshotPage, SubmissionPipeline, SubmissionWatcher,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;

const SIGNAL_BUFFER: usize = 64;

/// Shared by every request handler.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Latest page snapshot pushed by the browser bridge.
    pub page: Arc<SnapshotPage>,
    pub editor: Arc<EditorSlot>,
    pub signals: mpsc::Sender<PageSignal>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Opens the JSON store named by the config and wires up the live components.
    pub async fn from_config(config: &SyncConfig) -> Result<Self> {
        let path = config.store_path();
        log::info!("Initializing store at: {:?}", path);
        let store = JsonFileStore::new(&path);
        store.init().await?;

        Self::with_parts(
            config,
            Arc::new(store),
            GitHubHttp::from_config(config),
            Arc::new(SystemClock),
        )
    }

    /// Builds the state around an existing store and client, then starts the
    /// submission pipeline on the current runtime.
    pub fn with_parts(
        config: &SyncConfig,
        store: Arc<dyn KeyValueStore>,
        http: GitHubHttp,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            SyncState::new(store),
            http,
            clock,
        ));

        let page = Arc::new(SnapshotPage::default());
        let editor = Arc::new(EditorSlot::new());
        let watcher = SubmissionWatcher::from_config(&config.page).map_err(invalid_selector)?;
        let extractor = CodeExtractor::new(&config.page, page.clone(), editor.clone())
            .map_err(invalid_selector)?;
        let pipeline =
            SubmissionPipeline::new(page.clone(), watcher, extractor, orchestrator.clone());

        let (signals, receiver) = mpsc::channel(SIGNAL_BUFFER);
        let shutdown = CancellationToken::new();
        tokio::spawn(pipeline.run(receiver, shutdown.clone()));

        Ok(Self {
            orchestrator,
            page,
            editor,
            signals,
            shutdown,
        })
    }
}

fn invalid_selector(err: leetsync_page::SelectorError) -> SyncError {
    SyncError::MissingConfiguration(format!("invalid page selector: {}", err))
}
