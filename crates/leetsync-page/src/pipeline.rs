use std::sync::Arc;

use async_trait::async_trait;
use leetsync_core::{CommitResult, ExtractedSolution, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dom::{PageDocument, PageElement};
use crate::extractor::CodeExtractor;
use crate::watcher::SubmissionWatcher;

/// Notifications the host forwards from the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "elements", rename_all = "snake_case")]
pub enum PageSignal {
    /// Click target followed by its ancestors.
    Click(Vec<PageElement>),
    /// Elements added in one mutation batch.
    Mutations(Vec<PageElement>),
}

/// Where extracted solutions go.
#[async_trait]
pub trait SolutionSink: Send + Sync {
    async fn submit_solution(&self, solution: ExtractedSolution) -> Result<CommitResult>;
}

/// Watcher, extractor and sink wired together for one page.
pub struct SubmissionPipeline {
    page: Arc<dyn PageDocument>,
    watcher: SubmissionWatcher,
    extractor: CodeExtractor,
    sink: Arc<dyn SolutionSink>,
}

impl SubmissionPipeline {
    pub fn new(
        page: Arc<dyn PageDocument>,
        watcher: SubmissionWatcher,
        extractor: CodeExtractor,
        sink: Arc<dyn SolutionSink>,
    ) -> Self {
        Self {
            page,
            watcher,
            extractor,
            sink,
        }
    }

    pub fn watcher(&self) -> &SubmissionWatcher {
        &self.watcher
    }

    /// Returns `None` when the signal did not complete a submission cycle.
    pub async fn handle_signal(
        &mut self,
        signal: PageSignal,
        cancel: &CancellationToken,
    ) -> Option<Result<CommitResult>> {
        let event = match signal {
            PageSignal::Click(path) => {
                self.watcher.handle_click(&path);
                return None;
            }
            PageSignal::Mutations(added) => {
                self.watcher.handle_mutations(self.page.as_ref(), &added)?
            }
        };

        let outcome = match self.extractor.extract(&event, cancel).await {
            Ok(solution) => self.sink.submit_solution(solution).await,
            Err(err) => Err(err),
        };

        match &outcome {
            Ok(commit) => log::info!("Solution for {} committed to {}", event.problem_id, commit.path),
            Err(err) => log::error!("Solution for {} was not committed: {}", event.problem_id, err),
        }
        Some(outcome)
    }

    /// Drains signals until the channel closes or `cancel` fires.
    pub async fn run(mut self, mut signals: mpsc::Receiver<PageSignal>, cancel: CancellationToken) {
        loop {
            let signal = tokio::select! {
                _ = cancel.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => signal,
                    None => break,
                },
            };
            self.handle_signal(signal, &cancel).await;
        }
        log::debug!("Submission pipeline stopped");
    }
}
