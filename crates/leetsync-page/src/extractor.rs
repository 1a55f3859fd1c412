use std::sync::Arc;
use std::time::Duration;

use leetsync_core::{
    poll_until, Attempt, ExtractedSolution, PageConfig, RetryError, RetryPolicy, SubmissionEvent,
    SyncError,
};
use tokio_util::sync::CancellationToken;

use crate::dom::{EditorProbe, PageDocument, TextBuffer};
use crate::selector::{Selector, SelectorError};

const CONTAINER_PHASE: &str = "editor container";
const MODEL_PHASE: &str = "editor model";

/// Lower-cases the language control's label and maps the two labels whose
/// symbols do not survive as identifiers.
pub fn normalize_language(label: &str) -> Option<String> {
    let first_line = label.lines().next().unwrap_or("").trim().to_lowercase();
    if first_line.is_empty() {
        return None;
    }
    Some(match first_line.as_str() {
        "c++" => "cpp".to_string(),
        "c#" => "csharp".to_string(),
        _ => first_line,
    })
}

/// Reads the solution out of the embedded editor once it is ready.
pub struct CodeExtractor {
    page: Arc<dyn PageDocument>,
    editor: Arc<dyn EditorProbe>,
    container: Selector,
    language: Selector,
    timeout: Duration,
    interval: Duration,
}

impl CodeExtractor {
    pub fn new(
        config: &PageConfig,
        page: Arc<dyn PageDocument>,
        editor: Arc<dyn EditorProbe>,
    ) -> Result<Self, SelectorError> {
        Ok(Self {
            page,
            editor,
            container: Selector::parse(&config.editor_container_selector)?,
            language: Selector::parse(&config.language_selector)?,
            timeout: config.wait_timeout(),
            interval: config.wait_interval(),
        })
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::within(self.timeout, self.interval)
    }

    pub async fn extract(
        &self,
        event: &SubmissionEvent,
        cancel: &CancellationToken,
    ) -> Result<ExtractedSolution, SyncError> {
        self.wait_for_container(cancel).await?;
        let buffer = self.wait_for_buffer(cancel).await?;

        let language = self.language_label(buffer.as_ref());
        let source_code = buffer.value();
        log::info!(
            "Extracted {} bytes of {} for {}",
            source_code.len(),
            language,
            event.problem_id
        );

        Ok(ExtractedSolution {
            problem_id: event.problem_id.clone(),
            problem_name: event.problem_name.clone(),
            language,
            source_code,
        })
    }

    async fn wait_for_container(&self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let page = self.page.clone();
        let selector = &self.container;
        poll_until(self.policy(), cancel, |_| {
            let found = page.query(selector).is_some();
            async move {
                if found {
                    Attempt::Ready(())
                } else {
                    Attempt::<(), ()>::Pending
                }
            }
        })
        .await
        .map_err(|err| self.phase_error(CONTAINER_PHASE, err))
    }

    async fn wait_for_buffer(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn TextBuffer>, SyncError> {
        let editor = self.editor.clone();
        poll_until(self.policy(), cancel, |_| {
            let buffer = editor.readable_buffer();
            async move {
                match buffer {
                    Some(buffer) => Attempt::Ready(buffer),
                    None => Attempt::<_, ()>::Pending,
                }
            }
        })
        .await
        .map_err(|err| self.phase_error(MODEL_PHASE, err))
    }

    fn phase_error(&self, phase: &'static str, err: RetryError<()>) -> SyncError {
        match err {
            RetryError::Cancelled => SyncError::Cancelled(format!("waiting for the {}", phase)),
            RetryError::Exhausted { .. } | RetryError::Failed(()) => {
                log::warn!("Gave up waiting for the {} after {:?}", phase, self.timeout);
                SyncError::ExtractionTimeout {
                    phase,
                    waited_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }
            }
        }
    }

    fn language_label(&self, buffer: &dyn TextBuffer) -> String {
        self.page
            .query(&self.language)
            .and_then(|control| normalize_language(&control.text_content()))
            .or_else(|| buffer.language_id().and_then(|id| normalize_language(&id)))
            .unwrap_or_else(|| "plaintext".to_string())
    }
}
