use lazy_static::lazy_static;
use leetsync_core::{PageConfig, SubmissionEvent};
use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;

use crate::dom::{PageDocument, PageElement};
use crate::selector::{Selector, SelectorError};

lazy_static! {
    static ref SUBMISSION_ID_IN_URL: Regex =
        Regex::new(r"/submissions/(?:detail/)?(\d+)").expect("valid submission regex");
    static ref PROBLEM_SLUG_IN_URL: Regex =
        Regex::new(r"/problems/([^/?#]+)").expect("valid problem regex");
}

pub fn submission_id_from_url(url: &str) -> Option<String> {
    SUBMISSION_ID_IN_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn problem_slug_from_url(url: &str) -> Option<String> {
    PROBLEM_SLUG_IN_URL
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone)]
struct WatcherSelectors {
    submit: Selector,
    submit_text: String,
    result: Selector,
    title: Selector,
    success_marker: String,
    id_attribute: String,
}

/// Detects accepted submissions from click and mutation notifications.
///
/// A click on the submit control arms the watcher for `arm_timeout`. While
/// armed, added elements are scanned for the result announcement. An
/// accepted result yields one [`SubmissionEvent`] and disarms the watcher;
/// a result whose id was already processed is dropped.
#[derive(Debug)]
pub struct SubmissionWatcher {
    selectors: WatcherSelectors,
    arm_timeout: Duration,
    armed_until: Option<Instant>,
    last_processed_id: Option<String>,
}

impl SubmissionWatcher {
    pub fn from_config(config: &PageConfig) -> Result<Self, SelectorError> {
        Ok(Self {
            selectors: WatcherSelectors {
                submit: Selector::parse(&config.submit_selector)?,
                submit_text: config.submit_text.trim().to_string(),
                result: Selector::parse(&config.result_selector)?,
                title: Selector::parse(&config.title_selector)?,
                success_marker: config.success_marker.clone(),
                id_attribute: config.submission_id_attribute.clone(),
            },
            arm_timeout: config.arm_timeout(),
            armed_until: None,
            last_processed_id: None,
        })
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.armed_until, Some(deadline) if Instant::now() < deadline)
    }

    pub fn last_processed_id(&self) -> Option<&str> {
        self.last_processed_id.as_deref()
    }

    pub fn disarm(&mut self) {
        self.armed_until = None;
    }

    /// Forgets both the armed flag and the last processed submission.
    pub fn reset(&mut self) {
        self.armed_until = None;
        self.last_processed_id = None;
    }

    /// `path` is the click target followed by its ancestors. Returns whether
    /// the click armed the watcher.
    pub fn handle_click(&mut self, path: &[PageElement]) -> bool {
        let hit = path.iter().any(|element| {
            element.matches(&self.selectors.submit) || self.is_submit_by_text(element)
        });
        if hit {
            self.armed_until = Some(Instant::now() + self.arm_timeout);
            log::debug!("Submit clicked, waiting {:?} for a result", self.arm_timeout);
        }
        hit
    }

    fn is_submit_by_text(&self, element: &PageElement) -> bool {
        !self.selectors.submit_text.is_empty()
            && element.tag.eq_ignore_ascii_case("button")
            && element
                .text_content()
                .trim()
                .eq_ignore_ascii_case(&self.selectors.submit_text)
    }

    /// Inspects one batch of added elements, in the order the host delivered them.
    pub fn handle_mutations(
        &mut self,
        page: &dyn PageDocument,
        added: &[PageElement],
    ) -> Option<SubmissionEvent> {
        if !self.is_armed() {
            if self.armed_until.take().is_some() {
                log::debug!("No submission result within {:?}, disarmed", self.arm_timeout);
            }
            return None;
        }

        for element in added {
            let Some(result) = element.find(&self.selectors.result) else {
                continue;
            };

            let verdict = result.text_content();
            if !verdict.contains(&self.selectors.success_marker) {
                log::debug!("Submission result is not a success: {}", verdict.trim());
                continue;
            }

            let location = page.location();
            let submission_id = submission_id_from_url(&location)
                .or_else(|| self.submission_id_from_dom(page, element));

            if let Some(id) = &submission_id {
                if self.last_processed_id.as_deref() == Some(id.as_str()) {
                    log::debug!("Submission {} already processed, ignoring", id);
                    return None;
                }
                self.last_processed_id = Some(id.clone());
            }

            self.disarm();

            let problem_id =
                problem_slug_from_url(&location).unwrap_or_else(|| "unknown-problem".to_string());
            let problem_name = page
                .query(&self.selectors.title)
                .map(|title| title.text_content().trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| problem_id.clone());

            log::info!(
                "Accepted submission detected for {} (id {:?})",
                problem_id,
                submission_id
            );
            return Some(SubmissionEvent {
                problem_id,
                problem_name,
                submission_id,
            });
        }

        None
    }

    fn submission_id_from_dom(&self, page: &dyn PageDocument, added: &PageElement) -> Option<String> {
        let selector = Selector::has_attribute(&self.selectors.id_attribute);
        added
            .find(&selector)
            .and_then(|el| el.attr(&self.selectors.id_attribute).map(str::to_string))
            .or_else(|| {
                page.query(&selector)
                    .and_then(|el| el.attr(&self.selectors.id_attribute).map(str::to_string))
            })
            .filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SnapshotPage;

    const PROBLEM_URL: &str = "https://leetcode.com/problems/two-sum/description/";

    fn watcher() -> SubmissionWatcher {
        SubmissionWatcher::from_config(&PageConfig::default()).expect("default selectors")
    }

    fn page(url: &str) -> SnapshotPage {
        SnapshotPage::new(
            url,
            PageElement::new("body").with_child(
                PageElement::new("div")
                    .with_attr("data-cy", "question-title")
                    .with_text("1. Two Sum"),
            ),
        )
    }

    fn submit_button() -> PageElement {
        PageElement::new("button")
            .with_attr("data-e2e-locator", "console-submit-button")
            .with_text("Submit")
    }

    fn result(verdict: &str) -> PageElement {
        PageElement::new("div").with_child(
            PageElement::new("span")
                .with_attr("data-e2e-locator", "submission-result")
                .with_text(verdict),
        )
    }

    #[test]
    fn url_patterns() {
        assert_eq!(
            submission_id_from_url("https://leetcode.com/problems/two-sum/submissions/555/"),
            Some("555".to_string())
        );
        assert_eq!(
            submission_id_from_url("https://leetcode.com/submissions/detail/777/"),
            Some("777".to_string())
        );
        assert_eq!(submission_id_from_url(PROBLEM_URL), None);
        assert_eq!(problem_slug_from_url(PROBLEM_URL), Some("two-sum".to_string()));
    }

    #[tokio::test]
    async fn mutations_are_ignored_until_armed() {
        let mut watcher = watcher();
        let page = page(PROBLEM_URL);
        assert!(watcher.handle_mutations(&page, &[result("Accepted")]).is_none());
    }

    #[tokio::test]
    async fn click_inside_submit_button_arms() {
        let mut watcher = watcher();
        let icon = PageElement::new("svg");
        assert!(watcher.handle_click(&[icon, submit_button()]));
        assert!(watcher.is_armed());
    }

    #[tokio::test]
    async fn text_fallback_matches_plain_submit_button() {
        let mut plain = watcher();
        assert!(plain.handle_click(&[PageElement::new("button").with_text("  submit ")]));

        let mut other = watcher();
        assert!(!other.handle_click(&[PageElement::new("button").with_text("Submissions")]));
        assert!(!other.handle_click(&[PageElement::new("div").with_text("Submit")]));
    }

    #[tokio::test]
    async fn accepted_result_emits_event_and_disarms() {
        let mut watcher = watcher();
        let page = page("https://leetcode.com/problems/two-sum/submissions/555/");
        watcher.handle_click(&[submit_button()]);

        let event = watcher
            .handle_mutations(&page, &[result("Accepted")])
            .expect("event");
        assert_eq!(event.problem_id, "two-sum");
        assert_eq!(event.problem_name, "1. Two Sum");
        assert_eq!(event.submission_id.as_deref(), Some("555"));
        assert!(!watcher.is_armed());
        assert_eq!(watcher.last_processed_id(), Some("555"));
    }

    #[tokio::test]
    async fn same_submission_id_is_processed_once() {
        let mut watcher = watcher();
        let page = page("https://leetcode.com/problems/two-sum/submissions/555/");

        watcher.handle_click(&[submit_button()]);
        assert!(watcher.handle_mutations(&page, &[result("Accepted")]).is_some());

        // Re-armed by a second click, the same id is still suppressed.
        watcher.handle_click(&[submit_button()]);
        assert!(watcher.handle_mutations(&page, &[result("Accepted")]).is_none());
    }

    #[tokio::test]
    async fn failed_verdict_keeps_waiting() {
        let mut watcher = watcher();
        let page = page(PROBLEM_URL);
        watcher.handle_click(&[submit_button()]);

        assert!(watcher.handle_mutations(&page, &[result("Wrong Answer")]).is_none());
        assert!(watcher.is_armed());
    }

    #[tokio::test]
    async fn dom_attribute_is_the_id_fallback() {
        let mut watcher = watcher();
        let page = page(PROBLEM_URL);
        watcher.handle_click(&[submit_button()]);

        let added = result("Accepted").with_attr("data-submission-id", "901");
        let event = watcher.handle_mutations(&page, &[added]).expect("event");
        assert_eq!(event.submission_id.as_deref(), Some("901"));
    }

    #[tokio::test]
    async fn missing_title_falls_back_to_slug() {
        let mut watcher = watcher();
        let page = SnapshotPage::new(PROBLEM_URL, PageElement::new("body"));
        watcher.handle_click(&[submit_button()]);

        let event = watcher.handle_mutations(&page, &[result("Accepted")]).expect("event");
        assert_eq!(event.problem_name, "two-sum");
        assert_eq!(event.submission_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn arm_clears_itself_after_timeout() {
        let mut watcher = watcher();
        let page = page(PROBLEM_URL);
        watcher.handle_click(&[submit_button()]);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!watcher.is_armed());
        assert!(watcher.handle_mutations(&page, &[result("Accepted")]).is_none());
    }

    #[tokio::test]
    async fn reset_forgets_processed_id() {
        let mut watcher = watcher();
        let page = page("https://leetcode.com/problems/two-sum/submissions/555/");
        watcher.handle_click(&[submit_button()]);
        watcher.handle_mutations(&page, &[result("Accepted")]);

        watcher.reset();
        assert_eq!(watcher.last_processed_id(), None);
        watcher.handle_click(&[submit_button()]);
        assert!(watcher.handle_mutations(&page, &[result("Accepted")]).is_some());
    }
}
