//! Page model seen by the watcher and extractor.
//!
//! The host that embeds the core (a browser bridge, a headless driver, a
//! test) reports page state as [`PageElement`] snapshots and exposes the
//! editor runtime through [`EditorProbe`]. Nothing here assumes a concrete
//! DOM implementation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::selector::{AttributeMatch, CompoundSelector, Selector};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageElement {
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<PageElement>,
}

impl PageElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: PageElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Own text followed by descendants' text, like `textContent`.
    pub fn text_content(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.children {
            out.push_str(&child.text_content());
        }
        out
    }

    pub fn matches(&self, selector: &Selector) -> bool {
        selector
            .alternatives()
            .iter()
            .any(|compound| self.matches_compound(compound))
    }

    fn matches_compound(&self, compound: &CompoundSelector) -> bool {
        if let Some(tag) = &compound.tag {
            if !self.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &compound.id {
            if self.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !compound.classes.iter().all(|class| self.has_class(class)) {
            return false;
        }
        compound
            .attributes
            .iter()
            .all(|(name, expected)| match (expected, self.attr(name)) {
                (AttributeMatch::Present, Some(_)) => true,
                (AttributeMatch::Equals(want), Some(have)) => want == have,
                (_, None) => false,
            })
    }

    /// First element in document order, starting with `self`, that matches.
    pub fn find(&self, selector: &Selector) -> Option<&PageElement> {
        if self.matches(selector) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(selector))
    }
}

/// Read access to the live page.
pub trait PageDocument: Send + Sync {
    fn location(&self) -> String;

    fn query(&self, selector: &Selector) -> Option<PageElement>;
}

/// A readable text model of the embedded editor.
pub trait TextBuffer: Send + Sync {
    fn value(&self) -> String;

    fn language_id(&self) -> Option<String> {
        None
    }
}

/// Capability probe over the third-party editor runtime: yields a readable
/// buffer once the runtime has created one, `None` until then.
pub trait EditorProbe: Send + Sync {
    fn readable_buffer(&self) -> Option<Arc<dyn TextBuffer>>;
}

/// A page backed by the latest snapshot the host pushed.
#[derive(Debug, Default)]
pub struct SnapshotPage {
    inner: RwLock<(String, PageElement)>,
}

impl SnapshotPage {
    pub fn new(location: impl Into<String>, root: PageElement) -> Self {
        Self {
            inner: RwLock::new((location.into(), root)),
        }
    }

    pub fn set_location(&self, location: impl Into<String>) {
        if let Ok(mut inner) = self.inner.write() {
            inner.0 = location.into();
        }
    }

    pub fn replace_root(&self, root: PageElement) {
        if let Ok(mut inner) = self.inner.write() {
            inner.1 = root;
        }
    }

    pub fn append(&self, element: PageElement) {
        if let Ok(mut inner) = self.inner.write() {
            inner.1.children.push(element);
        }
    }
}

impl PageDocument for SnapshotPage {
    fn location(&self) -> String {
        self.inner
            .read()
            .map(|inner| inner.0.clone())
            .unwrap_or_default()
    }

    fn query(&self, selector: &Selector) -> Option<PageElement> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.1.find(selector).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct StaticBuffer {
    value: String,
    language_id: Option<String>,
}

impl StaticBuffer {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language_id: None,
        }
    }

    pub fn with_language_id(mut self, language_id: impl Into<String>) -> Self {
        self.language_id = Some(language_id.into());
        self
    }
}

impl TextBuffer for StaticBuffer {
    fn value(&self) -> String {
        self.value.clone()
    }

    fn language_id(&self) -> Option<String> {
        self.language_id.clone()
    }
}

/// Probe whose buffer the host installs once the editor has initialized.
#[derive(Default)]
pub struct EditorSlot {
    buffer: RwLock<Option<Arc<dyn TextBuffer>>>,
}

impl EditorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, buffer: Arc<dyn TextBuffer>) {
        if let Ok(mut slot) = self.buffer.write() {
            *slot = Some(buffer);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.buffer.write() {
            *slot = None;
        }
    }
}

impl EditorProbe for EditorSlot {
    fn readable_buffer(&self) -> Option<Arc<dyn TextBuffer>> {
        self.buffer.read().ok().and_then(|slot| slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_panel() -> PageElement {
        PageElement::new("div")
            .with_attr("class", "flex result")
            .with_child(
                PageElement::new("span")
                    .with_attr("data-e2e-locator", "submission-result")
                    .with_text("Accepted"),
            )
            .with_child(PageElement::new("span").with_text(" 42 ms"))
    }

    #[test]
    fn finds_descendant_by_attribute() {
        let selector = Selector::parse(r#"[data-e2e-locator="submission-result"]"#).unwrap();
        let found = result_panel().find(&selector).cloned();
        assert_eq!(found.map(|el| el.text), Some("Accepted".to_string()));
    }

    #[test]
    fn class_matching_uses_whitespace_split() {
        let panel = result_panel();
        assert!(panel.matches(&Selector::parse("div.result").unwrap()));
        assert!(!panel.matches(&Selector::parse(".res").unwrap()));
        assert!(!panel.matches(&Selector::parse("span.result").unwrap()));
    }

    #[test]
    fn text_content_concatenates_descendants() {
        assert_eq!(result_panel().text_content(), "Accepted 42 ms");
    }

    #[test]
    fn snapshot_page_reflects_appends() {
        let page = SnapshotPage::new("https://leetcode.com/problems/two-sum/", PageElement::new("body"));
        let selector = Selector::parse(".monaco-editor").unwrap();
        assert!(page.query(&selector).is_none());

        page.append(PageElement::new("div").with_attr("class", "monaco-editor"));
        assert!(page.query(&selector).is_some());
    }

    #[test]
    fn editor_slot_yields_buffer_after_install() {
        let slot = EditorSlot::new();
        assert!(slot.readable_buffer().is_none());

        slot.install(Arc::new(StaticBuffer::new("print(1)")));
        assert_eq!(slot.readable_buffer().map(|b| b.value()), Some("print(1)".to_string()));
    }
}
