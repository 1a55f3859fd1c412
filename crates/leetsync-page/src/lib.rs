pub mod dom;
pub mod extractor;
pub mod pipeline;
pub mod selector;
pub mod watcher;

pub use dom::{
    EditorProbe, EditorSlot, PageDocument, PageElement, SnapshotPage, StaticBuffer, TextBuffer,
};
pub use extractor::{normalize_language, CodeExtractor};
pub use pipeline::{PageSignal, SolutionSink, SubmissionPipeline};
pub use selector::{Selector, SelectorError};
pub use watcher::SubmissionWatcher;
