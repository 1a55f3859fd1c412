pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod paths;
pub mod retry;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{PageConfig, SyncConfig};
pub use error::{ErrorKind, Result, SyncError};
pub use model::{
    CommitResult, DeviceCodeInfo, DeviceFlowSession, ExtractedSolution, Identity, RepoSummary,
    RepositoryTarget, SubmissionEvent,
};
pub use retry::{poll_until, Attempt, RetryError, RetryPolicy};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreChange, SyncState};
