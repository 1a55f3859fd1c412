pub mod auth;
pub mod http;
pub mod publisher;
pub mod repos;

pub use auth::{DeviceFlowManager, FlowState, PollHandle, SessionQuery};
pub use http::GitHubHttp;
pub use publisher::{destination_path, language_extension, CommitPublisher};
pub use repos::RepoClient;
