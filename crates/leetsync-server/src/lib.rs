pub mod handlers;
pub mod logging;
pub mod orchestrator;
pub mod server;
pub mod state;

pub use orchestrator::{Command, Orchestrator};
pub use server::{app_config, run_server};
pub use state::AppState;
