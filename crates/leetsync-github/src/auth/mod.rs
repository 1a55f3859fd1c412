//! GitHub authentication
//!
//! Device Code Flow:
//! 1. Get device code from github.com/login/device/code
//! 2. User authorizes at github.com/login/device
//! 3. Poll for access token
//! 4. Store the token as the credential
//! 5. Validate it against /user when asked

pub mod device_code;
pub mod device_flow;
pub mod session;

pub use device_code::{
    request_access_token, request_device_code, AccessTokenResponse, DeviceCodeResponse, TokenPoll,
};
pub use device_flow::{DeviceFlowManager, FlowState, PollHandle};
pub use session::SessionQuery;
