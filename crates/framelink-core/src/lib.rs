pub mod config;
pub mod errors;
pub mod types;

pub use config::GrabConfig;
pub use errors::{CaptureError, FrameError};
pub use types::*;
