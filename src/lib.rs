#![forbid(unsafe_code)]

//! Supervisor for a single live-stream transmuxing process.
//!
//! Builds the transcoder invocation from a [`SessionConfig`], launches and
//! supervises the process, tees its output into an optional on-disk log,
//! removes segment artifacts on exit when asked to, and publishes a single
//! ended event.

pub mod args;
pub mod cleanup;
pub mod config;
pub mod errors;
pub mod events;
pub mod log_file;
pub mod logger;
pub mod paths;
pub mod session;
pub mod supervisor;

pub use config::SessionConfig;
pub use errors::{AppError, Result};
pub use events::{EndedReceiver, SessionEnd};
pub use session::Session;
