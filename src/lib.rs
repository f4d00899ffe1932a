#![allow(clippy::manual_unwrap_or_default)]
#![allow(clippy::manual_unwrap_or)]

pub mod backend;
pub mod config;
pub mod constants;
pub mod db;
pub mod extract;
pub mod format;
pub mod health;
pub mod logging;
pub mod prompt;
pub mod redaction;
pub mod server;
pub mod state;
pub mod str_utils;
pub mod types;

pub use types::*;

pub use config::{Args, Capabilities};
pub use state::AppState;
