pub mod cli;
pub mod config;
pub mod error;
pub mod server;

pub use log::{debug, error, info, trace, warn};
