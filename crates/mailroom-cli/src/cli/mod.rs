pub mod commands;
pub mod config;
pub mod credentials;
pub mod secure_storage;
pub mod tracing_setup;

pub use commands::{execute, open_core, print_json, run_watch, CliCommand, ListFilter};
pub use config::CliConfig;
