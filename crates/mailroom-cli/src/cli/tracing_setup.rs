use std::fs::OpenOptions;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter directives for stderr output, e.g. `mailroom_core=debug`.
pub const LOG_ENV: &str = "MAILROOM_LOG";
/// When set, debug-level logs are also appended to this file.
pub const LOG_FILE_ENV: &str = "MAILROOM_LOG_FILE";

/// Logs go to stderr so stdout stays machine-readable JSON.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    let file = std::env::var(LOG_FILE_ENV).ok().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: failed to open log file {}: {}", path, e);
                None
            }
        }
    });

    if let Some(file) = file {
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG);
        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}
