//! Structured logging for crew.
//!
//! Log levels:
//! - ERROR: Failures that end the session
//! - WARN: Task failures and other recoverable conditions
//! - INFO: Task lifecycle events (spawn, launch, completion)
//! - DEBUG: Scheduler passes and tool calls
//! - TRACE: Very detailed traces
//!
//! Debug mode can be enabled with `--debug` flag or `CREW_DEBUG=1` env var.
//! `RUST_LOG` overrides the level filter.

use std::fs::File;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::CrewConfig;

/// Initialize logging to ~/.crew/crew.log with explicit debug mode setting.
///
/// Falls back to stderr when the log file cannot be created. Calling this
/// more than once is a no-op.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || debug_from_env(std::env::var("CREW_DEBUG").ok().as_deref());
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_enabled)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match open_log_file() {
        Some(file) => {
            let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
        }
    }
}

fn debug_from_env(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

/// Create (truncating) the log file.
fn open_log_file() -> Option<File> {
    let path = CrewConfig::log_path().ok()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    File::create(path).ok()
}
