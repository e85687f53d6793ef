//! Logging initialization and configuration.
//!
//! Logs go to stderr so stdout stays clean for JSON output, or to a file in
//! the platform log directory when requested.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Initialize logging based on verbosity and destination.
///
/// `RUST_LOG` overrides the built-in filter. Returns the log file path if
/// logging to file.
pub fn init_logging(verbose: bool, to_file: bool) -> Option<PathBuf> {
    let default_filter = if verbose {
        "dex=debug,dex_auth=debug,dex_mcp=debug"
    } else {
        "dex=info,dex_auth=info,dex_mcp=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if !to_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return None;
    }

    let log_dir = get_log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {e}");
        return None;
    }

    let log_file = log_dir.join("dex.log");

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            return None;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(file)
        .init();

    Some(log_file)
}

/// Get the log directory path.
pub fn get_log_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            return home.join("Library/Logs/dex");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(state_dir) = dirs::state_dir() {
            return state_dir.join("dex/logs");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".local/state/dex/logs");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local_app) = dirs::data_local_dir() {
            return local_app.join("dex/logs");
        }
    }

    PathBuf::from(".dex/logs")
}
