//! tracing setup: human-readable stderr output plus an optional append-only run log.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// `<directory>/pgsafesync_<environment>_<stamp>.log`
pub fn log_file_path(directory: &Path, environment: &str, stamp: &str) -> PathBuf {
    directory.join(format!("pgsafesync_{environment}_{stamp}.log"))
}

/// Installs the global subscriber. `RUST_LOG` overrides the default level.
pub fn init_logging(log_path: Option<&Path>, verbose: bool) -> io::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,pgsafesync={level}")));

    let stderr_layer = fmt::layer().with_target(false).with_writer(io::stderr);

    let file_layer = match log_path {
        Some(path) => {
            let file = open_append(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)
}

/// Appends a block of text to the run log, outside of any tracing event.
pub fn append_to_log(path: &Path, text: &str) -> io::Result<()> {
    let mut file = open_append(path)?;
    file.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

fn open_append(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
