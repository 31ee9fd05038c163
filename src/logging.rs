//! Persistent log output
//!
//! The console subscriber is set up by the binary. For unattended runs the
//! same events can also be appended to a file, without ANSI colors.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Open `path` for appending, creating it and its parent directory if needed
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Formatting layer writing to `file`, as JSON lines when `json` is set
pub fn file_layer<S>(file: File, json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}
