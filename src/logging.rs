//! Tracing setup.
//!
//! stdout carries the protocol, so logs go to stderr by default or to a
//! rotated log file when `logging.file` is configured.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;

use crate::config::{expand_tilde, LoggingConfig};

/// Filter used when neither `RUST_LOG` nor `logging.filter` is set.
const DEFAULT_FILTER: &str = "stock_mcp_bridge=info,warn";

/// Rotated log files kept next to the active one.
const KEEP_ROTATED: u32 = 3;

/// Initialize the global tracing subscriber.
///
/// With a log file configured:
/// 1. Rotates existing logs (bridge.log → bridge.log.1 → .2 → .3).
/// 2. Opens a fresh file behind a line-flushing writer.
///
/// Falls back to stderr if the file cannot be opened.
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    let file_writer = config
        .file
        .as_deref()
        .map(|f| PathBuf::from(expand_tilde(f)))
        .and_then(|path| match open_rotated_log(&path) {
            Ok(file) => Some((path, FlushingWriter::new(file))),
            Err(e) => {
                eprintln!("failed to open log file {}: {e}", path.display());
                None
            }
        });

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    // try_init: a second call (tests, embedding) keeps the first subscriber.
    let log_target = match file_writer {
        Some((path, writer)) => {
            let _ = builder.with_writer(writer).try_init();
            path.display().to_string()
        }
        None => {
            let _ = builder.with_writer(std::io::stderr).try_init();
            "stderr".to_string()
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log = %log_target,
        pid = std::process::id(),
        "=== stock-mcp-bridge starting ==="
    );
}

/// Report a fatal error once.
///
/// With a subscriber installed the error goes through tracing and `None` is
/// returned. Before tracing is up (config failures) the caller gets a line to
/// print on stderr instead.
pub fn report_fatal(error: &anyhow::Error) -> Option<String> {
    fatal_line(error, tracing::dispatcher::has_been_set())
}

fn fatal_line(error: &anyhow::Error, subscriber_installed: bool) -> Option<String> {
    if subscriber_installed {
        tracing::error!(error = %format!("{error:#}"), "bridge exited with error");
        None
    } else {
        Some(format!("stock-mcp-bridge: {error:#}"))
    }
}

fn open_rotated_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rotate_log_file(path, KEEP_ROTATED);
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

/// `bridge.log` with generation 2 is `bridge.log.2`.
fn rotated_path(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

/// Shift the bridge log chain one generation: the active log becomes `.1`,
/// `.1` becomes `.2`, and `.{keep}` is dropped. Gaps are skipped.
fn rotate_log_file(base: &Path, keep: u32) {
    let _ = std::fs::remove_file(rotated_path(base, keep));
    for generation in (1..keep).rev() {
        let _ = std::fs::rename(rotated_path(base, generation), rotated_path(base, generation + 1));
    }
    let _ = std::fs::rename(base, rotated_path(base, 1));
}

/// Log sink used when `logging.file` is set.
///
/// stdout belongs to the JSON-RPC stream, so a host that swallows stderr
/// leaves the file as the only record of a session. Every write is flushed
/// so the file is complete even if the host kills the bridge mid-call.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<File>>,
}

impl FlushingWriter {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("bridge log writer lock poisoned"))?;
        op(&mut file)
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| {
            let written = file.write(buf)?;
            file.flush()?;
            Ok(written)
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush())
    }
}

impl<'a> MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
