pub mod capability;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod node;
pub mod protocol;

use std::path::{Path, PathBuf};

use config::{LogConfig, LogFormat};

pub use node::{DistributedNode, NodeError};

/// Name of the log file inside the data directory.
pub const LOG_FILE_NAME: &str = "node.log";

/// Return the platform-standard data directory for the node.
///
/// - macOS: `~/Library/Application Support/vcp-node/`
/// - Linux: `$XDG_DATA_HOME/vcp-node/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.vcp-node/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("vcp-node");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vcp-node")
}

/// Default tracing filter. `RUST_LOG` wins when set.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "vcp_node=debug,info"
    } else {
        "vcp_node=info,warn"
    }
}

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr unless `log.file` is set, in which case:
/// 1. Existing logs are rotated (node.log → node.log.1 → …, keeps `log.keep`).
/// 2. A fresh log file is opened behind a line-flushing writer.
///
/// Returns the log file path when file logging is active.
pub fn init_tracing(log: &LogConfig, debug: bool) -> std::io::Result<Option<PathBuf>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let (writer, log_path, ansi) = if log.file {
        let log_path = match &log.path {
            Some(path) => PathBuf::from(config::expand_tilde(path)),
            None => data_dir().join(LOG_FILE_NAME),
        };
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        rotate_log_file(&log_path, log.keep);

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        (
            BoxMakeWriter::new(FlushingWriter::new(log_file)),
            Some(log_path),
            false,
        )
    } else {
        (BoxMakeWriter::new(std::io::stderr), None, true)
    };

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(false);

    let installed = match log.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| std::io::Error::other(format!("tracing init failed: {e}")))?;

    Ok(log_path)
}

/// Rotate log files: `node.log` → `node.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are
/// skipped. With `keep == 0` the current file is simply removed.
pub fn rotate_log_file(base_path: &Path, keep: u32) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    // Shift: .{n-1} → .{n}
    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// Each log line is on disk immediately, so a crashed or killed node
/// still leaves a complete log behind.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
