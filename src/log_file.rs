//! Append-mode on-disk session log.
//!
//! Opened before the transcoder starts so none of its output is lost. The
//! header records the host, the resolved settings, and the exact invocation;
//! afterwards both raw output channels are appended as they arrive.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use chrono::{SecondsFormat, Utc};
use tracing::warn;

use crate::config::SessionConfig;
use crate::{AppError, Result};

/// Mutex-guarded append-mode log file shared by the output pumps.
pub struct SessionLogFile {
    path: PathBuf,
    writer: Mutex<BufWriter<fs::File>>,
}

impl SessionLogFile {
    /// Open `path` for appending, creating it when missing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| AppError::Io(format!("failed to open log file {}: {e}", path.display())))?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the start banner, settings dump, and invocation record.
    pub fn write_header(&self, config: &SessionConfig, argv: &[String]) {
        self.write_line(&format!(
            "[{}] Starting transcoding session on {} for {}",
            timestamp(),
            hostname(),
            config.stream
        ));

        let settings = serde_json::to_string_pretty(config)
            .unwrap_or_else(|e| format!("<unserializable settings: {e}>"));
        self.write_line(&format!("[{}] Settings\n{settings}", timestamp()));

        self.write_line(&format!(
            "[{}] {} {}",
            timestamp(),
            config.ffmpeg,
            argv.join(" ")
        ));
    }

    /// Record a spawn failure.
    pub fn write_error(&self, description: &str) {
        self.write_line(&format!("[{}][ERROR]{description}", timestamp()));
    }

    /// Append raw process output verbatim.
    pub fn append(&self, bytes: &[u8]) {
        self.write_bytes(bytes);
    }

    fn write_line(&self, line: &str) {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write_bytes(&buf);
    }

    fn write_bytes(&self, bytes: &[u8]) {
        let Ok(mut writer) = self.writer.lock() else {
            warn!(path = %self.path.display(), "session log mutex poisoned");
            return;
        };
        if let Err(e) = writer.write_all(bytes) {
            warn!(path = %self.path.display(), "failed to write session log: {e}");
            return;
        }
        if let Err(e) = writer.flush() {
            warn!(path = %self.path.display(), "failed to flush session log: {e}");
        }
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(unix)]
fn hostname() -> String {
    nix::unistd::gethostname().map_or_else(
        |_| "unknown-host".to_owned(),
        |name| name.to_string_lossy().into_owned(),
    )
}

#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var("COMPUTERNAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown-host".to_owned())
}
