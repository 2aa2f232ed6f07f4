//! Shared fixtures for session integration tests.

use std::fmt::Arguments;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use live_transmux::config::{DynamicValue, SessionConfig};
use live_transmux::logger::{LogLevel, SessionLogger};
use live_transmux::{EndedReceiver, SessionEnd};

/// Upper bound for any single session in these tests.
pub const END_TIMEOUT: Duration = Duration::from_secs(10);

/// Log sink that keeps every record for later assertions.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().unwrap().clone()
    }

    pub fn contains(&self, level: LogLevel, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(l, msg)| *l == level && msg.contains(needle))
    }
}

impl SessionLogger for RecordingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        self.records.lock().unwrap().push((level, args.to_string()));
    }
}

/// Config whose output directory is exactly `directory`.
pub fn config_in(directory: &Path, ffmpeg: &str) -> SessionConfig {
    let dir = directory.to_string_lossy().into_owned();
    SessionConfig::new("live", "s1")
        .with_ffmpeg(ffmpeg)
        .with_directory(DynamicValue::computed(move |_| dir.clone()))
}

/// Wait for the ended event, failing the test on timeout.
pub async fn wait_ended(rx: &mut EndedReceiver) -> SessionEnd {
    tokio::time::timeout(END_TIMEOUT, rx.wait())
        .await
        .expect("session did not end in time")
        .expect("session dropped without ending")
}
