//! Session configuration parsing, normalization, and validation.
//!
//! Loose inputs are normalized at this boundary: flag fields become
//! [`Flags`] token sequences and dynamic fields become [`DynamicValue`]s,
//! so the rest of the crate never inspects raw shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::paths::{parse_flags, FlagSource};
use crate::{AppError, Result};

/// Default listening port of the local ingest server.
pub const DEFAULT_PORT: u16 = 1935;
/// Default transcoder log verbosity.
pub const DEFAULT_LOGLEVEL: &str = "error";
/// Default input analyze duration in microseconds.
pub const DEFAULT_ANALYZE_DURATION: u64 = 1_000_000;
/// Default media root used when no directory rule is configured.
pub const DEFAULT_MEDIAROOT: &str = "./media";

/// Signature of a computed configuration value.
pub type ComputeFn = dyn Fn(&SessionConfig) -> String + Send + Sync;

/// A configuration value that is either a constant or derived from the
/// full configuration at evaluation time.
#[derive(Clone)]
pub enum DynamicValue {
    /// Constant string used verbatim.
    Literal(String),
    /// Function of the session configuration.
    Computed(Arc<ComputeFn>),
}

impl DynamicValue {
    /// Construct a literal value.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Construct a computed value from a closure.
    #[must_use]
    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn(&SessionConfig) -> String + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(compute))
    }
}

impl fmt::Debug for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl Serialize for DynamicValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Literal(value) => serializer.serialize_str(value),
            Self::Computed(_) => serializer.serialize_str("[computed]"),
        }
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::Literal)
    }
}

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        Self::Literal(value)
    }
}

/// Normalized, ordered token sequence for a flags field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FlagSource", into = "Vec<String>")]
pub struct Flags(Vec<String>);

impl Flags {
    /// Borrow the tokens.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Whether the sequence holds no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<FlagSource> for Flags {
    fn from(source: FlagSource) -> Self {
        Self(parse_flags(Some(&source)))
    }
}

impl From<&str> for Flags {
    fn from(line: &str) -> Self {
        Self::from(FlagSource::Line(line.to_owned()))
    }
}

impl From<Vec<String>> for Flags {
    fn from(tokens: Vec<String>) -> Self {
        Self(tokens)
    }
}

impl From<Flags> for Vec<String> {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

/// The three renditions a session can produce, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Flat MP4 container.
    Mp4,
    /// HLS playlist and segments.
    Hls,
    /// DASH manifest and segments.
    Dash,
}

impl TargetKind {
    /// Fixed emission order for output clauses.
    pub const ALL: [Self; 3] = [Self::Mp4, Self::Hls, Self::Dash];

    /// Muxer name passed after `-f`.
    #[must_use]
    pub fn format_name(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Hls => "hls",
            Self::Dash => "dash",
        }
    }

    /// Filename used when the target does not configure one.
    #[must_use]
    pub fn default_filename(self) -> &'static str {
        match self {
            Self::Mp4 => "index.mp4",
            Self::Hls => "index.m3u8",
            Self::Dash => "index.mpd",
        }
    }

    /// Upper-case label used in transmuxing notices.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Mp4 => "MP4",
            Self::Hls => "HLS",
            Self::Dash => "DASH",
        }
    }
}

/// One requested rendition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OutputTarget {
    /// Whether the target contributes to the invocation.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Extra muxer flags placed before `-f`.
    #[serde(default)]
    pub flags: Flags,
    /// Output filename rule, relative to the session directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<DynamicValue>,
}

impl Default for OutputTarget {
    fn default() -> Self {
        Self {
            enabled: true,
            flags: Flags::default(),
            filename: None,
        }
    }
}

impl OutputTarget {
    /// A present but disabled target.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the extra muxer flags.
    #[must_use]
    pub fn with_flags(mut self, flags: impl Into<Flags>) -> Self {
        self.flags = flags.into();
        self
    }

    /// Set the filename rule.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<DynamicValue>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_mediaroot() -> String {
    DEFAULT_MEDIAROOT.into()
}

/// Accept a target only when its value is a table; anything else is
/// ignored so it contributes nothing to the invocation.
fn lenient_target<'de, D>(deserializer: D) -> std::result::Result<Option<OutputTarget>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    if raw.is_object() {
        serde_json::from_value(raw).map(Some).map_err(D::Error::custom)
    } else {
        warn!(value = %raw, "ignoring output target that is not a table");
        Ok(None)
    }
}

/// Configuration for one transcoding session, parsed from `session.toml`
/// or built programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Ingest application name.
    pub app: String,
    /// Stream name within the application.
    pub stream: String,
    /// Full stream path on the ingest server; defaults to `/{app}/{stream}`.
    #[serde(default)]
    pub stream_path: String,
    /// Ingest server listening port on the loopback interface.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Transcoder executable (interpreted by the shell).
    pub ffmpeg: String,
    /// Transcoder thread count; 0 keeps the transcoder default.
    #[serde(default)]
    pub threads: u32,
    /// Transcoder log verbosity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<String>,
    /// Input analyze duration in microseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzeduration: Option<u64>,
    /// Video codec override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vc: Option<String>,
    /// Audio codec override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ac: Option<String>,
    /// Publish query arguments supplied by the ingest client.
    #[serde(default)]
    pub args: BTreeMap<String, serde_json::Value>,
    /// Raw flags inserted before the input clause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_flags: Option<Flags>,
    /// Raw flags inserted after the input clause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_flags: Option<Flags>,
    /// MP4 rendition.
    #[serde(default, deserialize_with = "lenient_target")]
    pub mp4: Option<OutputTarget>,
    /// HLS rendition.
    #[serde(default, deserialize_with = "lenient_target")]
    pub hls: Option<OutputTarget>,
    /// DASH rendition.
    #[serde(default, deserialize_with = "lenient_target")]
    pub dash: Option<OutputTarget>,
    /// Output directory rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<DynamicValue>,
    /// Media root used when no directory rule is configured.
    #[serde(default = "default_mediaroot")]
    pub mediaroot: String,
    /// On-disk log file rule; no file is written when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<DynamicValue>,
    /// Delete segment and manifest artifacts once the process ends.
    #[serde(default)]
    pub remove_on_exit: bool,
}

impl SessionConfig {
    /// Construct a configuration for `app`/`stream` with every optional
    /// field at its default and `ffmpeg` as the executable.
    #[must_use]
    pub fn new(app: impl Into<String>, stream: impl Into<String>) -> Self {
        let app = app.into();
        let stream = stream.into();
        Self {
            stream_path: format!("/{app}/{stream}"),
            app,
            stream,
            port: DEFAULT_PORT,
            ffmpeg: "ffmpeg".into(),
            threads: 0,
            loglevel: None,
            analyzeduration: None,
            vc: None,
            ac: None,
            args: BTreeMap::new(),
            input_flags: None,
            output_flags: None,
            mp4: None,
            hls: None,
            dash: None,
            directory: None,
            mediaroot: DEFAULT_MEDIAROOT.into(),
            log_file: None,
            remove_on_exit: false,
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string, fill derived defaults, and
    /// validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        if config.stream_path.is_empty() {
            config.stream_path = format!("/{}/{}", config.app, config.stream);
        }
        config.validate()?;
        Ok(config)
    }

    /// Check required fields.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.ffmpeg.trim().is_empty() {
            return Err(AppError::Config("ffmpeg must not be empty".into()));
        }
        if self.app.is_empty() {
            return Err(AppError::Config("app must not be empty".into()));
        }
        if self.stream.is_empty() {
            return Err(AppError::Config("stream must not be empty".into()));
        }
        if !self.stream_path.starts_with('/') {
            return Err(AppError::Config(format!(
                "stream_path must begin with '/': {:?}",
                self.stream_path
            )));
        }
        if self.port == 0 {
            return Err(AppError::Config("port must be greater than zero".into()));
        }
        Ok(())
    }

    /// Set the transcoder executable.
    #[must_use]
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// Set the configuration for one rendition.
    #[must_use]
    pub fn with_target(mut self, kind: TargetKind, target: OutputTarget) -> Self {
        *self.target_slot(kind) = Some(target);
        self
    }

    /// Set the output directory rule.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<DynamicValue>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Set the on-disk log file rule.
    #[must_use]
    pub fn with_log_file(mut self, log_file: impl Into<DynamicValue>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    /// Enable or disable artifact removal on exit.
    #[must_use]
    pub fn with_remove_on_exit(mut self, remove: bool) -> Self {
        self.remove_on_exit = remove;
        self
    }

    /// The configured value for one rendition, if any.
    #[must_use]
    pub fn target(&self, kind: TargetKind) -> Option<&OutputTarget> {
        match kind {
            TargetKind::Mp4 => self.mp4.as_ref(),
            TargetKind::Hls => self.hls.as_ref(),
            TargetKind::Dash => self.dash.as_ref(),
        }
    }

    fn target_slot(&mut self, kind: TargetKind) -> &mut Option<OutputTarget> {
        match kind {
            TargetKind::Mp4 => &mut self.mp4,
            TargetKind::Hls => &mut self.hls,
            TargetKind::Dash => &mut self.dash,
        }
    }

    /// Source URL on the loopback ingest server.
    #[must_use]
    pub fn input_url(&self) -> String {
        format!("rtmp://127.0.0.1:{}{}", self.port, self.stream_path)
    }

    /// Effective log verbosity.
    #[must_use]
    pub fn loglevel(&self) -> &str {
        non_empty(self.loglevel.as_deref()).unwrap_or(DEFAULT_LOGLEVEL)
    }

    /// Effective analyze duration in microseconds.
    #[must_use]
    pub fn analyze_duration(&self) -> u64 {
        self.analyzeduration
            .filter(|value| *value != 0)
            .unwrap_or(DEFAULT_ANALYZE_DURATION)
    }

    /// Effective video codec; stream copy unless overridden.
    #[must_use]
    pub fn video_codec(&self) -> &str {
        non_empty(self.vc.as_deref()).unwrap_or("copy")
    }

    /// Effective audio codec.
    ///
    /// A publish argument `ac` equal to 10 forces stream copy regardless of
    /// the `ac` override. This mirrors long-standing ingest behavior where
    /// the audio channel count field doubles as a copy switch.
    #[must_use]
    pub fn audio_codec(&self) -> &str {
        if self.forces_audio_copy() {
            return "copy";
        }
        non_empty(self.ac.as_deref()).unwrap_or("aac")
    }

    /// Whether the publish arguments carry the `ac == 10` copy switch.
    #[must_use]
    pub fn forces_audio_copy(&self) -> bool {
        let value = match self.args.get("ac") {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.is_some_and(|v| (v - 10.0).abs() < f64::EPSILON)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
