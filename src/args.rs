//! Transcoder command-line construction.
//!
//! Tokens are emitted in a fixed order: global flags, caller input flags,
//! the input clause, caller output flags, then one output clause per
//! enabled rendition in `mp4`, `hls`, `dash` order.

use std::path::Path;

use crate::config::{SessionConfig, TargetKind};
use crate::logger::SessionLogger;
use crate::paths::{evaluate, output_file};

/// Connection timeout, in seconds, passed after the input URL.
pub const INPUT_TIMEOUT_SECS: u32 = 30;

/// One rendition the invocation will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedOutput {
    /// Rendition kind.
    pub kind: TargetKind,
    /// Extra muxer flags.
    pub flags: Vec<String>,
    /// Absolute output filename.
    pub filename: String,
}

/// Builds the argument list for one session.
#[derive(Debug, Clone, Copy)]
pub struct ArgumentBuilder<'a> {
    config: &'a SessionConfig,
    directory: &'a Path,
}

impl<'a> ArgumentBuilder<'a> {
    /// Builder for `config` writing into `directory`.
    #[must_use]
    pub fn new(config: &'a SessionConfig, directory: &'a Path) -> Self {
        Self { config, directory }
    }

    /// Enabled renditions in emission order.
    ///
    /// A target that is absent or disabled contributes nothing.
    #[must_use]
    pub fn outputs(&self) -> Vec<PlannedOutput> {
        TargetKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let target = self.config.target(kind).filter(|t| t.enabled)?;
                let name = evaluate(target.filename.as_ref(), self.config, kind.default_filename());
                Some(PlannedOutput {
                    kind,
                    flags: target.flags.as_slice().to_vec(),
                    filename: output_file(self.directory, &name),
                })
            })
            .collect()
    }

    /// Full argument list, announcing each rendition on `logger`.
    #[must_use]
    pub fn build(&self, logger: &dyn SessionLogger) -> Vec<String> {
        let config = self.config;

        let mut args = vec![
            "-threads".to_string(),
            config.threads.to_string(),
            "-loglevel".to_string(),
            config.loglevel().to_string(),
            "-nostdin".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-y".to_string(),
            "-analyzeduration".to_string(),
            config.analyze_duration().to_string(),
        ];

        if let Some(flags) = &config.input_flags {
            args.extend(flags.as_slice().iter().cloned());
        }

        args.extend(vec![
            "-i".to_string(),
            config.input_url(),
            "-timeout".to_string(),
            INPUT_TIMEOUT_SECS.to_string(),
            "-c:v".to_string(),
            config.video_codec().to_string(),
            "-c:a".to_string(),
            config.audio_codec().to_string(),
        ]);

        if let Some(flags) = &config.output_flags {
            args.extend(flags.as_slice().iter().cloned());
        }

        for output in self.outputs() {
            // Optional selectors: a source without audio or video still maps.
            args.extend(vec![
                "-map".to_string(),
                "0:a?".to_string(),
                "-map".to_string(),
                "0:v?".to_string(),
            ]);
            args.extend(output.flags);
            args.extend(vec![
                "-f".to_string(),
                output.kind.format_name().to_string(),
                output.filename.clone(),
            ]);

            logger.info(format_args!(
                "[Transmuxing {}] {} to {}",
                output.kind.label(),
                config.stream_path,
                output.filename
            ));
        }

        args
    }
}
