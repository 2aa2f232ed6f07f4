//! One supervised transcoding session.
//!
//! A [`Session`] is created from a validated [`SessionConfig`], started
//! once with [`Session::run`], and may be stopped at any time with
//! [`Session::end`]. Completion is observed through [`Session::subscribe`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::args::ArgumentBuilder;
use crate::config::SessionConfig;
use crate::events::{EndedReceiver, EndedSender};
use crate::log_file::SessionLogFile;
use crate::logger::{SessionLogger, TracingLogger};
use crate::paths::{evaluate_opt, resolve_directory};
use crate::supervisor::{ProcessSlot, ProcessSupervisor, Supervision};
use crate::{AppError, Result};

/// A single transcoding task and the resources it owns.
pub struct Session {
    id: String,
    config: Arc<SessionConfig>,
    logger: Arc<dyn SessionLogger>,
    supervisor: ProcessSupervisor,
    directory: PathBuf,
    arguments: Option<Vec<String>>,
    process: ProcessSlot,
    ended: Arc<EndedSender>,
}

impl Session {
    /// Create a session that logs through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration fails validation.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_logger(config, Arc::new(TracingLogger))
    }

    /// Create a session that logs through `logger`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration fails validation.
    pub fn with_logger(config: SessionConfig, logger: Arc<dyn SessionLogger>) -> Result<Self> {
        config.validate()?;
        let directory = resolve_directory(&config);
        let (ended, _) = watch::channel(None);
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            config: Arc::new(config),
            logger,
            supervisor: ProcessSupervisor::default(),
            directory,
            arguments: None,
            process: ProcessSlot::default(),
            ended: Arc::new(ended),
        })
    }

    /// Replace the shell launcher.
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: ProcessSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Unique session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The configuration this session was created from.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolved output directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Argument list, available once [`Session::run`] succeeded.
    #[must_use]
    pub fn arguments(&self) -> Option<&[String]> {
        self.arguments.as_deref()
    }

    /// Whether a transcoder process is currently registered.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.process.is_active()
    }

    /// OS process id of the running transcoder.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Subscribe to the ended event.
    #[must_use]
    pub fn subscribe(&self) -> EndedReceiver {
        EndedReceiver::new(self.ended.subscribe())
    }

    /// Build the invocation, prepare the output directory and log file,
    /// and launch the transcoder.
    ///
    /// Returns as soon as the process is launched. A launch failure is not
    /// returned here; it is logged and delivered through the ended event.
    ///
    /// # Errors
    ///
    /// - `AppError::State` if the session was already started or no tokio
    ///   runtime is available.
    /// - `AppError::Io` if the output directory or log file cannot be created.
    pub fn run(&mut self) -> Result<()> {
        if self.arguments.is_some() {
            return Err(AppError::State(format!("session {} already started", self.id)));
        }
        tokio::runtime::Handle::try_current()
            .map_err(|err| AppError::State(format!("run requires a tokio runtime: {err}")))?;

        let config = Arc::clone(&self.config);
        let argv = ArgumentBuilder::new(&config, &self.directory).build(self.logger.as_ref());

        fs::create_dir_all(&self.directory).map_err(|err| {
            AppError::Io(format!(
                "failed to create output directory {}: {err}",
                self.directory.display()
            ))
        })?;

        self.logger
            .info(format_args!("[ffmpeg] {} {}", config.ffmpeg, argv.join(" ")));

        let log_file = match evaluate_opt(config.log_file.as_ref(), &config) {
            Some(path) => {
                self.logger
                    .info(format_args!("[ffmpeg] Writing log to {path}"));
                let file = SessionLogFile::open(path)?;
                file.write_header(&config, &argv);
                Some(Arc::new(file))
            }
            None => None,
        };

        self.supervisor.start(
            &config.ffmpeg,
            &argv,
            Supervision {
                session_id: self.id.clone(),
                stream_path: config.stream_path.clone(),
                directory: self.directory.clone(),
                remove_on_exit: config.remove_on_exit,
                logger: Arc::clone(&self.logger),
                log_file,
                slot: self.process.clone(),
                ended: Arc::clone(&self.ended),
            },
        );
        info!(session_id = %self.id, directory = %self.directory.display(), "transmux session started");

        self.arguments = Some(argv);
        Ok(())
    }

    /// Request graceful termination of the transcoder.
    ///
    /// Safe at any time: before `run`, while running, and after the
    /// process has exited. Does not wait for the process to exit; the ended
    /// event is the completion signal.
    pub fn end(&self) {
        if !self.process.terminate() {
            debug!(session_id = %self.id, "end requested with no running process");
        }
    }
}
