//! Transcoder process supervision.
//!
//! Launches the transcoder through the platform shell, pumps both output
//! channels into the log sink (and the on-disk log when present), and on
//! exit runs artifact cleanup before publishing the ended event exactly
//! once. Termination requests travel over a `CancellationToken` to the
//! supervising task, which owns the child and delivers the signal.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::cleanup::remove_artifacts;
use crate::events::{EndedSender, SessionEnd};
use crate::log_file::SessionLogFile;
use crate::logger::SessionLogger;
use crate::AppError;

/// Longest run of output forwarded as one record when no newline arrives.
const MAX_CHUNK_BYTES: u64 = 64 * 1024;

/// A live process registered with a session.
#[derive(Debug, Clone)]
struct ProcessHandle {
    pid: Option<u32>,
    cancel: CancellationToken,
}

/// Optional-owned process slot: filled on spawn, cleared on exit.
#[derive(Debug, Clone, Default)]
pub struct ProcessSlot(Arc<Mutex<Option<ProcessHandle>>>);

impl ProcessSlot {
    fn fill(&self, handle: ProcessHandle) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Whether a process is currently registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// OS process id of the registered process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|h| h.pid)
    }

    /// Request graceful termination of the registered process.
    ///
    /// Returns `false` when no process is registered; repeated requests
    /// are absorbed.
    pub fn terminate(&self) -> bool {
        let guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// Shell used to interpret the transcoder command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSupervisor {
    shell: String,
    shell_flag: String,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        if cfg!(windows) {
            Self::with_shell("cmd", "/C")
        } else {
            Self::with_shell("/bin/sh", "-c")
        }
    }
}

/// Everything the supervising task needs once the process is launched.
pub(crate) struct Supervision {
    pub session_id: String,
    pub stream_path: String,
    pub directory: PathBuf,
    pub remove_on_exit: bool,
    pub logger: Arc<dyn SessionLogger>,
    pub log_file: Option<Arc<SessionLogFile>>,
    pub slot: ProcessSlot,
    pub ended: Arc<EndedSender>,
}

#[derive(Debug, Clone, Copy)]
enum OutputChannel {
    Stdout,
    Stderr,
}

impl OutputChannel {
    fn label(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl ProcessSupervisor {
    /// Supervisor that runs `<shell> <flag> "<command line>"`.
    #[must_use]
    pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            shell_flag: flag.into(),
        }
    }

    /// Launch `executable argv…` and supervise it in a background task.
    ///
    /// Never fails synchronously: a launch failure is logged, recorded in
    /// the log file, and reported through the ended event.
    pub(crate) fn start(&self, executable: &str, argv: &[String], ctx: Supervision) {
        let line = command_line(executable, argv);
        ctx.logger.trace(format_args!(
            "[ffmpeg] {} {} {line:?}",
            self.shell, self.shell_flag
        ));

        let span = info_span!(
            "transmux_session",
            session_id = %ctx.session_id,
            stream_path = %ctx.stream_path
        );

        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.shell_flag);
        #[cfg(windows)]
        cmd.raw_arg(&line);
        #[cfg(not(windows))]
        cmd.arg(&line);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so termination reaches pipelines and subshells.
        #[cfg(unix)]
        cmd.process_group(0);

        match cmd.spawn() {
            Ok(child) => {
                let cancel = CancellationToken::new();
                ctx.slot.fill(ProcessHandle {
                    pid: child.id(),
                    cancel: cancel.clone(),
                });
                tokio::spawn(supervise(child, cancel, ctx).instrument(span));
            }
            Err(err) => {
                let failure = AppError::Spawn(format!("{}: {err}", self.shell));
                tokio::spawn(report_spawn_failure(failure, ctx).instrument(span));
            }
        }
    }
}

/// Join the executable and its arguments into one shell command line.
#[must_use]
pub fn command_line(executable: &str, argv: &[String]) -> String {
    let mut line = executable.to_owned();
    for arg in argv {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

async fn supervise(mut child: Child, cancel: CancellationToken, ctx: Supervision) {
    let group = GroupGuard(child.id());
    let pumps: Vec<JoinHandle<()>> = [
        child
            .stdout
            .take()
            .map(|out| spawn_pump(out, OutputChannel::Stdout, &ctx)),
        child
            .stderr
            .take()
            .map(|err| spawn_pump(err, OutputChannel::Stderr, &ctx)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let status = tokio::select! {
        status = child.wait() => status,
        () = cancel.cancelled() => {
            request_termination(&mut child);
            child.wait().await
        }
    };
    group.release();

    // Drain both channels so the log file holds the final output.
    for pump in pumps {
        if let Err(err) = pump.await {
            warn!(%err, "output pump task failed");
        }
    }

    let end = match status {
        Ok(status) => ended_with_status(&ctx, status),
        Err(err) => {
            warn!(%err, "error waiting for transcoder process");
            SessionEnd {
                session_id: ctx.session_id.clone(),
                stream_path: ctx.stream_path.clone(),
                exit_code: None,
                signal: None,
                spawn_error: None,
                reason: format!("wait error: {err}"),
            }
        }
    };
    finish(ctx, end).await;
}

async fn report_spawn_failure(failure: AppError, ctx: Supervision) {
    let description = failure.to_string();
    ctx.logger
        .error(format_args!("[ffmpeg] failed to spawn transcoder: {description}"));
    if let Some(log_file) = &ctx.log_file {
        log_file.write_error(&description);
    }
    let end = SessionEnd {
        session_id: ctx.session_id.clone(),
        stream_path: ctx.stream_path.clone(),
        exit_code: None,
        signal: None,
        reason: format!("spawn failed: {description}"),
        spawn_error: Some(description),
    };
    finish(ctx, end).await;
}

async fn finish(ctx: Supervision, end: SessionEnd) {
    let Supervision {
        stream_path,
        directory,
        remove_on_exit,
        logger,
        log_file,
        slot,
        ended,
        ..
    } = ctx;

    slot.clear();
    drop(log_file);
    logger.info(format_args!("[Transmuxing end] {stream_path}"));

    if remove_on_exit {
        let target = directory.clone();
        match tokio::task::spawn_blocking(move || remove_artifacts(&target)).await {
            Ok(removed) => debug!(removed, directory = %directory.display(), "artifact cleanup finished"),
            Err(err) => warn!(%err, "artifact cleanup task failed"),
        }
    }

    ended.send_replace(Some(end));
}

fn ended_with_status(ctx: &Supervision, status: ExitStatus) -> SessionEnd {
    let exit_code = status.code();
    let signal = exit_signal(status);
    let reason = match (exit_code, signal) {
        (Some(code), _) => format!("process exited with code {code}"),
        (None, Some(sig)) => format!("process terminated by signal {sig}"),
        (None, None) => "process terminated by signal".to_owned(),
    };
    SessionEnd {
        session_id: ctx.session_id.clone(),
        stream_path: ctx.stream_path.clone(),
        exit_code,
        signal,
        spawn_error: None,
        reason,
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Kills the whole process group if supervision is dropped before the
/// shell was reaped.
struct GroupGuard(Option<u32>);

impl GroupGuard {
    fn release(mut self) {
        self.0 = None;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.0 {
            signal_group(pid, nix::sys::signal::Signal::SIGKILL);
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    let group = Pid::from_raw(pid as i32);
    if let Err(err) = killpg(group, signal) {
        debug!(pid, %err, ?signal, "process group signal delivery failed");
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    if let Some(pid) = child.id() {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "termination request failed");
    }
}

fn spawn_pump<R>(reader: R, channel: OutputChannel, ctx: &Supervision) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let logger = Arc::clone(&ctx.logger);
    let log_file = ctx.log_file.clone();
    tokio::spawn(pump(reader, channel, logger, log_file).in_current_span())
}

async fn pump<R>(
    reader: R,
    channel: OutputChannel,
    logger: Arc<dyn SessionLogger>,
    log_file: Option<Arc<SessionLogFile>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        let read = (&mut reader)
            .take(MAX_CHUNK_BYTES)
            .read_until(b'\n', &mut chunk)
            .await;
        match read {
            Ok(0) => break,
            Ok(n) => {
                if let Some(file) = &log_file {
                    file.append(&chunk);
                    logger.trace(format_args!("[ffmpeg] tee {n} bytes from {}", channel.label()));
                }
                let text = String::from_utf8_lossy(&chunk);
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                match channel {
                    OutputChannel::Stdout => logger.info(format_args!("[ffmpeg] {text}")),
                    OutputChannel::Stderr => logger.warn(format_args!("[ffmpeg] {text}")),
                }
            }
            Err(err) => {
                logger.warn(format_args!("[ffmpeg] {} read failed: {err}", channel.label()));
                break;
            }
        }
    }
}
