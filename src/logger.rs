//! Leveled log sink consumed by a session.
//!
//! Provides the [`SessionLogger`] trait and [`TracingLogger`], the default
//! implementation that forwards every record to `tracing`.

use std::fmt::Arguments;

/// Severity of a session log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Transcoder-internal diagnostics.
    Trace,
    /// Normal activity.
    Info,
    /// Transcoder stderr output and recoverable problems.
    Warn,
    /// Failures.
    Error,
}

/// Receives leveled records from a session.
///
/// Implementations must be [`Send`] and [`Sync`]: records arrive from the
/// supervising task and both output pumps concurrently.
pub trait SessionLogger: Send + Sync {
    /// Record one formatted message.
    fn log(&self, level: LogLevel, args: Arguments<'_>);

    /// Record at [`LogLevel::Info`].
    fn info(&self, args: Arguments<'_>) {
        self.log(LogLevel::Info, args);
    }

    /// Record at [`LogLevel::Warn`].
    fn warn(&self, args: Arguments<'_>) {
        self.log(LogLevel::Warn, args);
    }

    /// Record at [`LogLevel::Error`].
    fn error(&self, args: Arguments<'_>) {
        self.log(LogLevel::Error, args);
    }

    /// Record at [`LogLevel::Trace`].
    fn trace(&self, args: Arguments<'_>) {
        self.log(LogLevel::Trace, args);
    }
}

/// Forwards session records to the active `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl SessionLogger for TracingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        match level {
            LogLevel::Trace => tracing::trace!("{args}"),
            LogLevel::Info => tracing::info!("{args}"),
            LogLevel::Warn => tracing::warn!("{args}"),
            LogLevel::Error => tracing::error!("{args}"),
        }
    }
}
