//! Completion notification published when a session's process ends.

use tokio::sync::watch;

/// Outcome of a terminated session.
///
/// A non-zero `exit_code` or a `signal` is a runtime failure; policy is left
/// to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    /// Session identifier.
    pub session_id: String,
    /// Stream path the session transmuxed.
    pub stream_path: String,
    /// Process exit code, when it exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal number, when it was signaled.
    pub signal: Option<i32>,
    /// Launch failure description, when the process never started.
    pub spawn_error: Option<String>,
    /// Human-readable summary.
    pub reason: String,
}

impl SessionEnd {
    /// Whether the process started and exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.spawn_error.is_none() && self.exit_code == Some(0)
    }
}

/// Publishing half of the ended event.
pub(crate) type EndedSender = watch::Sender<Option<SessionEnd>>;

/// Subscription to a session's ended event.
///
/// Every subscriber, including one created after the event fired, observes
/// the same single [`SessionEnd`].
#[derive(Debug, Clone)]
pub struct EndedReceiver(watch::Receiver<Option<SessionEnd>>);

impl EndedReceiver {
    pub(crate) fn new(rx: watch::Receiver<Option<SessionEnd>>) -> Self {
        Self(rx)
    }

    /// The outcome if the event has already fired.
    #[must_use]
    pub fn peek(&self) -> Option<SessionEnd> {
        self.0.borrow().clone()
    }

    /// Wait for the event.
    ///
    /// Returns `None` if the session was dropped without ever ending.
    pub async fn wait(&mut self) -> Option<SessionEnd> {
        match self.0.wait_for(Option::is_some).await {
            Ok(end) => (*end).clone(),
            Err(_) => None,
        }
    }
}
