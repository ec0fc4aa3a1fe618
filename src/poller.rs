//! State poller for asynchronous remote operations.
//!
//! Create and delete requests only start a state transition on the remote
//! side. [`StatePoller`] repeatedly refreshes the object until it reaches a
//! target state, reaches a failure state, or the deadline passes. Waits back
//! off exponentially from `interval` up to `max_interval`.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace, warn};

use crate::error::{Operation, ReconcileError, Result, TgwError};
use crate::gateway::RemoteObject;

/// Default delay before the first refresh.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);

/// Default interval between refreshes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Default cap on the backed-off interval.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Default overall deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Timing of a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Delay before the first refresh.
    pub delay: Duration,
    /// Initial interval between refreshes.
    pub interval: Duration,
    /// Upper bound for the interval.
    pub max_interval: Duration,
    /// Deadline measured from the start of the wait.
    pub timeout: Duration,
}

/// What a wait is looking for.
#[derive(Debug, Clone, Copy)]
pub struct StateWait<S: 'static> {
    /// States that end the wait successfully.
    pub target: &'static [S],
    /// States that end the wait with an error.
    pub failure: &'static [S],
    /// Whether the object disappearing counts as success.
    pub absent_is_target: bool,
}

/// Waits for a remote object to converge.
#[derive(Debug, Clone, Copy)]
pub struct StatePoller {
    settings: PollSettings,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            interval: DEFAULT_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PollSettings {
    /// Returns a copy with a different deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<S: fmt::Display> StateWait<S> {
    fn expected(&self) -> String {
        let mut names: Vec<String> = self.target.iter().map(ToString::to_string).collect();
        if self.absent_is_target {
            names.push(String::from("absent"));
        }
        names.join(", ")
    }
}

impl StatePoller {
    /// Creates a poller.
    #[must_use]
    pub const fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    /// Returns the poll settings.
    #[must_use]
    pub const fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Waits until `refresh` reports the object in a target state.
    ///
    /// `refresh` returns `Ok(None)` when the object no longer exists. On
    /// success the last observed object is returned, or `None` when absence
    /// was the accepted outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::TerminalState`] when a failure state is
    /// observed, [`ReconcileError::NotFound`] when the object disappears and
    /// absence is not a target, [`ReconcileError::Timeout`] when the deadline
    /// passes, or the first non-retryable refresh error.
    pub async fn wait<T, F, Fut>(
        &self,
        kind: &str,
        id: &str,
        operation: Operation,
        wait: &StateWait<T::State>,
        mut refresh: F,
    ) -> Result<Option<T>>
    where
        T: RemoteObject,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = Instant::now() + self.settings.timeout;
        let mut wait_for = self.settings.interval;
        let mut last_state = String::from("none");

        debug!("Waiting for {kind} ({id}) to reach {}", wait.expected());
        sleep(self.settings.delay.min(self.settings.timeout)).await;

        loop {
            match refresh().await {
                Ok(None) => {
                    if wait.absent_is_target {
                        debug!("{kind} ({id}) is gone");
                        return Ok(None);
                    }
                    return Err(ReconcileError::NotFound {
                        kind: kind.to_string(),
                        id: id.to_string(),
                    }
                    .into());
                }
                Ok(Some(object)) => {
                    let state = object.state();
                    trace!("{kind} ({id}) is {state}");

                    if wait.target.contains(&state) {
                        return Ok(Some(object));
                    }

                    if wait.failure.contains(&state) {
                        return Err(ReconcileError::TerminalState {
                            kind: kind.to_string(),
                            id: id.to_string(),
                            operation,
                            state: state.to_string(),
                            reason: object
                                .status_message()
                                .unwrap_or("no reason reported")
                                .to_string(),
                        }
                        .into());
                    }

                    last_state = state.to_string();
                }
                Err(e) if e.is_retryable() => {
                    warn!("Transient error refreshing {kind} ({id}): {e}");
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timeout(kind, id, operation, wait, last_state));
            }

            sleep(wait_for.min(deadline - now)).await;
            wait_for = (wait_for * 2).min(self.settings.max_interval);
        }
    }
}

fn timeout<S: fmt::Display>(
    kind: &str,
    id: &str,
    operation: Operation,
    wait: &StateWait<S>,
    last_state: String,
) -> TgwError {
    ReconcileError::Timeout {
        kind: kind.to_string(),
        id: id.to_string(),
        operation,
        expected: wait.expected(),
        last_state,
    }
    .into()
}
