//! Blocking wait for a stack to reach a terminal status.
//!
//! The loop polls the control plane on a fixed cadence until the stack is
//! terminal, the optional timeout expires, or the [`CancelToken`] fires.
//! Time is read through a [`Clock`] so tests can run on virtual time.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::ControlPlane;
use crate::error::{Error, Result};
use crate::status::StackStatus;
use crate::types::WaitConfig;

/// Granularity at which a sleeping wait notices cancellation.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Shared flag that stops an in-flight wait.
///
/// Cancelling never touches the remote stack; it only stops polling.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag, e.g. one set from a signal handler.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Source of time for the wait loop.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    /// Create a clock at offset zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total virtual time slept so far.
    pub fn elapsed(&self) -> Duration {
        match self.offset.lock() {
            Ok(offset) => *offset,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        match self.offset.lock() {
            Ok(mut offset) => *offset += duration,
            Err(poisoned) => *poisoned.into_inner() += duration,
        }
    }
}

/// How a wait ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult {
    /// The stack reached a terminal status
    Terminal(StackStatus),
    /// The wait was cancelled; carries the last status seen, if any
    Cancelled(Option<StackStatus>),
}

/// Poll `stack_name` until it reaches a terminal status.
///
/// `on_poll` sees every status returned by the control plane. Poll errors
/// propagate immediately unless cancellation was requested meanwhile. Exceeding `config.timeout` is a
/// [`Error::WaitTimeout`].
pub fn wait_for_terminal(
    plane: &dyn ControlPlane,
    stack_name: &str,
    config: &WaitConfig,
    clock: &dyn Clock,
    cancel: &CancelToken,
    on_poll: &mut dyn FnMut(&StackStatus),
) -> Result<WaitResult> {
    let start = clock.now();
    let mut last: Option<StackStatus> = None;

    loop {
        if cancel.is_cancelled() {
            log::info!("Stopped waiting for {stack_name}; remote operation continues");
            return Ok(WaitResult::Cancelled(last));
        }

        let status = match plane.poll_status(stack_name) {
            Ok(status) => status,
            // An interrupt can kill the in-flight poll along with us.
            Err(e) if cancel.is_cancelled() => {
                log::debug!("Poll for {stack_name} failed after interrupt: {e}");
                return Ok(WaitResult::Cancelled(last));
            }
            Err(e) => return Err(e),
        };
        log::debug!("{stack_name}: {status}");
        on_poll(&status);

        if status.is_terminal() {
            return Ok(WaitResult::Terminal(status));
        }

        let waited = clock.now().saturating_duration_since(start);
        let mut pause = config.poll_interval;
        if let Some(timeout) = config.timeout {
            if waited >= timeout {
                return Err(Error::WaitTimeout {
                    stack: stack_name.to_string(),
                    waited,
                    last_status: status.to_string(),
                });
            }
            pause = pause.min(timeout - waited);
        }
        last = Some(status);

        sleep_unless_cancelled(clock, pause, cancel);
    }
}

fn sleep_unless_cancelled(clock: &dyn Clock, duration: Duration, cancel: &CancelToken) {
    let mut remaining = duration;
    while !remaining.is_zero() && !cancel.is_cancelled() {
        let slice = remaining.min(CANCEL_CHECK_INTERVAL);
        clock.sleep(slice);
        remaining -= slice;
    }
}
