/// Cancellation Module
///
/// Propagates cancellation and statement timeouts down to the engine.
/// Both end the running engine call with an interrupt, which the facade
/// reports as `Interrupted` or `TimedOut`.
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rusqlite::Connection;

/// Engine VM steps between deadline checks.
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

/// A canceller that can be used to interrupt the operation running on a
/// connection from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    interrupt_handle: Arc<rusqlite::InterruptHandle>,
}

impl CancelHandle {
    pub(crate) fn new(interrupt_handle: rusqlite::InterruptHandle) -> Self {
        CancelHandle {
            interrupt_handle: Arc::new(interrupt_handle),
        }
    }

    /// Interrupts whatever the connection is currently running.
    ///
    /// Has no effect when the connection is idle or already closed.
    pub fn cancel(&self) {
        self.interrupt_handle.interrupt();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct ActiveDeadline {
    timeout: Duration,
    fired: Arc<AtomicBool>,
}

/// Per-connection record of the deadline currently installed.
#[derive(Default)]
pub(crate) struct DeadlineState {
    active: RefCell<Option<ActiveDeadline>>,
}

/// Installs a deadline on the connection for the lifetime of the guard.
///
/// The engine's progress callback aborts the running statement once the
/// deadline has passed. A guard created while another one is alive joins
/// the outer deadline instead of replacing it; only the outermost guard
/// removes the callback on drop.
pub(crate) struct DeadlineGuard<'c> {
    conn: &'c Connection,
    state: &'c DeadlineState,
    current: ActiveDeadline,
    owner: bool,
}

impl<'c> DeadlineGuard<'c> {
    pub(crate) fn install(conn: &'c Connection, state: &'c DeadlineState, timeout: Duration) -> Self {
        if let Some(outer) = state.active.borrow().clone() {
            return DeadlineGuard {
                conn,
                state,
                current: outer,
                owner: false,
            };
        }

        let deadline = Instant::now() + timeout;
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        conn.progress_handler(
            PROGRESS_INTERVAL_OPS,
            Some(move || {
                if Instant::now() >= deadline {
                    flag.store(true, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            }),
        );

        let current = ActiveDeadline { timeout, fired };
        *state.active.borrow_mut() = Some(current.clone());
        DeadlineGuard {
            conn,
            state,
            current,
            owner: true,
        }
    }

    /// The timeout in force, if its deadline aborted an engine call.
    pub(crate) fn fired_timeout(&self) -> Option<Duration> {
        self.current
            .fired
            .load(Ordering::SeqCst)
            .then_some(self.current.timeout)
    }
}

impl Drop for DeadlineGuard<'_> {
    fn drop(&mut self) {
        if self.owner {
            self.conn.progress_handler(0, None::<fn() -> bool>);
            self.state.active.borrow_mut().take();
        }
    }
}
