//! Caller-initiated cancellation.
//!
//! An [`AbortController`] hands out [`AbortSignal`]s. Attaching a signal to a
//! call with [`RequestOptions::abort_signal`] lets the caller end the whole
//! call, including any pending backoff wait, with an `ABORTED` error.
//!
//! [`RequestOptions::abort_signal`]: crate::RequestOptions::abort_signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    notify: Notify,
}

/// Triggers cancellation for every signal it handed out.
///
/// # Examples
///
/// ```
/// use courier::AbortController;
///
/// let controller = AbortController::new();
/// let signal = controller.signal();
/// assert!(!signal.is_aborted());
///
/// controller.abort();
/// assert!(signal.is_aborted());
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    /// Creates a controller whose signal has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a signal tied to this controller.
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Aborts. Calling this more than once has no further effect.
    pub fn abort(&self) {
        self.signal.state.aborted.store(true, Ordering::SeqCst);
        self.signal.state.notify.notify_waiters();
    }
}

/// Observes an [`AbortController`].
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    /// Returns `true` once the controller has aborted.
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::SeqCst)
    }

    /// Completes once the controller aborts, or immediately if it already has.
    pub async fn aborted(&self) {
        loop {
            // Register before checking the flag so an abort in between is not missed.
            let notified = self.state.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}
