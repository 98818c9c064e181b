//! Caller-side cancellation and deadline context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cloneable cancellation flag. Every clone observes the same state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancellation signal plus an optional caller deadline for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now. A timeout too large to represent leaves the
    /// context without a caller deadline.
    pub fn timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.deadline(deadline),
            None => self,
        }
    }

    /// Earliest of the caller deadline and `now + configured`. `None` only when
    /// neither bound is representable.
    pub fn effective_deadline(&self, now: Instant, configured: Duration) -> Option<Instant> {
        match (self.deadline, now.checked_add(configured)) {
            (Some(deadline), Some(bounded)) => Some(deadline.min(bounded)),
            (deadline, bounded) => deadline.or(bounded),
        }
    }
}
