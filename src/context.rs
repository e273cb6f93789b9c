//! Cancellation and deadlines layered over blocking native calls.
//!
//! The native client cannot be interrupted once a call has started, so a
//! [`Context`] is only consulted before a call is issued and after it returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why an operation was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum CancelReason {
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Externally supplied cancellation signal with an optional deadline.
///
/// Clones share the same cancellation flag, so any clone may cancel the
/// operations observing the others.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// A fresh context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    /// A fresh context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Returns a context sharing this one's cancellation flag whose deadline is
    /// the earlier of the current deadline and `deadline`.
    pub fn capped(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline: Some(deadline),
        }
    }

    /// Fires the cancellation signal.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this context is done, if it is.
    pub fn err(&self) -> Option<CancelReason> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Returns true once the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_done() {
        let ctx = Context::background();
        assert!(ctx.err().is_none());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let ctx = Context::background();
        let clone = ctx.clone();
        clone.cancel();
        assert_eq!(ctx.err(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn test_expired_deadline() {
        let ctx = Context::with_timeout(Duration::ZERO);
        assert_eq!(ctx.err(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn test_cancel_wins_over_deadline() {
        let ctx = Context::with_timeout(Duration::ZERO);
        ctx.cancel();
        assert_eq!(ctx.err(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn test_capped_keeps_earliest_deadline() {
        let now = Instant::now();
        let early = now + Duration::from_secs(1);
        let late = now + Duration::from_secs(60);

        let ctx = Context::with_deadline(early);
        assert_eq!(ctx.capped(late).deadline(), Some(early));

        let ctx = Context::with_deadline(late);
        assert_eq!(ctx.capped(early).deadline(), Some(early));

        assert_eq!(Context::background().capped(late).deadline(), Some(late));
    }

    #[test]
    fn test_capped_shares_cancellation() {
        let ctx = Context::background();
        let capped = ctx.capped(Instant::now() + Duration::from_secs(60));
        ctx.cancel();
        assert!(capped.is_done());
    }
}
