//! Request-scoped cancellation and deadlines.
//!
//! # Responsibility
//! - Carry a cancel signal and an optional deadline through repository calls.
//! - Let storage sessions abort an in-flight round trip when the request ends.
//!
//! # Invariants
//! - A derived context is done whenever its parent is done.
//! - The earliest deadline in the chain wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation/deadline scope for one logical request.
///
/// Cheap to clone; clones observe the same cancel signals.
#[derive(Debug, Clone, Default)]
pub struct Context {
    signals: Vec<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

/// Cancels the context it was created with (and every context derived from it).
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.signal.store(true, Ordering::SeqCst);
    }
}

impl Context {
    /// Root context: never cancelled, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a child context plus the handle that cancels it.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let signal = Arc::new(AtomicBool::new(false));
        let mut child = self.clone();
        child.signals.push(Arc::clone(&signal));
        (child, CancelHandle { signal })
    }

    /// Derives a child context that expires at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.clone();
        child.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        child
    }

    /// Derives a child context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is still live.
    ///
    /// Cancellation is reported ahead of an elapsed deadline.
    pub fn err(&self) -> Option<ContextError> {
        if self
            .signals
            .iter()
            .any(|signal| signal.load(Ordering::SeqCst))
        {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Fails fast when the context is already done.
    pub fn check(&self) -> Result<(), ContextError> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether this context can ever become done.
    ///
    /// Sessions skip installing abort hooks for contexts that cannot.
    pub fn can_end(&self) -> bool {
        !self.signals.is_empty() || self.deadline.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{Context, ContextError};
    use std::time::{Duration, Instant};

    #[test]
    fn background_never_ends() {
        let ctx = Context::background();
        assert!(!ctx.can_end());
        assert_eq!(ctx.err(), None);
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_derived_contexts() {
        let (parent, handle) = Context::background().with_cancel();
        let (child, _child_handle) = parent.with_cancel();
        let grandchild = child.with_timeout(Duration::from_secs(60));

        assert!(!grandchild.is_done());
        handle.cancel();
        assert_eq!(parent.err(), Some(ContextError::Cancelled));
        assert_eq!(grandchild.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn child_cancel_does_not_reach_parent() {
        let parent = Context::background();
        let (child, handle) = parent.with_cancel();
        handle.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[test]
    fn elapsed_deadline_reports_deadline_exceeded() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[test]
    fn earliest_deadline_wins() {
        let soon = Instant::now() + Duration::from_secs(1);
        let later = soon + Duration::from_secs(60);
        let ctx = Context::background().with_deadline(soon).with_deadline(later);
        assert_eq!(ctx.deadline(), Some(soon));
    }
}
