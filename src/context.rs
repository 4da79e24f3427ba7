use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Deadline and cancellation shared by every stage of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// True once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// True once less than `margin` remains before the deadline.
    pub fn soft_deadline_reached(&self, margin: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.deadline {
            Some(d) => Instant::now() + margin >= d,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_never_expires() {
        let ctx = RequestContext::new();
        assert!(!ctx.is_done());
        assert!(!ctx.soft_deadline_reached(Duration::from_secs(3600)));
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = RequestContext::new();
        let clone = ctx.clone();
        ctx.cancel();
        assert!(clone.is_done());
        assert!(clone.soft_deadline_reached(Duration::ZERO));
    }

    #[test]
    fn test_elapsed_deadline_is_done() {
        let ctx = RequestContext::new().with_deadline(Instant::now());
        assert!(ctx.is_done());
    }

    #[test]
    fn test_soft_deadline_uses_margin() {
        let ctx = RequestContext::with_timeout(Duration::from_secs(1));
        assert!(!ctx.is_done());
        assert!(ctx.soft_deadline_reached(Duration::from_secs(5)));
    }
}
