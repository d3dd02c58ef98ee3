//! Processing context handed to UDF calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use sfq_common::{Result, SfqError};

/// Per-invocation execution state handed to UDFs by the execution layer.
///
/// UDFs may observe it to abort early; the adapter never retains it past a call.
#[derive(Debug, Default)]
pub struct ProcessingContext {
    /// Free-form label (query or topology name) for log correlation.
    pub label: String,

    /// Optional wall-clock deadline for the current unit of work.
    pub deadline: Option<Instant>,

    cancelled: AtomicBool,
}

/// Shared handle passed to every UDF call.
pub type SharedContext = Arc<ProcessingContext>;

impl ProcessingContext {
    /// Context with a label and no deadline.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deadline: None,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Attach a deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Wrap into the shared handle type.
    pub fn shared(self) -> SharedContext {
        Arc::new(self)
    }

    /// Request cancellation; visible to all holders of the shared handle.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`ProcessingContext::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancelled or past the deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SfqError::Cancelled(format!("context '{}' cancelled", self.label)));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(SfqError::Cancelled(format!(
                    "context '{}' deadline exceeded",
                    self.label
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let ctx = ProcessingContext::new("q1").shared();
        let other = Arc::clone(&ctx);
        assert!(ctx.check().is_ok());
        other.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.check(), Err(SfqError::Cancelled(_))));
    }

    #[test]
    fn elapsed_deadline_fails_check() {
        let past = Instant::now() - Duration::from_millis(1);
        let ctx = ProcessingContext::new("q2").with_deadline(past);
        let err = ctx.check().expect_err("deadline");
        assert!(err.to_string().contains("deadline exceeded"));

        let future = Instant::now() + Duration::from_secs(60);
        assert!(ProcessingContext::new("q3").with_deadline(future).check().is_ok());
    }
}
