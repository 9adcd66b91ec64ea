//! Cooperative cancellation (§5): one token shared by a query execution,
//! its streaming pipeline, and the refresh jobs that depend on it.
//! Checked at well-defined suspension points, never preemptively.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PqError;

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// The idiomatic suspension-point check: `token.check()?` at batch/step
    /// boundaries, per §5's suspension-point list.
    pub fn check(&self) -> Result<(), PqError> {
        if self.is_cancelled() {
            Err(PqError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_errors_once_cancelled() {
        let t = CancelToken::new();
        assert!(t.check().is_ok());
        t.cancel();
        assert!(t.check().is_err());
    }

    #[test]
    fn clones_share_the_same_flag() {
        let t = CancelToken::new();
        let clone = t.clone();
        clone.cancel();
        assert!(t.is_cancelled());
    }
}
