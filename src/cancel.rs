use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// Cooperative cancellation flag shared between an operation and its caller.
///
/// Long-running operations poll the token before every step (each traversal
/// iteration, each commit filtered or expanded, each lock wait slice) and
/// unwind with [`Error::Canceled`] once it fires. The core never spawns
/// background tasks; cancellation is purely poll-based.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. All clones of this token observe it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fail with [`Error::Canceled`] if the token has fired.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_canceled() {
            Err(Error::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_passes_checkpoint() {
        let c = Cancel::new();
        assert!(!c.is_canceled());
        assert!(c.checkpoint().is_ok());
    }

    #[test]
    fn canceled_token_fails_checkpoint_on_all_clones() {
        let c = Cancel::new();
        let clone = c.clone();
        c.cancel();
        assert!(matches!(clone.checkpoint(), Err(Error::Canceled)));
    }
}
