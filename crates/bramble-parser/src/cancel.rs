use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ParserError;

/// Cooperative cancellation flag shared between a request and everything it spawns.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns [`ParserError::Cancelled`] once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), ParserError> {
        if self.is_cancelled() {
            Err(ParserError::Cancelled)
        } else {
            Ok(())
        }
    }
}
