use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SynthesisError;

/// Per-call cancellation flag. Clones observe the same flag, so the caller
/// keeps one handle and passes another into the call.
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

    /// Handle sharing this token's flag.
    pub fn child(&self) -> Self {
        self.clone()
    }

    /// Cooperative checkpoint: yields to the runtime, then fails with
    /// [`SynthesisError::Canceled`] if cancellation was requested.
    pub async fn checkpoint(&self) -> Result<(), SynthesisError> {
        tokio::task::yield_now().await;
        if self.is_cancelled() {
            Err(SynthesisError::Canceled)
        } else {
            Ok(())
        }
    }
}
