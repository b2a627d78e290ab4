//! Cooperative cancellation
//!
//! The walk has no suspension points of its own; callers that need to bound
//! latency hand the authorizer a token and trip it from another thread. The
//! walker polls between sibling nodes and unwinds with
//! [`AuthzError::Cancelled`](super::AuthzError::Cancelled).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::{AuthzError, AuthzResult};

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observed at the walker's next poll point
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> AuthzResult<()> {
        if self.is_cancelled() {
            Err(AuthzError::Cancelled)
        } else {
            Ok(())
        }
    }
}
