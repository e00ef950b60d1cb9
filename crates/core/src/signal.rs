//! The abort signal shared between a driver and whoever can interrupt it.

use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// A resettable cancellation flag.
///
/// A [`CancellationToken`] cannot be un-cancelled, so each run takes the
/// current token with [`AbortSignal::token`] and [`AbortSignal::reset`]
/// swaps in a fresh one before the next run.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    current: Arc<Mutex<CancellationToken>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever the current run is doing.
    pub fn abort(&self) {
        self.lock().cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().is_cancelled()
    }

    /// Clear a previous abort. No-op if the signal was never fired.
    pub fn reset(&self) {
        let mut current = self.lock();
        if current.is_cancelled() {
            *current = CancellationToken::new();
        }
    }

    /// The token the current run should watch.
    pub fn token(&self) -> CancellationToken {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
