//! Abort generations.
//!
//! A run captures an [`AbortToken`] for the generation current at its start.
//! Bumping the generation cancels every token handed out before it, which
//! wakes any poll loop sleeping on [`AbortToken::cancelled`] and makes
//! [`AbortToken::is_stale`] true from then on. Cancellation is advisory: the
//! remote work a stale loop was waiting on keeps running server-side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AbortController {
    generation: Arc<AtomicU64>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting from a previously persisted generation.
    pub fn starting_at(generation: u64) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(generation)),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Token bound to the current generation.
    pub fn token(&self) -> AbortToken {
        let guard = match self.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        AbortToken {
            generation: self.generation(),
            current: self.generation.clone(),
            cancel: guard.clone(),
        }
    }

    /// Invalidate every outstanding token. Returns the new generation, which
    /// is always strictly greater than the previous one.
    pub fn bump(&self) -> u64 {
        self.renew().generation()
    }

    /// Bump and hand out a token for the new generation in one step, so two
    /// concurrent callers can never end up sharing a generation.
    pub fn renew(&self) -> AbortToken {
        let mut guard = match self.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        guard.cancel();
        *guard = CancellationToken::new();
        debug!(generation = next, "Abort generation renewed");
        AbortToken {
            generation: next,
            current: self.generation.clone(),
            cancel: guard.clone(),
        }
    }
}

/// A run's view of the abort generation it was started under.
#[derive(Debug, Clone)]
pub struct AbortToken {
    generation: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl AbortToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_stale(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }

    pub fn is_current(&self) -> bool {
        !self.is_stale()
    }

    /// Resolves once a newer generation exists.
    pub async fn cancelled(&self) {
        if self.is_stale() {
            return;
        }
        self.cancel.cancelled().await
    }
}
