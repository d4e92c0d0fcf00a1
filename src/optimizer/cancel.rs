//! Cooperative cancellation and deadlines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, SemOptError};

/// A cancellation token shared between a caller and running optimizers.
///
/// Clones share the same flag. Optimizers call [`check`](Self::check) at the
/// top of every outer iteration.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Create a token that is cancelled only explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that also expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Create a token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fail with `SemOptError::Cancelled` if cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SemOptError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Check an optional token.
pub(crate) fn check(cancellation: &Option<Cancellation>) -> Result<()> {
    match cancellation {
        Some(token) => token.check(),
        None => Ok(()),
    }
}
