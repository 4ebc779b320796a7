//! FeedbackBuffer - token feedback collected by workers, drained by ingress.
//!
//! A single `parking_lot::Mutex<Vec<_>>`. The lock is held for one append,
//! one swap, or one serialization pass in `drain_with`, never across `.await`.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{ServiceId, TokenFeedback};

/// Process-wide feedback buffer. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct FeedbackBuffer {
    entries: Arc<Mutex<Vec<TokenFeedback>>>,
}

impl FeedbackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: TokenFeedback) {
        self.entries.lock().push(entry);
    }

    pub fn token_invalid(&self, service: ServiceId, token: impl Into<String>) {
        self.record(TokenFeedback::invalid(service, token));
    }

    pub fn token_replaced(
        &self,
        service: ServiceId,
        token: impl Into<String>,
        replacement: impl Into<String>,
    ) {
        self.record(TokenFeedback::replaced(service, token, replacement));
    }

    /// Take everything recorded so far, leaving an empty buffer behind.
    pub fn drain(&self) -> Vec<TokenFeedback> {
        mem::take(&mut *self.entries.lock())
    }

    /// Run `f` over the current entries and clear the buffer only if it succeeds.
    ///
    /// On `Err` the entries stay for the next drain.
    pub fn drain_with<T, E>(
        &self,
        f: impl FnOnce(&[TokenFeedback]) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut entries = self.entries.lock();
        let out = f(&entries)?;
        entries.clear();
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
