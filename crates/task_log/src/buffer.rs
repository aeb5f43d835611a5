//! Append buffer with ownership-transfer flush
//!
//! Producers push under a short-lived lock; a flush takes the whole vector
//! and leaves a fresh empty one behind. Aggregation and shipment never run
//! under the lock.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe record buffer
pub struct AppendBuffer<T> {
    records: Mutex<Vec<T>>,
}

impl<T> AppendBuffer<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    // The guarded data is a plain vector, so a panicking holder cannot leave
    // it half-updated
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one record
    #[inline]
    pub fn append(&self, record: T) {
        self.lock().push(record);
    }

    /// Detach everything appended so far
    ///
    /// Returns `None` when the buffer is empty. Records appended after the
    /// swap belong to the next flush.
    pub fn flush_swap(&self) -> Option<Vec<T>> {
        let mut records = self.lock();
        if records.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut *records))
    }

    /// Number of pending records (diagnostic snapshot)
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<T> Default for AppendBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AppendBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppendBuffer")
            .field("len", &self.len())
            .finish()
    }
}
