use std::collections::HashSet;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::cancel::Cancel;
use crate::error::{Error, Result};
use crate::sync::SyncId;

/// How long a waiter sleeps between acquisition attempts; bounds the
/// latency of observing a cancellation.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Process-wide mutual exclusion per sync id.
///
/// Only one writer may run a state-changing sync operation for a given id
/// at a time. Waiters are woken on release and re-race; fairness is not
/// guaranteed.
#[derive(Debug, Default)]
pub struct IdLocks {
    held: Mutex<HashSet<SyncId>>,
    released: Condvar,
}

/// Holds one id locked; releases and wakes waiters on drop.
#[derive(Debug)]
pub struct IdLockGuard<'a> {
    locks: &'a IdLocks,
    id: SyncId,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the id is free, then take it.
    ///
    /// Fails with [`Error::Canceled`] if the cancellation token fires while
    /// waiting, without acquiring.
    pub fn lock(&self, id: SyncId, cancel: &Cancel) -> Result<IdLockGuard<'_>> {
        let mut held = self.held.lock();
        loop {
            if cancel.is_canceled() {
                return Err(Error::Canceled);
            }
            if held.insert(id) {
                return Ok(IdLockGuard { locks: self, id });
            }
            self.released.wait_for(&mut held, WAIT_SLICE);
        }
    }

    /// Whether the id is currently held.
    pub fn is_locked(&self, id: &SyncId) -> bool {
        self.held.lock().contains(id)
    }
}

impl Drop for IdLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        held.remove(&self.id);
        self.locks.released.notify_all();
    }
}
