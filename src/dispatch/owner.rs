//! Host state pinned to the thread that registered it.
//!
//! Several interpreter threads take turns holding the GVL, but host closures
//! and payloads are not `Send`. Each one is wrapped in an [`Owned`] that
//! only hands it out on its owner thread. Drops that happen elsewhere (the
//! collector frees objects on whichever thread runs it) are queued and run
//! by the owner the next time it passes [`crate::protect::guard`].

use std::mem::{self, ManuallyDrop};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use log::{trace, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::BridgeError;

use super::outcome::panic_message;

pub(crate) struct Owned<T: 'static> {
    owner: ThreadId,
    value: ManuallyDrop<T>,
}

// SAFETY: the value is only reached through `get`, `get_mut` and
// `into_inner`, which refuse every thread but the owner, and `Drop` hands it
// back to the owner before dropping it. Other threads only see `owner`.
unsafe impl<T: 'static> Send for Owned<T> {}
unsafe impl<T: 'static> Sync for Owned<T> {}

impl<T: 'static> Owned<T> {
    /// Pins `value` to the calling thread.
    pub(crate) fn new(value: T) -> Self {
        Self {
            owner: thread::current().id(),
            value: ManuallyDrop::new(value),
        }
    }

    pub(crate) fn owner(&self) -> ThreadId {
        self.owner
    }

    pub(crate) fn is_local(&self) -> bool {
        self.owner == thread::current().id()
    }

    pub(crate) fn get(&self) -> Result<&T, BridgeError> {
        self.check()?;
        Ok(&self.value)
    }

    pub(crate) fn get_mut(&mut self) -> Result<&mut T, BridgeError> {
        self.check()?;
        Ok(&mut self.value)
    }

    /// The value, on the owner thread. Elsewhere it is dropped through the
    /// owner's queue and `None` comes back.
    pub(crate) fn into_inner(self) -> Option<T> {
        if !self.is_local() {
            return None;
        }
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the value is taken exactly once.
        Some(unsafe { ManuallyDrop::take(&mut this.value) })
    }

    fn check(&self) -> Result<(), BridgeError> {
        if self.is_local() {
            Ok(())
        } else {
            Err(BridgeError::Gvl(format!(
                "host callback belongs to thread {:?}, called from {:?}",
                self.owner,
                thread::current().id()
            )))
        }
    }
}

impl<T: 'static> Drop for Owned<T> {
    fn drop(&mut self) {
        // SAFETY: `value` is not touched again after this.
        let value = unsafe { ManuallyDrop::take(&mut self.value) };
        if self.is_local() {
            drop(value);
        } else {
            defer(self.owner, Box::new(move || drop(value)));
        }
    }
}

struct Deferred {
    owner: ThreadId,
    job: Box<dyn FnOnce()>,
}

// SAFETY: a job is only run or dropped by `run_deferred` on its owner
// thread; other threads just move the box around.
unsafe impl Send for Deferred {}

static DEFERRED: Lazy<Mutex<Vec<Deferred>>> = Lazy::new(|| Mutex::new(Vec::new()));
static PENDING: AtomicUsize = AtomicUsize::new(0);

/// Queues `job` for `owner`. Jobs of a thread that never comes back are
/// leaked.
pub(crate) fn defer(owner: ThreadId, job: Box<dyn FnOnce()>) {
    trace!("deferring host drop to thread {:?}", owner);
    DEFERRED.lock().push(Deferred { owner, job });
    PENDING.fetch_add(1, Ordering::Release);
}

/// Runs the jobs queued for the calling thread.
pub(crate) fn run_deferred() {
    if PENDING.load(Ordering::Acquire) == 0 {
        return;
    }
    let me = thread::current().id();
    let mine: Vec<Deferred> = {
        let mut queue = DEFERRED.lock();
        let (mine, rest) = mem::take(&mut *queue).into_iter().partition(|d| d.owner == me);
        *queue = rest;
        mine
    };
    if mine.is_empty() {
        return;
    }
    PENDING.fetch_sub(mine.len(), Ordering::Release);
    for deferred in mine {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(deferred.job)) {
            warn!("deferred host drop panicked: {}", panic_message(payload.as_ref()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    struct Flag(Rc<Cell<bool>>);

    impl Drop for Flag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn foreign_threads_are_refused_and_drops_come_home() {
        let dropped = Rc::new(Cell::new(false));
        let owned = Owned::new(Flag(Rc::clone(&dropped)));
        assert!(owned.get().is_ok());

        let refused = thread::scope(|scope| {
            scope
                .spawn(|| matches!(owned.get(), Err(BridgeError::Gvl(_))))
                .join()
                .unwrap()
        });
        assert!(refused);

        thread::scope(|scope| {
            scope.spawn(move || drop(owned));
        });
        assert!(!dropped.get());
        run_deferred();
        assert!(dropped.get());
    }

    #[test]
    fn into_inner_only_on_the_owner() {
        let owned = Owned::new(5_u32);
        assert_eq!(owned.into_inner(), Some(5));
        let owned = Owned::new(String::from("away"));
        let taken = thread::scope(|scope| scope.spawn(move || owned.into_inner().is_none()).join().unwrap());
        assert!(taken);
        run_deferred();
    }
}
