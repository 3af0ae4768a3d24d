//! The global VM lock and interpreter threads.
//!
//! At most one registered thread owns the GVL. A thread gives it up only
//! inside a blocking region, where an unblocking function may be used to
//! wake it from another thread.

use std::any::Any;
use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, Thread, ThreadId};

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use super::state;

pub type BlockingFn = extern "C" fn(*mut c_void) -> *mut c_void;
pub type UnblockFn = extern "C" fn(*mut c_void);

/// How a thread parked in a blocking region is woken.
#[derive(Clone, Copy, Debug)]
pub enum Unblock {
    /// Mark the thread interrupted and unpark it, repeating at every GVL
    /// hand-off until it leaves the region.
    Io,
    Custom(UnblockFn, *mut c_void),
}

struct ThreadRecord {
    handle: Thread,
    interrupted: bool,
    unblock: Option<Unblock>,
}

#[derive(Default)]
struct Gvl {
    owner: Option<ThreadId>,
    threads: HashMap<ThreadId, ThreadRecord>,
}

impl Gvl {
    /// Re-wakes interrupted threads that are still inside a blocking region.
    fn rewake_pending(&self) {
        for record in self.threads.values() {
            if record.interrupted && matches!(record.unblock, Some(Unblock::Io)) {
                record.handle.unpark();
            }
        }
    }
}

// SAFETY: custom unblocker contexts are opaque pointers handed back to the
// function that registered them; the table never dereferences them.
unsafe impl Send for Gvl {}

static GVL: Lazy<(Mutex<Gvl>, Condvar)> = Lazy::new(|| (Mutex::new(Gvl::default()), Condvar::new()));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GvlError {
    UnknownThread,
    NotHeld,
    Spawn(String),
}

impl std::fmt::Display for GvlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GvlError::UnknownThread => write!(f, "thread is not known to the interpreter"),
            GvlError::NotHeld => write!(f, "calling thread does not hold the GVL"),
            GvlError::Spawn(reason) => write!(f, "failed to spawn interpreter thread: {}", reason),
        }
    }
}

fn register(handle: Thread) {
    let (lock, _) = &*GVL;
    lock.lock().threads.insert(
        handle.id(),
        ThreadRecord {
            handle,
            interrupted: false,
            unblock: None,
        },
    );
}

pub(crate) fn register_main_thread() {
    register(thread::current());
}

pub fn is_known_thread() -> bool {
    let (lock, _) = &*GVL;
    lock.lock().threads.contains_key(&thread::current().id())
}

pub fn holds_gvl() -> bool {
    let (lock, _) = &*GVL;
    lock.lock().owner == Some(thread::current().id())
}

pub(crate) fn gvl_acquire() {
    let me = thread::current().id();
    let (lock, cvar) = &*GVL;
    let mut gvl = lock.lock();
    while gvl.owner.is_some() && gvl.owner != Some(me) {
        cvar.wait(&mut gvl);
    }
    gvl.owner = Some(me);
    gvl.rewake_pending();
}

pub(crate) fn gvl_release() {
    let me = thread::current().id();
    let (lock, cvar) = &*GVL;
    let mut gvl = lock.lock();
    if gvl.owner == Some(me) {
        gvl.owner = None;
        gvl.rewake_pending();
        cvar.notify_all();
    }
}

fn set_unblock(unblock: Option<Unblock>) -> Option<Unblock> {
    let (lock, _) = &*GVL;
    let mut gvl = lock.lock();
    match gvl.threads.get_mut(&thread::current().id()) {
        Some(record) => std::mem::replace(&mut record.unblock, unblock),
        None => None,
    }
}

/// Runs `func(data)` with the GVL released.
///
/// `func` must not touch the interpreter. A pending interrupt stays visible
/// through [`current_interrupted`] for the whole region and is cleared when
/// the region ends.
pub fn call_without_gvl(
    func: BlockingFn,
    data: *mut c_void,
    unblock: Unblock,
) -> Result<*mut c_void, GvlError> {
    if !holds_gvl() {
        return Err(GvlError::NotHeld);
    }
    set_unblock(Some(unblock));
    gvl_release();
    let result = func(data);
    gvl_acquire();
    set_unblock(None);
    let (lock, _) = &*GVL;
    if let Some(record) = lock.lock().threads.get_mut(&thread::current().id()) {
        record.interrupted = false;
    }
    Ok(result)
}

/// Runs `func(data)` holding the GVL. Runs it directly if the calling
/// thread already holds the lock.
pub fn call_with_gvl(func: BlockingFn, data: *mut c_void) -> Result<*mut c_void, GvlError> {
    if !is_known_thread() {
        return Err(GvlError::UnknownThread);
    }
    if holds_gvl() {
        return Ok(func(data));
    }
    let parked = set_unblock(None);
    gvl_acquire();
    let result = func(data);
    gvl_release();
    set_unblock(parked);
    Ok(result)
}

/// Interrupts the thread `id`, running its unblocking function when it is
/// inside a blocking region. Returns `false` for unknown threads.
///
/// A custom unblocking function runs with the thread table locked, so the
/// region it belongs to cannot end underneath it. It must not call back
/// into this module.
pub fn thread_interrupt(id: ThreadId) -> bool {
    let (lock, _) = &*GVL;
    let mut gvl = lock.lock();
    let Some(record) = gvl.threads.get_mut(&id) else {
        return false;
    };
    record.interrupted = true;
    match record.unblock {
        Some(Unblock::Io) => record.handle.unpark(),
        Some(Unblock::Custom(func, data)) => func(data),
        None => {}
    }
    true
}

pub fn current_interrupted() -> bool {
    let (lock, _) = &*GVL;
    lock.lock()
        .threads
        .get(&thread::current().id())
        .is_some_and(|r| r.interrupted)
}

type ThreadResult = Result<(), Box<dyn Any + Send>>;

/// A thread created by the interpreter.
pub struct GuestThread {
    id: ThreadId,
    handle: JoinHandle<ThreadResult>,
}

impl GuestThread {
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Waits for the thread, giving up the GVL meanwhile. A panic in the
    /// thread body is returned as the error payload.
    pub fn join(self) -> ThreadResult {
        let held = holds_gvl();
        if held {
            gvl_release();
        }
        let joined = self.handle.join();
        if held {
            gvl_acquire();
        }
        joined.and_then(|result| result)
    }
}

/// Starts `body` on a new interpreter thread, which runs it holding the GVL.
pub fn thread_create(body: Box<dyn FnOnce() + Send>) -> Result<GuestThread, GvlError> {
    if !holds_gvl() {
        return Err(GvlError::NotHeld);
    }
    let (ready_tx, ready_rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("rbgate-guest".to_string())
        .spawn(move || -> ThreadResult {
            if ready_rx.recv().is_err() {
                return Ok(());
            }
            gvl_acquire();
            let result = panic::catch_unwind(AssertUnwindSafe(body));
            state::drop_thread_stack();
            {
                let (lock, _) = &*GVL;
                lock.lock().threads.remove(&thread::current().id());
            }
            gvl_release();
            result
        })
        .map_err(|e| GvlError::Spawn(e.to_string()))?;
    let id = handle.thread().id();
    register(handle.thread().clone());
    // The child only waits on this channel, so the send cannot fail while
    // it is alive.
    let _ = ready_tx.send(());
    Ok(GuestThread { id, handle })
}

/// Number of registered interpreter threads.
pub fn thread_count() -> usize {
    let (lock, _) = &*GVL;
    lock.lock().threads.len()
}
