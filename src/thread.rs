//! GVL transfer and interpreter threads.
//!
//! Interpreter code runs only on a thread holding the GVL. A body run
//! through [`call_without_gvl`] gives the lock up and must not touch
//! interpreter values until it takes it back with [`call_with_gvl`].

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::thread::ThreadId;

use log::{debug, warn};

use crate::dispatch::Registry;
use crate::error::{BridgeError, history};
use crate::guest::thread::{self as gvl, GuestThread, GvlError, Unblock};
use crate::protect;
use crate::vm;

/// How a body in a blocking region is woken by [`interrupt`].
pub enum Unblocker {
    /// Mark the thread interrupted and unpark it until it leaves the region.
    Io,
    /// Run a host function on the interrupting thread. It runs with the
    /// thread table locked and must not call back into this module.
    Custom(Box<dyn Fn() + Send + Sync>),
}

struct Region<F, R> {
    body: Option<F>,
    result: Option<std::thread::Result<R>>,
}

extern "C" fn run_region<F: FnOnce() -> R, R>(data: *mut c_void) -> *mut c_void {
    // SAFETY: `data` is the `Region` owned by the caller of the guest region
    // function, which waits for this call to return.
    let region = unsafe { &mut *data.cast::<Region<F, R>>() };
    if let Some(body) = region.body.take() {
        region.result = Some(panic::catch_unwind(AssertUnwindSafe(body)));
    }
    ptr::null_mut()
}

extern "C" fn run_unblocker(data: *mut c_void) {
    // SAFETY: `data` points at the unblocker owned by the blocking region
    // that is still running; the guest calls this with the thread table
    // locked, so the region cannot end meanwhile.
    let unblocker = unsafe { &*data.cast::<Box<dyn Fn() + Send + Sync>>() };
    if panic::catch_unwind(AssertUnwindSafe(|| unblocker())).is_err() {
        warn!("unblocking function panicked");
    }
}

fn gvl_error(error: GvlError) -> BridgeError {
    history::recorded(BridgeError::Gvl(error.to_string()))
}

fn finish<R>(region: Region<impl FnOnce() -> R, R>) -> Result<R, BridgeError> {
    match region.result {
        Some(Ok(value)) => Ok(value),
        Some(Err(payload)) => panic::resume_unwind(payload),
        None => Err(BridgeError::Gvl("blocking region did not run its body".to_string())),
    }
}

/// Runs `body` without the GVL, interruptible through the default
/// unblocker.
pub fn call_without_gvl<F, R>(body: F) -> Result<R, BridgeError>
where
    F: FnOnce() -> R,
{
    call_without_gvl_unblocking(Unblocker::Io, body)
}

/// Runs `body` without the GVL. A panic in `body` resumes on the caller.
pub fn call_without_gvl_unblocking<F, R>(unblocker: Unblocker, body: F) -> Result<R, BridgeError>
where
    F: FnOnce() -> R,
{
    protect::guard()?;
    let mut region = Region {
        body: Some(body),
        result: None,
    };
    let custom = match unblocker {
        Unblocker::Io => None,
        Unblocker::Custom(func) => Some(func),
    };
    let unblock = match &custom {
        None => Unblock::Io,
        Some(func) => Unblock::Custom(
            run_unblocker,
            ptr::from_ref::<Box<dyn Fn() + Send + Sync>>(func).cast_mut().cast(),
        ),
    };
    let data = ptr::from_mut(&mut region).cast::<c_void>();
    gvl::call_without_gvl(run_region::<F, R>, data, unblock).map_err(gvl_error)?;
    drop(custom);
    finish(region)
}

/// Runs `body` holding the GVL. Inside a blocking region this takes the lock
/// back for the duration of `body`; on a thread already holding it, `body`
/// just runs.
pub fn call_with_gvl<F, R>(body: F) -> Result<R, BridgeError>
where
    F: FnOnce() -> R,
{
    if !vm::is_ready() {
        return Err(BridgeError::Setup("interpreter is not running".to_string()));
    }
    let mut region = Region {
        body: Some(body),
        result: None,
    };
    let data = ptr::from_mut(&mut region).cast::<c_void>();
    gvl::call_with_gvl(run_region::<F, R>, data).map_err(gvl_error)?;
    finish(region)
}

/// Whether the current thread was interrupted inside its blocking region.
pub fn is_interrupted() -> bool {
    gvl::current_interrupted()
}

/// Identifies an interpreter thread for [`interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadToken(ThreadId);

pub fn current() -> ThreadToken {
    ThreadToken(std::thread::current().id())
}

/// Interrupts the thread behind `token`. Returns `false` if it is not an
/// interpreter thread (any more).
pub fn interrupt(token: ThreadToken) -> bool {
    gvl::thread_interrupt(token.0)
}

/// A thread started by [`spawn`].
pub struct RbThread {
    inner: GuestThread,
}

impl RbThread {
    pub fn token(&self) -> ThreadToken {
        ThreadToken(self.inner.id())
    }

    /// Waits for the thread without holding the GVL.
    pub fn join(self) -> Result<(), BridgeError> {
        self.inner.join().map_err(|payload| {
            let message = crate::dispatch::panic_message(payload.as_ref());
            history::recorded(BridgeError::HostPanic(message))
        })
    }
}

/// Starts `body` on a new interpreter thread, which runs it holding the GVL.
pub fn spawn<F>(body: F) -> Result<RbThread, BridgeError>
where
    F: FnOnce() + Send + 'static,
{
    protect::guard()?;
    Registry::register_block_trampolines();
    let inner = gvl::thread_create(Box::new(body)).map_err(gvl_error)?;
    debug!("spawned interpreter thread {:?}", inner.id());
    Ok(RbThread { inner })
}
