use std::any::Any;
use std::ffi::{CStr, c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use log::warn;

use super::outcome::panic_message;
use super::owner::{self, Owned};
use super::{BindingHooks, tables};

/// What a bound object points at: the host value, pinned to the thread that
/// built it.
pub(crate) type BoundPayload = Owned<Box<dyn Any>>;

fn hooks_for(class_name: *const c_char) -> Option<(String, BindingHooks)> {
    if class_name.is_null() {
        return None;
    }
    // SAFETY: the helper layer passes the NUL-terminated class name it
    // stored when the class was bound.
    let name = unsafe { CStr::from_ptr(class_name) }.to_string_lossy().into_owned();
    let hooks = tables().bindings.get(&name).cloned();
    hooks.map(|hooks| (name, hooks))
}

/// Returns a leaked `Box<BoundPayload>`, or null when no hooks are
/// registered, they belong to another thread or the allocator panicked.
pub(super) extern "C" fn allocate_trampoline(class_name: *const c_char) -> *mut c_void {
    let Some((name, hooks)) = hooks_for(class_name) else {
        return ptr::null_mut();
    };
    let fns = match hooks.0.get() {
        Ok(fns) => fns,
        Err(err) => {
            warn!("cannot allocate {}: {}", name, err);
            return ptr::null_mut();
        }
    };
    match panic::catch_unwind(AssertUnwindSafe(|| (fns.allocate)())) {
        Ok(payload) => Box::into_raw(Box::new(Owned::new(payload))).cast(),
        Err(payload) => {
            warn!("allocator for {} panicked: {}", name, panic_message(payload.as_ref()));
            ptr::null_mut()
        }
    }
}

pub(super) extern "C" fn release_trampoline(class_name: *const c_char, payload: *mut c_void) {
    if payload.is_null() {
        return;
    }
    // SAFETY: non-null payloads come from `allocate_trampoline` and the
    // heap frees each bound object once.
    let payload = *unsafe { Box::from_raw(payload.cast::<BoundPayload>()) };
    let hooks = hooks_for(class_name);
    release(hooks, payload);
}

/// Hands `payload` to its deallocator on the thread that allocated it,
/// queueing the call when the collector ran somewhere else.
fn release(hooks: Option<(String, BindingHooks)>, payload: BoundPayload) {
    if !payload.is_local() {
        let owner = payload.owner();
        owner::defer(owner, Box::new(move || release(hooks, payload)));
        return;
    }
    let Some(payload) = payload.into_inner() else {
        return;
    };
    let Some((name, hooks)) = hooks else {
        drop(payload);
        return;
    };
    let Ok(fns) = hooks.0.get() else {
        warn!("deallocator for {} belongs to another thread; dropping the payload", name);
        drop(payload);
        return;
    };
    if let Err(panicked) = panic::catch_unwind(AssertUnwindSafe(|| (fns.release)(payload))) {
        warn!("deallocator for {} panicked: {}", name, panic_message(panicked.as_ref()));
    }
}
