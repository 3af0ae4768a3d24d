//! How long host closures handed to the interpreter stay alive.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use log::warn;

use crate::dispatch::{BlockContext, Registry};
use crate::error::BridgeError;
use crate::guest::helpers;
use crate::protect::{self, Job};
use crate::value::RbObject;

pub use crate::dispatch::live_contexts;

/// Lifetime of a block passed with [`RbObject::call_with_block`].
///
/// The interpreter may hold on to a block past the call (by turning it into
/// a proc, for instance). Calling such a block after its context was dropped
/// is undefined behavior, and choosing a long enough policy is up to the
/// caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockRetention {
    /// Dropped when the call returns.
    #[default]
    None,
    /// Kept by the receiver's handle.
    SelfObject,
    /// Kept by the handle on the call's result.
    Returned,
}

impl BlockRetention {
    pub(crate) fn settle(
        self,
        context: Rc<BlockContext>,
        receiver: &RbObject,
        result: &Result<RbObject, BridgeError>,
    ) {
        match (self, result) {
            (BlockRetention::SelfObject, _) => receiver.retain(context),
            (BlockRetention::Returned, Ok(returned)) => returned.retain(context),
            _ => drop(context),
        }
    }
}

extern "C" fn release_context(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: `ptr` came from `Box::into_raw` in `proc_from_closure`, and the
    // heap runs a Data free hook once. The closure inside goes back to its
    // own thread to be dropped when the collector runs elsewhere.
    let context = unsafe { Box::from_raw(ptr.cast::<BlockContext>()) };
    if panic::catch_unwind(AssertUnwindSafe(move || drop(context))).is_err() {
        warn!("block context destructor panicked");
    }
}

/// A proc running `closure`.
///
/// The closure lives in a Data object referenced by the proc and is freed
/// when the collector frees that object. Calling the proc from another
/// interpreter thread raises instead of running `closure`.
pub fn proc_from_closure<F>(closure: F) -> Result<RbObject, BridgeError>
where
    F: FnMut(&[RbObject], Option<&RbObject>) -> Result<RbObject, BridgeError> + 'static,
{
    protect::guard()?;
    Registry::register_block_trampolines();
    let context = Box::into_raw(Box::new(BlockContext::new(closure)));
    let holder = RbObject::from_value(helpers::data_wrap(context.cast(), Some(release_context)));
    protect::protect_object(Job::ProcNew(holder.value()))
}

/// Calls a proc with `args` and an optional block argument.
pub fn proc_call(proc_object: &RbObject, args: &[RbObject], block: Option<&RbObject>) -> Result<RbObject, BridgeError> {
    let args = crate::value::values(args);
    protect::protect_object(Job::ProcCall {
        proc_value: proc_object.value(),
        args: &args,
        blockarg: block.map_or(crate::guest::Value::NIL, RbObject::value),
    })
}
