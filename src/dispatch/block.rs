use std::cell::RefCell;
use std::ffi::{c_int, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::BridgeError;
use crate::guest::helpers::{self, ReturnValue};
use crate::guest::Value;
use crate::protect::{self, Job};
use crate::value::RbObject;

use super::outcome::{catch_host, fill_return, raw_args};
use super::owner::Owned;

type BlockFn = dyn FnMut(&[RbObject], Option<&RbObject>) -> Result<RbObject, BridgeError>;

static LIVE_CONTEXTS: AtomicUsize = AtomicUsize::new(0);

/// A host closure run as an interpreter block.
///
/// The interpreter only sees its address. How long it stays valid is decided
/// by the [`BlockRetention`](crate::retention::BlockRetention) it was handed
/// over with.
///
/// A block is not re-entrant: if its body makes the interpreter yield to the
/// same block again (say, by calling back into the iterator that is running
/// it), the inner call fails with [`BridgeError::HostPanic`] and the
/// interpreter sees a `RuntimeError`. The closure also only runs on the
/// thread that created it; anywhere else it fails with [`BridgeError::Gvl`].
pub struct BlockContext {
    closure: Owned<RefCell<Box<BlockFn>>>,
}

impl BlockContext {
    pub fn new<F>(closure: F) -> Self
    where
        F: FnMut(&[RbObject], Option<&RbObject>) -> Result<RbObject, BridgeError> + 'static,
    {
        LIVE_CONTEXTS.fetch_add(1, Ordering::Relaxed);
        Self {
            closure: Owned::new(RefCell::new(Box::new(closure))),
        }
    }

    pub(crate) fn invoke(&self, args: &[Value], blockarg: Value) -> Result<RbObject, BridgeError> {
        let closure = self.closure.get()?;
        let args: Vec<RbObject> = args.iter().copied().map(RbObject::from_value).collect();
        let block = (!blockarg.is_nil()).then(|| RbObject::from_value(blockarg));
        let mut closure = closure
            .try_borrow_mut()
            .map_err(|_| BridgeError::HostPanic("block re-entered while it was running".to_string()))?;
        closure(&args, block.as_ref())
    }
}

impl Drop for BlockContext {
    fn drop(&mut self) {
        LIVE_CONTEXTS.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Block contexts not yet dropped.
pub fn live_contexts() -> usize {
    LIVE_CONTEXTS.load(Ordering::Relaxed)
}

/// Breaks out of the innermost running block with `value`.
///
/// The returned error must be handed back from the callback unchanged.
pub fn break_out(value: Option<&RbObject>) -> BridgeError {
    let value = value.map_or(Value::NIL, RbObject::value);
    match protect::protect(Job::Break(value)) {
        Err(error) => error,
        Ok(_) => BridgeError::Break(None),
    }
}

pub(super) extern "C" fn pointer_block_trampoline(
    ctx: *mut c_void,
    argc: c_int,
    argv: *const Value,
    blockarg: Value,
    rv: *mut ReturnValue,
) {
    let outcome = catch_host(|| {
        if ctx.is_null() {
            return Err(BridgeError::MissingCallback("block".to_string()));
        }
        // SAFETY: `ctx` is the `BlockContext` passed with the block call, kept
        // alive by its retention policy; `argv` holds `argc` values for the
        // duration of the call.
        let (context, args) = unsafe { (&*ctx.cast::<BlockContext>(), raw_args(argc, argv)) };
        context.invoke(args, blockarg)
    });
    fill_return(rv, outcome);
}

pub(super) extern "C" fn value_block_trampoline(
    ctx: Value,
    argc: c_int,
    argv: *const Value,
    blockarg: Value,
    rv: *mut ReturnValue,
) {
    let outcome = catch_host(|| {
        let ptr = helpers::data_get(ctx)
            .filter(|ptr| !ptr.is_null())
            .ok_or_else(|| BridgeError::MissingCallback("block".to_string()))?;
        // SAFETY: value contexts are Data objects wrapping a `BlockContext`
        // that is only freed when the Data object is swept; the proc running
        // this block keeps it reachable.
        let (context, args) = unsafe { (&*ptr.cast::<BlockContext>(), raw_args(argc, argv)) };
        context.invoke(args, blockarg)
    });
    fill_return(rv, outcome);
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::thread;

    use super::*;
    use crate::testing::on_vm_thread;

    #[test]
    fn running_block_cannot_be_entered_again() {
        on_vm_thread(|| {
            let slot: Rc<RefCell<Option<Rc<BlockContext>>>> = Rc::new(RefCell::new(None));
            let inner = Rc::clone(&slot);
            let context = Rc::new(BlockContext::new(move |_, _| {
                let again = inner.borrow().clone().ok_or_else(|| BridgeError::MissingCallback("block".into()))?;
                again.invoke(&[], Value::NIL)
            }));
            *slot.borrow_mut() = Some(Rc::clone(&context));

            let err = context.invoke(&[], Value::NIL).unwrap_err();
            slot.borrow_mut().take();
            assert!(matches!(err, BridgeError::HostPanic(ref m) if m.contains("re-entered")), "{:?}", err);
        });
    }

    #[test]
    fn blocks_refuse_other_threads() {
        on_vm_thread(|| {
            let context = BlockContext::new(|_, _| Ok(RbObject::nil()));
            let refused = thread::scope(|scope| {
                scope
                    .spawn(|| matches!(context.invoke(&[], Value::NIL), Err(BridgeError::Gvl(_))))
                    .join()
                    .unwrap()
            });
            assert!(refused);
            assert!(context.invoke(&[], Value::NIL).unwrap().is_nil());
        });
    }
}
