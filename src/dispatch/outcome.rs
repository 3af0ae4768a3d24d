//! Turning host outcomes into helper return records.

use std::any::Any;
use std::ffi::c_int;
use std::panic::{self, AssertUnwindSafe};
use std::slice;

use log::warn;

use crate::error::{BridgeError, history};
use crate::guest::helpers::{ReturnType, ReturnValue};
use crate::guest::{self, Value};
use crate::protect::{self, Job};
use crate::value::RbObject;

pub(crate) type Outcome = Result<RbObject, BridgeError>;

/// Borrows a raw argument vector handed over by the helper layer.
///
/// # Safety
/// `argv` must point at `argc` values that stay valid for `'a`.
pub(crate) unsafe fn raw_args<'a>(argc: c_int, argv: *const Value) -> &'a [Value] {
    if argc <= 0 || argv.is_null() {
        return &[];
    }
    // SAFETY: guaranteed by the caller.
    unsafe { slice::from_raw_parts(argv, argc as usize) }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Runs a host callback body, turning a panic into [`BridgeError::HostPanic`].
pub(crate) fn catch_host(body: impl FnOnce() -> Outcome) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("host callback panicked: {}", message);
            Err(BridgeError::HostPanic(message))
        }
    }
}

/// Writes `outcome` into the helper's return slot.
pub(crate) fn fill_return(rv: *mut ReturnValue, outcome: Outcome) {
    let record = return_record(outcome);
    if rv.is_null() {
        return;
    }
    // SAFETY: a non-null `rv` is the live out-slot of the helper call that
    // invoked the trampoline.
    unsafe { rv.write(record) }
}

fn return_record(outcome: Outcome) -> ReturnValue {
    match outcome {
        Ok(object) => ReturnValue {
            kind: ReturnType::Value,
            value: object.value(),
        },
        Err(BridgeError::Break(None)) => ReturnValue {
            kind: ReturnType::Break,
            value: Value::NIL,
        },
        Err(BridgeError::Break(Some(object))) => ReturnValue {
            kind: ReturnType::BreakValue,
            value: object.value(),
        },
        Err(BridgeError::FlowControl(flow)) => {
            guest::set_errinfo(flow.carried.value());
            ReturnValue {
                kind: ReturnType::Jump,
                value: Value::fixnum(i64::from(flow.tag.status())).unwrap_or(Value::NIL),
            }
        }
        Err(BridgeError::GuestException(exception)) => ReturnValue {
            kind: ReturnType::Raise,
            value: exception.object.value(),
        },
        Err(other) => {
            let value = exception_for(&other);
            history::record(&other);
            ReturnValue {
                kind: ReturnType::Raise,
                value,
            }
        }
    }
}

/// The interpreter exception raised for a bridge error.
fn exception_for(error: &BridgeError) -> Value {
    let classes = guest::core_classes();
    if let BridgeError::Arity { given, expected, .. } = error {
        let min = i32::try_from(expected.min).unwrap_or(i32::MAX);
        let max = expected.max.map_or(-1, |max| i32::try_from(max).unwrap_or(i32::MAX));
        // The job always raises; its exception is the one to hand back.
        if let Err(BridgeError::GuestException(exception)) = protect::protect(Job::ErrorArity {
            given: *given,
            min,
            max,
        }) {
            return exception.object.value();
        }
    }
    let class = match error {
        BridgeError::Arity { .. }
        | BridgeError::DuplicateKeyword(_)
        | BridgeError::UnknownKeyword(_)
        | BridgeError::MissingKeyword(_) => classes.argument_error,
        BridgeError::BadIdentifier { .. } => classes.name_error,
        BridgeError::BadType { .. } => classes.type_error,
        BridgeError::MissingCallback(_) => classes.no_method_error,
        _ => classes.runtime_error,
    };
    guest::exc_new(class, &error.to_string())
}
