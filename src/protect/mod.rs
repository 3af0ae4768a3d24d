//! Protected calls into the interpreter.
//!
//! Every guest entry point that can raise runs as a [`Job`] inside the
//! guest's `protect`. A jump never reaches host frames: it comes back as a
//! [`BridgeError`] with the pending-error slot already cleared.

mod job;
pub mod numeric;

use log::trace;

use crate::dispatch;
use crate::error::{BridgeError, FlowControl, RbException, history};
use crate::guest::{self, Tag, Value, convert};
use crate::value::RbObject;
use crate::vm;

pub use job::{Injection, Job, JobOutput, MethodTarget};

use job::{JobFrame, job_trampoline};

/// Checks that the interpreter is running and the calling thread holds the
/// GVL. Booting happens here on first use.
///
/// Host closures the collector released on another thread are dropped here,
/// once their own thread comes back.
pub fn guard() -> Result<(), BridgeError> {
    vm::ensure_running()?;
    if !guest::thread::holds_gvl() {
        let reason = if guest::thread::is_known_thread() {
            "calling thread does not hold the GVL"
        } else {
            "calling thread is not known to the interpreter"
        };
        return Err(history::recorded(BridgeError::Gvl(reason.to_string())));
    }
    dispatch::run_deferred();
    Ok(())
}

/// Runs `job` with every jump converted into an error.
pub fn protect(job: Job<'_>) -> Result<JobOutput, BridgeError> {
    guard()?;
    run(job).map_err(history::recorded)
}

/// [`protect`] for jobs producing an interpreter value.
pub fn protect_value(job: Job<'_>) -> Result<Value, BridgeError> {
    protect(job)?.into_value()
}

/// [`protect`] for jobs producing an interpreter value, boxed.
pub fn protect_object(job: Job<'_>) -> Result<RbObject, BridgeError> {
    protect_value(job).map(RbObject::from_value)
}

fn run(job: Job<'_>) -> Result<JobOutput, BridgeError> {
    guest::maybe_collect();
    trace!("protect: {:?}", job);
    let mut frame = JobFrame {
        job: Some(job),
        output: JobOutput::Unit,
    };
    let data = Value::from_raw(&mut frame as *mut JobFrame<'_> as usize as u64);
    let mut status = 0;
    guest::protect(job_trampoline, data, Some(&mut status));
    if status == 0 {
        return Ok(frame.output);
    }
    let pending = guest::errinfo();
    guest::set_errinfo(Value::NIL);
    let carried = RbObject::from_value(pending);
    if convert::is_exception(pending) {
        return Err(BridgeError::GuestException(capture_exception(carried)));
    }
    let tag = Tag::from_status(status).unwrap_or(Tag::Fatal);
    Err(BridgeError::FlowControl(FlowControl { tag, carried }))
}

/// Reads class name and message off a raised exception. A failing
/// `message` leaves the message empty.
fn capture_exception(object: RbObject) -> RbException {
    let value = object.value();
    let class_name = guest::class::obj_classname(value);
    let message_id = guest::intern("message");
    let message = run(Job::Funcall {
        recv: value,
        method: message_id,
        args: &[],
        kw_splat: false,
    })
    .and_then(JobOutput::into_value)
    .ok()
    .and_then(convert::string_value)
    .unwrap_or_default();
    RbException {
        object,
        class_name,
        message,
    }
}

