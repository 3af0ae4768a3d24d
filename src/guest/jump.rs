//! Non-local jumps.
//!
//! A jump is an unwind carrying a [`JumpTag`] payload. `protect` and the
//! iterator/catch frames are the only places that stop one. Everything the
//! jump passes through must be a Rust frame or an `extern "C-unwind"` function.

use std::panic::{self, AssertUnwindSafe};

use super::state::{self, with_state};
use super::value::Value;

/// Jump tags, numbered as the interpreter reports them through `protect`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Return = 1,
    Break = 2,
    Next = 3,
    Retry = 4,
    Redo = 5,
    Raise = 6,
    Throw = 7,
    Fatal = 8,
}

impl Tag {
    pub fn from_status(status: i32) -> Option<Tag> {
        match status {
            1 => Some(Tag::Return),
            2 => Some(Tag::Break),
            3 => Some(Tag::Next),
            4 => Some(Tag::Retry),
            5 => Some(Tag::Redo),
            6 => Some(Tag::Raise),
            7 => Some(Tag::Throw),
            8 => Some(Tag::Fatal),
            _ => None,
        }
    }

    pub fn status(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::Return => "return",
            Tag::Break => "break",
            Tag::Next => "next",
            Tag::Retry => "retry",
            Tag::Redo => "redo",
            Tag::Raise => "raise",
            Tag::Throw => "throw",
            Tag::Fatal => "fatal",
        }
    }
}

/// Unwind payload of a guest jump.
#[derive(Debug)]
pub(crate) struct JumpTag(pub Tag);

/// Work run under [`protect`].
pub type ProtectFn = extern "C-unwind" fn(Value) -> Value;

/// Exception to raise once the state borrow is released.
pub(crate) struct Failure {
    pub class: Value,
    pub message: String,
}

impl Failure {
    pub fn new(class: Value, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

pub(crate) type GuestResult<T> = Result<T, Failure>;

/// Unwraps `result`, raising the failure as a guest exception.
pub(crate) fn check<T>(result: GuestResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(failure) => raise_failure(failure),
    }
}

pub(crate) fn raise_failure(failure: Failure) -> ! {
    raise_new(failure.class, &failure.message)
}

/// Runs `func(data)` and stops any jump it performs.
///
/// On a jump, `status` receives the tag number, the stack is restored to its
/// depth at entry and `nil` is returned. `errinfo` is left as the jump set it.
/// On success `status` receives 0. Passing `None` discards the status.
pub fn protect(func: ProtectFn, data: Value, status: Option<&mut i32>) -> Value {
    let mark = state::stack_mark();
    let result = panic::catch_unwind(AssertUnwindSafe(|| func(data)));
    match result {
        Ok(value) => {
            if let Some(status) = status {
                *status = 0;
            }
            value
        }
        Err(payload) => match payload.downcast::<JumpTag>() {
            Ok(jump) => {
                state::restore_stack(mark);
                if let Some(status) = status {
                    *status = jump.0.status();
                }
                Value::NIL
            }
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Jumps with `tag`, leaving `errinfo` untouched.
pub fn jump_tag(tag: Tag) -> ! {
    panic::resume_unwind(Box::new(JumpTag(tag)))
}

/// Raises `exception`.
pub fn raise(exception: Value) -> ! {
    with_state(|s| s.stack().errinfo = exception);
    jump_tag(Tag::Raise)
}

/// Raises a new instance of `class` with `message`.
pub fn raise_new(class: Value, message: &str) -> ! {
    let exception = with_state(|s| s.new_exception(class, message));
    raise(exception)
}

/// A new exception instance, without raising it.
pub fn exc_new(class: Value, message: &str) -> Value {
    with_state(|s| s.new_exception(class, message))
}

/// The pending-error slot.
pub fn errinfo() -> Value {
    with_state(|s| s.stack().errinfo)
}

pub fn set_errinfo(value: Value) {
    with_state(|s| s.stack().errinfo = value)
}
