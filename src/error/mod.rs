//! Bridge errors.
//!
//! Every failure crossing the boundary is a [`BridgeError`]. Each variant has
//! a static [`ErrorCode`], and errors leaving a protected call or a dispatch
//! are kept in a bounded [`history`].

pub mod error_codes;
pub mod history;

use std::fmt;

use crate::guest::Tag;
use crate::value::RbObject;

pub use error_codes::ErrorCode;

/// Accepted positional argument counts. `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArityRange {
    pub min: usize,
    pub max: Option<usize>,
}

impl ArityRange {
    pub fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub fn contains(&self, given: usize) -> bool {
        given >= self.min && self.max.is_none_or(|max| given <= max)
    }
}

impl fmt::Display for ArityRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", self.min),
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "{}+", self.min),
        }
    }
}

/// A guest exception whose ownership moved to the host.
#[derive(Debug, Clone)]
pub struct RbException {
    pub object: RbObject,
    pub class_name: String,
    pub message: String,
}

impl fmt::Display for RbException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

/// A non-exception jump (`break`, `throw`, `return`, `next`) in flight.
///
/// Callbacks must return it unchanged so the jump can be re-issued on the
/// interpreter side.
#[derive(Debug, Clone)]
pub struct FlowControl {
    pub tag: Tag,
    pub carried: RbObject,
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} jump in progress", self.tag.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("interpreter setup failed: {0}")]
    Setup(String),

    #[error("{0}")]
    GuestException(RbException),

    #[error("{0}")]
    FlowControl(FlowControl),

    #[error("break from block")]
    Break(Option<RbObject>),

    #[error("wrong number of arguments for '{method}' (given {given}, expected {expected})")]
    Arity {
        method: String,
        given: usize,
        expected: ArityRange,
    },

    #[error("'{name}' is not a valid name: {reason}")]
    BadIdentifier { name: String, reason: &'static str },

    #[error("wrong value type (expected {expected}, got {actual})")]
    BadType { expected: String, actual: String },

    #[error("keyword '{0}' declared twice")]
    DuplicateKeyword(String),

    #[error("unknown keyword: :{0}")]
    UnknownKeyword(String),

    #[error("missing keyword: :{0}")]
    MissingKeyword(String),

    #[error("no host callback registered for '{0}'")]
    MissingCallback(String),

    #[error("GVL: {0}")]
    Gvl(String),

    #[error("host callback panicked: {0}")]
    HostPanic(String),
}

impl BridgeError {
    pub fn code(&self) -> &'static ErrorCode {
        use error_codes::*;
        match self {
            BridgeError::Setup(_) => &SETUP_FAILED,
            BridgeError::GuestException(_) => &GUEST_EXCEPTION,
            BridgeError::FlowControl(_) => &FLOW_CONTROL,
            BridgeError::Break(_) => &HOST_BREAK,
            BridgeError::Arity { .. } => &WRONG_ARITY,
            BridgeError::BadIdentifier { .. } => &BAD_IDENTIFIER,
            BridgeError::BadType { .. } => &BAD_TYPE,
            BridgeError::DuplicateKeyword(_) => &DUPLICATE_KEYWORD,
            BridgeError::UnknownKeyword(_) => &UNKNOWN_KEYWORD,
            BridgeError::MissingKeyword(_) => &MISSING_KEYWORD,
            BridgeError::MissingCallback(_) => &MISSING_CALLBACK,
            BridgeError::Gvl(_) => &GVL_VIOLATION,
            BridgeError::HostPanic(_) => &HOST_PANIC,
        }
    }

    /// `true` for jumps that are still unwinding toward a guest frame.
    pub fn is_flow_control(&self) -> bool {
        matches!(self, BridgeError::FlowControl(_) | BridgeError::Break(_))
    }

    /// Exception class of a guest exception, if this is one.
    pub fn exception_class(&self) -> Option<&str> {
        match self {
            BridgeError::GuestException(exc) => Some(&exc.class_name),
            _ => None,
        }
    }

    pub(crate) fn bad_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        BridgeError::BadType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
