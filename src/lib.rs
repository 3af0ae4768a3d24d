//! Runtime bridge between a Rust host and an embedded Ruby-style
//! interpreter.
//!
//! Host calls into the interpreter go through [`protect`], which turns every
//! non-local jump into a [`BridgeError`]. Calls back into the host go
//! through the [`dispatch`] registry. Values crossing the boundary are held
//! in registered [`value::ValueBox`]es, and [`thread`] moves the GVL around
//! blocking host work.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod guest;
pub mod protect;
pub mod retention;
pub mod thread;
pub mod value;
pub mod vm;

#[cfg(test)]
pub(crate) mod testing;

pub use config::BridgeConfig;
pub use dispatch::{ArgsSpec, CallSite, MethodArgs, Registry};
pub use error::{BridgeError, FlowControl, RbException};
pub use protect::{Job, JobOutput, protect};
pub use retention::BlockRetention;
pub use value::{RbObject, ValueBox};
