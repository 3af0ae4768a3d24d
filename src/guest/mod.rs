//! Embedded guest interpreter.
//!
//! A compact Ruby-style runtime exposing the C-API subset the bridge is built
//! on: tagged values, a collected heap with registered roots, classes and
//! modules, jump-based exceptions with `protect`, blocks and procs, global
//! variables, and a GVL with blocking regions.

mod builtins;
pub mod call;
pub mod class;
pub mod convert;
pub mod gvar;
mod heap;
pub mod helpers;
pub mod jump;
mod object;
mod state;
pub mod thread;
mod value;

pub use jump::{ProtectFn, Tag, errinfo, exc_new, jump_tag, protect, raise, raise_new, set_errinfo};
pub use object::{BuiltinFn, DataFreeFn};
pub use state::{
    CoreClasses, SetupOptions, cleanup, core_classes, gc_count, gc_register_address,
    gc_root_count, gc_start, gc_unregister_address, heap_live_count, id_name, intern, is_running,
    maybe_collect, setup, top_self,
};
pub use value::{Id, Value, ValueType};
