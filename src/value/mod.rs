//! Host-side ownership of interpreter values.

pub mod box_stats;
mod object;
mod value_box;

pub use object::RbObject;
pub(crate) use object::{intern, values};
pub use value_box::ValueBox;
