use crate::guest::{self, Value};

use super::box_stats;

/// Owns one interpreter handle and keeps it visible to the collector.
///
/// The box is heap allocated so the registered root address stays put for
/// its whole life. Special constants are never registered and need no
/// running interpreter.
#[derive(Debug)]
pub struct ValueBox {
    handle: Value,
}

impl ValueBox {
    pub fn alloc(handle: Value) -> Box<ValueBox> {
        let boxed = Box::new(ValueBox { handle });
        if !handle.is_special_const() {
            guest::gc_register_address(&boxed.handle);
            box_stats::record_register();
        }
        box_stats::record_alloc();
        boxed
    }

    pub fn handle(&self) -> Value {
        self.handle
    }

    /// A second, independently registered box for the same handle.
    pub fn duplicate(&self) -> Box<ValueBox> {
        ValueBox::alloc(self.handle)
    }

    pub fn free(self: Box<Self>) {
        drop(self)
    }

    fn release(&mut self) {
        if !self.handle.is_special_const() {
            guest::gc_unregister_address(&self.handle);
            box_stats::record_unregister();
        }
        self.handle = Value::UNDEF;
    }
}

impl Drop for ValueBox {
    fn drop(&mut self) {
        self.release();
        box_stats::record_free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_constants_work_without_an_interpreter() {
        let before = box_stats::snapshot();
        let boxed = ValueBox::alloc(Value::TRUE);
        assert_eq!(boxed.handle(), Value::TRUE);
        let copy = boxed.duplicate();
        copy.free();
        boxed.free();
        let after = box_stats::snapshot();
        assert!(after.allocated >= before.allocated + 2);
        assert!(after.freed >= before.freed + 2);
    }

    #[test]
    fn release_poisons_the_handle() {
        let mut boxed = ValueBox::alloc(Value::NIL);
        boxed.release();
        assert!(boxed.handle().is_undef());
    }
}
