mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{as_i64, int, on_vm};
use rbgate::guest::{self, convert};
use rbgate::retention::{self, live_contexts};
use rbgate::{BlockRetention, RbObject};

fn array_of(values: &[i64]) -> RbObject {
    let elements = values.iter().map(|n| int(*n).value()).collect();
    RbObject::from_value(convert::ary_new(elements))
}

#[test]
fn default_retention_drops_the_block_after_the_call() {
    on_vm(|| {
        let before = live_contexts();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        int(3)
            .call_with_block("times", &[], BlockRetention::None, move |_, _| {
                seen.set(seen.get() + 1);
                Ok(RbObject::nil())
            })
            .unwrap();
        assert_eq!(calls.get(), 3);
        assert_eq!(live_contexts(), before);
        assert_eq!(Rc::strong_count(&calls), 1);
    });
}

#[test]
fn self_retention_ties_the_block_to_the_receiver() {
    on_vm(|| {
        let before = live_contexts();
        let receiver = array_of(&[1, 2]);
        receiver
            .call_with_block("each", &[], BlockRetention::SelfObject, |_, _| Ok(RbObject::nil()))
            .unwrap();
        assert_eq!(live_contexts(), before + 1);
        assert_eq!(receiver.retained_count(), 1);
        drop(receiver);
        assert_eq!(live_contexts(), before);
    });
}

#[test]
fn returned_retention_ties_the_block_to_the_result() {
    on_vm(|| {
        let before = live_contexts();
        let source = array_of(&[1, 2, 3]);
        let mapped = source
            .call_with_block("map", &[], BlockRetention::Returned, |args, _| {
                RbObject::from_i64(args[0].to_i64()? + 1)
            })
            .unwrap();
        assert_eq!(source.retained_count(), 0);
        assert_eq!(mapped.retained_count(), 1);
        assert_eq!(live_contexts(), before + 1);
        assert_eq!(as_i64(mapped.call("last", &[])), 4);
        drop(mapped);
        assert_eq!(live_contexts(), before);
    });
}

#[test]
fn returned_retention_drops_the_block_on_error() {
    on_vm(|| {
        let before = live_contexts();
        let err = array_of(&[1])
            .call_with_block("map", &[], BlockRetention::Returned, |_, _| {
                Err(rbgate::BridgeError::MissingCallback("retention_probe".to_string()))
            })
            .unwrap_err();
        assert_eq!(err.exception_class(), Some("NoMethodError"));
        assert_eq!(live_contexts(), before);
    });
}

#[test]
fn proc_closure_is_freed_with_the_proc() {
    on_vm(|| {
        let before = live_contexts();
        let captured = Rc::new(Cell::new(0_i64));
        let total = Rc::clone(&captured);
        let adder = retention::proc_from_closure(move |args, _| {
            total.set(total.get() + args[0].to_i64()?);
            RbObject::from_i64(total.get())
        })
        .unwrap();
        assert_eq!(live_contexts(), before + 1);

        assert_eq!(as_i64(retention::proc_call(&adder, &[int(4)], None)), 4);
        assert_eq!(as_i64(adder.call("call", &[int(5)])), 9);
        guest::gc_start();
        assert_eq!(as_i64(retention::proc_call(&adder, &[int(1)], None)), 10);

        drop(adder);
        guest::gc_start();
        assert_eq!(live_contexts(), before);
        assert_eq!(Rc::strong_count(&captured), 1);
        assert_eq!(captured.get(), 10);
    });
}

#[test]
fn proc_receives_the_block_argument() {
    on_vm(|| {
        let inner = retention::proc_from_closure(|args, _| RbObject::from_i64(args[0].to_i64()? * 2)).unwrap();
        let outer = retention::proc_from_closure(|args, block| match block {
            Some(block) => retention::proc_call(block, args, None),
            None => Ok(RbObject::nil()),
        })
        .unwrap();
        assert_eq!(as_i64(retention::proc_call(&outer, &[int(21)], Some(&inner))), 42);
        assert!(retention::proc_call(&outer, &[int(21)], None).unwrap().is_nil());
    });
}
