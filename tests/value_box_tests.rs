mod common;

use std::rc::Rc;

use common::on_vm;
use rbgate::guest::{self, Value, convert};
use rbgate::value::box_stats;
use rbgate::{RbObject, ValueBox};

#[test]
fn alloc_then_free_leaves_the_root_set_unchanged() {
    on_vm(|| {
        let before = guest::gc_root_count();
        let boxed = ValueBox::alloc(convert::str_new("rooted"));
        assert_eq!(guest::gc_root_count(), before + 1);
        boxed.free();
        assert_eq!(guest::gc_root_count(), before);
    });
}

#[test]
fn duplicates_are_registered_independently() {
    on_vm(|| {
        let before = guest::gc_root_count();
        let stats_before = box_stats::snapshot();
        let first = ValueBox::alloc(convert::str_new("shared"));
        let second = first.duplicate();
        let third = second.duplicate();
        assert_eq!(guest::gc_root_count(), before + 3);
        assert_eq!(second.handle(), first.handle());

        second.free();
        first.free();
        assert_eq!(guest::gc_root_count(), before + 1);
        third.free();
        assert_eq!(guest::gc_root_count(), before);

        let stats_after = box_stats::snapshot();
        assert_eq!(
            stats_after.live_roots(),
            stats_before.live_roots(),
            "every registration must be paired"
        );
    });
}

#[test]
fn special_constants_are_never_registered() {
    on_vm(|| {
        let before = guest::gc_root_count();
        let boxes: Vec<_> = [Value::NIL, Value::TRUE, Value::FALSE, Value::fixnum(9).unwrap()]
            .into_iter()
            .map(ValueBox::alloc)
            .collect();
        assert_eq!(guest::gc_root_count(), before);
        drop(boxes);
        assert_eq!(guest::gc_root_count(), before);
    });
}

#[test]
fn a_boxed_value_survives_collection() {
    on_vm(|| {
        let kept = RbObject::from_value(convert::str_new("survivor"));
        guest::gc_start();
        guest::gc_start();
        assert_eq!(convert::string_value(kept.value()).as_deref(), Some("survivor"));
    });
}

#[test]
fn duplicate_outlives_the_original_handle() {
    on_vm(|| {
        let before = guest::gc_root_count();
        let original = RbObject::string("twice").unwrap();
        let copy = original.duplicate();
        assert_eq!(copy, original);
        assert_eq!(guest::gc_root_count(), before + 2);
        drop(original);
        guest::gc_start();
        assert_eq!(copy.try_to_string().unwrap(), "twice");
        drop(copy);
        assert_eq!(guest::gc_root_count(), before);
    });
}

#[test]
fn clones_share_one_box() {
    on_vm(|| {
        let before = guest::gc_root_count();
        let object = RbObject::string("one box").unwrap();
        let clone = object.clone();
        assert_eq!(guest::gc_root_count(), before + 1);
        drop(object);
        assert_eq!(guest::gc_root_count(), before + 1);
        drop(clone);
        assert_eq!(guest::gc_root_count(), before);
    });
}

#[test]
fn retained_values_live_as_long_as_the_handle() {
    on_vm(|| {
        let token = Rc::new(String::from("retained"));
        let object = RbObject::string("holder").unwrap();
        object.retain(token.clone());
        object.clone().retain(Rc::new(1_u8));
        assert_eq!(object.retained_count(), 2);
        assert_eq!(Rc::strong_count(&token), 2);
        drop(object);
        assert_eq!(Rc::strong_count(&token), 1);
    });
}

#[test]
fn immediate_handles_need_no_interpreter() {
    let nil = RbObject::nil();
    assert!(nil.is_nil());
    assert!(RbObject::from_bool(true).is_truthy());
    assert_eq!(RbObject::from_i64(12).unwrap().value(), Value::fixnum(12).unwrap());
}
