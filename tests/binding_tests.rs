mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{as_i64, define_class, on_vm, send};
use rbgate::guest;
use rbgate::{ArgsSpec, BridgeError, RbObject, Registry};

#[derive(Debug, Default)]
struct Tally {
    hits: i64,
}

fn bind_tally(name: &str, freed: &Rc<Cell<usize>>) -> RbObject {
    let class = define_class(name, None);
    let freed = Rc::clone(freed);
    Registry::register_bound_object_hooks(&class, Tally::default, move |tally: Tally| {
        assert!(tally.hits >= 0);
        freed.set(freed.get() + 1);
    })
    .unwrap();
    class
}

#[test]
fn every_allocation_is_released_once() {
    on_vm(|| {
        let freed = Rc::new(Cell::new(0));
        let class = bind_tally("BindingTally", &freed);
        let instances: Vec<_> = (0..3).map(|_| send(&class, "new", &[])).collect();
        guest::gc_start();
        assert_eq!(freed.get(), 0);
        drop(instances);
        guest::gc_start();
        assert_eq!(freed.get(), 3);
        guest::gc_start();
        assert_eq!(freed.get(), 3);
    });
}

#[test]
fn host_state_is_reachable_from_methods() {
    on_vm(|| {
        let freed = Rc::new(Cell::new(0));
        let class = bind_tally("BindingCounter", &freed);
        Registry::register_instance_method(&class, "bump", ArgsSpec::new(), |recv, _| {
            let hits = recv.with_bound_object(|tally: &mut Tally| {
                tally.hits += 1;
                tally.hits
            })?;
            RbObject::from_i64(hits)
        })
        .unwrap();
        let counter = send(&class, "new", &[]);
        send(&counter, "bump", &[]);
        assert_eq!(as_i64(counter.call("bump", &[])), 2);
        let hits = counter.with_bound_object(|tally: &mut Tally| tally.hits).unwrap();
        assert_eq!(hits, 2);
    });
}

#[test]
fn subclasses_inherit_the_binding() {
    on_vm(|| {
        let freed = Rc::new(Cell::new(0));
        let parent = bind_tally("BindingParent", &freed);
        let child = define_class("BindingChild", Some(&parent));
        let instance = send(&child, "new", &[]);
        instance.with_bound_object(|tally: &mut Tally| tally.hits = 5).unwrap();
        assert_eq!(instance.with_bound_object(|tally: &mut Tally| tally.hits).unwrap(), 5);
        drop(instance);
        guest::gc_start();
        assert_eq!(freed.get(), 1);
    });
}

#[test]
fn wrong_payload_types_are_rejected() {
    on_vm(|| {
        let freed = Rc::new(Cell::new(0));
        let class = bind_tally("BindingTyped", &freed);
        let instance = send(&class, "new", &[]);
        let err = instance.with_bound_object(|_: &mut String| ()).unwrap_err();
        assert!(matches!(err, BridgeError::BadType { ref actual, .. } if actual == "BindingTyped"));

        let plain = RbObject::string("not bound").unwrap();
        let err = plain.with_bound_object(|_: &mut Tally| ()).unwrap_err();
        assert!(matches!(err, BridgeError::BadType { .. }));
    });
}

#[test]
fn binding_requires_a_class() {
    on_vm(|| {
        let text = RbObject::string("not a class").unwrap();
        let err = Registry::register_bound_object_hooks(&text, Tally::default, drop).unwrap_err();
        assert!(matches!(err, BridgeError::BadType { .. }));
    });
}
