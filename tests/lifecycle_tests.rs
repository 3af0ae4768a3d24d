use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use rbgate::guest;
use rbgate::protect::{self, Job};
use rbgate::retention::{self, live_contexts};
use rbgate::{BridgeConfig, BridgeError, RbObject, Registry, vm};

// One test: teardown is final for the whole process.
#[test]
fn setup_use_and_teardown() {
    let _ = env_logger::builder().is_test(true).try_init();
    assert!(!vm::is_ready());

    let config = BridgeConfig::from_json(r#"{ "error_history": 4 }"#).unwrap();
    vm::setup_with(config).unwrap();
    assert!(vm::is_ready());
    vm::setup().unwrap();

    let object = guest::core_classes().object;
    let class = protect::protect_object(Job::DefineClass {
        outer: object,
        name: "LifecycleResource",
        superclass: object,
    })
    .unwrap();
    let freed = Rc::new(Cell::new(0));
    let on_free = Rc::clone(&freed);
    Registry::register_bound_object_hooks(&class, || 7_u32, move |payload: u32| {
        assert_eq!(payload, 7);
        on_free.set(on_free.get() + 1);
    })
    .unwrap();
    let kept = class.call("new", &[]).unwrap();
    drop(class.call("new", &[]).unwrap());
    assert_eq!(kept.with_bound_object(|n: &mut u32| *n).unwrap(), 7);

    let contexts = live_contexts();
    let echo = retention::proc_from_closure(|args, _| Ok(args.first().cloned().unwrap_or_else(RbObject::nil))).unwrap();
    assert_eq!(live_contexts(), contexts + 1);
    drop(echo);

    vm::cleanup();
    assert!(!vm::is_ready());
    assert_eq!(freed.get(), 2, "every bound payload is released at teardown");
    assert_eq!(live_contexts(), contexts);

    assert!(matches!(kept.with_bound_object(|n: &mut u32| *n), Err(BridgeError::Setup(_))));
    drop(kept);
    assert!(matches!(vm::setup(), Err(BridgeError::Setup(_))));
    assert!(matches!(RbObject::string("too late"), Err(BridgeError::Setup(_))));

    let again = panic::catch_unwind(AssertUnwindSafe(vm::cleanup)).unwrap_err();
    assert_eq!(again.downcast_ref::<&str>(), Some(&"vm::cleanup called twice"));
}
