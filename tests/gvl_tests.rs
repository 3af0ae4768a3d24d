mod common;

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use common::{as_i64, int, main_object, on_vm};
use rbgate::guest::{self, convert};
use rbgate::protect::{self, Job};
use rbgate::thread::{self as gvl, Unblocker};
use rbgate::{ArgsSpec, BridgeError, RbObject, Registry};

const DEADLINE: Duration = Duration::from_secs(5);

fn wait_until(done: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > DEADLINE {
            return false;
        }
        std::thread::park_timeout(Duration::from_millis(10));
    }
    true
}

#[test]
fn reacquiring_inside_a_blocking_region_sees_interpreter_state() {
    on_vm(|| {
        let list = RbObject::from_value(convert::ary_new(Vec::new()));
        let (released, nested) = gvl::call_without_gvl(|| {
            let released = !guest::thread::holds_gvl();
            let nested = gvl::call_with_gvl(|| {
                let held = guest::thread::holds_gvl();
                list.call("push", &[int(7)]).map(|_| held)
            });
            (released, nested)
        })
        .unwrap();
        assert!(released);
        assert!(nested.unwrap().unwrap());
        assert!(guest::thread::holds_gvl());
        assert_eq!(as_i64(list.call("size", &[])), 1);
    });
}

#[test]
fn call_with_gvl_on_the_owning_thread_runs_directly() {
    on_vm(|| {
        let value = gvl::call_with_gvl(|| RbObject::string("direct").and_then(|s| s.try_to_string())).unwrap();
        assert_eq!(value.unwrap(), "direct");
    });
}

#[test]
fn io_interrupt_is_visible_inside_the_region() {
    on_vm(|| {
        let token = gvl::current();
        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let interrupter = std::thread::spawn(move || {
            entered_rx.recv().expect("region entered");
            assert!(gvl::interrupt(token));
        });
        let seen = gvl::call_without_gvl(move || {
            entered_tx.send(()).expect("interrupter alive");
            wait_until(gvl::is_interrupted)
        })
        .unwrap();
        interrupter.join().unwrap();
        assert!(seen);
        assert!(!gvl::is_interrupted());
    });
}

#[test]
fn custom_unblocker_runs_on_interrupt() {
    on_vm(|| {
        let token = gvl::current();
        let woken = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&woken);
        let unblocker = Unblocker::Custom(Box::new(move || flag.store(true, Ordering::SeqCst)));

        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let interrupter = std::thread::spawn(move || {
            entered_rx.recv().expect("region entered");
            gvl::interrupt(token)
        });
        let probe = Arc::clone(&woken);
        let finished = gvl::call_without_gvl_unblocking(unblocker, move || {
            entered_tx.send(()).expect("interrupter alive");
            wait_until(|| probe.load(Ordering::SeqCst))
        })
        .unwrap();
        assert!(interrupter.join().unwrap());
        assert!(finished);
    });
}

#[test]
fn panics_in_the_region_resume_on_the_caller() {
    on_vm(|| {
        let caught = panic::catch_unwind(AssertUnwindSafe(|| gvl::call_without_gvl(|| panic!("inside region"))));
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"inside region"));
        assert!(guest::thread::holds_gvl());
        assert_eq!(as_i64(int(1).call("+", &[int(1)])), 2);
    });
}

#[test]
fn spawned_threads_run_guest_code_and_join() {
    on_vm(|| {
        let (tx, rx) = mpsc::channel();
        let worker = gvl::spawn(move || {
            let sum = int(2).call("+", &[int(3)]).and_then(|v| v.to_i64());
            tx.send(sum.map_err(|e| e.to_string())).expect("receiver alive");
        })
        .unwrap();
        assert_ne!(worker.token(), gvl::current());
        worker.join().unwrap();
        assert_eq!(rx.recv().unwrap(), Ok(5));
        assert!(guest::thread::holds_gvl());
    });
}

fn class_and_message(result: Result<RbObject, BridgeError>) -> Option<(String, String)> {
    match result {
        Err(BridgeError::GuestException(exc)) => Some((exc.class_name, exc.message)),
        _ => None,
    }
}

#[test]
fn host_callbacks_stay_on_the_thread_that_registered_them() {
    on_vm(|| {
        let calls = Rc::new(Cell::new(0_u64));
        let seen = Rc::clone(&calls);
        Registry::register_global_function("gvl_owned_bump", ArgsSpec::new(), move |_, _| {
            seen.set(seen.get() + 1);
            RbObject::from_u64(seen.get())
        })
        .unwrap();
        let read = Rc::clone(&calls);
        Registry::register_virtual_global("$gvl_owned_count", move || RbObject::from_u64(read.get()), None).unwrap();

        let (tx, rx) = mpsc::channel();
        let worker = gvl::spawn(move || {
            let called = class_and_message(main_object().call("gvl_owned_bump", &[]));
            let read = class_and_message(protect::protect_object(Job::GlobalGet("$gvl_owned_count")));
            tx.send((called, read)).expect("receiver alive");
        })
        .unwrap();
        worker.join().unwrap();

        let (called, read) = rx.recv().unwrap();
        for refused in [called, read] {
            let (class, message) = refused.expect("foreign call raised");
            assert_eq!(class, "RuntimeError");
            assert!(message.contains("belongs to thread"), "{}", message);
        }
        assert_eq!(calls.get(), 0);

        assert_eq!(as_i64(main_object().call("gvl_owned_bump", &[])), 1);
        assert_eq!(calls.get(), 1);
    });
}

#[test]
fn a_panicking_thread_reports_on_join() {
    on_vm(|| {
        let worker = gvl::spawn(|| panic!("thread boom")).unwrap();
        match worker.join() {
            Err(BridgeError::HostPanic(message)) => assert_eq!(message, "thread boom"),
            other => panic!("expected a host panic, got {:?}", other),
        }
    });
}

#[test]
fn foreign_threads_are_refused() {
    on_vm(|| ());
    let without = gvl::call_without_gvl(|| 1).unwrap_err();
    assert!(matches!(without, BridgeError::Gvl(_)));
    let with = gvl::call_with_gvl(|| 1).unwrap_err();
    assert!(matches!(with, BridgeError::Gvl(_)));
    assert!(!gvl::interrupt(gvl::current()));
}
