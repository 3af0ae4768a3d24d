#![allow(dead_code)]

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, OnceLock};
use std::thread;

use rbgate::guest;
use rbgate::protect::{self, Job};
use rbgate::{BridgeConfig, BridgeError, RbObject, vm};

type Task = Box<dyn FnOnce() + Send>;

fn worker() -> &'static Mutex<Sender<Task>> {
    static WORKER: OnceLock<Mutex<Sender<Task>>> = OnceLock::new();
    WORKER.get_or_init(|| {
        let (tx, rx) = mpsc::channel::<Task>();
        thread::Builder::new()
            .name("interpreter".to_string())
            .spawn(move || {
                let _ = env_logger::builder().is_test(true).try_init();
                vm::setup_with(BridgeConfig::default()).expect("interpreter setup");
                for task in rx {
                    task();
                }
            })
            .expect("spawn interpreter thread");
        Mutex::new(tx)
    })
}

/// Runs `f` on the thread that booted the interpreter.
pub fn on_vm<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let task: Task = Box::new(move || {
        let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
    });
    worker()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .send(task)
        .expect("interpreter thread is gone");
    match rx.recv().expect("interpreter thread dropped the task") {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}

pub fn define_class(name: &str, superclass: Option<&RbObject>) -> RbObject {
    let object = guest::core_classes().object;
    protect::protect_object(Job::DefineClass {
        outer: object,
        name,
        superclass: superclass.map_or(object, RbObject::value),
    })
    .expect("define class")
}

pub fn int(n: i64) -> RbObject {
    RbObject::from_i64(n).expect("integer")
}

pub fn sym(name: &str) -> RbObject {
    RbObject::symbol(name).expect("symbol")
}

pub fn main_object() -> RbObject {
    RbObject::top_self().expect("top self")
}

pub fn as_i64(result: Result<RbObject, BridgeError>) -> i64 {
    result.expect("call failed").to_i64().expect("not an integer")
}

/// Evaluates a guest expression built from method calls on `main`.
pub fn send(recv: &RbObject, method: &str, args: &[RbObject]) -> RbObject {
    recv.call(method, args)
        .unwrap_or_else(|e| panic!("{}.{} failed: {}", recv.inspect().unwrap_or_default(), method, e))
}
