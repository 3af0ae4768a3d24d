//! Runs unit tests on the one thread that owns the interpreter.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::thread;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::BridgeConfig;
use crate::vm;

type Task = Box<dyn FnOnce() + Send>;

static WORKER: Lazy<Mutex<Sender<Task>>> = Lazy::new(|| {
    let (tx, rx) = mpsc::channel::<Task>();
    thread::Builder::new()
        .name("rbgate-test-vm".to_string())
        .spawn(move || {
            let _ = env_logger::builder().is_test(true).try_init();
            vm::setup_with(BridgeConfig::default()).expect("interpreter setup");
            for task in rx {
                task();
            }
        })
        .expect("spawn interpreter test thread");
    Mutex::new(tx)
});

/// Runs `f` on the interpreter thread and returns its result, re-raising a
/// panic on the calling test thread.
pub(crate) fn on_vm_thread<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let task: Task = Box::new(move || {
        let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
    });
    WORKER.lock().send(task).expect("interpreter test thread is gone");
    match rx.recv().expect("interpreter test thread dropped the task") {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}
