//! Interpreter lifecycle.
//!
//! The interpreter boots once per process on the calling thread, which
//! becomes its main thread. After [`cleanup`] it cannot be started again.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::config::BridgeConfig;
use crate::dispatch::Registry;
use crate::error::{BridgeError, history};
use crate::guest::{self, SetupOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Fresh,
    Ready,
    Failed(String),
    Cleaned,
}

static PHASE: Lazy<Mutex<Phase>> = Lazy::new(|| Mutex::new(Phase::Fresh));
static TRACE_DISPATCH: AtomicBool = AtomicBool::new(false);

/// Boots the interpreter with settings from the environment.
pub fn setup() -> Result<(), BridgeError> {
    setup_with(BridgeConfig::from_env())
}

/// Boots the interpreter. Calling it again once running does nothing.
pub fn setup_with(config: BridgeConfig) -> Result<(), BridgeError> {
    let mut phase = PHASE.lock();
    match &*phase {
        Phase::Ready => return Ok(()),
        Phase::Failed(reason) => return Err(history::recorded(BridgeError::Setup(reason.clone()))),
        Phase::Cleaned => {
            return Err(history::recorded(BridgeError::Setup(
                "interpreter cannot be restarted after cleanup".to_string(),
            )));
        }
        Phase::Fresh => {}
    }
    history::set_capacity(config.error_history);
    TRACE_DISPATCH.store(config.trace_dispatch, Ordering::Relaxed);
    let options = SetupOptions {
        gc_enabled: config.gc_enabled,
        gc_threshold: config.gc_threshold,
    };
    match guest::setup(options) {
        Ok(()) => {
            *phase = Phase::Ready;
            drop(phase);
            Registry::register_block_trampolines();
            info!(
                "interpreter ready (gc: {}, threshold: {})",
                config.gc_enabled, config.gc_threshold
            );
            Ok(())
        }
        Err(reason) => {
            error!("interpreter setup failed: {}", reason);
            *phase = Phase::Failed(reason.clone());
            Err(history::recorded(BridgeError::Setup(reason)))
        }
    }
}

/// Boots on first use; fails after a setup failure or teardown.
pub(crate) fn ensure_running() -> Result<(), BridgeError> {
    let fresh = match &*PHASE.lock() {
        Phase::Ready => return Ok(()),
        Phase::Fresh => true,
        Phase::Failed(reason) => return Err(history::recorded(BridgeError::Setup(reason.clone()))),
        Phase::Cleaned => false,
    };
    if fresh {
        setup()
    } else {
        Err(history::recorded(BridgeError::Setup(
            "interpreter was cleaned up".to_string(),
        )))
    }
}

pub fn is_ready() -> bool {
    *PHASE.lock() == Phase::Ready
}

pub(crate) fn trace_dispatch() -> bool {
    TRACE_DISPATCH.load(Ordering::Relaxed)
}

/// Tears the interpreter down, running every outstanding free hook.
///
/// # Panics
/// When called a second time.
pub fn cleanup() {
    let mut phase = PHASE.lock();
    match &*phase {
        Phase::Cleaned => panic!("vm::cleanup called twice"),
        Phase::Ready => {
            *phase = Phase::Cleaned;
            drop(phase);
            if let Err(reason) = guest::cleanup() {
                error!("interpreter cleanup failed: {}", reason);
            }
            info!("interpreter cleaned up");
        }
        Phase::Fresh | Phase::Failed(_) => *phase = Phase::Cleaned,
    }
}
