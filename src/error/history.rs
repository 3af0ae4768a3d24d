//! Bounded record of recent bridge errors.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;

use super::BridgeError;

pub const DEFAULT_CAPACITY: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub title: &'static str,
    pub message: String,
}

impl ErrorReport {
    pub fn from_error(error: &BridgeError) -> Self {
        let code = error.code();
        Self {
            code: code.code,
            title: code.title,
            message: error.to_string(),
        }
    }
}

struct ErrorHistory {
    capacity: usize,
    entries: VecDeque<ErrorReport>,
}

impl ErrorHistory {
    fn push(&mut self, report: ErrorReport) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(report);
    }
}

static HISTORY: Lazy<Mutex<ErrorHistory>> = Lazy::new(|| {
    Mutex::new(ErrorHistory {
        capacity: DEFAULT_CAPACITY,
        entries: VecDeque::new(),
    })
});

/// Records `error` unless it is a jump still in flight.
pub fn record(error: &BridgeError) {
    if error.is_flow_control() {
        return;
    }
    HISTORY.lock().push(ErrorReport::from_error(error));
}

/// Records `error` and hands it back.
pub(crate) fn recorded(error: BridgeError) -> BridgeError {
    record(&error);
    error
}

/// Oldest first.
pub fn recent() -> Vec<ErrorReport> {
    HISTORY.lock().entries.iter().cloned().collect()
}

pub fn last() -> Option<ErrorReport> {
    HISTORY.lock().entries.back().cloned()
}

pub fn clear() {
    HISTORY.lock().entries.clear();
}

pub fn set_capacity(capacity: usize) {
    let mut history = HISTORY.lock();
    history.capacity = capacity;
    while history.entries.len() > capacity {
        history.entries.pop_front();
    }
}

pub fn to_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&recent())
}
