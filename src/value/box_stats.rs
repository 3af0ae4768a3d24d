use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxStats {
    pub allocated: usize,
    pub freed: usize,
    pub registered: usize,
    pub unregistered: usize,
}

impl BoxStats {
    pub fn live_boxes(&self) -> usize {
        self.allocated.saturating_sub(self.freed)
    }

    pub fn live_roots(&self) -> usize {
        self.registered.saturating_sub(self.unregistered)
    }
}

static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
static FREED: AtomicUsize = AtomicUsize::new(0);
static REGISTERED: AtomicUsize = AtomicUsize::new(0);
static UNREGISTERED: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn record_alloc() {
    ALLOCATED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_free() {
    FREED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_register() {
    REGISTERED.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_unregister() {
    UNREGISTERED.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> BoxStats {
    BoxStats {
        allocated: ALLOCATED.load(Ordering::Relaxed),
        freed: FREED.load(Ordering::Relaxed),
        registered: REGISTERED.load(Ordering::Relaxed),
        unregistered: UNREGISTERED.load(Ordering::Relaxed),
    }
}
