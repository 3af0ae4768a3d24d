use super::object::{DataKind, Finalizer, HeapObject, ObjectBody};
use super::value::Value;

const DEFAULT_GC_THRESHOLD: usize = 10_000;
pub(crate) const MIN_GC_THRESHOLD: usize = 1024;

struct HeapEntry {
    object: HeapObject,
    marked: bool,
}

/// Stop-the-world mark-and-sweep heap holding every guest object.
///
/// Handles are slot indices encoded into [`Value`]s. Freed slots are reused
/// through the free list, so a handle is only meaningful while its object is
/// reachable from a root.
pub(crate) struct GuestHeap {
    entries: Vec<Option<HeapEntry>>,
    free_list: Vec<u32>,
    allocation_count: usize,
    gc_threshold: usize,
    gc_enabled: bool,
    total_collections: usize,
    total_allocations: usize,
}

impl Default for GuestHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestHeap {
    /// Creates a heap with collection enabled and a threshold of `10_000`.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free_list: Vec::new(),
            allocation_count: 0,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            gc_enabled: true,
            total_collections: 0,
            total_allocations: 0,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.gc_enabled = enabled
    }

    /// Sets the allocation threshold. Values below `MIN_GC_THRESHOLD` are
    /// clamped upward.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.gc_threshold = threshold.max(MIN_GC_THRESHOLD)
    }

    pub fn threshold(&self) -> usize {
        self.gc_threshold
    }

    /// Returns `true` when collection is enabled and the threshold was reached.
    pub fn should_collect(&self) -> bool {
        self.gc_enabled && self.allocation_count >= self.gc_threshold
    }

    /// Allocates an object and returns its handle.
    pub fn alloc(&mut self, object: HeapObject) -> Value {
        self.allocation_count += 1;
        self.total_allocations += 1;

        let entry = HeapEntry {
            object,
            marked: false,
        };

        if let Some(idx) = self.free_list.pop() {
            self.entries[idx as usize] = Some(entry);
            Value::from_slot(idx)
        } else {
            let idx = self.entries.len() as u32;
            self.entries.push(Some(entry));
            Value::from_slot(idx)
        }
    }

    pub fn get(&self, value: Value) -> Option<&HeapObject> {
        let idx = value.slot()? as usize;
        self.entries.get(idx)?.as_ref().map(|entry| &entry.object)
    }

    pub fn get_mut(&mut self, value: Value) -> Option<&mut HeapObject> {
        let idx = value.slot()? as usize;
        self.entries
            .get_mut(idx)?
            .as_mut()
            .map(|entry| &mut entry.object)
    }

    pub fn live_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }

    pub fn total_collections(&self) -> usize {
        self.total_collections
    }

    /// Runs a full collection from `roots`.
    ///
    /// Returns the free hooks of swept Data objects. The caller runs them
    /// after releasing the heap, since hooks are host code.
    pub fn collect(&mut self, roots: &[Value]) -> Vec<Finalizer> {
        self.mark(roots);

        let live_before = self.live_count();
        let finalizers = self.sweep();
        let live_after = self.live_count();
        let collected = live_before.saturating_sub(live_after);

        self.total_collections += 1;
        self.allocation_count = 0;

        self.adapt_threshold(collected, live_before);
        finalizers
    }

    /// Detaches the free hook of every live Data object, for teardown.
    pub fn drain_finalizers(&mut self) -> Vec<Finalizer> {
        let mut finalizers = Vec::new();
        for entry in self.entries.iter_mut().flatten() {
            if let ObjectBody::Data(data) = &mut entry.object.body {
                let ptr = std::mem::replace(&mut data.ptr, std::ptr::null_mut());
                if let Some(finalizer) = finalizer_for(&data.kind, ptr) {
                    finalizers.push(finalizer);
                }
            }
        }
        finalizers
    }

    fn mark(&mut self, roots: &[Value]) {
        let mut worklist: Vec<Value> = Vec::with_capacity(roots.len().max(16));
        worklist.extend_from_slice(roots);

        while let Some(value) = worklist.pop() {
            let Some(idx) = value.slot() else {
                continue;
            };
            // Mark first so cycles and shared objects are visited once.
            match self.entries.get_mut(idx as usize) {
                Some(Some(entry)) => {
                    if entry.marked {
                        continue;
                    }
                    entry.marked = true;
                }
                _ => continue,
            }
            if let Some(Some(entry)) = self.entries.get(idx as usize) {
                entry.object.children(&mut worklist);
            }
        }
    }

    fn sweep(&mut self) -> Vec<Finalizer> {
        let mut finalizers = Vec::new();
        let mut i = 0;
        let len = self.entries.len();
        while i < len {
            let reclaim = match &mut self.entries[i] {
                Some(entry) if entry.marked => {
                    entry.marked = false;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if reclaim && let Some(entry) = self.entries[i].take() {
                if let ObjectBody::Data(data) = entry.object.body
                    && let Some(finalizer) = finalizer_for(&data.kind, data.ptr)
                {
                    finalizers.push(finalizer);
                }
                self.free_list.push(i as u32);
            }
            i += 1;
        }
        finalizers
    }

    fn adapt_threshold(&mut self, collected: usize, total_before: usize) {
        if total_before == 0 {
            return;
        }

        let ratio = collected as f64 / total_before as f64;
        if ratio < 0.25 {
            self.gc_threshold = (self.gc_threshold * 2).min(1_000_000);
        } else if ratio > 0.75 {
            self.gc_threshold = (self.gc_threshold / 2).max(MIN_GC_THRESHOLD)
        }
    }
}

fn finalizer_for(kind: &DataKind, ptr: *mut std::ffi::c_void) -> Option<Finalizer> {
    if ptr.is_null() {
        return None;
    }
    match kind {
        DataKind::Plain { free: Some(free) } => Some(Finalizer::Free(*free, ptr)),
        DataKind::Plain { free: None } => None,
        DataKind::Bound { class_name } => Some(Finalizer::Bound(class_name.clone(), ptr)),
    }
}
