use std::cell::RefCell;
use std::collections::HashMap;
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use parking_lot::ReentrantMutex;

use super::heap::GuestHeap;
use super::object::{
    AttachedBlock, BlockHandler, ClassBody, ClassKind, Finalizer, HeapObject, ObjectBody,
};
use super::value::{Id, Value, ValueType};
use super::{builtins, class, helpers, thread as gvl};

pub(crate) struct SymbolTable {
    ids: HashMap<String, Id>,
    names: Vec<String>,
}

impl SymbolTable {
    fn new() -> Self {
        Self {
            ids: HashMap::new(),
            names: Vec::new(),
        }
    }

    pub fn intern(&mut self, name: &str) -> Id {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        self.names.push(name.to_string());
        let id = Id(self.names.len() as u64);
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: Id) -> Option<&str> {
        let idx = (id.0 as usize).checked_sub(1)?;
        self.names.get(idx).map(String::as_str)
    }
}

/// Handles of the classes the runtime itself depends on.
#[derive(Default, Clone, Copy, Debug)]
pub struct CoreClasses {
    pub basic_object: Value,
    pub object: Value,
    pub module: Value,
    pub class: Value,
    pub kernel: Value,
    pub comparable: Value,
    pub numeric: Value,
    pub integer: Value,
    pub float: Value,
    pub string: Value,
    pub symbol: Value,
    pub nil_class: Value,
    pub true_class: Value,
    pub false_class: Value,
    pub array: Value,
    pub hash: Value,
    pub proc_class: Value,
    pub data: Value,
    pub gc: Value,
    pub exception: Value,
    pub script_error: Value,
    pub not_implemented_error: Value,
    pub standard_error: Value,
    pub runtime_error: Value,
    pub argument_error: Value,
    pub uncaught_throw_error: Value,
    pub type_error: Value,
    pub name_error: Value,
    pub no_method_error: Value,
    pub range_error: Value,
    pub float_domain_error: Value,
    pub zero_division_error: Value,
    pub index_error: Value,
    pub key_error: Value,
    pub local_jump_error: Value,
}

impl CoreClasses {
    fn all(&self) -> [Value; 35] {
        [
            self.basic_object,
            self.object,
            self.module,
            self.class,
            self.kernel,
            self.comparable,
            self.numeric,
            self.integer,
            self.float,
            self.string,
            self.symbol,
            self.nil_class,
            self.true_class,
            self.false_class,
            self.array,
            self.hash,
            self.proc_class,
            self.data,
            self.gc,
            self.exception,
            self.script_error,
            self.not_implemented_error,
            self.standard_error,
            self.runtime_error,
            self.argument_error,
            self.uncaught_throw_error,
            self.type_error,
            self.name_error,
            self.no_method_error,
            self.range_error,
            self.float_domain_error,
            self.zero_division_error,
            self.index_error,
            self.key_error,
            self.local_jump_error,
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Top,
    Method,
    /// A host or proc block running; `break` returns to the `home` marker.
    Block { home: u64 },
    /// An iterator call that catches `break` aimed at `marker`.
    BlockCall { marker: u64 },
    Catch { marker: u64, tag: Value },
}

pub(crate) struct Frame {
    pub kind: FrameKind,
    pub self_value: Value,
    pub method: Option<Id>,
    pub owner: Value,
    pub block: Option<AttachedBlock>,
    pub args: Vec<Value>,
    pub kw_splat: bool,
    pub is_super: bool,
}

impl Frame {
    pub fn marker(kind: FrameKind, self_value: Value) -> Self {
        Self {
            kind,
            self_value,
            method: None,
            owner: Value::NIL,
            block: None,
            args: Vec::new(),
            kw_splat: false,
            is_super: false,
        }
    }
}

/// Per-thread execution context.
pub(crate) struct ExecStack {
    pub frames: Vec<Frame>,
    pub stack_roots: Vec<Value>,
    pub errinfo: Value,
}

impl ExecStack {
    fn new(top_self: Value) -> Self {
        Self {
            frames: vec![Frame::marker(FrameKind::Top, top_self)],
            stack_roots: Vec::new(),
            errinfo: Value::NIL,
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct RootAddr(pub *const Value);

pub(crate) enum GlobalKind {
    Plain,
    Virtual { readonly: bool },
}

pub(crate) struct GlobalEntry {
    pub value: Value,
    pub kind: GlobalKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Phase {
    Uninit,
    Running,
    TornDown,
}

/// Frequently used method and ivar names.
#[derive(Default, Clone, Copy)]
pub(crate) struct CoreIds {
    pub initialize: Id,
    pub mesg: Id,
    pub inspect: Id,
    pub to_s: Id,
    pub to_str: Id,
    pub to_int: Id,
    pub to_i: Id,
    pub to_f: Id,
    pub to_hash: Id,
    pub to_ary: Id,
    pub to_a: Id,
    pub eq: Id,
}

pub(crate) struct State {
    pub phase: Phase,
    pub heap: GuestHeap,
    pub symbols: SymbolTable,
    pub classes: CoreClasses,
    pub ids: CoreIds,
    pub top_self: Value,
    stacks: HashMap<ThreadId, ExecStack>,
    pub roots: Vec<RootAddr>,
    pub globals: HashMap<Id, GlobalEntry>,
    next_marker: u64,
    pub hierarchy_serial: u64,
}

// SAFETY: the raw pointers held here (registered root addresses, Data
// payloads, opaque block contexts) are only dereferenced while the GVL is held,
// and the state itself is only reached through the reentrant lock below. The
// host values behind payloads and contexts refuse every thread but their own.
unsafe impl Send for State {}

static STATE: Lazy<ReentrantMutex<RefCell<State>>> =
    Lazy::new(|| ReentrantMutex::new(RefCell::new(State::new())));

/// Runs `f` with exclusive access to the interpreter state.
///
/// `f` must not call back into anything that takes the state again: guest
/// functions that run methods, blocks or host callbacks release it first.
pub(crate) fn with_state<R>(f: impl FnOnce(&mut State) -> R) -> R {
    let guard = STATE.lock();
    let mut state = guard.borrow_mut();
    f(&mut state)
}

impl State {
    fn new() -> Self {
        Self {
            phase: Phase::Uninit,
            heap: GuestHeap::new(),
            symbols: SymbolTable::new(),
            classes: CoreClasses::default(),
            ids: CoreIds::default(),
            top_self: Value::NIL,
            stacks: HashMap::new(),
            roots: Vec::new(),
            globals: HashMap::new(),
            next_marker: 1,
            hierarchy_serial: 0,
        }
    }

    pub fn alloc(&mut self, klass: Value, body: ObjectBody) -> Value {
        self.heap.alloc(HeapObject::new(klass, body))
    }

    pub fn obj(&self, value: Value) -> Option<&HeapObject> {
        self.heap.get(value)
    }

    pub fn obj_mut(&mut self, value: Value) -> Option<&mut HeapObject> {
        self.heap.get_mut(value)
    }

    pub fn class_body(&self, value: Value) -> Option<&ClassBody> {
        match &self.obj(value)?.body {
            ObjectBody::Class(body) => Some(body),
            _ => None,
        }
    }

    pub fn class_body_mut(&mut self, value: Value) -> Option<&mut ClassBody> {
        match &mut self.obj_mut(value)?.body {
            ObjectBody::Class(body) => Some(body),
            _ => None,
        }
    }

    /// The class used for method lookup, singleton classes included.
    pub fn class_of(&self, value: Value) -> Value {
        let c = &self.classes;
        match value {
            Value::NIL => c.nil_class,
            Value::TRUE => c.true_class,
            Value::FALSE => c.false_class,
            v if v.is_fixnum() => c.integer,
            v if v.is_symbol() => c.symbol,
            v => match self.obj(v) {
                Some(object) => object.klass,
                None => c.basic_object,
            },
        }
    }

    pub fn intern(&mut self, name: &str) -> Id {
        self.symbols.intern(name)
    }

    pub fn id_name(&self, id: Id) -> String {
        self.symbols.name(id).unwrap_or("?").to_string()
    }

    pub fn new_string(&mut self, text: &str) -> Value {
        let klass = self.classes.string;
        self.alloc(klass, ObjectBody::String(text.to_string()))
    }

    pub fn new_exception(&mut self, class: Value, message: &str) -> Value {
        let mesg = self.new_string(message);
        let exception = self.alloc(class, ObjectBody::Plain);
        let mesg_id = self.ids.mesg;
        if let Some(object) = self.obj_mut(exception) {
            object.ivars.insert(mesg_id, mesg);
        }
        exception
    }

    pub fn value_type(&self, value: Value) -> ValueType {
        match value {
            Value::NIL => ValueType::Nil,
            Value::TRUE => ValueType::True,
            Value::FALSE => ValueType::False,
            Value::UNDEF => ValueType::Undef,
            v if v.is_fixnum() => ValueType::Fixnum,
            v if v.is_symbol() => ValueType::Symbol,
            v => match self.obj(v).map(|o| &o.body) {
                Some(ObjectBody::Plain) => ValueType::Object,
                Some(ObjectBody::Class(body)) => match body.kind {
                    ClassKind::Module => ValueType::Module,
                    _ => ValueType::Class,
                },
                Some(ObjectBody::String(_)) => ValueType::String,
                Some(ObjectBody::Float(_)) => ValueType::Float,
                Some(ObjectBody::Bignum(_)) => ValueType::Bignum,
                Some(ObjectBody::Array(_)) => ValueType::Array,
                Some(ObjectBody::Hash(_)) => ValueType::Hash,
                Some(ObjectBody::Proc(_)) => ValueType::Proc,
                Some(ObjectBody::Data(_)) => ValueType::Data,
                Some(ObjectBody::ThrowData(_)) => ValueType::ThrowData,
                None => ValueType::Undef,
            },
        }
    }

    pub fn next_marker(&mut self) -> u64 {
        let marker = self.next_marker;
        self.next_marker += 1;
        marker
    }

    pub fn bump_serial(&mut self) {
        self.hierarchy_serial += 1;
    }

    /// Execution context of the calling thread.
    pub fn stack(&mut self) -> &mut ExecStack {
        let top_self = self.top_self;
        self.stacks
            .entry(thread::current().id())
            .or_insert_with(|| ExecStack::new(top_self))
    }

    pub fn frames(&mut self) -> &mut Vec<Frame> {
        &mut self.stack().frames
    }

    /// Nearest frame that belongs to a method call.
    pub fn method_frame(&mut self) -> Option<&Frame> {
        self.stack()
            .frames
            .iter()
            .rev()
            .find(|f| f.kind == FrameKind::Method)
    }

    pub fn marker_is_live(&mut self, marker: u64) -> bool {
        self.stack().frames.iter().any(|f| match f.kind {
            FrameKind::BlockCall { marker: m } | FrameKind::Catch { marker: m, .. } => m == marker,
            _ => false,
        })
    }

    fn gc_roots(&self) -> Vec<Value> {
        let mut roots = Vec::with_capacity(64);
        roots.extend(self.classes.all());
        roots.push(self.top_self);
        for stack in self.stacks.values() {
            roots.push(stack.errinfo);
            roots.extend(stack.stack_roots.iter().copied());
            for frame in &stack.frames {
                roots.push(frame.self_value);
                roots.push(frame.owner);
                roots.extend(frame.args.iter().copied());
                if let FrameKind::Catch { tag, .. } = frame.kind {
                    roots.push(tag);
                }
                if let Some(block) = frame.block {
                    match block.handler {
                        BlockHandler::Context(v) | BlockHandler::Proc(v) => roots.push(v),
                        BlockHandler::Pointer(_) => {}
                    }
                }
            }
        }
        for entry in self.globals.values() {
            roots.push(entry.value);
        }
        for root in &self.roots {
            // SAFETY: registered addresses stay valid until unregistered.
            roots.push(unsafe { *root.0 });
        }
        roots
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StackMark {
    frames: usize,
    stack_roots: usize,
}

pub(crate) fn stack_mark() -> StackMark {
    with_state(|s| {
        let stack = s.stack();
        StackMark {
            frames: stack.frames.len(),
            stack_roots: stack.stack_roots.len(),
        }
    })
}

/// Drops every frame and temporary root pushed after `mark`.
pub(crate) fn restore_stack(mark: StackMark) {
    with_state(|s| {
        let stack = s.stack();
        stack.frames.truncate(mark.frames);
        stack.stack_roots.truncate(mark.stack_roots);
    })
}

pub(crate) fn push_frame(frame: Frame) {
    with_state(|s| s.frames().push(frame))
}

pub(crate) fn pop_frame() {
    with_state(|s| {
        s.frames().pop();
    })
}

/// Forgets the execution context of the calling thread.
pub(crate) fn drop_thread_stack() {
    with_state(|s| {
        s.stacks.remove(&thread::current().id());
    })
}

/// Collector settings applied at setup.
#[derive(Debug, Clone, Copy)]
pub struct SetupOptions {
    pub gc_enabled: bool,
    pub gc_threshold: usize,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            gc_enabled: true,
            gc_threshold: 10_000,
        }
    }
}

/// Boots the interpreter on the calling thread, which becomes its main
/// thread and takes the GVL.
///
/// Calling it again while running is a no-op. The interpreter cannot be
/// restarted after [`cleanup`].
pub fn setup(options: SetupOptions) -> Result<(), String> {
    let booted = with_state(|s| match s.phase {
        Phase::Running => Ok(false),
        Phase::TornDown => Err("interpreter cannot be restarted after cleanup".to_string()),
        Phase::Uninit => {
            s.heap.set_enabled(options.gc_enabled);
            s.heap.set_threshold(options.gc_threshold);
            class::bootstrap(s);
            builtins::install(s);
            s.phase = Phase::Running;
            Ok(true)
        }
    })?;
    if booted {
        gvl::register_main_thread();
        gvl::gvl_acquire();
    }
    Ok(())
}

/// Tears the interpreter down, running every outstanding Data free hook.
pub fn cleanup() -> Result<(), String> {
    let finalizers = with_state(|s| {
        if s.phase != Phase::Running {
            return Err("interpreter is not running".to_string());
        }
        s.phase = Phase::TornDown;
        s.stacks.clear();
        s.globals.clear();
        Ok(s.heap.drain_finalizers())
    })?;
    run_finalizers(finalizers);
    gvl::gvl_release();
    Ok(())
}

pub fn is_running() -> bool {
    with_state(|s| s.phase == Phase::Running)
}

pub fn intern(name: &str) -> Id {
    with_state(|s| s.intern(name))
}

pub fn id_name(id: Id) -> String {
    with_state(|s| s.id_name(id))
}

pub fn core_classes() -> CoreClasses {
    with_state(|s| s.classes)
}

pub fn top_self() -> Value {
    with_state(|s| s.top_self)
}

fn run_finalizers(finalizers: Vec<Finalizer>) {
    for finalizer in finalizers {
        match finalizer {
            Finalizer::Free(free, ptr) => free(ptr),
            Finalizer::Bound(class_name, ptr) => helpers::run_bound_free(&class_name, ptr),
        }
    }
}

/// Runs a full collection.
pub fn gc_start() {
    let finalizers = with_state(|s| {
        if s.phase != Phase::Running {
            return Vec::new();
        }
        let roots = s.gc_roots();
        s.heap.collect(&roots)
    });
    run_finalizers(finalizers);
}

/// Collects if the allocation threshold was reached and the calling thread
/// is not inside any guest call.
pub fn maybe_collect() {
    let due = with_state(|s| s.heap.should_collect() && s.stack().frames.len() == 1);
    if due {
        gc_start();
    }
}

/// Registers the address of a value slot as a collector root.
pub fn gc_register_address(address: *const Value) {
    with_state(|s| s.roots.push(RootAddr(address)))
}

/// Removes one registration of `address`.
pub fn gc_unregister_address(address: *const Value) {
    with_state(|s| {
        if let Some(pos) = s.roots.iter().position(|r| std::ptr::eq(r.0, address)) {
            s.roots.swap_remove(pos);
        }
    })
}

pub fn gc_root_count() -> usize {
    with_state(|s| s.roots.len())
}

pub fn heap_live_count() -> usize {
    with_state(|s| s.heap.live_count())
}

pub fn gc_count() -> usize {
    with_state(|s| s.heap.total_collections())
}
