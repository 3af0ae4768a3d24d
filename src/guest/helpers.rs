//! Helper layer between the interpreter and an embedding host.
//!
//! The host installs one callback per kind. Every helper method, host block,
//! virtual global and bound class is routed through these slots, and the
//! callback reports its outcome in a [`ReturnValue`] that the helper applies
//! once the callback has returned.

use std::ffi::{CStr, CString, c_char, c_int, c_long, c_void};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::call::{self, iter_break_value};
use super::class::{self, define_method_def, set_allocator, singleton_class_of};
use super::convert;
use super::gvar;
use super::jump::{self, Tag, check};
use super::object::{Allocator, BlockHandler, DataBody, DataFreeFn, DataKind, MethodBody, MethodDef, ObjectBody};
use super::state::with_state;
use super::value::{Id, Value};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnType {
    Value,
    Raise,
    Break,
    BreakValue,
    /// Re-issue a jump; `value` holds the tag number as a fixnum.
    Jump,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ReturnValue {
    pub kind: ReturnType,
    pub value: Value,
}

impl Default for ReturnValue {
    fn default() -> Self {
        Self {
            kind: ReturnType::Value,
            value: Value::NIL,
        }
    }
}

pub type MethodCall = extern "C" fn(
    symbol: Value,
    target_count: c_long,
    targets: *const Value,
    recv: Value,
    argc: c_int,
    argv: *const Value,
    rv: *mut ReturnValue,
);
pub type PvoidBlockCall =
    extern "C" fn(ctx: *mut c_void, argc: c_int, argv: *const Value, blockarg: Value, rv: *mut ReturnValue);
pub type ValueBlockCall =
    extern "C" fn(ctx: Value, argc: c_int, argv: *const Value, blockarg: Value, rv: *mut ReturnValue);
pub type GvarGetter = extern "C" fn(name: Value, rv: *mut ReturnValue);
pub type GvarSetter = extern "C" fn(name: Value, new_value: Value, rv: *mut ReturnValue);
pub type BindAllocator = extern "C" fn(class_name: *const c_char) -> *mut c_void;
pub type BindDeallocator = extern "C" fn(class_name: *const c_char, ptr: *mut c_void);

#[derive(Default, Clone, Copy)]
struct Callbacks {
    method: Option<MethodCall>,
    pvoid_block: Option<PvoidBlockCall>,
    value_block: Option<ValueBlockCall>,
    gvar_get: Option<GvarGetter>,
    gvar_set: Option<GvarSetter>,
    bind_alloc: Option<BindAllocator>,
    bind_free: Option<BindDeallocator>,
}

static CALLBACKS: Lazy<RwLock<Callbacks>> = Lazy::new(|| RwLock::new(Callbacks::default()));

pub fn set_method_callback(func: MethodCall) {
    CALLBACKS.write().method = Some(func);
}

pub fn set_pvoid_block_callback(func: PvoidBlockCall) {
    CALLBACKS.write().pvoid_block = Some(func);
}

pub fn set_value_block_callback(func: ValueBlockCall) {
    CALLBACKS.write().value_block = Some(func);
}

pub fn set_gvar_callbacks(getter: GvarGetter, setter: GvarSetter) {
    let mut slots = CALLBACKS.write();
    slots.gvar_get = Some(getter);
    slots.gvar_set = Some(setter);
}

pub fn set_bind_callbacks(allocator: BindAllocator, deallocator: BindDeallocator) {
    let mut slots = CALLBACKS.write();
    slots.bind_alloc = Some(allocator);
    slots.bind_free = Some(deallocator);
}

fn missing_callback(kind: &str) -> ! {
    let class = with_state(|s| s.classes.not_implemented_error);
    jump::raise_new(class, &format!("no {} callback installed", kind))
}

/// Applies a callback outcome: returns the value or performs the jump.
pub(crate) fn apply_return(rv: ReturnValue) -> Value {
    match rv.kind {
        ReturnType::Value => rv.value,
        ReturnType::Raise => jump::raise(rv.value),
        ReturnType::Break => iter_break_value(Value::NIL),
        ReturnType::BreakValue => iter_break_value(rv.value),
        ReturnType::Jump => {
            let tag = Tag::from_status(rv.value.fix2long() as i32).unwrap_or(Tag::Fatal);
            jump::jump_tag(tag)
        }
    }
}

pub(crate) fn call_method_helper(method: Id, targets: &[Value], recv: Value, args: &[Value]) -> Value {
    let Some(func) = CALLBACKS.read().method else {
        missing_callback("method")
    };
    let mut rv = ReturnValue::default();
    func(
        Value::from_id(method),
        targets.len() as c_long,
        targets.as_ptr(),
        recv,
        args.len() as c_int,
        args.as_ptr(),
        &mut rv,
    );
    apply_return(rv)
}

pub(crate) fn call_block_pvoid(ctx: *mut c_void, args: &[Value], blockarg: Value) -> Value {
    let Some(func) = CALLBACKS.read().pvoid_block else {
        missing_callback("block")
    };
    let mut rv = ReturnValue::default();
    func(ctx, args.len() as c_int, args.as_ptr(), blockarg, &mut rv);
    apply_return(rv)
}

pub(crate) fn call_block_value(ctx: Value, args: &[Value], blockarg: Value) -> Value {
    let Some(func) = CALLBACKS.read().value_block else {
        missing_callback("block")
    };
    let mut rv = ReturnValue::default();
    func(ctx, args.len() as c_int, args.as_ptr(), blockarg, &mut rv);
    apply_return(rv)
}

pub(crate) fn call_gvar_getter(id: Id) -> Value {
    let Some(func) = CALLBACKS.read().gvar_get else {
        missing_callback("global variable")
    };
    let mut rv = ReturnValue::default();
    func(Value::from_id(id), &mut rv);
    apply_return(rv)
}

pub(crate) fn call_gvar_setter(id: Id, value: Value) {
    let Some(func) = CALLBACKS.read().gvar_set else {
        missing_callback("global variable")
    };
    let mut rv = ReturnValue::default();
    func(Value::from_id(id), value, &mut rv);
    apply_return(rv);
}

/// A registered helper method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MethodId {
    /// Method name as a Symbol.
    pub method: Value,
    /// Class or module whose method table holds the definition.
    pub target: Value,
}

fn define_helper(target: Value, name: &str) -> MethodId {
    with_state(|s| {
        let id = s.intern(name);
        define_method_def(
            s,
            target,
            id,
            MethodDef {
                body: MethodBody::Helper,
                arity: -1,
            },
        );
        s.bump_serial();
        MethodId {
            method: Value::from_id(id),
            target,
        }
    })
}

/// Defines `name` on `Kernel`, callable from anywhere.
pub fn define_global_function(name: &str) -> MethodId {
    let kernel = with_state(|s| s.classes.kernel);
    define_helper(kernel, name)
}

pub fn define_method(klass: Value, name: &str) -> MethodId {
    if !class::is_class_or_module(klass) {
        let class = with_state(|s| s.classes.type_error);
        jump::raise_new(class, "method target is not a class or module");
    }
    define_helper(klass, name)
}

/// Defines `name` on the singleton class of `object`.
pub fn define_singleton_method(object: Value, name: &str) -> MethodId {
    let meta = check(with_state(|s| singleton_class_of(s, object)));
    define_helper(meta, name)
}

/// Calls `method` with a host block whose context is an opaque pointer.
pub fn block_call_pvoid(recv: Value, method: Id, args: &[Value], ctx: *mut c_void, kw_splat: bool) -> Value {
    call::block_call(recv, method, args, BlockHandler::Pointer(ctx), kw_splat)
}

/// Calls `method` with a host block whose context is an interpreter value.
pub fn block_call_value(recv: Value, method: Id, args: &[Value], ctx: Value, kw_splat: bool) -> Value {
    call::block_call(recv, method, args, BlockHandler::Context(ctx), kw_splat)
}

/// A proc run through the value-block callback with `ctx`.
pub fn proc_new_value(ctx: Value) -> Value {
    call::proc_new(BlockHandler::Context(ctx))
}

pub fn create_virtual_gvar(name: &str, readonly: bool) {
    gvar::define_virtual(name, readonly)
}

/// Makes instances of `klass` and its subclasses bound objects.
pub fn bind_class(klass: Value) {
    let name = class::class_name(klass);
    let name = CString::new(name).unwrap_or_default();
    with_state(|s| set_allocator(s, klass, Allocator::Bound(name)));
}

pub(crate) fn bound_allocate(klass: Value, class_name: CString) -> Value {
    let Some(func) = CALLBACKS.read().bind_alloc else {
        missing_callback("bound object")
    };
    let ptr = func(class_name.as_ptr());
    if ptr.is_null() {
        let class = with_state(|s| s.classes.runtime_error);
        jump::raise_new(
            class,
            &format!("allocator for {} returned null", class_name.to_string_lossy()),
        );
    }
    with_state(|s| {
        s.alloc(
            klass,
            ObjectBody::Data(DataBody {
                ptr,
                kind: DataKind::Bound { class_name },
            }),
        )
    })
}

pub(crate) fn run_bound_free(class_name: &CStr, ptr: *mut c_void) {
    if let Some(func) = CALLBACKS.read().bind_free {
        func(class_name.as_ptr(), ptr);
    }
}

/// Payload and bound class name of a bound object.
pub fn get_bound_object(value: Value) -> Option<(String, *mut c_void)> {
    with_state(|s| match s.obj(value).map(|o| &o.body) {
        Some(ObjectBody::Data(DataBody {
            ptr,
            kind: DataKind::Bound { class_name },
        })) if !ptr.is_null() => Some((class_name.to_string_lossy().into_owned(), *ptr)),
        _ => None,
    })
}

/// Wraps `ptr` in a Data object whose sweep calls `free`.
pub fn data_wrap(ptr: *mut c_void, free: Option<DataFreeFn>) -> Value {
    with_state(|s| {
        let klass = s.classes.data;
        s.alloc(
            klass,
            ObjectBody::Data(DataBody {
                ptr,
                kind: DataKind::Plain { free },
            }),
        )
    })
}

pub fn data_get(value: Value) -> Option<*mut c_void> {
    with_state(|s| match s.obj(value).map(|o| &o.body) {
        Some(ObjectBody::Data(data)) => Some(data.ptr),
        _ => None,
    })
}

/// Keyword-hash detection for a trailing argument.
///
/// Returns the hash (or `nil`), whether the argument converts to a hash, and
/// whether every key is a Symbol.
pub fn scan_arg_hash(last: Value) -> (Value, bool, bool) {
    match convert::check_hash_type(last) {
        Some(hash) => {
            let all_symbols = convert::hash_entries(hash)
                .unwrap_or_default()
                .iter()
                .all(|(k, _)| k.is_symbol());
            (hash, true, all_symbols)
        }
        None => (Value::NIL, false, false),
    }
}

/// Raises the interpreter's own arity error. A negative `max` means no
/// upper bound.
pub fn error_arity(given: usize, min: i32, max: i32) -> ! {
    jump::raise_failure(call::arity_failure(given, min, max))
}
