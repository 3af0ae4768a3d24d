//! Callback dispatch registry.
//!
//! One process-wide table maps call sites to host closures. The interpreter
//! reaches it through one native trampoline per callback kind, installed
//! into the guest helper layer on first use.

mod args;
mod binding;
mod block;
mod gvar;
mod method;
pub(crate) mod names;
mod outcome;
mod owner;

#[cfg(test)]
mod args_test;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Once};

use log::debug;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};

use crate::error::BridgeError;
use crate::guest::helpers::{self, MethodId};
use crate::guest::{self, Id, Value};
use crate::protect::{self, Job, MethodTarget};
use crate::value::RbObject;

pub use args::{ArgsSpec, MethodArgs};
pub use block::{BlockContext, break_out, live_contexts};
pub(crate) use binding::BoundPayload;
pub(crate) use outcome::panic_message;
pub(crate) use owner::{Owned, run_deferred};

pub type MethodFn = dyn Fn(&RbObject, &MethodArgs) -> Result<RbObject, BridgeError>;
pub type GlobalGetter = dyn Fn() -> Result<RbObject, BridgeError>;
pub type GlobalSetter = dyn Fn(&RbObject) -> Result<(), BridgeError>;

/// Registry key: the class or module whose method table holds a helper
/// method, and the method name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub target: Value,
    pub method: Id,
}

impl From<MethodId> for CallSite {
    fn from(id: MethodId) -> Self {
        Self {
            target: id.target,
            method: id.method.symbol_id().unwrap_or_default(),
        }
    }
}

struct MethodBody {
    spec: ArgsSpec,
    closure: Box<MethodFn>,
}

/// A registered host method.
///
/// Entries can be looked up from any interpreter thread, but the argument
/// spec and the closure are only reachable on the thread that registered
/// them. Elsewhere both accessors fail with [`BridgeError::Gvl`], which the
/// interpreter sees as a `RuntimeError`.
#[derive(Clone)]
pub struct MethodEntry {
    pub name: String,
    body: Arc<Owned<MethodBody>>,
}

impl MethodEntry {
    pub fn spec(&self) -> Result<&ArgsSpec, BridgeError> {
        Ok(&self.body.get()?.spec)
    }

    pub fn invoke(&self, receiver: &RbObject, args: &MethodArgs) -> Result<RbObject, BridgeError> {
        (self.body.get()?.closure)(receiver, args)
    }

    pub fn same_closure(&self, other: &MethodEntry) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("owner", &self.body.owner())
            .finish_non_exhaustive()
    }
}

struct GlobalHooks {
    getter: Box<GlobalGetter>,
    setter: Option<Box<GlobalSetter>>,
}

#[derive(Clone)]
struct GlobalEntry(Arc<Owned<GlobalHooks>>);

struct BindingFns {
    allocate: Box<dyn Fn() -> Box<dyn Any>>,
    release: Box<dyn Fn(Box<dyn Any>)>,
}

#[derive(Clone)]
struct BindingHooks(Arc<Owned<BindingFns>>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Lookups that searched the ancestry chain.
    pub walks: u64,
    pub cache_hits: u64,
}

#[derive(Default)]
struct Tables {
    methods: HashMap<CallSite, MethodEntry>,
    /// (chain head, method) to the ancestor that answered it.
    cache: HashMap<(Value, Id), Value>,
    cache_serial: u64,
    globals: HashMap<Id, GlobalEntry>,
    bindings: HashMap<String, BindingHooks>,
    stats: DispatchStats,
}

static TABLES: Lazy<Mutex<Tables>> = Lazy::new(|| Mutex::new(Tables::default()));
static TRAMPOLINES: Once = Once::new();

fn tables() -> MutexGuard<'static, Tables> {
    TABLES.lock()
}

/// Runs `job`, then `record` on the tables. A failing job records nothing.
fn record_after(job: Job<'_>, record: impl FnOnce(&mut Tables)) -> Result<(), BridgeError> {
    protect::protect(job)?;
    record(&mut tables());
    Ok(())
}

/// Facade over the process-wide dispatch tables.
pub struct Registry;

impl Registry {
    /// Installs every trampoline into the helper layer. Runs once per
    /// process; later calls do nothing.
    pub fn register_block_trampolines() {
        TRAMPOLINES.call_once(|| {
            helpers::set_method_callback(method::method_trampoline);
            helpers::set_pvoid_block_callback(block::pointer_block_trampoline);
            helpers::set_value_block_callback(block::value_block_trampoline);
            helpers::set_gvar_callbacks(gvar::getter_trampoline, gvar::setter_trampoline);
            helpers::set_bind_callbacks(binding::allocate_trampoline, binding::release_trampoline);
            debug!("dispatch trampolines installed");
        });
    }

    /// Defines `name` on `Kernel`, callable from anywhere.
    pub fn register_global_function<F>(name: &str, spec: ArgsSpec, closure: F) -> Result<CallSite, BridgeError>
    where
        F: Fn(&RbObject, &MethodArgs) -> Result<RbObject, BridgeError> + 'static,
    {
        Self::register_method(MethodTarget::Global, name, spec, Box::new(closure))
    }

    pub fn register_instance_method<F>(
        class: &RbObject,
        name: &str,
        spec: ArgsSpec,
        closure: F,
    ) -> Result<CallSite, BridgeError>
    where
        F: Fn(&RbObject, &MethodArgs) -> Result<RbObject, BridgeError> + 'static,
    {
        protect::guard()?;
        if !guest::class::is_class_or_module(class.value()) {
            return Err(BridgeError::bad_type(
                "Class or Module",
                guest::class::obj_classname(class.value()),
            ));
        }
        Self::register_method(MethodTarget::Instance(class.value()), name, spec, Box::new(closure))
    }

    /// Defines `name` on the singleton class of `object`. On a class this is
    /// a class method, inherited by subclasses.
    pub fn register_singleton_method<F>(
        object: &RbObject,
        name: &str,
        spec: ArgsSpec,
        closure: F,
    ) -> Result<CallSite, BridgeError>
    where
        F: Fn(&RbObject, &MethodArgs) -> Result<RbObject, BridgeError> + 'static,
    {
        let value = object.value();
        if value.is_fixnum() || value.is_symbol() {
            return Err(BridgeError::bad_type("object with a singleton class", format!("{:?}", value)));
        }
        Self::register_method(MethodTarget::Singleton(value), name, spec, Box::new(closure))
    }

    fn register_method(
        target: MethodTarget,
        name: &str,
        spec: ArgsSpec,
        closure: Box<MethodFn>,
    ) -> Result<CallSite, BridgeError> {
        names::check_method_name(name)?;
        protect::guard()?;
        Self::register_block_trampolines();
        let site = CallSite::from(protect::protect(Job::DefineMethod { target, name })?.into_method()?);
        let mut tables = tables();
        tables.methods.insert(
            site,
            MethodEntry {
                name: name.to_string(),
                body: Arc::new(Owned::new(MethodBody { spec, closure })),
            },
        );
        tables.cache.clear();
        debug!("registered method '{}' on {:?}", name, site.target);
        Ok(site)
    }

    /// Declares a global backed by host accessors. Without a setter the
    /// global is read-only.
    pub fn register_virtual_global<G>(
        name: &str,
        getter: G,
        setter: Option<Box<GlobalSetter>>,
    ) -> Result<(), BridgeError>
    where
        G: Fn() -> Result<RbObject, BridgeError> + 'static,
    {
        names::check_global_name(name)?;
        protect::guard()?;
        Self::register_block_trampolines();
        let id = crate::value::intern(name)?;
        let readonly = setter.is_none();
        let hooks = GlobalHooks {
            getter: Box::new(getter),
            setter,
        };
        record_after(Job::DefineVirtualGlobal { name, readonly }, |tables| {
            tables.globals.insert(id, GlobalEntry(Arc::new(Owned::new(hooks))));
        })?;
        debug!("registered virtual global {} (readonly: {})", name, readonly);
        Ok(())
    }

    /// Makes instances of `class` (and its subclasses) carry a host `T`
    /// built by `allocator` and handed to `deallocator` exactly once when
    /// the instance is freed.
    pub fn register_bound_object_hooks<T, A, D>(class: &RbObject, allocator: A, deallocator: D) -> Result<(), BridgeError>
    where
        T: 'static,
        A: Fn() -> T + 'static,
        D: Fn(T) + 'static,
    {
        protect::guard()?;
        if !guest::class::is_class_or_module(class.value()) {
            return Err(BridgeError::bad_type("Class", guest::class::obj_classname(class.value())));
        }
        Self::register_block_trampolines();
        let class_name = guest::class::class_name(class.value());
        let hooks = BindingFns {
            allocate: Box::new(move || Box::new(allocator()) as Box<dyn Any>),
            release: Box::new(move |payload: Box<dyn Any>| {
                if let Ok(payload) = payload.downcast::<T>() {
                    deallocator(*payload);
                }
            }),
        };
        let key = class_name.clone();
        record_after(Job::BindClass(class.value()), |tables| {
            tables.bindings.insert(key, BindingHooks(Arc::new(Owned::new(hooks))));
        })?;
        debug!("registered bound object hooks for {}", class_name);
        Ok(())
    }

    /// Runs `site.method` the way the interpreter would: the receiver's
    /// ancestry (its singleton class first, when it has one) is searched
    /// nearest first, so an override below `site.target` wins.
    pub fn dispatch(
        site: CallSite,
        receiver: &RbObject,
        args: &[Value],
        kw_given: bool,
        block_given: bool,
    ) -> Result<RbObject, BridgeError> {
        protect::guard()?;
        let chain = guest::class::ancestors(guest::class::class_of(receiver.value()));
        method::dispatch_chain(site.method, &chain, receiver, args, kw_given, block_given)
    }

    /// Cached lookup of `method` along `chain`, nearest first.
    pub fn lookup(chain: &[Value], method: Id) -> Option<MethodEntry> {
        method::lookup(chain, method)
    }

    /// The same search without touching the cache or the statistics.
    pub fn lookup_uncached(chain: &[Value], method: Id) -> Option<MethodEntry> {
        let tables = tables();
        chain
            .iter()
            .find_map(|&target| tables.methods.get(&CallSite { target, method }).cloned())
    }

    pub fn entry(site: CallSite) -> Option<MethodEntry> {
        tables().methods.get(&site).cloned()
    }

    pub fn stats() -> DispatchStats {
        tables().stats
    }

    pub fn cached_targets() -> usize {
        tables().cache.len()
    }
}

/// Calls the next definition of the running host method.
pub fn call_super(args: &[RbObject]) -> Result<RbObject, BridgeError> {
    let args = crate::value::values(args);
    protect::protect_object(Job::CallSuper(&args))
}
