use std::ffi::c_void;
use std::fmt;

use crate::error::BridgeError;
use crate::guest::helpers::{self, MethodId};
use crate::guest::{self, Id, Value, call, class, convert, gvar};

use super::numeric;

/// How a module is attached by [`Job::InjectModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    Include,
    Prepend,
    Extend,
}

/// Where [`Job::DefineMethod`] puts a helper method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodTarget {
    /// `Kernel`, callable from anywhere.
    Global,
    Instance(Value),
    Singleton(Value),
}

/// One unit of work run under [`protect`](super::protect).
#[derive(Debug, Clone, Copy)]
pub enum Job<'a> {
    Intern(&'a str),
    ConstGet {
        scope: Value,
        name: Id,
    },
    ConstGetAt {
        scope: Value,
        name: Id,
    },
    ConstSet {
        scope: Value,
        name: Id,
        value: Value,
    },
    Funcall {
        recv: Value,
        method: Id,
        args: &'a [Value],
        kw_splat: bool,
    },
    BlockCall {
        recv: Value,
        method: Id,
        args: &'a [Value],
        ctx: *mut c_void,
        kw_splat: bool,
    },
    BlockCallValue {
        recv: Value,
        method: Id,
        args: &'a [Value],
        ctx: Value,
        kw_splat: bool,
    },
    Yield(&'a [Value]),
    ProcNew(Value),
    ProcCall {
        proc_value: Value,
        args: &'a [Value],
        blockarg: Value,
    },
    CvarGet {
        class: Value,
        name: Id,
    },
    CvarSet {
        class: Value,
        name: Id,
        value: Value,
    },
    GlobalGet(&'a str),
    GlobalSet {
        name: &'a str,
        value: Value,
    },
    ToLong(Value),
    ToULong(Value),
    ToDouble(Value),
    ToString(Value),
    ToArray(Value),
    ToHash(Value),
    Inspect(Value),
    /// Always fails with the interpreter's own `ArgumentError`. A negative
    /// `max` means unbounded.
    ErrorArity {
        given: usize,
        min: i32,
        max: i32,
    },
    ScanArgHash(Value),
    DefineClass {
        outer: Value,
        name: &'a str,
        superclass: Value,
    },
    DefineModule {
        outer: Value,
        name: &'a str,
    },
    InjectModule {
        target: Value,
        module: Value,
        mode: Injection,
    },
    CallSuper(&'a [Value]),
    Break(Value),
    DefineMethod {
        target: MethodTarget,
        name: &'a str,
    },
    DefineVirtualGlobal {
        name: &'a str,
        readonly: bool,
    },
    BindClass(Value),
}

/// Result of a job that finished without jumping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JobOutput {
    Unit,
    Value(Value),
    Id(Id),
    Long(i64),
    ULong(u64),
    Double(f64),
    ArgHash {
        hash: Value,
        is_hash: bool,
        all_symbols: bool,
    },
    Method(MethodId),
}

impl JobOutput {
    fn kind(&self) -> &'static str {
        match self {
            JobOutput::Unit => "unit",
            JobOutput::Value(_) => "value",
            JobOutput::Id(_) => "id",
            JobOutput::Long(_) => "long",
            JobOutput::ULong(_) => "unsigned long",
            JobOutput::Double(_) => "double",
            JobOutput::ArgHash { .. } => "argument hash",
            JobOutput::Method(_) => "method",
        }
    }

    fn mismatch(&self, expected: &str) -> BridgeError {
        BridgeError::bad_type(expected, self.kind())
    }

    pub fn into_value(self) -> Result<Value, BridgeError> {
        match self {
            JobOutput::Value(value) => Ok(value),
            other => Err(other.mismatch("value")),
        }
    }

    pub fn into_id(self) -> Result<Id, BridgeError> {
        match self {
            JobOutput::Id(id) => Ok(id),
            other => Err(other.mismatch("id")),
        }
    }

    pub fn into_long(self) -> Result<i64, BridgeError> {
        match self {
            JobOutput::Long(n) => Ok(n),
            other => Err(other.mismatch("long")),
        }
    }

    pub fn into_ulong(self) -> Result<u64, BridgeError> {
        match self {
            JobOutput::ULong(n) => Ok(n),
            other => Err(other.mismatch("unsigned long")),
        }
    }

    pub fn into_double(self) -> Result<f64, BridgeError> {
        match self {
            JobOutput::Double(f) => Ok(f),
            other => Err(other.mismatch("double")),
        }
    }

    pub fn into_method(self) -> Result<MethodId, BridgeError> {
        match self {
            JobOutput::Method(method) => Ok(method),
            other => Err(other.mismatch("method")),
        }
    }
}

impl fmt::Display for JobOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Job and result slot shared with [`job_trampoline`] through a raw address.
pub(super) struct JobFrame<'a> {
    pub job: Option<Job<'a>>,
    pub output: JobOutput,
}

/// The single function every job runs through inside the guest's `protect`.
pub(super) extern "C-unwind" fn job_trampoline(data: Value) -> Value {
    // SAFETY: `data` is the address of a `JobFrame` owned by the `protect`
    // call that is waiting for this function to return.
    let frame = unsafe { &mut *(data.to_raw() as usize as *mut JobFrame<'_>) };
    if let Some(job) = frame.job.take() {
        frame.output = run(job);
    }
    Value::NIL
}

fn run(job: Job<'_>) -> JobOutput {
    match job {
        Job::Intern(name) => JobOutput::Id(guest::intern(name)),
        Job::ConstGet { scope, name } => JobOutput::Value(class::const_get(scope, name)),
        Job::ConstGetAt { scope, name } => JobOutput::Value(class::const_get_at(scope, name)),
        Job::ConstSet { scope, name, value } => {
            class::const_set(scope, name, value);
            JobOutput::Unit
        }
        Job::Funcall {
            recv,
            method,
            args,
            kw_splat,
        } => JobOutput::Value(call::funcall_kw(recv, method, args, kw_splat)),
        Job::BlockCall {
            recv,
            method,
            args,
            ctx,
            kw_splat,
        } => JobOutput::Value(helpers::block_call_pvoid(recv, method, args, ctx, kw_splat)),
        Job::BlockCallValue {
            recv,
            method,
            args,
            ctx,
            kw_splat,
        } => JobOutput::Value(helpers::block_call_value(recv, method, args, ctx, kw_splat)),
        Job::Yield(args) => JobOutput::Value(call::yield_values(args)),
        Job::ProcNew(ctx) => JobOutput::Value(helpers::proc_new_value(ctx)),
        Job::ProcCall {
            proc_value,
            args,
            blockarg,
        } => JobOutput::Value(call::proc_call(proc_value, args, blockarg)),
        Job::CvarGet { class, name } => JobOutput::Value(class::cvar_get(class, name)),
        Job::CvarSet { class, name, value } => {
            class::cvar_set(class, name, value);
            JobOutput::Unit
        }
        Job::GlobalGet(name) => JobOutput::Value(gvar::gv_get(name)),
        Job::GlobalSet { name, value } => JobOutput::Value(gvar::gv_set(name, value)),
        Job::ToLong(value) => JobOutput::Long(convert::num2long(value)),
        Job::ToULong(value) => JobOutput::ULong(numeric::to_unsigned(value)),
        Job::ToDouble(value) => JobOutput::Double(convert::num2dbl(value)),
        Job::ToString(value) => JobOutput::Value(convert::string_convert(value)),
        Job::ToArray(value) => JobOutput::Value(convert::array_convert(value)),
        Job::ToHash(value) => JobOutput::Value(convert::hash_convert(value)),
        Job::Inspect(value) => JobOutput::Value(convert::inspect(value)),
        Job::ErrorArity { given, min, max } => helpers::error_arity(given, min, max),
        Job::ScanArgHash(value) => {
            let (hash, is_hash, all_symbols) = helpers::scan_arg_hash(value);
            JobOutput::ArgHash {
                hash,
                is_hash,
                all_symbols,
            }
        }
        Job::DefineClass {
            outer,
            name,
            superclass,
        } => JobOutput::Value(class::define_class_under(outer, name, superclass)),
        Job::DefineModule { outer, name } => JobOutput::Value(class::define_module_under(outer, name)),
        Job::InjectModule {
            target,
            module,
            mode,
        } => {
            match mode {
                Injection::Include => class::include_module(target, module),
                Injection::Prepend => class::prepend_module(target, module),
                Injection::Extend => class::extend_object(target, module),
            }
            JobOutput::Unit
        }
        Job::CallSuper(args) => JobOutput::Value(call::call_super(args)),
        Job::Break(value) => call::iter_break_value(value),
        Job::DefineMethod { target, name } => JobOutput::Method(match target {
            MethodTarget::Global => helpers::define_global_function(name),
            MethodTarget::Instance(klass) => helpers::define_method(klass, name),
            MethodTarget::Singleton(object) => helpers::define_singleton_method(object, name),
        }),
        Job::DefineVirtualGlobal { name, readonly } => {
            helpers::create_virtual_gvar(name, readonly);
            JobOutput::Unit
        }
        Job::BindClass(klass) => {
            helpers::bind_class(klass);
            JobOutput::Unit
        }
    }
}
