use std::collections::HashMap;
use std::ffi::{CString, c_void};

use num_bigint::BigInt;

use super::jump::Tag;
use super::value::{Id, Value};

/// Built-in method implementation. Receives `self` and the argument vector.
pub type BuiltinFn = fn(Value, &[Value]) -> Value;

/// Free hook attached to a Data object, run when the collector reclaims it.
pub type DataFreeFn = extern "C" fn(*mut c_void);

#[derive(Clone, Copy)]
pub(crate) enum MethodBody {
    Builtin(BuiltinFn),
    /// Routed through the helper layer's single method callback.
    Helper,
}

#[derive(Clone, Copy)]
pub(crate) struct MethodDef {
    pub body: MethodBody,
    /// Fixed argument count, or `-1` for a C-style variadic method.
    pub arity: i32,
}

#[derive(Clone)]
pub(crate) enum Allocator {
    /// Instances are Data objects created through the bound-object hooks.
    Bound(CString),
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClassKind {
    Class,
    Module,
    Singleton { attached: Value },
}

pub(crate) struct ClassBody {
    pub name: Option<String>,
    pub kind: ClassKind,
    pub superclass: Option<Value>,
    pub methods: HashMap<Id, MethodDef>,
    pub consts: HashMap<Id, Value>,
    pub cvars: HashMap<Id, Value>,
    pub includes: Vec<Value>,
    pub prepends: Vec<Value>,
    pub allocator: Option<Allocator>,
}

impl ClassBody {
    pub fn new(name: Option<String>, kind: ClassKind, superclass: Option<Value>) -> Self {
        Self {
            name,
            kind,
            superclass,
            methods: HashMap::new(),
            consts: HashMap::new(),
            cvars: HashMap::new(),
            includes: Vec::new(),
            prepends: Vec::new(),
            allocator: None,
        }
    }

    pub fn is_module(&self) -> bool {
        self.kind == ClassKind::Module
    }
}

/// Where a block came from when it is invoked.
#[derive(Clone, Copy, Debug)]
pub(crate) enum BlockHandler {
    /// Host block carrying an opaque pointer context.
    Pointer(*mut c_void),
    /// Host block carrying a Data object as its context.
    Context(Value),
    Proc(Value),
}

/// A block attached to a call, together with the marker of the frame a
/// `break` from it returns to. A `home` of 0 means no frame will catch it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AttachedBlock {
    pub handler: BlockHandler,
    pub home: u64,
}

pub(crate) struct ProcBody {
    pub block: AttachedBlock,
}

pub(crate) enum DataKind {
    Plain { free: Option<DataFreeFn> },
    Bound { class_name: CString },
}

pub(crate) struct DataBody {
    pub ptr: *mut c_void,
    pub kind: DataKind,
}

/// Non-Exception marker left in `errinfo` by `break` and `throw`.
pub(crate) struct ThrowBody {
    pub tag: Tag,
    pub value: Value,
    pub target: u64,
    pub catch_tag: Value,
}

pub(crate) enum ObjectBody {
    Plain,
    Class(Box<ClassBody>),
    String(String),
    Float(f64),
    Bignum(BigInt),
    Array(Vec<Value>),
    Hash(Vec<(Value, Value)>),
    Proc(ProcBody),
    Data(DataBody),
    ThrowData(ThrowBody),
}

pub(crate) struct HeapObject {
    pub klass: Value,
    pub ivars: HashMap<Id, Value>,
    pub body: ObjectBody,
}

impl HeapObject {
    pub fn new(klass: Value, body: ObjectBody) -> Self {
        Self {
            klass,
            ivars: HashMap::new(),
            body,
        }
    }

    /// Pushes every value this object keeps alive.
    pub fn children(&self, out: &mut Vec<Value>) {
        out.push(self.klass);
        out.extend(self.ivars.values().copied());
        match &self.body {
            ObjectBody::Class(class) => {
                out.extend(class.superclass);
                out.extend(class.consts.values().copied());
                out.extend(class.cvars.values().copied());
                out.extend(class.includes.iter().copied());
                out.extend(class.prepends.iter().copied());
                if let ClassKind::Singleton { attached } = class.kind {
                    out.push(attached);
                }
            }
            ObjectBody::Array(elements) => out.extend(elements.iter().copied()),
            ObjectBody::Hash(pairs) => {
                for (key, value) in pairs {
                    out.push(*key);
                    out.push(*value);
                }
            }
            ObjectBody::Proc(body) => match body.block.handler {
                BlockHandler::Context(v) | BlockHandler::Proc(v) => out.push(v),
                BlockHandler::Pointer(_) => {}
            },
            ObjectBody::ThrowData(throw) => {
                out.push(throw.value);
                out.push(throw.catch_tag);
            }
            ObjectBody::Plain
            | ObjectBody::String(_)
            | ObjectBody::Float(_)
            | ObjectBody::Bignum(_)
            | ObjectBody::Data(_) => {}
        }
    }
}

/// Deferred free-hook invocation, run once the heap borrow is released.
pub(crate) enum Finalizer {
    Free(DataFreeFn, *mut c_void),
    Bound(CString, *mut c_void),
}
