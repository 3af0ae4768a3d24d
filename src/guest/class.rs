use super::jump::{Failure, GuestResult, check};
use super::object::{Allocator, BuiltinFn, ClassBody, ClassKind, MethodBody, MethodDef, ObjectBody};
use super::state::{CoreIds, State, with_state};
use super::value::{Id, Value};

fn alloc_class_object(s: &mut State, name: Option<String>, kind: ClassKind, superclass: Option<Value>) -> Value {
    let klass = match kind {
        ClassKind::Module => s.classes.module,
        _ => s.classes.class,
    };
    s.alloc(
        klass,
        ObjectBody::Class(Box::new(ClassBody::new(name, kind, superclass))),
    )
}

/// Creates a class and its metaclass so class methods inherit.
pub(crate) fn new_class(s: &mut State, name: Option<String>, superclass: Value) -> Value {
    let klass = alloc_class_object(s, name, ClassKind::Class, Some(superclass));
    // A metaclass for a fresh class cannot fail.
    let _ = singleton_class_of(s, klass);
    s.bump_serial();
    klass
}

fn new_module(s: &mut State, name: Option<String>) -> Value {
    let module = alloc_class_object(s, name, ClassKind::Module, None);
    s.bump_serial();
    module
}

fn bootstrap_class(s: &mut State, name: &str, superclass: Value) -> Value {
    let klass = new_class(s, None, superclass);
    let object = s.classes.object;
    let id = s.intern(name);
    const_set_raw(s, object, id, klass);
    klass
}

fn bootstrap_module(s: &mut State, name: &str) -> Value {
    let module = new_module(s, None);
    let object = s.classes.object;
    let id = s.intern(name);
    const_set_raw(s, object, id, module);
    module
}

pub(crate) fn bootstrap(s: &mut State) {
    s.ids = CoreIds {
        initialize: s.intern("initialize"),
        mesg: s.intern("mesg"),
        inspect: s.intern("inspect"),
        to_s: s.intern("to_s"),
        to_str: s.intern("to_str"),
        to_int: s.intern("to_int"),
        to_i: s.intern("to_i"),
        to_f: s.intern("to_f"),
        to_hash: s.intern("to_hash"),
        to_ary: s.intern("to_ary"),
        to_a: s.intern("to_a"),
        eq: s.intern("=="),
    };

    let basic = alloc_class_object(s, None, ClassKind::Class, None);
    let object = alloc_class_object(s, None, ClassKind::Class, Some(basic));
    let module = alloc_class_object(s, None, ClassKind::Class, Some(object));
    let class = alloc_class_object(s, None, ClassKind::Class, Some(module));
    for klass in [basic, object, module, class] {
        if let Some(obj) = s.obj_mut(klass) {
            obj.klass = class;
        }
    }
    s.classes.basic_object = basic;
    s.classes.object = object;
    s.classes.module = module;
    s.classes.class = class;
    for (name, klass) in [
        ("BasicObject", basic),
        ("Object", object),
        ("Module", module),
        ("Class", class),
    ] {
        let id = s.intern(name);
        const_set_raw(s, object, id, klass);
        let _ = singleton_class_of(s, klass);
    }

    let kernel = bootstrap_module(s, "Kernel");
    let _ = include_module_in(s, object, kernel);
    let comparable = bootstrap_module(s, "Comparable");
    let numeric = bootstrap_class(s, "Numeric", object);
    let _ = include_module_in(s, numeric, comparable);

    let c = &mut s.classes;
    c.kernel = kernel;
    c.comparable = comparable;
    c.numeric = numeric;

    s.classes.integer = bootstrap_class(s, "Integer", numeric);
    s.classes.float = bootstrap_class(s, "Float", numeric);
    s.classes.string = bootstrap_class(s, "String", object);
    let string = s.classes.string;
    let _ = include_module_in(s, string, comparable);
    s.classes.symbol = bootstrap_class(s, "Symbol", object);
    s.classes.nil_class = bootstrap_class(s, "NilClass", object);
    s.classes.true_class = bootstrap_class(s, "TrueClass", object);
    s.classes.false_class = bootstrap_class(s, "FalseClass", object);
    s.classes.array = bootstrap_class(s, "Array", object);
    s.classes.hash = bootstrap_class(s, "Hash", object);
    s.classes.proc_class = bootstrap_class(s, "Proc", object);
    s.classes.data = bootstrap_class(s, "Data", object);
    s.classes.gc = bootstrap_module(s, "GC");

    let exception = bootstrap_class(s, "Exception", object);
    s.classes.exception = exception;
    s.classes.script_error = bootstrap_class(s, "ScriptError", exception);
    let script_error = s.classes.script_error;
    s.classes.not_implemented_error = bootstrap_class(s, "NotImplementedError", script_error);
    let standard = bootstrap_class(s, "StandardError", exception);
    s.classes.standard_error = standard;
    s.classes.runtime_error = bootstrap_class(s, "RuntimeError", standard);
    s.classes.argument_error = bootstrap_class(s, "ArgumentError", standard);
    let argument_error = s.classes.argument_error;
    s.classes.uncaught_throw_error = bootstrap_class(s, "UncaughtThrowError", argument_error);
    s.classes.type_error = bootstrap_class(s, "TypeError", standard);
    s.classes.name_error = bootstrap_class(s, "NameError", standard);
    let name_error = s.classes.name_error;
    s.classes.no_method_error = bootstrap_class(s, "NoMethodError", name_error);
    s.classes.range_error = bootstrap_class(s, "RangeError", standard);
    let range_error = s.classes.range_error;
    s.classes.float_domain_error = bootstrap_class(s, "FloatDomainError", range_error);
    s.classes.zero_division_error = bootstrap_class(s, "ZeroDivisionError", standard);
    s.classes.index_error = bootstrap_class(s, "IndexError", standard);
    let index_error = s.classes.index_error;
    s.classes.key_error = bootstrap_class(s, "KeyError", index_error);
    s.classes.local_jump_error = bootstrap_class(s, "LocalJumpError", standard);

    s.top_self = s.alloc(object, ObjectBody::Plain);
}

pub(crate) fn is_const_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Ancestry chain of `klass`, nearest first, with prepended and included
/// modules in lookup order.
pub(crate) fn ancestors_of(s: &State, klass: Value) -> Vec<Value> {
    let mut out = Vec::new();
    let mut current = Some(klass);
    while let Some(c) = current {
        let Some(body) = s.class_body(c) else {
            break;
        };
        append_module_chain(s, c, &mut out);
        current = body.superclass;
    }
    out
}

fn append_module_chain(s: &State, klass: Value, out: &mut Vec<Value>) {
    let Some(body) = s.class_body(klass) else {
        return;
    };
    for module in body.prepends.iter().rev() {
        append_module_chain(s, *module, out);
    }
    if !out.contains(&klass) {
        out.push(klass);
    }
    for module in body.includes.iter().rev() {
        append_module_chain(s, *module, out);
    }
}

/// Skips singleton classes.
pub(crate) fn class_real(s: &State, mut klass: Value) -> Value {
    while let Some(body) = s.class_body(klass) {
        match (body.kind, body.superclass) {
            (ClassKind::Singleton { .. }, Some(superclass)) => klass = superclass,
            _ => break,
        }
    }
    klass
}

pub(crate) fn class_name_of(s: &State, klass: Value) -> String {
    match s.class_body(klass) {
        Some(body) => match (&body.name, body.kind) {
            (Some(name), _) => name.clone(),
            (None, ClassKind::Singleton { attached }) => {
                if s.class_body(attached).is_some() {
                    format!("#<Class:{}>", class_name_of(s, attached))
                } else {
                    let real = class_real(s, s.class_of(attached));
                    format!("#<Class:#<{}>>", class_name_of(s, real))
                }
            }
            (None, ClassKind::Module) => format!("#<Module:0x{:016x}>", klass.to_raw()),
            (None, ClassKind::Class) => format!("#<Class:0x{:016x}>", klass.to_raw()),
        },
        None => "?".to_string(),
    }
}

/// Name of the real class of `value`.
pub(crate) fn obj_classname_of(s: &State, value: Value) -> String {
    let klass = class_real(s, s.class_of(value));
    class_name_of(s, klass)
}

pub(crate) fn singleton_class_of(s: &mut State, object: Value) -> GuestResult<Value> {
    match object {
        Value::NIL => return Ok(s.classes.nil_class),
        Value::TRUE => return Ok(s.classes.true_class),
        Value::FALSE => return Ok(s.classes.false_class),
        v if v.is_special_const() => {
            return Err(Failure::new(s.classes.type_error, "can't define singleton"));
        }
        _ => {}
    }
    let klass = s.class_of(object);
    if let Some(body) = s.class_body(klass)
        && body.kind == (ClassKind::Singleton { attached: object })
    {
        return Ok(klass);
    }
    let superclass = match s.class_body(object).map(|b| (b.kind, b.superclass)) {
        Some((ClassKind::Class, Some(parent))) => singleton_class_of(s, parent)?,
        Some((ClassKind::Class, None)) => s.classes.class,
        Some((ClassKind::Module, _)) => s.classes.module,
        Some((ClassKind::Singleton { .. }, _)) => s.classes.class,
        None => klass,
    };
    let meta = alloc_class_object(
        s,
        None,
        ClassKind::Singleton { attached: object },
        Some(superclass),
    );
    if let Some(obj) = s.obj_mut(object) {
        obj.klass = meta;
    }
    s.bump_serial();
    Ok(meta)
}

pub(crate) fn lookup_method(s: &State, klass: Value, method: Id) -> Option<(Value, MethodDef)> {
    ancestors_of(s, klass).into_iter().find_map(|c| {
        s.class_body(c)
            .and_then(|body| body.methods.get(&method).copied())
            .map(|def| (c, def))
    })
}

/// Next definition of `method` after `owner` in the ancestry of `klass`.
pub(crate) fn lookup_super(
    s: &State,
    klass: Value,
    owner: Value,
    method: Id,
) -> Option<(Value, MethodDef)> {
    let chain = ancestors_of(s, klass);
    let start = chain.iter().position(|c| *c == owner)? + 1;
    chain[start..].iter().find_map(|c| {
        s.class_body(*c)
            .and_then(|body| body.methods.get(&method).copied())
            .map(|def| (*c, def))
    })
}

pub(crate) fn define_method_def(s: &mut State, klass: Value, method: Id, def: MethodDef) {
    if let Some(body) = s.class_body_mut(klass) {
        body.methods.insert(method, def);
    }
}

pub(crate) fn define_builtin(s: &mut State, klass: Value, name: &str, arity: i32, func: BuiltinFn) {
    let id = s.intern(name);
    define_method_def(
        s,
        klass,
        id,
        MethodDef {
            body: MethodBody::Builtin(func),
            arity,
        },
    );
}

pub(crate) fn define_singleton_builtin(
    s: &mut State,
    object: Value,
    name: &str,
    arity: i32,
    func: BuiltinFn,
) {
    if let Ok(meta) = singleton_class_of(s, object) {
        define_builtin(s, meta, name, arity, func);
    }
}

pub(crate) fn set_allocator(s: &mut State, klass: Value, allocator: Allocator) {
    if let Some(body) = s.class_body_mut(klass) {
        body.allocator = Some(allocator);
    }
}

/// Allocator of `klass` or its nearest superclass that has one.
pub(crate) fn find_allocator(s: &State, klass: Value) -> Option<Allocator> {
    let mut current = Some(klass);
    while let Some(c) = current {
        let body = s.class_body(c)?;
        if let Some(allocator) = &body.allocator {
            return Some(allocator.clone());
        }
        current = body.superclass;
    }
    None
}

pub(crate) fn is_kind_of(s: &State, value: Value, klass: Value) -> bool {
    let own = s.class_of(value);
    ancestors_of(s, own).contains(&klass)
}

fn const_set_raw(s: &mut State, scope: Value, id: Id, value: Value) {
    let scope_name = if scope == s.classes.object {
        None
    } else {
        Some(class_name_of(s, scope))
    };
    let const_name = s.id_name(id);
    if let Some(body) = s.class_body_mut(value)
        && body.name.is_none()
        && !matches!(body.kind, ClassKind::Singleton { .. })
    {
        body.name = Some(match scope_name {
            Some(outer) => format!("{}::{}", outer, const_name),
            None => const_name,
        });
    }
    if let Some(body) = s.class_body_mut(scope) {
        body.consts.insert(id, value);
    }
}

fn const_lookup(s: &State, scope: Value, id: Id, recurse: bool) -> Option<Value> {
    let own = s.class_body(scope)?.consts.get(&id).copied();
    if own.is_some() || !recurse {
        return own;
    }
    let mut chain = ancestors_of(s, scope);
    chain.push(s.classes.object);
    chain
        .into_iter()
        .find_map(|c| s.class_body(c).and_then(|b| b.consts.get(&id).copied()))
}

fn const_get_in(s: &State, scope: Value, id: Id, recurse: bool) -> GuestResult<Value> {
    let name = s.id_name(id);
    if !is_const_name(&name) {
        return Err(Failure::new(
            s.classes.name_error,
            format!("wrong constant name {}", name),
        ));
    }
    if s.class_body(scope).is_none() {
        return Err(Failure::new(
            s.classes.type_error,
            format!("{} is not a class/module", obj_classname_of(s, scope)),
        ));
    }
    const_lookup(s, scope, id, recurse).ok_or_else(|| {
        let message = if scope == s.classes.object {
            format!("uninitialized constant {}", name)
        } else {
            format!("uninitialized constant {}::{}", class_name_of(s, scope), name)
        };
        Failure::new(s.classes.name_error, message)
    })
}

fn include_module_in(s: &mut State, klass: Value, module: Value) -> GuestResult<()> {
    attach_module(s, klass, module, false)
}

fn attach_module(s: &mut State, klass: Value, module: Value, prepend: bool) -> GuestResult<()> {
    if !s.class_body(module).is_some_and(|b| b.is_module()) {
        let got = obj_classname_of(s, module);
        return Err(Failure::new(
            s.classes.type_error,
            format!("wrong argument type {} (expected Module)", got),
        ));
    }
    if s.class_body(klass).is_none() {
        return Err(Failure::new(
            s.classes.type_error,
            format!("{} is not a class/module", obj_classname_of(s, klass)),
        ));
    }
    if ancestors_of(s, module).contains(&klass) {
        let what = if prepend { "prepend" } else { "include" };
        return Err(Failure::new(
            s.classes.argument_error,
            format!("cyclic {} detected", what),
        ));
    }
    if ancestors_of(s, klass).contains(&module) {
        return Ok(());
    }
    if let Some(body) = s.class_body_mut(klass) {
        if prepend {
            body.prepends.push(module);
        } else {
            body.includes.push(module);
        }
    }
    s.bump_serial();
    Ok(())
}

fn define_class_in(s: &mut State, outer: Value, name: &str, superclass: Value) -> GuestResult<Value> {
    if !is_const_name(name) {
        return Err(Failure::new(
            s.classes.name_error,
            format!("wrong constant name {}", name),
        ));
    }
    match s.class_body(superclass).map(|b| b.kind) {
        Some(ClassKind::Class) => {}
        _ => {
            let got = obj_classname_of(s, superclass);
            return Err(Failure::new(
                s.classes.type_error,
                format!("superclass must be an instance of Class (given an instance of {})", got),
            ));
        }
    }
    let id = s.intern(name);
    let existing = s.class_body(outer).and_then(|b| b.consts.get(&id).copied());
    if let Some(existing) = existing {
        return match s.class_body(existing).map(|b| (b.kind, b.superclass)) {
            Some((ClassKind::Class, parent)) if parent == Some(superclass) => Ok(existing),
            Some((ClassKind::Class, _)) => Err(Failure::new(
                s.classes.type_error,
                format!("superclass mismatch for class {}", name),
            )),
            _ => Err(Failure::new(
                s.classes.type_error,
                format!("{} is not a class", name),
            )),
        };
    }
    let klass = new_class(s, None, superclass);
    const_set_raw(s, outer, id, klass);
    Ok(klass)
}

fn define_module_in(s: &mut State, outer: Value, name: &str) -> GuestResult<Value> {
    if !is_const_name(name) {
        return Err(Failure::new(
            s.classes.name_error,
            format!("wrong constant name {}", name),
        ));
    }
    let id = s.intern(name);
    let existing = s.class_body(outer).and_then(|b| b.consts.get(&id).copied());
    if let Some(existing) = existing {
        return if s.class_body(existing).is_some_and(|b| b.is_module()) {
            Ok(existing)
        } else {
            Err(Failure::new(
                s.classes.type_error,
                format!("{} is not a module", name),
            ))
        };
    }
    let module = new_module(s, None);
    const_set_raw(s, outer, id, module);
    Ok(module)
}

fn cvar_check_name(s: &State, id: Id) -> GuestResult<String> {
    let name = s.id_name(id);
    if name.len() > 2 && name.starts_with("@@") {
        Ok(name)
    } else {
        Err(Failure::new(
            s.classes.name_error,
            format!("'{}' is not allowed as a class variable name", name),
        ))
    }
}

// Public surface, each entry raising on failure.

pub fn class_of(value: Value) -> Value {
    with_state(|s| s.class_of(value))
}

pub fn class_real_of(value: Value) -> Value {
    with_state(|s| {
        let klass = s.class_of(value);
        class_real(s, klass)
    })
}

pub fn class_name(klass: Value) -> String {
    with_state(|s| class_name_of(s, klass))
}

pub fn obj_classname(value: Value) -> String {
    with_state(|s| obj_classname_of(s, value))
}

pub fn ancestors(klass: Value) -> Vec<Value> {
    with_state(|s| ancestors_of(s, klass))
}

/// Bumped whenever a class, module, singleton class or inclusion appears.
pub fn hierarchy_serial() -> u64 {
    with_state(|s| s.hierarchy_serial)
}

pub fn singleton_class(object: Value) -> Value {
    check(with_state(|s| singleton_class_of(s, object)))
}

pub fn obj_is_kind_of(value: Value, klass: Value) -> bool {
    with_state(|s| is_kind_of(s, value, klass))
}

pub fn respond_to(value: Value, method: Id) -> bool {
    with_state(|s| {
        let klass = s.class_of(value);
        lookup_method(s, klass, method).is_some()
    })
}

pub fn is_class_or_module(value: Value) -> bool {
    with_state(|s| s.class_body(value).is_some())
}

pub fn define_class_under(outer: Value, name: &str, superclass: Value) -> Value {
    check(with_state(|s| define_class_in(s, outer, name, superclass)))
}

pub fn define_module_under(outer: Value, name: &str) -> Value {
    check(with_state(|s| define_module_in(s, outer, name)))
}

pub fn include_module(klass: Value, module: Value) {
    check(with_state(|s| attach_module(s, klass, module, false)))
}

pub fn prepend_module(klass: Value, module: Value) {
    check(with_state(|s| attach_module(s, klass, module, true)))
}

pub fn extend_object(object: Value, module: Value) {
    check(with_state(|s| {
        let meta = singleton_class_of(s, object)?;
        attach_module(s, meta, module, false)
    }))
}

/// Lexical-style lookup: `scope`, its ancestors, then `Object`.
pub fn const_get(scope: Value, id: Id) -> Value {
    check(with_state(|s| const_get_in(s, scope, id, true)))
}

/// Lookup in `scope` alone.
pub fn const_get_at(scope: Value, id: Id) -> Value {
    check(with_state(|s| const_get_in(s, scope, id, false)))
}

pub fn const_set(scope: Value, id: Id, value: Value) {
    check(with_state(|s| {
        let name = s.id_name(id);
        if !is_const_name(&name) {
            return Err(Failure::new(
                s.classes.name_error,
                format!("wrong constant name {}", name),
            ));
        }
        if s.class_body(scope).is_none() {
            return Err(Failure::new(
                s.classes.type_error,
                format!("{} is not a class/module", obj_classname_of(s, scope)),
            ));
        }
        const_set_raw(s, scope, id, value);
        Ok(())
    }))
}

pub fn cvar_get(klass: Value, id: Id) -> Value {
    check(with_state(|s| {
        let name = cvar_check_name(s, id)?;
        ancestors_of(s, klass)
            .into_iter()
            .find_map(|c| s.class_body(c).and_then(|b| b.cvars.get(&id).copied()))
            .ok_or_else(|| {
                Failure::new(
                    s.classes.name_error,
                    format!(
                        "uninitialized class variable {} in {}",
                        name,
                        class_name_of(s, klass)
                    ),
                )
            })
    }))
}

pub fn cvar_set(klass: Value, id: Id, value: Value) {
    check(with_state(|s| {
        cvar_check_name(s, id)?;
        let holder = ancestors_of(s, klass)
            .into_iter()
            .find(|c| s.class_body(*c).is_some_and(|b| b.cvars.contains_key(&id)))
            .unwrap_or(klass);
        match s.class_body_mut(holder) {
            Some(body) => {
                body.cvars.insert(id, value);
                Ok(())
            }
            None => Err(Failure::new(s.classes.type_error, "not a class/module")),
        }
    }))
}

pub fn ivar_get(object: Value, id: Id) -> Value {
    with_state(|s| {
        s.obj(object)
            .and_then(|o| o.ivars.get(&id).copied())
            .unwrap_or(Value::NIL)
    })
}

pub fn ivar_set(object: Value, id: Id, value: Value) {
    check(with_state(|s| match s.obj_mut(object) {
        Some(obj) => {
            obj.ivars.insert(id, value);
            Ok(())
        }
        None => Err(Failure::new(
            s.classes.runtime_error,
            "can't modify frozen immediate value",
        )),
    }))
}
