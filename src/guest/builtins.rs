//! Core methods installed at boot.

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use super::call::{self, funcall, funcall_passing_block, yield_values};
use super::class::{
    self, ancestors_of, class_name_of, class_real, define_builtin, define_singleton_builtin,
    find_allocator, lookup_method,
};
use super::convert::{
    self, any_to_s, ary_entries, ary_new, float_new, float_to_s, float_value, hash_entries,
    inspect_string, integer_from_bigint, integer_value, quote, str_new, string_value,
};
use super::helpers;
use super::jump;
use super::object::{Allocator, ClassKind, ObjectBody};
use super::state::{self, State, with_state};
use super::value::{Id, Value};

fn intern(name: &str) -> Id {
    with_state(|s| s.intern(name))
}

fn raise_with(pick: fn(&State) -> Value, message: &str) -> ! {
    let class = with_state(|s| pick(s));
    jump::raise_new(class, message)
}

fn raise_type(message: &str) -> ! {
    raise_with(|s| s.classes.type_error, message)
}

fn raise_arg(message: &str) -> ! {
    raise_with(|s| s.classes.argument_error, message)
}

fn classname(value: Value) -> String {
    match value {
        Value::NIL => "nil".to_string(),
        Value::TRUE => "true".to_string(),
        Value::FALSE => "false".to_string(),
        v => with_state(|s| class::obj_classname_of(s, v)),
    }
}

fn symbol_or_string_id(value: Value) -> Id {
    if let Some(id) = value.symbol_id() {
        return id;
    }
    match string_value(value) {
        Some(name) => intern(&name),
        None => raise_type(&format!("{} is not a symbol nor a string", inspect_string(value))),
    }
}

fn symbol_name(value: Value) -> String {
    value.symbol_id().map(state::id_name).unwrap_or_default()
}

pub(crate) fn install(s: &mut State) {
    install_object(s);
    install_module(s);
    install_numeric(s);
    install_string(s);
    install_singletons(s);
    install_array(s);
    install_hash(s);
    install_proc(s);
    install_exception(s);
}

fn install_object(s: &mut State) {
    let basic = s.classes.basic_object;
    define_builtin(s, basic, "initialize", 0, |_, _| Value::NIL);
    define_builtin(s, basic, "==", 1, |recv, args| Value::from_bool(recv == args[0]));
    define_builtin(s, basic, "equal?", 1, |recv, args| Value::from_bool(recv == args[0]));
    define_builtin(s, basic, "!", 0, |recv, _| Value::from_bool(!recv.is_truthy()));

    let kernel = s.classes.kernel;
    define_builtin(s, kernel, "class", 0, kernel_class);
    define_builtin(s, kernel, "inspect", 0, |recv, _| str_new(&any_to_s(recv)));
    define_builtin(s, kernel, "to_s", 0, |recv, _| str_new(&any_to_s(recv)));
    define_builtin(s, kernel, "nil?", 0, |_, _| Value::FALSE);
    define_builtin(s, kernel, "itself", 0, |recv, _| recv);
    define_builtin(s, kernel, "object_id", 0, |recv, _| convert::uint2inum(recv.to_raw() >> 1));
    define_builtin(s, kernel, "respond_to?", 1, |recv, args| {
        Value::from_bool(class::respond_to(recv, symbol_or_string_id(args[0])))
    });
    define_builtin(s, kernel, "is_a?", 1, kernel_is_a);
    define_builtin(s, kernel, "kind_of?", 1, kernel_is_a);
    define_builtin(s, kernel, "instance_variable_get", 1, |recv, args| {
        class::ivar_get(recv, symbol_or_string_id(args[0]))
    });
    define_builtin(s, kernel, "instance_variable_set", 2, |recv, args| {
        class::ivar_set(recv, symbol_or_string_id(args[0]), args[1]);
        args[1]
    });
    define_builtin(s, kernel, "singleton_class", 0, |recv, _| class::singleton_class(recv));
    define_builtin(s, kernel, "extend", 1, |recv, args| {
        class::extend_object(recv, args[0]);
        recv
    });
    define_builtin(s, kernel, "send", -1, kernel_send);
    define_builtin(s, kernel, "public_send", -1, kernel_send);
    define_builtin(s, kernel, "raise", -1, kernel_raise);
    define_builtin(s, kernel, "catch", -1, kernel_catch);
    define_builtin(s, kernel, "throw", -1, |_, args| {
        if args.is_empty() || args.len() > 2 {
            jump::raise_failure(call::arity_failure(args.len(), 1, 2));
        }
        call::throw(args[0], args.get(1).copied().unwrap_or(Value::NIL))
    });
    define_builtin(s, kernel, "proc", 0, |_, _| call::block_proc());
    define_builtin(s, kernel, "Integer", 1, |_, args| convert::integer(args[0]));
    define_builtin(s, kernel, "Float", 1, |_, args| convert::float_convert(args[0]));
    define_builtin(s, kernel, "String", 1, |_, args| convert::string_convert(args[0]));
    define_builtin(s, kernel, "Array", 1, |_, args| convert::array_convert(args[0]));
    define_builtin(s, kernel, "Hash", 1, |_, args| convert::hash_convert(args[0]));

    let gc = s.classes.gc;
    define_singleton_builtin(s, gc, "start", 0, |_, _| {
        state::gc_start();
        Value::NIL
    });
    define_singleton_builtin(s, gc, "count", 0, |_, _| convert::uint2inum(state::gc_count() as u64));
}

fn kernel_class(recv: Value, _: &[Value]) -> Value {
    class::class_real_of(recv)
}

fn kernel_is_a(recv: Value, args: &[Value]) -> Value {
    if !class::is_class_or_module(args[0]) {
        raise_type("class or module required");
    }
    Value::from_bool(class::obj_is_kind_of(recv, args[0]))
}

fn kernel_send(recv: Value, args: &[Value]) -> Value {
    let Some((name, rest)) = args.split_first() else {
        raise_arg("no method name given")
    };
    funcall_passing_block(recv, symbol_or_string_id(*name), rest)
}

fn kernel_raise(_: Value, args: &[Value]) -> Value {
    let exception = match args {
        [] => {
            let pending = jump::errinfo();
            if convert::is_exception(pending) {
                pending
            } else {
                with_state(|s| {
                    let class = s.classes.runtime_error;
                    s.new_exception(class, "unhandled exception")
                })
            }
        }
        [message] if string_value(*message).is_some() => {
            let text = string_value(*message).unwrap_or_default();
            with_state(|s| {
                let class = s.classes.runtime_error;
                s.new_exception(class, &text)
            })
        }
        [target, rest @ ..] if rest.len() <= 1 => {
            let new = if class::is_class_or_module(*target) {
                intern("new")
            } else {
                intern("exception")
            };
            if !rest.is_empty() || class::is_class_or_module(*target) {
                funcall(*target, new, rest)
            } else {
                *target
            }
        }
        _ => jump::raise_failure(call::arity_failure(args.len(), 0, 2)),
    };
    if !convert::is_exception(exception) {
        raise_type("exception class/object expected");
    }
    jump::raise(exception)
}

fn kernel_catch(_: Value, args: &[Value]) -> Value {
    let tag = match args {
        [] => with_state(|s| {
            let object = s.classes.object;
            s.alloc(object, ObjectBody::Plain)
        }),
        [tag] => *tag,
        _ => jump::raise_failure(call::arity_failure(args.len(), 0, 1)),
    };
    call::catch_with_block(tag)
}

fn install_module(s: &mut State) {
    let module = s.classes.module;
    define_builtin(s, module, "name", 0, |recv, _| {
        let named = with_state(|s| s.class_body(recv).and_then(|b| b.name.clone()));
        match named {
            Some(name) => str_new(&name),
            None => Value::NIL,
        }
    });
    define_builtin(s, module, "to_s", 0, |recv, _| str_new(&class::class_name(recv)));
    define_builtin(s, module, "inspect", 0, |recv, _| str_new(&class::class_name(recv)));
    define_builtin(s, module, "ancestors", 0, |recv, _| {
        let chain = with_state(|s| ancestors_of(s, recv));
        ary_new(chain)
    });
    define_builtin(s, module, "const_get", 1, |recv, args| {
        class::const_get(recv, symbol_or_string_id(args[0]))
    });
    define_builtin(s, module, "const_set", 2, |recv, args| {
        class::const_set(recv, symbol_or_string_id(args[0]), args[1]);
        args[1]
    });
    define_builtin(s, module, "===", 1, |recv, args| {
        Value::from_bool(class::obj_is_kind_of(args[0], recv))
    });
    define_builtin(s, module, "class_variable_get", 1, |recv, args| {
        class::cvar_get(recv, symbol_or_string_id(args[0]))
    });
    define_builtin(s, module, "class_variable_set", 2, |recv, args| {
        class::cvar_set(recv, symbol_or_string_id(args[0]), args[1]);
        args[1]
    });
    define_builtin(s, module, "method_defined?", 1, |recv, args| {
        let id = symbol_or_string_id(args[0]);
        Value::from_bool(with_state(|s| lookup_method(s, recv, id).is_some()))
    });
    define_builtin(s, module, "include", -1, |recv, args| {
        for module in args {
            class::include_module(recv, *module);
        }
        recv
    });
    define_builtin(s, module, "prepend", -1, |recv, args| {
        for module in args {
            class::prepend_module(recv, *module);
        }
        recv
    });

    let klass = s.classes.class;
    define_builtin(s, klass, "new", -1, class_new);
    define_builtin(s, klass, "allocate", 0, |recv, _| allocate(recv));
    define_builtin(s, klass, "superclass", 0, |recv, _| {
        with_state(|s| {
            let mut current = s.class_body(recv).and_then(|b| b.superclass);
            while let Some(c) = current {
                match s.class_body(c).map(|b| (b.kind, b.superclass)) {
                    Some((ClassKind::Singleton { .. }, parent)) => current = parent,
                    _ => break,
                }
            }
            current.unwrap_or(Value::NIL)
        })
    });
}

enum Layout {
    Plain,
    String,
    Array,
    Hash,
    Bound(std::ffi::CString),
    Undefined,
}

/// Allocates an uninitialized instance of `klass`.
pub(crate) fn allocate(klass: Value) -> Value {
    let layout = with_state(|s| {
        if let Some(Allocator::Bound(name)) = find_allocator(s, klass) {
            return Layout::Bound(name);
        }
        let c = s.classes;
        let kind_of = |core: Value| ancestors_of(s, klass).contains(&core);
        if s.class_body(klass).is_none_or(|b| b.kind != ClassKind::Class) {
            Layout::Undefined
        } else if kind_of(c.string) {
            Layout::String
        } else if kind_of(c.array) {
            Layout::Array
        } else if kind_of(c.hash) {
            Layout::Hash
        } else if [
            c.integer,
            c.float,
            c.symbol,
            c.nil_class,
            c.true_class,
            c.false_class,
            c.proc_class,
            c.data,
        ]
        .into_iter()
        .any(kind_of)
        {
            Layout::Undefined
        } else {
            Layout::Plain
        }
    });
    let body = match layout {
        Layout::Bound(name) => return helpers::bound_allocate(klass, name),
        Layout::Undefined => {
            raise_type(&format!("allocator undefined for {}", class::class_name(klass)))
        }
        Layout::Plain => ObjectBody::Plain,
        Layout::String => ObjectBody::String(String::new()),
        Layout::Array => ObjectBody::Array(Vec::new()),
        Layout::Hash => ObjectBody::Hash(Vec::new()),
    };
    with_state(|s| s.alloc(klass, body))
}

fn class_new(recv: Value, args: &[Value]) -> Value {
    let instance = allocate(recv);
    let initialize = with_state(|s| s.ids.initialize);
    funcall_passing_block(instance, initialize, args);
    instance
}

fn numeric_pair(recv: Value, arg: Value) -> Option<Result<(BigInt, BigInt), (f64, f64)>> {
    let as_float = |v: Value| float_value(v).or_else(|| integer_value(v).and_then(|n| n.to_f64()));
    match (integer_value(recv), integer_value(arg)) {
        (Some(a), Some(b)) => Some(Ok((a, b))),
        _ => match (as_float(recv), as_float(arg)) {
            (Some(a), Some(b)) => Some(Err((a, b))),
            _ => None,
        },
    }
}

fn coerce_failure(recv: Value, arg: Value) -> ! {
    let target = if float_value(recv).is_some() { "Float" } else { "Integer" };
    let shown = match arg {
        Value::NIL => "nil".to_string(),
        Value::TRUE | Value::FALSE => inspect_string(arg),
        v => classname(v),
    };
    raise_type(&format!("{} can't be coerced into {}", shown, target))
}

fn arith(recv: Value, arg: Value, int_op: fn(BigInt, BigInt) -> BigInt, float_op: fn(f64, f64) -> f64) -> Value {
    match numeric_pair(recv, arg) {
        Some(Ok((a, b))) => integer_from_bigint(int_op(a, b)),
        Some(Err((a, b))) => float_new(float_op(a, b)),
        None => coerce_failure(recv, arg),
    }
}

fn compare(recv: Value, arg: Value) -> std::cmp::Ordering {
    let ordering = match numeric_pair(recv, arg) {
        Some(Ok((a, b))) => Some(a.cmp(&b)),
        Some(Err((a, b))) => a.partial_cmp(&b),
        None => None,
    };
    match ordering {
        Some(ordering) => ordering,
        None => raise_arg(&format!(
            "comparison of {} with {} failed",
            classname(recv),
            if arg.is_nil() { "nil".to_string() } else { inspect_string(arg) }
        )),
    }
}

fn numeric_eq(recv: Value, args: &[Value]) -> Value {
    let equal = match numeric_pair(recv, args[0]) {
        Some(Ok((a, b))) => a == b,
        Some(Err((a, b))) => a == b,
        None => false,
    };
    Value::from_bool(equal)
}

fn install_numeric(s: &mut State) {
    let integer = s.classes.integer;
    let int_to_s: fn(Value, &[Value]) -> Value = |recv, _| {
        str_new(&integer_value(recv).map(|n| n.to_string()).unwrap_or_default())
    };
    define_builtin(s, integer, "to_s", 0, int_to_s);
    define_builtin(s, integer, "inspect", 0, int_to_s);
    define_builtin(s, integer, "to_i", 0, |recv, _| recv);
    define_builtin(s, integer, "to_int", 0, |recv, _| recv);
    define_builtin(s, integer, "to_f", 0, |recv, _| float_new(convert::num2dbl(recv)));
    define_builtin(s, integer, "+", 1, |recv, args| arith(recv, args[0], |a, b| a + b, |a, b| a + b));
    define_builtin(s, integer, "-", 1, |recv, args| arith(recv, args[0], |a, b| a - b, |a, b| a - b));
    define_builtin(s, integer, "*", 1, |recv, args| arith(recv, args[0], |a, b| a * b, |a, b| a * b));
    define_builtin(s, integer, "<", 1, |recv, args| Value::from_bool(compare(recv, args[0]).is_lt()));
    define_builtin(s, integer, ">", 1, |recv, args| Value::from_bool(compare(recv, args[0]).is_gt()));
    define_builtin(s, integer, "==", 1, numeric_eq);
    define_builtin(s, integer, "-@", 0, |recv, _| {
        integer_from_bigint(-integer_value(recv).unwrap_or_default())
    });
    define_builtin(s, integer, "zero?", 0, |recv, _| {
        Value::from_bool(integer_value(recv).is_some_and(|n| n.is_zero()))
    });
    define_builtin(s, integer, "times", 0, |recv, _| {
        let count = convert::num2long(recv);
        for i in 0..count.max(0) {
            yield_values(&[convert::int2inum(i)]);
        }
        recv
    });

    let float = s.classes.float;
    let float_show: fn(Value, &[Value]) -> Value =
        |recv, _| str_new(&float_to_s(float_value(recv).unwrap_or_default()));
    define_builtin(s, float, "to_s", 0, float_show);
    define_builtin(s, float, "inspect", 0, float_show);
    define_builtin(s, float, "to_f", 0, |recv, _| recv);
    define_builtin(s, float, "to_i", 0, |recv, _| convert::integer(recv));
    define_builtin(s, float, "to_int", 0, |recv, _| convert::integer(recv));
    define_builtin(s, float, "+", 1, |recv, args| arith(recv, args[0], |a, b| a + b, |a, b| a + b));
    define_builtin(s, float, "-", 1, |recv, args| arith(recv, args[0], |a, b| a - b, |a, b| a - b));
    define_builtin(s, float, "*", 1, |recv, args| arith(recv, args[0], |a, b| a * b, |a, b| a * b));
    define_builtin(s, float, "<", 1, |recv, args| Value::from_bool(compare(recv, args[0]).is_lt()));
    define_builtin(s, float, "==", 1, numeric_eq);
    define_builtin(s, float, "-@", 0, |recv, _| float_new(-float_value(recv).unwrap_or_default()));
}

fn string_of(recv: Value) -> String {
    string_value(recv).unwrap_or_default()
}

fn install_string(s: &mut State) {
    let string = s.classes.string;
    define_builtin(s, string, "to_s", 0, |recv, _| recv);
    define_builtin(s, string, "to_str", 0, |recv, _| recv);
    define_builtin(s, string, "inspect", 0, |recv, _| str_new(&quote(&string_of(recv))));
    define_builtin(s, string, "to_i", 0, |recv, _| {
        let text = string_of(recv);
        let trimmed = text.trim_start();
        let end = trimmed
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
            .map_or(trimmed.len(), |(i, _)| i);
        let n = trimmed[..end].parse::<BigInt>().unwrap_or_default();
        integer_from_bigint(n)
    });
    define_builtin(s, string, "to_sym", 0, |recv, _| Value::from_id(intern(&string_of(recv))));
    define_builtin(s, string, "length", 0, |recv, _| {
        convert::int2inum(string_of(recv).chars().count() as i64)
    });
    define_builtin(s, string, "size", 0, |recv, _| {
        convert::int2inum(string_of(recv).chars().count() as i64)
    });
    define_builtin(s, string, "+", 1, |recv, args| match string_value(args[0]) {
        Some(other) => str_new(&(string_of(recv) + &other)),
        None => raise_type(&format!(
            "no implicit conversion of {} into String",
            classname(args[0])
        )),
    });
    define_builtin(s, string, "==", 1, |recv, args| {
        Value::from_bool(string_value(args[0]).is_some_and(|other| other == string_of(recv)))
    });
    define_builtin(s, string, "upcase", 0, |recv, _| str_new(&string_of(recv).to_uppercase()));

    let symbol = s.classes.symbol;
    define_builtin(s, symbol, "to_s", 0, |recv, _| str_new(&symbol_name(recv)));
    define_builtin(s, symbol, "to_sym", 0, |recv, _| recv);
    define_builtin(s, symbol, "inspect", 0, |recv, _| str_new(&format!(":{}", symbol_name(recv))));
}

fn install_singletons(s: &mut State) {
    let nil = s.classes.nil_class;
    define_builtin(s, nil, "to_s", 0, |_, _| str_new(""));
    define_builtin(s, nil, "to_a", 0, |_, _| ary_new(Vec::new()));
    define_builtin(s, nil, "to_i", 0, |_, _| convert::int2inum(0));
    define_builtin(s, nil, "inspect", 0, |_, _| str_new("nil"));
    define_builtin(s, nil, "nil?", 0, |_, _| Value::TRUE);

    let true_class = s.classes.true_class;
    define_builtin(s, true_class, "to_s", 0, |_, _| str_new("true"));
    define_builtin(s, true_class, "inspect", 0, |_, _| str_new("true"));
    let false_class = s.classes.false_class;
    define_builtin(s, false_class, "to_s", 0, |_, _| str_new("false"));
    define_builtin(s, false_class, "inspect", 0, |_, _| str_new("false"));
}

fn elements(recv: Value) -> Vec<Value> {
    ary_entries(recv).unwrap_or_default()
}

fn array_inspect(recv: Value, _: &[Value]) -> Value {
    let shown: Vec<String> = elements(recv).into_iter().map(inspect_string).collect();
    str_new(&format!("[{}]", shown.join(", ")))
}

fn install_array(s: &mut State) {
    let array = s.classes.array;
    define_builtin(s, array, "each", 0, |recv, _| {
        for element in elements(recv) {
            yield_values(&[element]);
        }
        recv
    });
    define_builtin(s, array, "map", 0, |recv, _| {
        let result = ary_new(Vec::new());
        with_state(|s| s.stack().stack_roots.push(result));
        for element in elements(recv) {
            let mapped = yield_values(&[element]);
            convert::ary_push(result, mapped);
        }
        with_state(|s| {
            let roots = &mut s.stack().stack_roots;
            if let Some(pos) = roots.iter().rposition(|v| *v == result) {
                roots.remove(pos);
            }
        });
        result
    });
    let size: fn(Value, &[Value]) -> Value = |recv, _| convert::int2inum(elements(recv).len() as i64);
    define_builtin(s, array, "size", 0, size);
    define_builtin(s, array, "length", 0, size);
    define_builtin(s, array, "[]", 1, |recv, args| {
        let items = elements(recv);
        let index = convert::num2long(args[0]);
        let resolved = if index < 0 { items.len() as i64 + index } else { index };
        usize::try_from(resolved)
            .ok()
            .and_then(|i| items.get(i).copied())
            .unwrap_or(Value::NIL)
    });
    define_builtin(s, array, "<<", 1, |recv, args| {
        convert::ary_push(recv, args[0]);
        recv
    });
    define_builtin(s, array, "push", -1, |recv, args| {
        for arg in args {
            convert::ary_push(recv, *arg);
        }
        recv
    });
    define_builtin(s, array, "first", 0, |recv, _| elements(recv).first().copied().unwrap_or(Value::NIL));
    define_builtin(s, array, "last", 0, |recv, _| elements(recv).last().copied().unwrap_or(Value::NIL));
    define_builtin(s, array, "to_a", 0, |recv, _| recv);
    define_builtin(s, array, "to_ary", 0, |recv, _| recv);
    define_builtin(s, array, "inspect", 0, array_inspect);
    define_builtin(s, array, "to_s", 0, array_inspect);
    define_builtin(s, array, "==", 1, |recv, args| {
        let Some(other) = ary_entries(args[0]) else {
            return Value::FALSE;
        };
        let mine = elements(recv);
        if mine.len() != other.len() {
            return Value::FALSE;
        }
        let eq = with_state(|s| s.ids.eq);
        let same = mine
            .into_iter()
            .zip(other)
            .all(|(a, b)| funcall(a, eq, &[b]).is_truthy());
        Value::from_bool(same)
    });
}

fn pairs(recv: Value) -> Vec<(Value, Value)> {
    hash_entries(recv).unwrap_or_default()
}

fn hash_inspect(recv: Value, _: &[Value]) -> Value {
    let shown: Vec<String> = pairs(recv)
        .into_iter()
        .map(|(k, v)| format!("{}=>{}", inspect_string(k), inspect_string(v)))
        .collect();
    str_new(&format!("{{{}}}", shown.join(", ")))
}

fn install_hash(s: &mut State) {
    let hash = s.classes.hash;
    define_builtin(s, hash, "[]", 1, |recv, args| {
        convert::hash_lookup(recv, args[0]).unwrap_or(Value::NIL)
    });
    define_builtin(s, hash, "[]=", 2, |recv, args| {
        convert::hash_aset(recv, args[0], args[1]);
        args[1]
    });
    define_builtin(s, hash, "size", 0, |recv, _| convert::int2inum(pairs(recv).len() as i64));
    define_builtin(s, hash, "keys", 0, |recv, _| ary_new(pairs(recv).into_iter().map(|(k, _)| k).collect()));
    define_builtin(s, hash, "values", 0, |recv, _| ary_new(pairs(recv).into_iter().map(|(_, v)| v).collect()));
    define_builtin(s, hash, "to_hash", 0, |recv, _| recv);
    define_builtin(s, hash, "to_h", 0, |recv, _| recv);
    define_builtin(s, hash, "key?", 1, |recv, args| {
        Value::from_bool(convert::hash_lookup(recv, args[0]).is_some())
    });
    define_builtin(s, hash, "fetch", -1, |recv, args| {
        if args.is_empty() || args.len() > 2 {
            jump::raise_failure(call::arity_failure(args.len(), 1, 2));
        }
        match (convert::hash_lookup(recv, args[0]), args.get(1)) {
            (Some(value), _) => value,
            (None, Some(default)) => *default,
            (None, None) => raise_with(
                |s| s.classes.key_error,
                &format!("key not found: {}", inspect_string(args[0])),
            ),
        }
    });
    define_builtin(s, hash, "each", 0, |recv, _| {
        for (key, value) in pairs(recv) {
            yield_values(&[key, value]);
        }
        recv
    });
    define_builtin(s, hash, "inspect", 0, hash_inspect);
    define_builtin(s, hash, "to_s", 0, hash_inspect);
}

fn install_proc(s: &mut State) {
    let proc_class = s.classes.proc_class;
    define_builtin(s, proc_class, "call", -1, |recv, args| call::proc_call(recv, args, Value::NIL));
    define_builtin(s, proc_class, "lambda?", 0, |_, _| Value::FALSE);
    define_builtin(s, proc_class, "to_proc", 0, |recv, _| recv);
}

fn exception_message(recv: Value) -> String {
    let stored = with_state(|s| {
        let mesg = s.ids.mesg;
        s.obj(recv).and_then(|o| o.ivars.get(&mesg).copied())
    });
    match stored {
        Some(text) if !text.is_nil() => convert::to_s_string(text),
        _ => classname(recv),
    }
}

fn install_exception(s: &mut State) {
    let exception = s.classes.exception;
    define_builtin(s, exception, "initialize", -1, |recv, args| {
        if args.len() > 1 {
            jump::raise_failure(call::arity_failure(args.len(), 0, 1));
        }
        if let Some(message) = args.first() {
            let mesg = with_state(|s| s.ids.mesg);
            class::ivar_set(recv, mesg, *message);
        }
        Value::NIL
    });
    define_builtin(s, exception, "to_s", 0, |recv, _| str_new(&exception_message(recv)));
    define_builtin(s, exception, "message", 0, |recv, _| {
        let to_s = with_state(|s| s.ids.to_s);
        funcall(recv, to_s, &[])
    });
    define_builtin(s, exception, "inspect", 0, |recv, _| {
        let name = with_state(|s| {
            let klass = s.class_of(recv);
            class_name_of(s, class_real(s, klass))
        });
        let message = exception_message(recv);
        if message.is_empty() || message == name {
            str_new(&name)
        } else {
            str_new(&format!("#<{}: {}>", name, message))
        }
    });
    define_singleton_builtin(s, exception, "exception", -1, |recv, args| {
        let new = intern("new");
        funcall(recv, new, args)
    });
    define_builtin(s, exception, "exception", -1, |recv, args| match args {
        [] => recv,
        [message] => {
            let klass = class::class_real_of(recv);
            let new = intern("new");
            funcall(klass, new, &[*message])
        }
        _ => jump::raise_failure(call::arity_failure(args.len(), 0, 1)),
    });
}
