//! Object construction, accessors and the `Kernel` conversion primitives.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

use super::call::funcall;
use super::class::{self, obj_classname_of};
use super::jump::{self, Failure, GuestResult, check};
use super::object::ObjectBody;
use super::state::{State, with_state};
use super::value::{Value, ValueType};

enum Shape {
    Fixnum(i64),
    Bignum(BigInt),
    Float(f64),
    String(String),
    Nil,
    Bool(bool),
    Other,
}

fn shape(value: Value) -> Shape {
    match value {
        Value::NIL => Shape::Nil,
        Value::TRUE => Shape::Bool(true),
        Value::FALSE => Shape::Bool(false),
        v if v.is_fixnum() => Shape::Fixnum(v.fix2long()),
        v => with_state(|s| match s.obj(v).map(|o| &o.body) {
            Some(ObjectBody::Bignum(n)) => Shape::Bignum(n.clone()),
            Some(ObjectBody::Float(f)) => Shape::Float(*f),
            Some(ObjectBody::String(text)) => Shape::String(text.clone()),
            _ => Shape::Other,
        }),
    }
}

pub fn str_new(text: &str) -> Value {
    with_state(|s| s.new_string(text))
}

pub fn float_new(f: f64) -> Value {
    with_state(|s| {
        let klass = s.classes.float;
        s.alloc(klass, ObjectBody::Float(f))
    })
}

pub(crate) fn bignum_in(s: &mut State, n: BigInt) -> Value {
    if let Some(small) = n.to_i64().and_then(Value::fixnum) {
        return small;
    }
    let klass = s.classes.integer;
    s.alloc(klass, ObjectBody::Bignum(n))
}

/// An Integer for `n`, demoted to a fixnum when it fits.
pub fn integer_from_bigint(n: BigInt) -> Value {
    if let Some(small) = n.to_i64().and_then(Value::fixnum) {
        return small;
    }
    with_state(|s| bignum_in(s, n))
}

pub fn int2inum(n: i64) -> Value {
    Value::fixnum(n).unwrap_or_else(|| integer_from_bigint(BigInt::from(n)))
}

pub fn uint2inum(n: u64) -> Value {
    match i64::try_from(n) {
        Ok(small) => int2inum(small),
        Err(_) => integer_from_bigint(BigInt::from(n)),
    }
}

pub fn ary_new(elements: Vec<Value>) -> Value {
    with_state(|s| {
        let klass = s.classes.array;
        s.alloc(klass, ObjectBody::Array(elements))
    })
}

pub fn ary_push(array: Value, element: Value) {
    with_state(|s| {
        if let Some(ObjectBody::Array(elements)) = s.obj_mut(array).map(|o| &mut o.body) {
            elements.push(element);
        }
    })
}

pub fn ary_entries(array: Value) -> Option<Vec<Value>> {
    with_state(|s| match s.obj(array).map(|o| &o.body) {
        Some(ObjectBody::Array(elements)) => Some(elements.clone()),
        _ => None,
    })
}

pub fn hash_new() -> Value {
    with_state(|s| {
        let klass = s.classes.hash;
        s.alloc(klass, ObjectBody::Hash(Vec::new()))
    })
}

/// Hash key equality: identity, or equal contents for strings and numbers.
pub(crate) fn keys_equal(s: &State, a: Value, b: Value) -> bool {
    if a == b {
        return true;
    }
    match (s.obj(a).map(|o| &o.body), s.obj(b).map(|o| &o.body)) {
        (Some(ObjectBody::String(x)), Some(ObjectBody::String(y))) => x == y,
        (Some(ObjectBody::Float(x)), Some(ObjectBody::Float(y))) => x == y,
        (Some(ObjectBody::Bignum(x)), Some(ObjectBody::Bignum(y))) => x == y,
        _ => false,
    }
}

pub fn hash_aset(hash: Value, key: Value, value: Value) {
    with_state(|s| {
        let pos = match s.obj(hash).map(|o| &o.body) {
            Some(ObjectBody::Hash(pairs)) => pairs.iter().position(|(k, _)| keys_equal(s, *k, key)),
            _ => return,
        };
        if let Some(ObjectBody::Hash(pairs)) = s.obj_mut(hash).map(|o| &mut o.body) {
            match pos {
                Some(i) => pairs[i].1 = value,
                None => pairs.push((key, value)),
            }
        }
    })
}

pub fn hash_lookup(hash: Value, key: Value) -> Option<Value> {
    with_state(|s| match s.obj(hash).map(|o| &o.body) {
        Some(ObjectBody::Hash(pairs)) => pairs
            .iter()
            .find(|(k, _)| keys_equal(s, *k, key))
            .map(|(_, v)| *v),
        _ => None,
    })
}

pub fn hash_entries(hash: Value) -> Option<Vec<(Value, Value)>> {
    with_state(|s| match s.obj(hash).map(|o| &o.body) {
        Some(ObjectBody::Hash(pairs)) => Some(pairs.clone()),
        _ => None,
    })
}

pub fn string_value(value: Value) -> Option<String> {
    with_state(|s| match s.obj(value).map(|o| &o.body) {
        Some(ObjectBody::String(text)) => Some(text.clone()),
        _ => None,
    })
}

pub fn float_value(value: Value) -> Option<f64> {
    with_state(|s| match s.obj(value).map(|o| &o.body) {
        Some(ObjectBody::Float(f)) => Some(*f),
        _ => None,
    })
}

/// The value of an Integer, fixnum or bignum.
pub fn integer_value(value: Value) -> Option<BigInt> {
    if value.is_fixnum() {
        return Some(BigInt::from(value.fix2long()));
    }
    with_state(|s| match s.obj(value).map(|o| &o.body) {
        Some(ObjectBody::Bignum(n)) => Some(n.clone()),
        _ => None,
    })
}

pub fn value_type(value: Value) -> ValueType {
    with_state(|s| s.value_type(value))
}

pub fn is_integer(value: Value) -> bool {
    matches!(value_type(value), ValueType::Fixnum | ValueType::Bignum)
}

pub fn is_float(value: Value) -> bool {
    value_type(value) == ValueType::Float
}

pub fn is_exception(value: Value) -> bool {
    with_state(|s| {
        let exception = s.classes.exception;
        !value.is_special_const() && class::is_kind_of(s, value, exception)
    })
}

fn raise_type(message: String) -> ! {
    let class = with_state(|s| s.classes.type_error);
    jump::raise_new(class, &message)
}

fn classname(value: Value) -> String {
    match value {
        Value::NIL => "nil".to_string(),
        Value::TRUE => "true".to_string(),
        Value::FALSE => "false".to_string(),
        v => with_state(|s| obj_classname_of(s, v)),
    }
}

pub(crate) fn float_to_s(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if f == f.trunc() && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn float_domain(f: f64) -> Failure {
    with_state(|s| Failure::new(s.classes.float_domain_error, float_to_s(f)))
}

fn float_to_integer(f: f64) -> GuestResult<Value> {
    if !f.is_finite() {
        return Err(float_domain(f));
    }
    match BigInt::from_f64(f.trunc()) {
        Some(n) => Ok(integer_from_bigint(n)),
        None => Err(float_domain(f)),
    }
}

fn parse_integer_literal(text: &str) -> Option<BigInt> {
    let trimmed = text.trim();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = rest.to_ascii_lowercase();
    let (radix, digits) = if let Some(d) = lower.strip_prefix("0x") {
        (16, d)
    } else if let Some(d) = lower.strip_prefix("0b") {
        (2, d)
    } else if let Some(d) = lower.strip_prefix("0o") {
        (8, d)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || !digits.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let n = BigInt::parse_bytes(cleaned.as_bytes(), radix)?;
    Some(if negative { -n } else { n })
}

fn parse_float_literal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('_')
        || trimmed.ends_with('_')
        || trimmed.contains("__")
        || trimmed
            .chars()
            .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | '_' | 'e' | 'E' | '+' | '-')))
    {
        return None;
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f64>().ok()
}

fn responds(value: Value, method: &str) -> Option<super::value::Id> {
    let id = with_state(|s| s.intern(method));
    class::respond_to(value, id).then_some(id)
}

fn convertible_to_integer(value: Value) -> bool {
    is_integer(value)
        || is_float(value)
        || responds(value, "to_int").is_some()
        || responds(value, "to_i").is_some()
}

/// One step of `Kernel#Integer`.
///
/// Numbers and strings convert directly. Other objects are asked for
/// `to_int`, then `to_i`; a result that is itself convertible is returned as
/// is, so callers that need a primitive keep converting.
pub fn integer(value: Value) -> Value {
    match shape(value) {
        Shape::Fixnum(_) | Shape::Bignum(_) => value,
        Shape::Float(f) => check(float_to_integer(f)),
        Shape::String(text) => match parse_integer_literal(&text) {
            Some(n) => integer_from_bigint(n),
            None => {
                let class = with_state(|s| s.classes.argument_error);
                jump::raise_new(
                    class,
                    &format!("invalid value for Integer(): {}", quote(&text)),
                )
            }
        },
        Shape::Nil => raise_type("can't convert nil into Integer".to_string()),
        Shape::Bool(_) | Shape::Other => {
            for method in ["to_int", "to_i"] {
                if let Some(id) = responds(value, method) {
                    let result = funcall(value, id, &[]);
                    if convertible_to_integer(result) {
                        return result;
                    }
                    let from = classname(value);
                    raise_type(format!(
                        "can't convert {} to Integer ({}#{} gives {})",
                        from,
                        from,
                        method,
                        classname(result)
                    ));
                }
            }
            raise_type(format!("can't convert {} into Integer", classname(value)))
        }
    }
}

/// `Kernel#Float`.
pub fn float_convert(value: Value) -> Value {
    match shape(value) {
        Shape::Float(_) => value,
        Shape::Fixnum(n) => float_new(n as f64),
        Shape::Bignum(n) => float_new(n.to_f64().unwrap_or(f64::INFINITY)),
        Shape::String(text) => match parse_float_literal(&text) {
            Some(f) => float_new(f),
            None => {
                let class = with_state(|s| s.classes.argument_error);
                jump::raise_new(
                    class,
                    &format!("invalid value for Float(): {}", quote(&text)),
                )
            }
        },
        Shape::Nil => raise_type("can't convert nil into Float".to_string()),
        Shape::Bool(_) | Shape::Other => match responds(value, "to_f") {
            Some(id) => {
                let result = funcall(value, id, &[]);
                if is_float(result) {
                    result
                } else {
                    let from = classname(value);
                    raise_type(format!(
                        "can't convert {} to Float ({}#to_f gives {})",
                        from,
                        from,
                        classname(result)
                    ))
                }
            }
            None => raise_type(format!("can't convert {} into Float", classname(value))),
        },
    }
}

/// `Kernel#String`.
pub fn string_convert(value: Value) -> Value {
    if string_value(value).is_some() {
        return value;
    }
    let method = responds(value, "to_str").or_else(|| responds(value, "to_s"));
    match method {
        Some(id) => {
            let result = funcall(value, id, &[]);
            if string_value(result).is_some() {
                result
            } else {
                raise_type(format!("can't convert {} to String", classname(value)))
            }
        }
        None => raise_type(format!("can't convert {} into String", classname(value))),
    }
}

/// `Kernel#Array`.
pub fn array_convert(value: Value) -> Value {
    if value.is_nil() {
        return ary_new(Vec::new());
    }
    if ary_entries(value).is_some() {
        return value;
    }
    for method in ["to_ary", "to_a"] {
        if let Some(id) = responds(value, method) {
            let result = funcall(value, id, &[]);
            if result.is_nil() {
                continue;
            }
            if ary_entries(result).is_some() {
                return result;
            }
            let from = classname(value);
            raise_type(format!(
                "can't convert {} to Array ({}#{} gives {})",
                from,
                from,
                method,
                classname(result)
            ));
        }
    }
    ary_new(vec![value])
}

/// Returns the hash `value` converts to implicitly, if any.
pub fn check_hash_type(value: Value) -> Option<Value> {
    if hash_entries(value).is_some() {
        return Some(value);
    }
    let id = responds(value, "to_hash")?;
    let result = funcall(value, id, &[]);
    if hash_entries(result).is_some() {
        Some(result)
    } else {
        raise_type(format!(
            "can't convert {} to Hash ({}#to_hash gives {})",
            classname(value),
            classname(value),
            classname(result)
        ))
    }
}

/// `Kernel#Hash`.
pub fn hash_convert(value: Value) -> Value {
    if value.is_nil() || ary_entries(value).is_some_and(|a| a.is_empty()) {
        return hash_new();
    }
    match check_hash_type(value) {
        Some(hash) => hash,
        None => raise_type(format!("can't convert {} into Hash", classname(value))),
    }
}

fn implicit_integer(value: Value) -> Value {
    match responds(value, "to_int") {
        Some(id) => {
            let result = funcall(value, id, &[]);
            if is_integer(result) {
                result
            } else {
                let from = classname(value);
                raise_type(format!(
                    "can't convert {} to Integer ({}#to_int gives {})",
                    from,
                    from,
                    classname(result)
                ))
            }
        }
        None => raise_type(format!(
            "no implicit conversion of {} into Integer",
            classname(value)
        )),
    }
}

fn range_error(message: String) -> ! {
    let class = with_state(|s| s.classes.range_error);
    jump::raise_new(class, &message)
}

/// Signed native conversion.
pub fn num2long(value: Value) -> i64 {
    match shape(value) {
        Shape::Fixnum(n) => n,
        Shape::Bignum(n) => match n.to_i64() {
            Some(n) => n,
            None => range_error("bignum too big to convert into 'long'".to_string()),
        },
        Shape::Float(f) => {
            if f.is_finite() && f.trunc() >= i64::MIN as f64 && f.trunc() < i64::MAX as f64 {
                f.trunc() as i64
            } else {
                range_error(format!("float {} out of range of integer", float_to_s(f)))
            }
        }
        Shape::Nil => raise_type("no implicit conversion from nil to integer".to_string()),
        Shape::Bool(flag) => raise_type(format!("no implicit conversion of {} into Integer", flag)),
        Shape::String(_) | Shape::Other => num2long(implicit_integer(value)),
    }
}

/// Unsigned native conversion. Negative values wrap, as the native
/// primitive does.
pub fn num2ulong(value: Value) -> u64 {
    match shape(value) {
        Shape::Fixnum(n) => n as u64,
        Shape::Bignum(n) => {
            if n.is_negative() {
                match n.to_i64() {
                    Some(small) => small as u64,
                    None => range_error("bignum out of range of unsigned long".to_string()),
                }
            } else {
                match n.to_u64() {
                    Some(big) => big,
                    None => range_error("bignum out of range of unsigned long".to_string()),
                }
            }
        }
        Shape::Float(f) => {
            let t = f.trunc();
            if f.is_finite() && t < 0.0 && t >= i64::MIN as f64 {
                (t as i64) as u64
            } else if f.is_finite() && t >= 0.0 && t < u64::MAX as f64 {
                t as u64
            } else {
                range_error(format!("float {} out of range of integer", float_to_s(f)))
            }
        }
        Shape::Nil => raise_type("no implicit conversion from nil to integer".to_string()),
        Shape::Bool(flag) => raise_type(format!("no implicit conversion of {} into Integer", flag)),
        Shape::String(_) | Shape::Other => num2ulong(implicit_integer(value)),
    }
}

/// Native float conversion.
pub fn num2dbl(value: Value) -> f64 {
    match shape(value) {
        Shape::Float(f) => f,
        Shape::Fixnum(n) => n as f64,
        Shape::Bignum(n) => n.to_f64().unwrap_or(if n.is_negative() {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }),
        Shape::String(_) => raise_type("no implicit conversion to float from string".to_string()),
        Shape::Nil => raise_type("no implicit conversion to float from nil".to_string()),
        Shape::Bool(flag) => raise_type(format!("no implicit conversion to float from {}", flag)),
        Shape::Other => num2dbl(float_convert(value)),
    }
}

/// Sign of a numeric value, or `None` for non-numerics.
pub fn numeric_sign(value: Value) -> Option<std::cmp::Ordering> {
    use std::cmp::Ordering;
    match shape(value) {
        Shape::Fixnum(n) => Some(n.cmp(&0)),
        Shape::Bignum(n) => Some(if n.is_negative() {
            Ordering::Less
        } else if n.is_zero() {
            Ordering::Equal
        } else {
            Ordering::Greater
        }),
        Shape::Float(f) => f.partial_cmp(&0.0),
        _ => None,
    }
}

pub(crate) fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Default `#<Foo>` rendering.
pub fn any_to_s(value: Value) -> String {
    format!("#<{}>", classname(value))
}

/// `inspect`, always producing a String.
pub fn inspect(value: Value) -> Value {
    let id = with_state(|s| s.ids.inspect);
    let result = funcall(value, id, &[]);
    if string_value(result).is_some() {
        result
    } else {
        str_new(&any_to_s(value))
    }
}

pub fn inspect_string(value: Value) -> String {
    let shown = inspect(value);
    string_value(shown).unwrap_or_else(|| any_to_s(value))
}

/// `to_s`, falling back to the default rendering.
pub fn to_s_string(value: Value) -> String {
    let id = with_state(|s| s.ids.to_s);
    let result = funcall(value, id, &[]);
    string_value(result).unwrap_or_else(|| any_to_s(value))
}
