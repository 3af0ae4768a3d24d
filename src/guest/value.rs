use std::fmt;

pub(crate) const FIXNUM_MAX: i64 = (1 << 62) - 1;
pub(crate) const FIXNUM_MIN: i64 = -(1 << 62);

const SPECIAL_MASK: u64 = 0x07;
const SYMBOL_FLAG: u64 = 0x0c;
const SLOT_SHIFT: u32 = 4;

/// Tagged interpreter value.
///
/// Immediates (`false`, `nil`, `true`, `undef`, fixnums, static symbols) are
/// encoded in the word itself. Everything else is a 16-aligned reference into
/// the guest heap.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

impl Value {
    pub const FALSE: Value = Value(0x00);
    pub const NIL: Value = Value(0x08);
    pub const TRUE: Value = Value(0x14);
    pub const UNDEF: Value = Value(0x34);

    pub const fn from_raw(raw: u64) -> Self {
        Value(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }

    pub fn from_bool(flag: bool) -> Self {
        if flag { Value::TRUE } else { Value::FALSE }
    }

    /// Returns `true` for values the collector never tracks.
    pub fn is_special_const(self) -> bool {
        self.0 & SPECIAL_MASK != 0 || self.0 & !Value::NIL.0 == 0
    }

    pub fn is_nil(self) -> bool {
        self == Value::NIL
    }

    pub fn is_undef(self) -> bool {
        self == Value::UNDEF
    }

    /// Ruby truthiness: everything except `false` and `nil`.
    pub fn is_truthy(self) -> bool {
        self.0 & !Value::NIL.0 != 0
    }

    pub fn is_fixnum(self) -> bool {
        self.0 & 1 == 1
    }

    /// Encodes `n` as a fixnum when it fits in 63 bits.
    pub fn fixnum(n: i64) -> Option<Value> {
        if (FIXNUM_MIN..=FIXNUM_MAX).contains(&n) {
            Some(Value(((n << 1) | 1) as u64))
        } else {
            None
        }
    }

    pub fn fix2long(self) -> i64 {
        (self.0 as i64) >> 1
    }

    pub fn is_symbol(self) -> bool {
        self.0 & 0xff == SYMBOL_FLAG
    }

    pub fn from_id(id: Id) -> Value {
        Value((id.0 << 8) | SYMBOL_FLAG)
    }

    pub fn symbol_id(self) -> Option<Id> {
        self.is_symbol().then_some(Id(self.0 >> 8))
    }

    pub(crate) fn from_slot(index: u32) -> Value {
        Value((index as u64 + 1) << SLOT_SHIFT)
    }

    pub(crate) fn slot(self) -> Option<u32> {
        if self.is_special_const() || self.0 & 0x0f != 0 {
            return None;
        }
        Some(((self.0 >> SLOT_SHIFT) - 1) as u32)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::NIL
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Value::FALSE => write!(f, "false"),
            Value::NIL => write!(f, "nil"),
            Value::TRUE => write!(f, "true"),
            Value::UNDEF => write!(f, "undef"),
            v if v.is_fixnum() => write!(f, "{}", v.fix2long()),
            v if v.is_symbol() => write!(f, "sym#{}", v.0 >> 8),
            v => match v.slot() {
                Some(slot) => write!(f, "obj@{}", slot),
                None => write!(f, "value(0x{:x})", v.0),
            },
        }
    }
}

/// Interned symbol identifier. `Id::default()` is never handed out by the
/// symbol table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Id(pub(crate) u64);

impl Id {
    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

/// Coarse classification of a value, in the spirit of `rb_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Nil,
    True,
    False,
    Undef,
    Fixnum,
    Symbol,
    Object,
    Class,
    Module,
    Float,
    String,
    Array,
    Hash,
    Bignum,
    Proc,
    Data,
    ThrowData,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Nil => "nil",
            ValueType::True => "true",
            ValueType::False => "false",
            ValueType::Undef => "undef",
            ValueType::Fixnum => "Integer",
            ValueType::Symbol => "Symbol",
            ValueType::Object => "Object",
            ValueType::Class => "Class",
            ValueType::Module => "Module",
            ValueType::Float => "Float",
            ValueType::String => "String",
            ValueType::Array => "Array",
            ValueType::Hash => "Hash",
            ValueType::Bignum => "Integer",
            ValueType::Proc => "Proc",
            ValueType::Data => "Data",
            ValueType::ThrowData => "throw data",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_constants() {
        assert!(Value::NIL.is_special_const());
        assert!(Value::FALSE.is_special_const());
        assert!(Value::TRUE.is_special_const());
        assert!(Value::UNDEF.is_special_const());
        assert!(Value::fixnum(-3).is_some_and(|v| v.is_special_const()));
        assert!(Value::from_id(Id(7)).is_special_const());
        assert!(!Value::from_slot(0).is_special_const());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::NIL.is_truthy());
        assert!(!Value::FALSE.is_truthy());
        assert!(Value::TRUE.is_truthy());
        assert!(Value::fixnum(0).is_some_and(|v| v.is_truthy()));
    }

    #[test]
    fn test_fixnum_range() {
        assert_eq!(Value::fixnum(FIXNUM_MAX).map(Value::fix2long), Some(FIXNUM_MAX));
        assert_eq!(Value::fixnum(FIXNUM_MIN).map(Value::fix2long), Some(FIXNUM_MIN));
        assert!(Value::fixnum(i64::MAX).is_none());
        assert!(Value::fixnum(i64::MIN).is_none());
    }

    #[test]
    fn test_slot_roundtrip() {
        let v = Value::from_slot(41);
        assert_eq!(v.slot(), Some(41));
        assert_eq!(Value::NIL.slot(), None);
        assert_eq!(Value::from_id(Id(3)).symbol_id(), Some(Id(3)));
    }
}
