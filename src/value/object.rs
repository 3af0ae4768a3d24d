use std::any::{self, Any};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dispatch::{BlockContext, BoundPayload, names};
use crate::error::{BridgeError, history};
use crate::guest::{self, Id, Value, convert, helpers};
use crate::protect::{self, Job, JobOutput};
use crate::retention::BlockRetention;

use super::ValueBox;

struct ObjectInner {
    boxed: Box<ValueBox>,
    retained: RefCell<Vec<Rc<dyn Any>>>,
}

/// Reference-counted host handle on one interpreter value.
///
/// Clones share the box and the retained list. [`RbObject::duplicate`]
/// registers a second box instead.
#[derive(Clone)]
pub struct RbObject {
    inner: Rc<ObjectInner>,
}

impl RbObject {
    pub fn from_value(value: Value) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                boxed: ValueBox::alloc(value),
                retained: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn value(&self) -> Value {
        self.inner.boxed.handle()
    }

    pub fn nil() -> Self {
        Self::from_value(Value::NIL)
    }

    pub fn from_bool(flag: bool) -> Self {
        Self::from_value(Value::from_bool(flag))
    }

    pub fn from_i64(n: i64) -> Result<Self, BridgeError> {
        match Value::fixnum(n) {
            Some(value) => Ok(Self::from_value(value)),
            None => {
                protect::guard()?;
                Ok(Self::from_value(convert::int2inum(n)))
            }
        }
    }

    pub fn from_u64(n: u64) -> Result<Self, BridgeError> {
        match i64::try_from(n).ok().and_then(Value::fixnum) {
            Some(value) => Ok(Self::from_value(value)),
            None => {
                protect::guard()?;
                Ok(Self::from_value(convert::uint2inum(n)))
            }
        }
    }

    pub fn from_f64(f: f64) -> Result<Self, BridgeError> {
        protect::guard()?;
        Ok(Self::from_value(convert::float_new(f)))
    }

    pub fn string(text: &str) -> Result<Self, BridgeError> {
        protect::guard()?;
        Ok(Self::from_value(convert::str_new(text)))
    }

    pub fn symbol(name: &str) -> Result<Self, BridgeError> {
        let id = intern(name)?;
        Ok(Self::from_value(Value::from_id(id)))
    }

    /// The interpreter's `main` object.
    pub fn top_self() -> Result<Self, BridgeError> {
        protect::guard()?;
        Ok(Self::from_value(guest::top_self()))
    }

    /// A constant looked up from `Object`.
    pub fn constant(name: &str) -> Result<Self, BridgeError> {
        names::check_constant_name(name)?;
        protect::guard()?;
        let object = guest::core_classes().object;
        let id = intern(name)?;
        protect::protect_object(Job::ConstGet { scope: object, name: id })
    }

    /// A new, independently registered handle on the same value.
    pub fn duplicate(&self) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                boxed: self.inner.boxed.duplicate(),
                retained: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Keeps `keep` alive for as long as this object is.
    pub fn retain(&self, keep: Rc<dyn Any>) {
        self.inner.retained.borrow_mut().push(keep);
    }

    pub fn retained_count(&self) -> usize {
        self.inner.retained.borrow().len()
    }

    pub fn is_nil(&self) -> bool {
        self.value().is_nil()
    }

    pub fn is_truthy(&self) -> bool {
        self.value().is_truthy()
    }

    pub fn call(&self, method: &str, args: &[RbObject]) -> Result<RbObject, BridgeError> {
        let id = method_id(method)?;
        let args = values(args);
        protect::protect_object(Job::Funcall {
            recv: self.value(),
            method: id,
            args: &args,
            kw_splat: false,
        })
    }

    /// Calls `method` passing `keywords` as keyword arguments.
    pub fn call_with_keywords(
        &self,
        method: &str,
        args: &[RbObject],
        keywords: &[(&str, RbObject)],
    ) -> Result<RbObject, BridgeError> {
        let id = method_id(method)?;
        let mut keys = Vec::with_capacity(keywords.len());
        for (name, _) in keywords {
            names::check_keyword_name(name)?;
            keys.push(intern(name)?);
        }
        protect::guard()?;
        let hash = RbObject::from_value(convert::hash_new());
        for (key, (_, value)) in keys.into_iter().zip(keywords) {
            convert::hash_aset(hash.value(), Value::from_id(key), value.value());
        }
        let mut args = values(args);
        args.push(hash.value());
        protect::protect_object(Job::Funcall {
            recv: self.value(),
            method: id,
            args: &args,
            kw_splat: true,
        })
    }

    /// Calls `method` with a host block.
    ///
    /// `retention` decides how long the block outlives this call. Picking a
    /// policy shorter than the interpreter's use of the block is the caller's
    /// error and is not detected.
    ///
    /// The block is not re-entrant. If `block` leads the interpreter to yield
    /// to it again before it returns, that inner yield fails with
    /// [`BridgeError::HostPanic`] (a `RuntimeError` on the interpreter side)
    /// instead of running the closure twice at once.
    pub fn call_with_block<F>(
        &self,
        method: &str,
        args: &[RbObject],
        retention: BlockRetention,
        block: F,
    ) -> Result<RbObject, BridgeError>
    where
        F: FnMut(&[RbObject], Option<&RbObject>) -> Result<RbObject, BridgeError> + 'static,
    {
        let id = method_id(method)?;
        let args = values(args);
        let context = Rc::new(BlockContext::new(block));
        let result = protect::protect_object(Job::BlockCall {
            recv: self.value(),
            method: id,
            args: &args,
            ctx: Rc::as_ptr(&context).cast_mut().cast(),
            kw_splat: false,
        });
        retention.settle(context, self, &result);
        result
    }

    /// Constant `name` seen from this class or module.
    pub fn get_const(&self, name: &str) -> Result<RbObject, BridgeError> {
        names::check_constant_name(name)?;
        let id = intern(name)?;
        protect::protect_object(Job::ConstGet {
            scope: self.value(),
            name: id,
        })
    }

    pub fn set_const(&self, name: &str, value: &RbObject) -> Result<(), BridgeError> {
        names::check_constant_name(name)?;
        let id = intern(name)?;
        protect::protect(Job::ConstSet {
            scope: self.value(),
            name: id,
            value: value.value(),
        })
        .map(|_| ())
    }

    pub fn to_i64(&self) -> Result<i64, BridgeError> {
        protect::protect(Job::ToLong(self.value()))?.into_long()
    }

    /// Unsigned conversion. Negative values are a `TypeError` rather than
    /// wrapping around.
    pub fn to_u64(&self) -> Result<u64, BridgeError> {
        protect::protect(Job::ToULong(self.value()))?.into_ulong()
    }

    pub fn to_f64(&self) -> Result<f64, BridgeError> {
        protect::protect(Job::ToDouble(self.value()))?.into_double()
    }

    /// `String(self)` as host text.
    pub fn try_to_string(&self) -> Result<String, BridgeError> {
        let converted = protect::protect_object(Job::ToString(self.value()))?;
        convert::string_value(converted.value())
            .ok_or_else(|| BridgeError::bad_type("String", guest::class::obj_classname(converted.value())))
    }

    pub fn inspect(&self) -> Result<String, BridgeError> {
        let shown = protect::protect_object(Job::Inspect(self.value()))?;
        convert::string_value(shown.value())
            .ok_or_else(|| BridgeError::bad_type("String", guest::class::obj_classname(shown.value())))
    }

    pub fn class_name(&self) -> Result<String, BridgeError> {
        protect::guard()?;
        Ok(guest::class::obj_classname(self.value()))
    }

    pub fn is_kind_of(&self, class: &RbObject) -> Result<bool, BridgeError> {
        protect::guard()?;
        Ok(guest::class::obj_is_kind_of(self.value(), class.value()))
    }

    /// Runs `f` on the host payload of a bound object.
    ///
    /// `f` must not reach the same payload again through another handle.
    /// Payloads stay on the thread that allocated them; from any other
    /// thread this fails with [`BridgeError::Gvl`].
    pub fn with_bound_object<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, BridgeError> {
        protect::guard()?;
        let Some((_, ptr)) = helpers::get_bound_object(self.value()) else {
            return Err(BridgeError::bad_type(
                any::type_name::<T>(),
                guest::class::obj_classname(self.value()),
            ));
        };
        // SAFETY: bound payloads are `Box<BoundPayload>` leaked by the
        // allocator trampoline and only freed when the object is swept, which
        // cannot happen while this handle roots it.
        let payload = unsafe { &mut *ptr.cast::<BoundPayload>() };
        let payload = payload.get_mut().map_err(history::recorded)?;
        match payload.downcast_mut::<T>() {
            Some(target) => Ok(f(target)),
            None => Err(BridgeError::bad_type(
                any::type_name::<T>(),
                guest::class::obj_classname(self.value()),
            )),
        }
    }
}

impl fmt::Debug for RbObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RbObject({:?})", self.value())
    }
}

/// Identity comparison of the underlying values.
impl PartialEq for RbObject {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

pub(crate) fn values(objects: &[RbObject]) -> Vec<Value> {
    objects.iter().map(RbObject::value).collect()
}

pub(crate) fn intern(name: &str) -> Result<Id, BridgeError> {
    protect::protect(Job::Intern(name)).and_then(JobOutput::into_id)
}

fn method_id(name: &str) -> Result<Id, BridgeError> {
    names::check_method_name(name)?;
    intern(name)
}
