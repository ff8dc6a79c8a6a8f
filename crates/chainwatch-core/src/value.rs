#![forbid(unsafe_code)]

//! Dynamic values read out of a host object graph.
//!
//! # Identity vs equality
//!
//! Two relations are defined on [`Value`]:
//!
//! - [`Value::same_ref`] is the identity test used when re-binding a chain
//!   node. Objects compare by pointer, scalars by value.
//! - `PartialEq` is the value equality used to suppress change events whose
//!   observed value did not actually change. Objects still compare by pointer
//!   (a host object has no structural equality); floats treat `NaN` as equal
//!   to `NaN` so a `NaN` terminal does not fire on every update.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::capability::PropertySource;

/// Shared handle to a host object.
///
/// Cloning shares the same object. Equality is pointer identity.
#[derive(Clone)]
pub struct ObjectRef(Rc<dyn PropertySource>);

impl ObjectRef {
    /// Wrap a host object.
    pub fn new<P: PropertySource + 'static>(source: P) -> Self {
        Self(Rc::new(source))
    }

    /// Wrap an already shared host object.
    #[must_use]
    pub fn from_rc(source: Rc<dyn PropertySource>) -> Self {
        Self(source)
    }

    /// Whether both handles point at the same host object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    /// The underlying shared pointer.
    #[must_use]
    pub fn as_rc(&self) -> &Rc<dyn PropertySource> {
        &self.0
    }
}

impl Deref for ObjectRef {
    type Target = dyn PropertySource;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&self.0.type_name()).finish()
    }
}

impl<P: PropertySource + 'static> From<Rc<P>> for ObjectRef {
    fn from(source: Rc<P>) -> Self {
        Self(source)
    }
}

/// A value read from a host object property.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent value. Reading any segment from `Null` yields `Null`.
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    /// A nested host object.
    Object(ObjectRef),
}

impl Value {
    /// Identity test used for bind idempotence.
    #[must_use]
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Text(a), Self::Text(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => self == other,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The host object, if this value is one.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Runtime type name, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Object(obj) => obj.type_name(),
        }
    }

    /// Typed view of this value.
    #[must_use]
    pub fn get<T: FromValue>(&self) -> Option<T> {
        T::from_value(self)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Text(v) => f.debug_tuple("Text").field(v).finish(),
            Self::Object(v) => v.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Object(obj) => f.write_str(&obj.describe()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(Rc::from(v))
    }
}

impl From<Rc<str>> for Value {
    fn from(v: Rc<str>) -> Self {
        Self::Text(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Typed extraction from a [`Value`].
///
/// Returns `None` for `Null` and for values of another runtime type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        (!value.is_null()).then(|| value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v.to_string()),
            _ => None,
        }
    }
}

impl FromValue for Rc<str> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(Rc::clone(v)),
            _ => None,
        }
    }
}

impl FromValue for ObjectRef {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned()
    }
}
