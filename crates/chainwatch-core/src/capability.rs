#![forbid(unsafe_code)]

//! Capabilities a host object model supplies to the observation tree.
//!
//! The tree never inspects host objects directly. It asks two questions,
//! once per bind:
//!
//! 1. Can I read property `s` from this object? ([`PropertySource::read`])
//! 2. Will this object tell me when a property changes?
//!    ([`PropertySource::notifier`])
//!
//! A host object that answers `None` to the second question can still be the
//! terminal value of a chain, but never an intermediate one.

use std::rc::Rc;

use crate::error::{ChainError, Result};
use crate::signal::{Signal, Subscription};
use crate::value::Value;

/// Handler invoked with the name of the property that changed.
pub type ChangeHandler = Rc<dyn Fn(&str)>;

/// Change-notification capability of a host object.
pub trait ChangeNotifier {
    /// Register `handler`; it stays registered until the returned guard is
    /// released or dropped.
    fn subscribe_changes(&self, handler: ChangeHandler) -> Subscription;
}

/// Property-read capability of a host object.
pub trait PropertySource {
    /// Runtime type name, used in diagnostics.
    fn type_name(&self) -> &str;

    /// Read property `segment`. `None` means the property does not exist on
    /// this runtime type (as opposed to existing and being `Null`).
    fn read(&self, segment: &str) -> Option<Value>;

    /// Change-notification capability, if this object supports it.
    fn notifier(&self) -> Option<&dyn ChangeNotifier> {
        None
    }

    /// Human readable description used when reporting the observed root.
    fn describe(&self) -> String {
        self.type_name().to_string()
    }
}

impl ChangeNotifier for Signal<str> {
    fn subscribe_changes(&self, handler: ChangeHandler) -> Subscription {
        self.subscribe_rc(handler)
    }
}

/// Read `segment` from `target`.
///
/// Reading from `Null` yields `Null`: a chain broken by an absent
/// intermediate value is not an error. Reading from a scalar, or a property
/// the object does not have, fails with [`ChainError::SegmentNotFound`].
pub fn read_segment(target: &Value, segment: &str) -> Result<Value> {
    match target {
        Value::Null => Ok(Value::Null),
        Value::Object(obj) => obj
            .read(segment)
            .ok_or_else(|| ChainError::segment_not_found(segment, obj.type_name())),
        other => Err(ChainError::segment_not_found(segment, other.type_name())),
    }
}
