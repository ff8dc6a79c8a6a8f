#![forbid(unsafe_code)]

//! Chain statuses: one registry entry per distinct (path, value type).
//!
//! A status caches the last value observed through its path and fans change
//! events out to its listeners. Listener callbacks are never invoked while
//! the tree is borrowed: [`StatusEntry::refresh`] returns a [`Delivery`]
//! closure that the tree runs after releasing its state.
//!
//! # Invariants
//!
//! 1. Two statuses never share a [`StatusKey`].
//! 2. `refresh` produces a delivery only when the new value differs from the
//!    cached one (by `PartialEq`), and updates the cache before returning.
//! 3. A status with zero listeners is removed from the registry.

use std::any::{Any, TypeId, type_name};
use std::cell::Cell;
use std::rc::Rc;

use chainwatch_core::{ChainError, ChainPath, FromValue, Value};

use crate::event::{ChainChanged, ChainEvent};

/// Listener callbacks to run once the tree state is released.
pub(crate) type Delivery = Box<dyn FnOnce()>;

pub(crate) type ListenerId = u64;

pub(crate) type Listener<T> = Rc<dyn Fn(&ChainEvent<T>)>;

/// Value types a chain can be observed as.
pub trait Observed: FromValue + Clone + PartialEq + 'static {}

impl<T: FromValue + Clone + PartialEq + 'static> Observed for T {}

/// Identity of a status: the observed path plus the declared value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StatusKey {
    pub(crate) path: ChainPath,
    value_type: TypeId,
    type_name: &'static str,
}

impl StatusKey {
    pub(crate) fn of<T: 'static>(path: ChainPath) -> Self {
        Self {
            path,
            value_type: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Type-erased view of a [`ChainStatus`] held by the registry.
pub(crate) trait StatusEntry {
    fn key(&self) -> &StatusKey;

    fn path(&self) -> &ChainPath {
        &self.key().path
    }

    fn listener_count(&self) -> usize;

    /// Remove one listener, handing it back so the caller can drop it
    /// outside the tree borrow.
    fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn Any>>;

    /// Re-evaluate against the value currently bound at the path's end.
    fn refresh(&mut self, current: &Value) -> Option<Delivery>;

    /// Report a re-binding failure on this path.
    fn fail(&self, error: &ChainError) -> Option<Delivery>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A registered listener. `attached` is cleared on removal so a delivery
/// built before the removal skips it.
struct Attached<T> {
    id: ListenerId,
    listener: Listener<T>,
    attached: Rc<Cell<bool>>,
}

pub(crate) struct ChainStatus<T: Observed> {
    key: StatusKey,
    last: Option<T>,
    listeners: Vec<Attached<T>>,
}

impl<T: Observed> ChainStatus<T> {
    pub(crate) fn new(path: ChainPath, current: &Value) -> Self {
        Self {
            key: StatusKey::of::<T>(path),
            last: T::from_value(current),
            listeners: Vec::new(),
        }
    }

    pub(crate) fn add_listener(&mut self, id: ListenerId, listener: Listener<T>) {
        self.listeners.push(Attached {
            id,
            listener,
            attached: Rc::new(Cell::new(true)),
        });
    }

    pub(crate) fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }

    fn deliver(&self, event: ChainEvent<T>) -> Option<Delivery> {
        if self.listeners.is_empty() {
            return None;
        }
        let listeners: Vec<(Listener<T>, Rc<Cell<bool>>)> = self
            .listeners
            .iter()
            .map(|a| (Rc::clone(&a.listener), Rc::clone(&a.attached)))
            .collect();
        Some(Box::new(move || {
            for (listener, attached) in &listeners {
                if attached.get() {
                    listener(&event);
                }
            }
        }))
    }
}

impl<T: Observed> StatusEntry for ChainStatus<T> {
    fn key(&self) -> &StatusKey {
        &self.key
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn Any>> {
        let idx = self.listeners.iter().position(|a| a.id == id)?;
        let removed = self.listeners.remove(idx);
        removed.attached.set(false);
        Some(Box::new(removed.listener))
    }

    fn refresh(&mut self, current: &Value) -> Option<Delivery> {
        let next = T::from_value(current);
        if next.is_none() && !current.is_null() {
            tracing::trace!(
                path = %self.key.path,
                expected = self.key.type_name(),
                actual = current.type_name(),
                "terminal value is not of the observed type"
            );
        }
        if next == self.last {
            return None;
        }
        self.last = next.clone();
        self.deliver(ChainEvent::Changed(ChainChanged {
            path: self.key.path.clone(),
            value: next,
        }))
    }

    fn fail(&self, error: &ChainError) -> Option<Delivery> {
        self.deliver(ChainEvent::Failed {
            path: self.key.path.clone(),
            error: error.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recording<T: Observed + std::fmt::Debug>() -> (Listener<T>, Rc<RefCell<Vec<ChainEvent<T>>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let listener: Listener<T> = Rc::new(move |e: &ChainEvent<T>| log_clone.borrow_mut().push(e.clone()));
        (listener, log)
    }

    #[test]
    fn equal_value_delivers_nothing() {
        let mut status = ChainStatus::<String>::new(ChainPath::from(["City"]), &Value::from("X"));
        let (listener, log) = recording::<String>();
        status.add_listener(1, listener);

        assert!(status.refresh(&Value::from("X")).is_none());
        let delivery = status.refresh(&Value::from("Y")).unwrap();
        assert_eq!(status.last(), Some(&"Y".to_string()));
        assert!(log.borrow().is_empty());

        delivery();
        let events = log.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_changed().and_then(ChainChanged::value),
            Some(&"Y".to_string())
        );
    }

    #[test]
    fn null_and_type_mismatch_are_none() {
        let mut status = ChainStatus::<i64>::new(ChainPath::from(["Age"]), &Value::from(3));
        let (listener, log) = recording::<i64>();
        status.add_listener(1, listener);

        status.refresh(&Value::from("three")).unwrap()();
        assert_eq!(status.last(), None);
        assert!(status.refresh(&Value::Null).is_none());
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn remove_listener_by_id() {
        let mut status = ChainStatus::<Value>::new(ChainPath::from(["A"]), &Value::Null);
        status.add_listener(1, Rc::new(|_: &ChainEvent<Value>| {}));
        status.add_listener(2, Rc::new(|_: &ChainEvent<Value>| {}));
        assert!(status.remove_listener(1).is_some());
        assert!(status.remove_listener(1).is_none());
        assert_eq!(status.listener_count(), 1);
    }

    #[test]
    fn removed_listener_is_skipped_by_pending_delivery() {
        let mut status = ChainStatus::<String>::new(ChainPath::from(["A"]), &Value::from("x"));
        let (first, first_log) = recording::<String>();
        let (second, second_log) = recording::<String>();
        status.add_listener(1, first);
        status.add_listener(2, second);

        let delivery = status.refresh(&Value::from("y")).unwrap();
        assert!(status.remove_listener(2).is_some());
        delivery();
        assert_eq!(first_log.borrow().len(), 1);
        assert!(second_log.borrow().is_empty());
    }

    #[test]
    fn keys_distinguish_types() {
        let path = ChainPath::from(["A"]);
        assert_eq!(StatusKey::of::<i64>(path.clone()), StatusKey::of::<i64>(path.clone()));
        assert_ne!(StatusKey::of::<i64>(path.clone()), StatusKey::of::<String>(path));
    }

    #[test]
    fn fail_reaches_listeners() {
        let status = ChainStatus::<String>::new(ChainPath::from(["A", "B"]), &Value::Null);
        assert!(status.fail(&ChainError::segment_not_found("B", "A")).is_none());

        let mut status = status;
        let (listener, log) = recording::<String>();
        status.add_listener(7, listener);
        status.fail(&ChainError::segment_not_found("B", "A")).unwrap()();
        assert!(log.borrow()[0].error().is_some());
    }
}
