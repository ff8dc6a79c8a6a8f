#![forbid(unsafe_code)]

//! Dynamic host object for tests and demos.
//!
//! A [`Record`] is a named bag of properties. A notifying record announces
//! every property assignment through its change [`Signal`]; a plain record
//! does not support change notification at all.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::capability::{ChangeNotifier, PropertySource};
use crate::signal::Signal;
use crate::value::{ObjectRef, Value};

pub struct Record {
    type_name: String,
    fields: RefCell<BTreeMap<String, Value>>,
    changes: Option<Signal<str>>,
}

impl Record {
    /// A record that supports change notification.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: RefCell::new(BTreeMap::new()),
            changes: Some(Signal::new()),
        }
    }

    /// A record without change notification.
    #[must_use]
    pub fn plain(type_name: impl Into<String>) -> Self {
        Self {
            changes: None,
            ..Self::new(type_name)
        }
    }

    /// Declare a property with an initial value.
    #[must_use]
    pub fn with(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.borrow_mut().insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn shared(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// This record as a graph value.
    #[must_use]
    pub fn value(self: &Rc<Self>) -> Value {
        Value::Object(ObjectRef::from(Rc::clone(self)))
    }

    /// Assign a property and announce it. The announcement is skipped when the
    /// assigned value is identical to the current one.
    pub fn set(&self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        let changed = {
            let mut fields = self.fields.borrow_mut();
            match fields.get(field) {
                Some(current) if current.same_ref(&value) => false,
                _ => {
                    fields.insert(field.to_string(), value);
                    true
                }
            }
        };
        if changed {
            self.touch(field);
        }
    }

    /// Announce a property change without assigning anything.
    pub fn touch(&self, field: &str) {
        if let Some(changes) = &self.changes {
            changes.emit(field);
        }
    }

    /// Remove a property, so later reads of it fail.
    pub fn remove(&self, field: &str) {
        let removed = self.fields.borrow_mut().remove(field).is_some();
        if removed {
            self.touch(field);
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        self.fields.borrow().get(field).cloned()
    }

    /// Change handlers currently registered and alive.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.changes.as_ref().map_or(0, Signal::live_count)
    }
}

impl PropertySource for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn read(&self, segment: &str) -> Option<Value> {
        self.get(segment)
    }

    fn notifier(&self) -> Option<&dyn ChangeNotifier> {
        self.changes.as_ref().map(|s| s as &dyn ChangeNotifier)
    }

    fn describe(&self) -> String {
        let fields = self.fields.borrow();
        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        format!("{} {{ {} }}", self.type_name, names.join(", "))
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields.borrow())
            .field("notifying", &self.changes.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_announces_change() {
        let person = Record::new("Person").with("Name", "Ann").shared();
        let hits = Rc::new(Cell::new(0u32));
        let hits_clone = Rc::clone(&hits);
        let notifier = person.notifier().unwrap();
        let _sub = notifier.subscribe_changes(Rc::new(move |name: &str| {
            assert_eq!(name, "Name");
            hits_clone.set(hits_clone.get() + 1);
        }));

        person.set("Name", "Bob");
        person.set("Name", "Bob");
        assert_eq!(hits.get(), 1);
        assert_eq!(person.get("Name"), Some(Value::from("Bob")));
        assert_eq!(person.listener_count(), 1);
    }

    #[test]
    fn plain_record_has_no_notifier() {
        let r = Record::plain("Point").with("X", 1);
        assert!(r.notifier().is_none());
        assert_eq!(r.listener_count(), 0);
        assert_eq!(r.read("X"), Some(Value::Int(1)));
        assert_eq!(r.read("Y"), None);
    }

    #[test]
    fn describe_lists_fields() {
        let r = Record::new("Address").with("City", "X").with("Zip", 1);
        assert_eq!(r.describe(), "Address { City, Zip }");
    }
}
