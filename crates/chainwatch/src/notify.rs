#![forbid(unsafe_code)]

//! Read-only mirror of a chain's value.
//!
//! A [`NotifyObject`] owns one listener on its chain and stores each new value
//! before announcing it, so subscribers that read [`NotifyObject::value`] from
//! inside their callback already see the new value.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use chainwatch_core::{ChainPath, Result, Signal, Subscription};

use crate::event::{ChainChanged, ChainEvent};
use crate::handle::ObservationHandle;
use crate::status::{Listener, Observed};
use crate::tree::ChainTree;

struct Mirror<T: 'static> {
    value: RefCell<Option<T>>,
    version: Cell<u64>,
    changed: Signal<ChainChanged<T>>,
}

/// Holds the latest value observed through a chain and re-broadcasts
/// changes.
///
/// Dropping it (or calling [`dispose`](Self::dispose)) detaches from the
/// tree. After disposal the last value stays readable.
pub struct NotifyObject<T: Observed> {
    mirror: Rc<Mirror<T>>,
    handle: ObservationHandle,
}

impl<T: Observed> NotifyObject<T> {
    pub(crate) fn attach(tree: &ChainTree, path: ChainPath) -> Result<Self> {
        let mirror = Rc::new(Mirror {
            value: RefCell::new(None),
            version: Cell::new(0),
            changed: Signal::new(),
        });
        let weak: Weak<Mirror<T>> = Rc::downgrade(&mirror);
        let listener: Listener<T> = Rc::new(move |event: &ChainEvent<T>| {
            let (Some(mirror), ChainEvent::Changed(change)) = (weak.upgrade(), event) else {
                return;
            };
            *mirror.value.borrow_mut() = change.value.clone();
            mirror.version.set(mirror.version.get() + 1);
            mirror.changed.emit(change);
        });
        let (handle, initial) = tree.attach(path, listener)?;
        *mirror.value.borrow_mut() = initial;
        Ok(Self { mirror, handle })
    }

    /// The latest value, cloned.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.mirror.value.borrow().clone()
    }

    /// Borrow the latest value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        let value: Ref<'_, Option<T>> = self.mirror.value.borrow();
        f(value.as_ref())
    }

    /// Number of changes observed since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.mirror.version.get()
    }

    /// Be told about each change. The value is already stored when the
    /// callback runs.
    pub fn subscribe(&self, callback: impl Fn(&ChainChanged<T>) + 'static) -> Subscription {
        self.mirror.changed.subscribe(callback)
    }

    /// Live subscribers registered through [`subscribe`](Self::subscribe).
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.mirror.changed.live_count()
    }

    #[must_use]
    pub fn path(&self) -> &ChainPath {
        self.handle.path()
    }

    /// Detach from the tree. The last value stays readable.
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }
}

impl<T: Observed + fmt::Debug> fmt::Debug for NotifyObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyObject")
            .field("path", self.path())
            .field("value", &*self.mirror.value.borrow())
            .field("version", &self.version())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
