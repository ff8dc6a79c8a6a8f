#![forbid(unsafe_code)]

//! Observation handles.

use std::cell::Cell;
use std::fmt;
use std::rc::Weak;

use chainwatch_core::ChainPath;

use crate::status::{ListenerId, StatusKey};
use crate::tree::Shared;

/// Keeps one listener attached to a chain.
///
/// Dropping the handle (or calling [`dispose`](Self::dispose)) detaches the
/// listener; when it was the last listener on its status, the chain nodes no
/// other status needs are pruned and their host subscriptions released.
/// Disposal is idempotent, and a handle that outlives its tree disposes into
/// nothing.
#[must_use = "dropping an ObservationHandle detaches the listener immediately"]
pub struct ObservationHandle {
    owner: Weak<Shared>,
    key: StatusKey,
    listener: ListenerId,
    disposed: Cell<bool>,
}

impl ObservationHandle {
    pub(crate) fn new(owner: Weak<Shared>, key: StatusKey, listener: ListenerId) -> Self {
        Self {
            owner,
            key,
            listener,
            disposed: Cell::new(false),
        }
    }

    /// Detach the listener now.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        if let Some(shared) = self.owner.upgrade() {
            shared.release(self.key.clone(), self.listener);
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    #[cfg(test)]
    pub(crate) fn key(&self) -> &StatusKey {
        &self.key
    }

    #[cfg(test)]
    pub(crate) fn listener(&self) -> ListenerId {
        self.listener
    }

    /// The observed chain.
    #[must_use]
    pub fn path(&self) -> &ChainPath {
        &self.key.path
    }
}

impl Drop for ObservationHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ObservationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationHandle")
            .field("path", &self.key.path)
            .field("value_type", &self.key.type_name())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
