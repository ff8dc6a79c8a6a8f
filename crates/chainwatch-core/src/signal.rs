#![forbid(unsafe_code)]

//! Single-threaded multicast with RAII unsubscription.
//!
//! # Design
//!
//! [`Signal<E>`] keeps its handlers as `Weak` references; the matching strong
//! reference lives inside the [`Subscription`] guard handed back to the
//! subscriber. Dropping (or [`release`](Subscription::release)-ing) the guard
//! makes the handler unreachable immediately. Dead entries are pruned lazily
//! during [`emit`](Signal::emit).
//!
//! `Signal<str>` is the change-notification channel of host objects (it
//! implements [`ChangeNotifier`](crate::ChangeNotifier)); typed signals carry
//! change events to notify-object listeners.
//!
//! # Failure Modes
//!
//! - **Re-entrant emit**: handlers are collected before any is invoked, so a
//!   handler may subscribe, release, or emit again. Handlers added during an
//!   emit are not called for that emit.
//! - **Guard leak**: guards stored indefinitely keep their handlers alive.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

type HandlerRc<E> = Rc<dyn Fn(&E)>;
type HandlerWeak<E> = Weak<dyn Fn(&E)>;

/// Multicast event source. Cloning shares the same handler list.
pub struct Signal<E: ?Sized + 'static> {
    handlers: Rc<RefCell<Vec<HandlerWeak<E>>>>,
}

impl<E: ?Sized + 'static> Clone for Signal<E> {
    fn clone(&self) -> Self {
        Self {
            handlers: Rc::clone(&self.handlers),
        }
    }
}

impl<E: ?Sized + 'static> Default for Signal<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized + 'static> fmt::Debug for Signal<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("handler_count", &self.handler_count())
            .field("live", &self.live_count())
            .finish()
    }
}

impl<E: ?Sized + 'static> Signal<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Register a handler. It is called on every [`emit`](Self::emit) until
    /// the returned guard is dropped.
    pub fn subscribe(&self, handler: impl Fn(&E) + 'static) -> Subscription {
        self.subscribe_rc(Rc::new(handler))
    }

    /// Register an already shared handler.
    pub fn subscribe_rc(&self, handler: HandlerRc<E>) -> Subscription {
        self.handlers.borrow_mut().push(Rc::downgrade(&handler));
        Subscription::hold(handler)
    }

    /// Invoke every live handler in registration order and prune dead ones.
    pub fn emit(&self, event: &E) {
        let live: Vec<HandlerRc<E>> = {
            let mut handlers = self.handlers.borrow_mut();
            let before = handlers.len();
            handlers.retain(|w| w.strong_count() > 0);
            if handlers.len() < before {
                tracing::trace!(pruned = before - handlers.len(), "signal dropped released handlers");
            }
            handlers.iter().filter_map(Weak::upgrade).collect()
        };
        for handler in &live {
            handler(event);
        }
    }

    /// Registered handlers, including released ones not yet pruned.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Handlers whose guard is still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.handlers
            .borrow()
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

/// RAII guard for a registered handler.
///
/// Dropping the guard unsubscribes. [`release`](Self::release) does the same
/// explicitly.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl Subscription {
    /// Keep `value` alive for as long as the guard lives.
    pub fn hold<T: 'static>(value: T) -> Self {
        Self {
            _guard: Box::new(value),
        }
    }

    /// Run `release` exactly once when the guard is dropped. For hosts whose
    /// notification mechanism needs an explicit unregister call.
    pub fn on_release(release: impl FnOnce() + 'static) -> Self {
        Self::hold(ReleaseOnDrop(Some(Box::new(release))))
    }

    /// Release the handler now.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

struct ReleaseOnDrop(Option<Box<dyn FnOnce()>>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
