#![forbid(unsafe_code)]

//! The public observation root.
//!
//! # Design
//!
//! [`ChainTree`] is a cheap, cloneable handle to shared single-threaded state
//! (`Rc<Shared>`). All binding, propagation, and pruning happen synchronously
//! on the call stack of whatever delivered the change: a host notification, a
//! `subscribe`, a handle disposal, or `change_target`.
//!
//! Listener callbacks run after the tree state is released, so a listener may
//! subscribe, dispose handles, swap the target, or mutate the observed graph.
//! Host notifications raised while an update is in flight are queued and
//! processed as fresh top-level updates once the current round completes.
//!
//! # Failure Modes
//!
//! - **Runaway listeners**: a listener that mutates the graph on every change
//!   keeps the queue non-empty. After `max_reentrant_rounds` re-entrant
//!   updates in one drain, further segment updates are dropped with a
//!   warning. Deferred handle releases still run.
//! - **Calls from inside `PropertySource::read`**: the tree is borrowed while
//!   reading host properties; calling `subscribe` or `change_target` from a
//!   read implementation panics (RefCell borrow rules).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use chainwatch_core::{ChainPath, Result, Value};

use crate::arena::ROOT;
use crate::config::ChainTreeConfig;
use crate::event::{ChainChanged, ChainEvent};
use crate::handle::ObservationHandle;
use crate::notify::NotifyObject;
use crate::root::{TreeState, Update};
use crate::status::{Delivery, Listener, ListenerId, Observed, StatusKey};

/// Shared interior of a [`ChainTree`].
pub(crate) struct Shared {
    state: RefCell<TreeState>,
    queue: RefCell<VecDeque<Update>>,
    busy: Cell<bool>,
}

/// Restores the `busy` flag even if a listener panics.
struct BusyGuard<'a> {
    busy: &'a Cell<bool>,
    was_busy: bool,
}

impl<'a> BusyGuard<'a> {
    fn enter(busy: &'a Cell<bool>) -> Self {
        let was_busy = busy.replace(true);
        Self { busy, was_busy }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.set(self.was_busy);
    }
}

fn run(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery();
    }
}

impl Shared {
    /// Queue an update and drain the queue unless a drain is already running.
    pub(crate) fn deliver(self: &Rc<Self>, update: Update) {
        self.queue.borrow_mut().push_back(update);
        self.pump(true);
    }

    /// Drain the queue. `top_level` is true when the first queued update is
    /// the one that started this drain; it does not count against
    /// `max_reentrant_rounds`. Past the limit, segment updates are dropped but
    /// releases still run, so a disposed handle never stays registered.
    fn pump(&self, top_level: bool) {
        if self.busy.get() {
            return;
        }
        let _guard = BusyGuard::enter(&self.busy);
        let limit = self.state.borrow().config.max_reentrant_rounds;
        let budget = limit.saturating_add(usize::from(top_level));
        let mut rounds = 0usize;
        let mut dropped = 0usize;
        loop {
            let Some(update) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            if rounds >= budget && !matches!(update, Update::Release { .. }) {
                dropped += 1;
                continue;
            }
            rounds += 1;
            let deliveries = self.state.borrow_mut().apply(update);
            run(deliveries);
        }
        if dropped > 0 {
            tracing::warn!(limit, dropped, "re-entrant update limit reached, dropped queued updates");
        }
    }

    /// Run `op` with exclusive access to the state, then deliver its events
    /// and drain anything queued meanwhile.
    fn exclusive<R>(&self, op: impl FnOnce(&mut TreeState) -> (R, Vec<Delivery>)) -> R {
        let result = {
            let _guard = BusyGuard::enter(&self.busy);
            let (result, deliveries) = op(&mut self.state.borrow_mut());
            run(deliveries);
            result
        };
        self.pump(false);
        result
    }

    /// Detach a listener. Deferred to the queue when the state is borrowed.
    pub(crate) fn release(&self, key: StatusKey, listener: ListenerId) {
        if self.state.try_borrow_mut().is_err() {
            self.queue
                .borrow_mut()
                .push_back(Update::Release { key, listener });
            return;
        }
        self.exclusive(|state| ((), state.release(&key, listener)));
    }
}

/// Observation root over a host object graph.
///
/// Cloning shares the same tree.
#[derive(Clone)]
pub struct ChainTree {
    shared: Rc<Shared>,
}

impl ChainTree {
    /// Start observing `target` with the default configuration.
    pub fn establish(target: impl Into<Value>) -> Self {
        Self::with_config(target, ChainTreeConfig::default())
    }

    /// Start observing `target` with `config`. Settings that fail
    /// [`ChainTreeConfig::validate`] are clamped to the nearest valid value
    /// and logged.
    pub fn with_config(target: impl Into<Value>, mut config: ChainTreeConfig) -> Self {
        if let Err(errors) = config.validate() {
            for error in &errors {
                tracing::warn!(error = %error, "invalid chain tree config, clamping");
            }
            config.max_reentrant_rounds = config.max_reentrant_rounds.max(1);
        }
        let target = target.into();
        let shared = Rc::new_cyclic(|weak| Shared {
            state: RefCell::new(TreeState::new(target, config, weak.clone())),
            queue: RefCell::new(VecDeque::new()),
            busy: Cell::new(false),
        });
        Self { shared }
    }

    /// Observe `path` as a `T`. The callback receives the path and the new
    /// value each time it changes.
    pub fn subscribe<T: Observed>(
        &self,
        path: impl Into<ChainPath>,
        on_changed: impl Fn(&ChainChanged<T>) + 'static,
    ) -> Result<ObservationHandle> {
        self.subscribe_events(path, move |event: &ChainEvent<T>| {
            if let ChainEvent::Changed(change) = event {
                on_changed(change);
            }
        })
    }

    /// Observe `path` as a `T`, receiving only the new value.
    pub fn subscribe_value<T: Observed>(
        &self,
        path: impl Into<ChainPath>,
        on_value: impl Fn(Option<&T>) + 'static,
    ) -> Result<ObservationHandle> {
        self.subscribe(path, move |change: &ChainChanged<T>| on_value(change.value()))
    }

    /// Run `on_changed` whenever the value at `path` changes, whatever its
    /// type.
    pub fn on_change(
        &self,
        path: impl Into<ChainPath>,
        on_changed: impl Fn() + 'static,
    ) -> Result<ObservationHandle> {
        self.subscribe::<Value>(path, move |_| on_changed())
    }

    /// Observe `path` as a `T`, receiving both changes and re-bind failures.
    pub fn subscribe_events<T: Observed>(
        &self,
        path: impl Into<ChainPath>,
        on_event: impl Fn(&ChainEvent<T>) + 'static,
    ) -> Result<ObservationHandle> {
        self.attach(path.into(), Rc::new(on_event))
            .map(|(handle, _)| handle)
    }

    /// A read-only object mirroring the value at `path`.
    pub fn to_notify_object<T: Observed>(
        &self,
        path: impl Into<ChainPath>,
    ) -> Result<NotifyObject<T>> {
        NotifyObject::attach(self, path.into())
    }

    pub(crate) fn attach<T: Observed>(
        &self,
        path: ChainPath,
        listener: Listener<T>,
    ) -> Result<(ObservationHandle, Option<T>)> {
        let attached = self.shared.exclusive(|state| {
            let attached = state.register::<T>(&path).and_then(|key| {
                let (id, last) = state.attach(&key, listener)?;
                Ok((key, id, last))
            });
            (attached, Vec::new())
        })?;
        let (key, id, last) = attached;
        Ok((ObservationHandle::new(Rc::downgrade(&self.shared), key, id), last))
    }

    /// Swap the observed root object, re-binding every registered chain.
    ///
    /// With `notify_on_target_change` enabled, every status whose value
    /// differs after the swap fires once.
    pub fn change_target(&self, target: impl Into<Value>) -> Result<()> {
        let target = target.into();
        self.shared
            .exclusive(|state| match state.change_target(target) {
                Ok(deliveries) => (Ok(()), deliveries),
                Err(error) => (Err(error), Vec::new()),
            })
    }

    /// The observed root object.
    #[must_use]
    pub fn target(&self) -> Value {
        self.shared.state.borrow().arena.root_target()
    }

    #[must_use]
    pub fn config(&self) -> ChainTreeConfig {
        self.shared.state.borrow().config.clone()
    }

    #[must_use]
    pub fn notify_on_target_change(&self) -> bool {
        self.shared.state.borrow().config.notify_on_target_change
    }

    pub fn set_notify_on_target_change(&self, enabled: bool) {
        self.shared.state.borrow_mut().config.notify_on_target_change = enabled;
    }

    /// Cached value of the `(path, T)` status, if one is registered.
    #[must_use]
    pub fn current<T: Observed>(&self, path: &ChainPath) -> Option<T> {
        self.shared.state.borrow().current::<T>(path)
    }

    /// Number of chain nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.shared.state.borrow().arena.len()
    }

    /// Whether a node exists for `path` (the empty path is the root).
    #[must_use]
    pub fn has_node(&self, path: &ChainPath) -> bool {
        self.shared.state.borrow().arena.descend(path).is_some()
    }

    /// Whether the node at `path` holds a change subscription on its value.
    #[must_use]
    pub fn is_listening(&self, path: &ChainPath) -> bool {
        let state = self.shared.state.borrow();
        state
            .arena
            .descend(path)
            .and_then(|id| state.arena.get(id))
            .is_some_and(|node| node.subscription.is_some())
    }

    /// Suffixes still watched through the node at `path`.
    #[must_use]
    pub fn watched_suffixes(&self, path: &ChainPath) -> Vec<ChainPath> {
        let state = self.shared.state.borrow();
        state
            .arena
            .descend(path)
            .and_then(|id| state.arena.get(id))
            .map(|node| node.watched.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct (path, type) statuses.
    #[must_use]
    pub fn status_count(&self) -> usize {
        self.shared.state.borrow().statuses.len()
    }

    /// Live listeners on the `(path, T)` status.
    #[must_use]
    pub fn listener_count<T: Observed>(&self, path: &ChainPath) -> usize {
        self.shared.state.borrow().listener_count::<T>(path)
    }
}

impl fmt::Debug for ChainTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        let statuses: Vec<String> = state
            .statuses
            .iter()
            .map(|s| format!("{} ({} listeners)", s.path(), s.listener_count()))
            .collect();
        let rendered = state.arena.render();
        f.debug_struct("ChainTree")
            .field("target", &state.arena.get(ROOT).map(|n| &n.bound))
            .field("nodes", &state.arena.len())
            .field("statuses", &statuses)
            .field("tree", &format_args!("\n{rendered}"))
            .finish()
    }
}
