#![forbid(unsafe_code)]

//! Tree state owned by the chain root: status registry, change propagation,
//! target swaps, and pruning.
//!
//! # Propagation
//!
//! A re-bind reports the leaves under the node that changed. Every status
//! whose path is prefix-compatible with a leaf's path is marked dirty (the
//! scan stops once all statuses are marked). Each dirty status then
//! re-resolves its value once, so a status fires at most once per update no
//! matter how many of its leaves changed.
//!
//! # Pruning
//!
//! Pruning is driven by the registry, not by individual nodes: the nodes on a
//! vacated path are compared against the nodes on every live status path, and
//! only the difference is disposed. Nodes shared by two statuses survive until
//! both are gone.

use std::any::Any;
use std::rc::Weak;

use chainwatch_core::{ChainError, ChainPath, Result, Value};
use rustc_hash::FxHashSet;

use crate::arena::{NodeArena, NodeId, ROOT};
use crate::config::ChainTreeConfig;
use crate::status::{ChainStatus, Delivery, Listener, ListenerId, Observed, StatusEntry, StatusKey};
use crate::tree::Shared;

/// Work item processed by the tree's notification queue.
pub(crate) enum Update {
    /// A bound host object announced a property change.
    SegmentChanged { node: NodeId, segment: String },
    /// A handle was disposed while the tree state was borrowed.
    Release { key: StatusKey, listener: ListenerId },
}

pub(crate) struct TreeState {
    pub(crate) arena: NodeArena,
    pub(crate) statuses: Vec<Box<dyn StatusEntry>>,
    pub(crate) config: ChainTreeConfig,
    pub(crate) owner: Weak<Shared>,
    next_listener: ListenerId,
}

impl TreeState {
    pub(crate) fn new(target: Value, config: ChainTreeConfig, owner: Weak<Shared>) -> Self {
        Self {
            arena: NodeArena::new(target),
            statuses: Vec::new(),
            config,
            owner,
            next_listener: 1,
        }
    }

    pub(crate) fn apply(&mut self, update: Update) -> Vec<Delivery> {
        match update {
            Update::SegmentChanged { node, segment } => self.on_segment_changed(node, &segment),
            Update::Release { key, listener } => self.release(&key, listener),
        }
    }

    fn find_status(&self, key: &StatusKey) -> Option<usize> {
        self.statuses.iter().position(|s| s.key() == key)
    }

    fn typed_status<T: Observed>(&self, path: &ChainPath) -> Option<&ChainStatus<T>> {
        let idx = self.find_status(&StatusKey::of::<T>(path.clone()))?;
        self.statuses[idx].as_any().downcast_ref::<ChainStatus<T>>()
    }

    /// Register `path` in the tree and make sure a status for `(path, T)`
    /// exists. On failure the partially built chain is rolled back.
    pub(crate) fn register<T: Observed>(&mut self, path: &ChainPath) -> Result<StatusKey> {
        path.validate()?;
        if let Err(error) = self.add_watched_suffix(ROOT, path.clone()) {
            tracing::debug!(path = %path, kind = error.kind(), "subscribe failed, rolling back");
            self.prune(path);
            return Err(error);
        }

        let key = StatusKey::of::<T>(path.clone());
        if self.find_status(&key).is_none() {
            let initial = match self.arena.resolve(path) {
                Ok(value) => value,
                Err(error) => {
                    self.prune(path);
                    return Err(error);
                }
            };
            tracing::debug!(path = %path, value_type = key.type_name(), "status created");
            self.statuses.push(Box::new(ChainStatus::<T>::new(path.clone(), &initial)));
        }
        Ok(key)
    }

    /// Attach a listener to a registered status. Returns the listener id and
    /// the status's cached value.
    pub(crate) fn attach<T: Observed>(
        &mut self,
        key: &StatusKey,
        listener: Listener<T>,
    ) -> Result<(ListenerId, Option<T>)> {
        let id = self.next_listener;
        let unresolved = || ChainError::UnresolvedChain {
            path: key.path.clone(),
        };
        let idx = self.find_status(key).ok_or_else(unresolved)?;
        let status = self.statuses[idx]
            .as_any_mut()
            .downcast_mut::<ChainStatus<T>>()
            .ok_or_else(unresolved)?;
        status.add_listener(id, listener);
        self.next_listener += 1;
        Ok((id, status.last().cloned()))
    }

    /// Detach one listener. At zero listeners the status is removed and its
    /// path pruned. The removed callback is returned inside a delivery so it
    /// is dropped after the tree borrow ends.
    pub(crate) fn release(&mut self, key: &StatusKey, listener: ListenerId) -> Vec<Delivery> {
        let Some(idx) = self.find_status(key) else {
            return Vec::new();
        };
        let removed = self.statuses[idx].remove_listener(listener);
        if self.statuses[idx].listener_count() == 0 {
            let status = self.statuses.remove(idx);
            tracing::debug!(path = %key.path, value_type = key.type_name(), "status removed");
            self.prune(&key.path);
            drop(status);
        }
        match removed {
            Some(callback) => vec![drop_later(callback)],
            None => Vec::new(),
        }
    }

    /// Re-evaluate the statuses affected by a change at `leaves`.
    pub(crate) fn propagate(&mut self, leaves: &[NodeId]) -> Vec<Delivery> {
        let total = self.statuses.len();
        let mut dirty = vec![false; total];
        let mut marked = 0;
        for &leaf in leaves {
            if marked == total {
                break;
            }
            let leaf_path = self.arena.path_of(leaf);
            for (i, status) in self.statuses.iter().enumerate() {
                if !dirty[i] && status.path().prefix_compatible(&leaf_path) {
                    dirty[i] = true;
                    marked += 1;
                }
            }
        }

        let mut deliveries = Vec::new();
        for (i, status) in self.statuses.iter_mut().enumerate() {
            if !dirty[i] {
                continue;
            }
            let delivery = match self.arena.resolve(status.path()) {
                Ok(current) => status.refresh(&current),
                Err(error) => status.fail(&error),
            };
            deliveries.extend(delivery);
        }
        tracing::debug!(
            leaves = leaves.len(),
            dirty = marked,
            fired = deliveries.len(),
            "propagated"
        );
        deliveries
    }

    /// Report a re-bind failure at `path` to every status it can affect.
    pub(crate) fn fail_branch(&self, path: &ChainPath, error: &ChainError) -> Vec<Delivery> {
        self.statuses
            .iter()
            .filter(|s| s.path().prefix_compatible(path))
            .filter_map(|s| s.fail(error))
            .collect()
    }

    /// Re-bind the root to `target`, cascading through the whole tree.
    ///
    /// Status caches are refreshed whenever the root reference changes. With
    /// `notify_on_target_change` off the refresh is silent: listeners (and
    /// notify objects, which are listeners) keep their previous value until
    /// the next change they are told about. A failed bind still re-binds the
    /// whole tree and refreshes the caches silently before returning the
    /// error.
    pub(crate) fn change_target(&mut self, target: Value) -> Result<Vec<Delivery>> {
        let _span = tracing::debug_span!(
            "change_target",
            nodes = self.arena.len(),
            statuses = self.statuses.len()
        )
        .entered();
        let before = self.arena.root_target();
        let bound = self.bind(ROOT, target);
        if before.same_ref(&self.arena.root_target()) {
            return bound.map(|()| Vec::new());
        }
        let leaves: Vec<NodeId> = self
            .arena
            .leaves(ROOT)
            .into_iter()
            .filter(|&id| id != ROOT)
            .collect();
        let deliveries = self.propagate(&leaves);
        bound?;
        if self.config.notify_on_target_change {
            Ok(deliveries)
        } else {
            tracing::debug!(suppressed = deliveries.len(), "target swapped silently");
            Ok(Vec::new())
        }
    }

    /// Drop the parts of `path` that no live status still needs.
    pub(crate) fn prune(&mut self, path: &ChainPath) {
        if self.statuses.iter().any(|s| s.path() == path) {
            return;
        }
        let trace = self.arena.trace(path);
        for (depth, &id) in trace.iter().enumerate() {
            let Some(node) = self.arena.get_mut(id) else {
                continue;
            };
            if depth < path.len() {
                node.watched.remove(&path.suffix(depth));
            } else {
                node.terminal = false;
            }
        }

        let live: FxHashSet<NodeId> = self
            .statuses
            .iter()
            .flat_map(|s| self.arena.trace(s.path()))
            .collect();
        let mut removed = 0;
        for &id in trace.iter().skip(1) {
            if !live.contains(&id) && self.arena.contains(id) {
                removed += self.arena.remove_subtree(id);
            }
        }
        for &id in &trace {
            if !self.arena.contains(id) {
                continue;
            }
            // A node left non-notifying by a failed re-bind can still watch
            // other suffixes.
            if let Err(error) = self.listen(id) {
                tracing::warn!(node = id, kind = error.kind(), error = %error, "prune left node unobservable");
            }
        }
        tracing::debug!(path = %path, removed, remaining = self.arena.len(), "pruned");
    }

    pub(crate) fn current<T: Observed>(&self, path: &ChainPath) -> Option<T> {
        self.typed_status::<T>(path)?.last().cloned()
    }

    pub(crate) fn listener_count<T: Observed>(&self, path: &ChainPath) -> usize {
        self.typed_status::<T>(path)
            .map_or(0, |s| s.listener_count())
    }
}

fn drop_later(value: Box<dyn Any>) -> Delivery {
    Box::new(move || drop(value))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chainwatch_core::{ChainPath, Record, Value, chain};
    use tracing_test::traced_test;

    use crate::tree::ChainTree;

    fn person_with_city(city: &str) -> (Rc<Record>, Rc<Record>) {
        let address = Record::new("Address").with("City", city).shared();
        let person = Record::new("Person")
            .with("Name", "Ann")
            .with("Address", address.value())
            .shared();
        (person, address)
    }

    #[test]
    fn status_fires_once_per_update() {
        let (person, _) = person_with_city("X");
        let tree = ChainTree::establish(person.value());
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let _h = tree
            .subscribe_value::<Value>(chain!(Address), move |v| {
                log_clone.borrow_mut().push(v.cloned())
            })
            .unwrap();
        let _city = tree.on_change(chain!(Address.City), || {}).unwrap();
        let _zip = tree.on_change(chain!(Address.Zip), || {}).unwrap_err();

        let replacement = Record::new("Address").with("City", "Y").shared();
        person.set("Address", replacement.value());
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn prune_keeps_shared_prefix() {
        let (person, address) = person_with_city("X");
        let tree = ChainTree::establish(person.value());
        let city = tree.on_change(chain!(Address.City), || {}).unwrap();
        let addr = tree.on_change(chain!(Address), || {}).unwrap();
        assert_eq!(tree.node_count(), 3);

        city.dispose();
        assert_eq!(tree.node_count(), 2);
        assert!(tree.has_node(&chain!(Address)));
        assert!(!tree.has_node(&chain!(Address.City)));
        assert!(!tree.is_listening(&chain!(Address)));
        assert_eq!(address.listener_count(), 0);

        addr.dispose();
        assert_eq!(tree.node_count(), 1);
        assert!(!tree.is_listening(&ChainPath::root()));
        assert_eq!(person.listener_count(), 0);
    }

    #[test]
    fn same_path_different_type_shares_nodes() {
        let (person, _) = person_with_city("X");
        let tree = ChainTree::establish(person.value());
        let text = tree.subscribe_value::<String>(chain!(Address.City), |_| {}).unwrap();
        let untyped = tree.on_change(chain!(Address.City), || {}).unwrap();
        assert_eq!(tree.status_count(), 2);
        assert_eq!(tree.node_count(), 3);

        drop(text);
        assert_eq!(tree.status_count(), 1);
        assert!(tree.has_node(&chain!(Address.City)));
        drop(untyped);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    #[traced_test]
    fn rebind_failure_is_logged_and_delivered() {
        let (person, address) = person_with_city("X");
        let tree = ChainTree::establish(person.value());
        let errors = Rc::new(RefCell::new(Vec::new()));
        let errors_clone = Rc::clone(&errors);
        let _h = tree
            .subscribe_events::<String>(chain!(Address.City), move |event| {
                if let Some(err) = event.error() {
                    errors_clone.borrow_mut().push(err.kind());
                }
            })
            .unwrap();

        address.remove("City");
        assert_eq!(*errors.borrow(), vec!["segment_not_found"]);
        assert!(logs_contain("re-bind failed"));
    }

    #[test]
    #[traced_test]
    fn prune_through_unobservable_node_is_logged() {
        let address = Record::new("Address").with("City", "X").with("Zip", "0").shared();
        let person = Record::new("Person").with("Address", address.value()).shared();
        let tree = ChainTree::establish(person.value());
        let city = tree.on_change(chain!(Address.City), || {}).unwrap();
        let _zip = tree.on_change(chain!(Address.Zip), || {}).unwrap();

        let plain = Record::plain("Address").with("City", "Y").with("Zip", "1").shared();
        person.set("Address", plain.value());
        assert!(!tree.is_listening(&chain!(Address)));

        city.dispose();
        assert!(tree.has_node(&chain!(Address)));
        assert!(!tree.has_node(&chain!(Address.City)));
        assert!(logs_contain("prune left node unobservable"));
    }
}
