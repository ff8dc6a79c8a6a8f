#![forbid(unsafe_code)]

//! Chain node binding and re-binding.
//!
//! # Invariants
//!
//! 1. Binding a node to the value it is already bound to (by
//!    [`Value::same_ref`]) does nothing: no subscription churn, no recursion.
//! 2. A node holds a subscription iff its bound value can notify and its
//!    `watched` set is non-empty.
//! 3. Only requested paths are materialized: a child exists for each distinct
//!    first segment of the node's `watched` suffixes.
//!
//! # Failure Modes
//!
//! - A non-null bound value that cannot notify, on a node that still has
//!   suffixes to watch, fails with `MissingNotificationCapability`.
//! - A property missing on a bound object fails with `SegmentNotFound`.
//!
//! Neither stops a bind cascade: the subtree is still re-bound (unreadable
//! links become `Null`) and the first error is returned. The caller decides
//! whether to roll back (subscribe) or report through the affected statuses
//! (re-bind triggered by a host notification).

use std::rc::Rc;

use chainwatch_core::{ChainError, ChainPath, ChangeHandler, Result, Value, read_segment};

use crate::arena::{NodeId, ROOT};
use crate::root::{TreeState, Update};
use crate::status::Delivery;
use crate::tree::Shared;

impl TreeState {
    /// Bind `id` to `target` and cascade through its remembered subtree.
    ///
    /// A failure does not stop the cascade: every child is still re-bound to
    /// what can be read from `target` (or `Null` when the read fails), so no
    /// node keeps a subscription on an object the graph no longer reaches.
    /// The first error is returned.
    pub(crate) fn bind(&mut self, id: NodeId, target: Value) -> Result<()> {
        let children: Vec<(String, NodeId)> = {
            let Some(node) = self.arena.get_mut(id) else {
                return Ok(());
            };
            if node.bound.same_ref(&target) {
                return Ok(());
            }
            tracing::trace!(node = id, segment = %node.segment, target = ?target, "bind");
            node.subscription = None;
            node.bound = target.clone();
            node.children
                .iter()
                .map(|(segment, &child)| (segment.clone(), child))
                .collect()
        };
        let mut first_error = self.listen(id).err();
        for (segment, child) in children {
            let value = match read_segment(&target, &segment) {
                Ok(value) => value,
                Err(error) => {
                    first_error.get_or_insert(error);
                    Value::Null
                }
            };
            if let Err(error) = self.bind(child, value) {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Register `suffix` as watched through `id`, materializing the nodes it
    /// needs. An empty suffix marks `id` as the end of a live chain.
    pub(crate) fn add_watched_suffix(&mut self, id: NodeId, suffix: ChainPath) -> Result<()> {
        let Some((first, rest)) = suffix.split_first() else {
            if let Some(node) = self.arena.get_mut(id) {
                node.terminal = true;
            }
            return Ok(());
        };
        let inserted = self
            .arena
            .get_mut(id)
            .is_some_and(|node| node.watched.insert(suffix.clone()));
        if !inserted {
            return Ok(());
        }
        self.listen(id)?;

        let Some((child, created)) = self.arena.ensure_child(id, first) else {
            return Ok(());
        };
        if created {
            let target = self.arena.get(id).map(|n| n.bound.clone()).unwrap_or_default();
            let value = read_segment(&target, first)?;
            self.bind(child, value)?;
        }
        self.add_watched_suffix(child, rest)
    }

    /// Bring the subscription of `id` in line with its bound value and
    /// watched set.
    pub(crate) fn listen(&mut self, id: NodeId) -> Result<()> {
        let needs_subscription = {
            let Some(node) = self.arena.get_mut(id) else {
                return Ok(());
            };
            if node.watched.is_empty() {
                node.subscription = None;
                return Ok(());
            }
            if node.subscription.is_some() {
                return Ok(());
            }
            match &node.bound {
                Value::Null => return Ok(()),
                Value::Object(obj) => obj.notifier().is_some(),
                _ => false,
            }
        };
        if !needs_subscription {
            return Err(self.missing_capability(id));
        }

        let handler = self.change_handler(id);
        if let Some(node) = self.arena.get_mut(id) {
            let subscription = node
                .bound
                .as_object()
                .and_then(|obj| obj.notifier())
                .map(|notifier| notifier.subscribe_changes(handler));
            tracing::trace!(node = id, segment = %node.segment, "subscribed to bound value");
            node.subscription = subscription;
        }
        Ok(())
    }

    /// Host notification: property `segment` changed on the value bound at
    /// `id`. Unregistered segments and pruned nodes are ignored.
    pub(crate) fn on_segment_changed(&mut self, id: NodeId, segment: &str) -> Vec<Delivery> {
        let Some(child) = self.arena.child(id, segment) else {
            return Vec::new();
        };
        let target = self.arena.get(id).map(|n| n.bound.clone()).unwrap_or_default();
        let rebound = read_segment(&target, segment).and_then(|value| self.bind(child, value));
        match rebound {
            Ok(()) => {
                let leaves = self.arena.leaves(child);
                self.propagate(&leaves)
            }
            Err(error) => {
                let path = self.arena.path_of(child);
                tracing::warn!(path = %path, kind = error.kind(), error = %error, "re-bind failed");
                self.fail_branch(&path, &error)
            }
        }
    }

    fn change_handler(&self, id: NodeId) -> ChangeHandler {
        let owner = self.owner.clone();
        Rc::new(move |segment: &str| {
            if segment.is_empty() {
                return;
            }
            if let Some(shared) = owner.upgrade() {
                Shared::deliver(
                    &shared,
                    Update::SegmentChanged {
                        node: id,
                        segment: segment.to_string(),
                    },
                );
            }
        })
    }

    fn missing_capability(&self, id: NodeId) -> ChainError {
        ChainError::MissingNotificationCapability {
            path: self.arena.path_of(id),
            root: self
                .arena
                .get(ROOT)
                .map(|root| root.bound.to_string())
                .unwrap_or_default(),
        }
    }
}
