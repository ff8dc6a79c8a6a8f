//! Property-based invariant tests for the chain tree.
//!
//! For any interleaving of subscribe, dispose, and intermediate-object
//! replacement:
//!
//! 1. The node set equals the root plus every prefix of every live path.
//! 2. A node holds a host subscription iff some live path continues past it
//!    (every object in the fixture can notify).
//! 3. Each host object is subscribed to by at most one node, and only while
//!    it is bound on a live path.
//! 4. Cached values match a direct read of the graph.
//! 5. Disposing everything returns the tree to a bare root.

use std::collections::BTreeSet;
use std::rc::Rc;

use chainwatch::{ChainPath, ChainTree, ObservationHandle, Value};
use chainwatch_core::Record;
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

const PATHS: &[&[&str]] = &[
    &["Name"],
    &["Address"],
    &["Address", "City"],
    &["Address", "Zip"],
    &["Boss"],
    &["Boss", "Name"],
    &["Boss", "Address"],
    &["Boss", "Address", "City"],
];

/// Prefixes bound to host objects rather than scalars.
const OBJECT_PREFIXES: &[&[&str]] = &[&[], &["Address"], &["Boss"], &["Boss", "Address"]];

const CITIES: &[&str] = &["X", "Y", "Z"];

#[derive(Debug, Clone)]
enum Op {
    Subscribe(usize),
    Dispose(usize),
    ReplaceAddress(usize),
    ReplaceBossAddress(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..PATHS.len()).prop_map(Op::Subscribe),
        3 => any::<usize>().prop_map(Op::Dispose),
        1 => (0..CITIES.len()).prop_map(Op::ReplaceAddress),
        1 => (0..CITIES.len()).prop_map(Op::ReplaceBossAddress),
    ]
}

fn address(city: &str) -> Rc<Record> {
    Record::new("Address").with("City", city).with("Zip", "00000").shared()
}

struct Fixture {
    person: Rc<Record>,
    boss: Rc<Record>,
    address: Rc<Record>,
    boss_address: Rc<Record>,
    retired: Vec<Rc<Record>>,
}

impl Fixture {
    fn new() -> Self {
        let boss_address = address("B");
        let boss = Record::new("Person")
            .with("Name", "Boss")
            .with("Address", boss_address.value())
            .shared();
        let address = address("X");
        let person = Record::new("Person")
            .with("Name", "Ann")
            .with("Address", address.value())
            .with("Boss", boss.value())
            .shared();
        Self {
            person,
            boss,
            address,
            boss_address,
            retired: Vec::new(),
        }
    }

    fn replace_address(&mut self, city: &str) {
        let fresh = address(city);
        self.person.set("Address", fresh.value());
        self.retired.push(std::mem::replace(&mut self.address, fresh));
    }

    fn replace_boss_address(&mut self, city: &str) {
        let fresh = address(city);
        self.boss.set("Address", fresh.value());
        self.retired.push(std::mem::replace(&mut self.boss_address, fresh));
    }

    /// Host object reached by following `prefix` from the person.
    fn object_at(&self, prefix: &ChainPath) -> &Rc<Record> {
        match prefix.segments().iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            [] => &self.person,
            ["Address"] => &self.address,
            ["Boss"] => &self.boss,
            ["Boss", "Address"] => &self.boss_address,
            other => panic!("no object at {other:?}"),
        }
    }

    fn read(&self, path: &ChainPath) -> Value {
        let (last, parent) = path.segments().split_last().unwrap();
        self.object_at(&ChainPath::from_segments(parent.iter().map(String::as_str)))
            .get(last)
            .unwrap()
    }
}

fn expected_nodes(live: &[ChainPath]) -> BTreeSet<ChainPath> {
    let mut nodes = BTreeSet::new();
    nodes.insert(ChainPath::root());
    for path in live {
        for len in 1..=path.len() {
            nodes.insert(path.prefix(len));
        }
    }
    nodes
}

fn all_prefixes() -> BTreeSet<ChainPath> {
    let all: Vec<ChainPath> = PATHS.iter().map(|p| ChainPath::from(*p)).collect();
    expected_nodes(&all)
}

fn check(tree: &ChainTree, fixture: &Fixture, live: &[(ChainPath, ObservationHandle)]) {
    let paths: Vec<ChainPath> = live.iter().map(|(p, _)| p.clone()).collect();
    let nodes = expected_nodes(&paths);
    assert_eq!(tree.node_count(), nodes.len(), "node set: {tree:?}");

    for prefix in all_prefixes() {
        let present = nodes.contains(&prefix);
        assert_eq!(tree.has_node(&prefix), present, "has_node({prefix})");
        let continues = paths
            .iter()
            .any(|p| p.len() > prefix.len() && p.starts_with(&prefix));
        assert_eq!(tree.is_listening(&prefix), continues, "is_listening({prefix})");
        if OBJECT_PREFIXES.iter().any(|p| ChainPath::from(*p) == prefix) {
            let object = fixture.object_at(&prefix);
            assert_eq!(object.listener_count(), usize::from(continues), "listeners at {prefix}");
        }
    }
    for retired in &fixture.retired {
        assert_eq!(retired.listener_count(), 0);
    }

    let distinct: BTreeSet<&ChainPath> = paths.iter().collect();
    assert_eq!(tree.status_count(), distinct.len());
    for path in distinct {
        assert_eq!(tree.current::<Value>(path), Some(fixture.read(path)));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Random subscribe / dispose / replace sequences
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn tree_matches_live_paths(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut fixture = Fixture::new();
        let tree = ChainTree::establish(fixture.person.value());
        let mut live: Vec<(ChainPath, ObservationHandle)> = Vec::new();

        for op in ops {
            match op {
                Op::Subscribe(i) => {
                    let path = ChainPath::from(PATHS[i]);
                    let handle = tree.on_change(path.clone(), || {}).unwrap();
                    live.push((path, handle));
                }
                Op::Dispose(i) => {
                    if !live.is_empty() {
                        let (_, handle) = live.remove(i % live.len());
                        handle.dispose();
                    }
                }
                Op::ReplaceAddress(c) => fixture.replace_address(CITIES[c]),
                Op::ReplaceBossAddress(c) => fixture.replace_boss_address(CITIES[c]),
            }
            check(&tree, &fixture, &live);
        }

        live.clear();
        prop_assert_eq!(tree.node_count(), 1);
        prop_assert_eq!(tree.status_count(), 0);
        prop_assert_eq!(fixture.person.listener_count(), 0);
        prop_assert_eq!(fixture.address.listener_count(), 0);
        prop_assert_eq!(fixture.boss.listener_count(), 0);
    }

    #[test]
    fn each_status_fires_at_most_once_per_change(
        subscriptions in proptest::collection::vec(0..PATHS.len(), 1..8),
        city in 0..CITIES.len(),
    ) {
        let mut fixture = Fixture::new();
        let tree = ChainTree::establish(fixture.person.value());
        let fired = Rc::new(std::cell::RefCell::new(Vec::<ChainPath>::new()));
        let mut handles = Vec::new();
        for i in subscriptions {
            let path = ChainPath::from(PATHS[i]);
            let fired_clone = Rc::clone(&fired);
            handles.push(
                tree.subscribe::<Value>(path, move |change| {
                    fired_clone.borrow_mut().push(change.path.clone());
                })
                .unwrap(),
            );
        }

        let before: Vec<(ChainPath, Option<Value>)> = PATHS
            .iter()
            .map(|p| ChainPath::from(*p))
            .map(|p| { let v = tree.current::<Value>(&p); (p, v) })
            .collect();
        fixture.replace_address(CITIES[city]);

        for (path, old) in before {
            let listeners = tree.listener_count::<Value>(&path);
            let count = fired.borrow().iter().filter(|p| **p == path).count();
            let changed = old.is_some() && old != tree.current::<Value>(&path);
            prop_assert_eq!(count, if changed { listeners } else { 0 }, "path {}", path);
        }
    }
}
