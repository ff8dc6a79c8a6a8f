#![forbid(unsafe_code)]

//! Property-chain observation over a live object graph.
//!
//! A [`ChainTree`] is rooted at one host object. Subscribing to a chain such
//! as `Address.City` materializes one node per segment, binds each node to the
//! value currently read through it, and subscribes to change notifications on
//! every intermediate object. When any link of the chain is replaced, the
//! nodes below it re-bind and every affected subscriber is told the new
//! terminal value, at most once per update and only when it actually changed.
//!
//! Chains that share a prefix share nodes. Disposing the last subscriber of a
//! chain prunes exactly the nodes no other chain needs and releases their host
//! subscriptions.
//!
//! ```ignore
//! use chainwatch::{ChainTree, chain};
//!
//! let tree = ChainTree::establish(person.value());
//! let _city = tree.subscribe_value::<String>(chain!(Address.City), |city| {
//!     println!("city is now {city:?}");
//! })?;
//! ```
//!
//! The tree is single-threaded (`Rc`-based). Host objects implement
//! [`PropertySource`] and, to be observable as an intermediate link,
//! [`ChangeNotifier`].

mod arena;
pub mod config;
pub mod event;
pub mod handle;
mod node;
pub mod notify;
mod root;
mod status;
pub mod tree;

pub use config::{ChainTreeConfig, ConfigError, ConfigParse, from_env_with};
pub use event::{ChainChanged, ChainEvent};
pub use handle::ObservationHandle;
pub use notify::NotifyObject;
pub use status::Observed;
pub use tree::ChainTree;

pub use chainwatch_core::{
    ChainError, ChainPath, ChangeHandler, ChangeNotifier, FromValue, ObjectRef, PropertySource,
    Result, Signal, Subscription, Value, chain, read_segment,
};
