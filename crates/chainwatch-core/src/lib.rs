#![forbid(unsafe_code)]

//! Core types shared by the chainwatch observation tree and its host object
//! model.
//!
//! - [`Value`]: the dynamic value read out of a host object graph.
//! - [`PropertySource`] / [`ChangeNotifier`]: the capabilities a host object
//!   exposes (read a property by name, announce changed property names).
//! - [`ChainPath`]: an ordered list of property segment names.
//! - [`Signal`] / [`Subscription`]: single-threaded multicast with RAII
//!   unsubscription.
//! - [`ChainError`]: every failure the observation tree can report.
//!
//! With the `test-helpers` feature, [`Record`] provides a dynamic host object
//! that implements both capabilities.

pub mod capability;
pub mod error;
pub mod path;
#[cfg(feature = "test-helpers")]
pub mod record;
pub mod signal;
pub mod value;

pub use capability::{ChangeHandler, ChangeNotifier, PropertySource, read_segment};
pub use error::{ChainError, Result};
pub use path::ChainPath;
#[cfg(feature = "test-helpers")]
pub use record::Record;
pub use signal::{Signal, Subscription};
pub use value::{FromValue, ObjectRef, Value};
