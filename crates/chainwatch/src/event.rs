#![forbid(unsafe_code)]

//! Events delivered to chain listeners.

use chainwatch_core::{ChainError, ChainPath};

/// The value observed through a chain changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainChanged<T> {
    /// The observed chain.
    pub path: ChainPath,
    /// The new value; `None` when the chain is broken by a null link, the
    /// terminal is null, or the terminal is not a `T`.
    pub value: Option<T>,
}

impl<T> ChainChanged<T> {
    /// Dotted name of the observed chain, e.g. `"Address.City"`.
    #[must_use]
    pub fn property_name(&self) -> String {
        self.path.to_string()
    }

    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

/// Everything a status can report to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent<T> {
    Changed(ChainChanged<T>),
    /// Re-binding part of the chain failed after the subscription was
    /// established. The status keeps its last value.
    Failed { path: ChainPath, error: ChainError },
}

impl<T> ChainEvent<T> {
    #[must_use]
    pub fn path(&self) -> &ChainPath {
        match self {
            Self::Changed(change) => &change.path,
            Self::Failed { path, .. } => path,
        }
    }

    #[must_use]
    pub fn as_changed(&self) -> Option<&ChainChanged<T>> {
        match self {
            Self::Changed(change) => Some(change),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&ChainError> {
        match self {
            Self::Failed { error, .. } => Some(error),
            Self::Changed(_) => None,
        }
    }
}
