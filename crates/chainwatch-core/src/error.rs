#![forbid(unsafe_code)]

//! Errors raised while building or re-binding an observation chain.
//!
//! # Failure Modes
//!
//! | Error | Cause | Raised by |
//! |-------|-------|-----------|
//! | `SegmentNotFound` | property absent on the live runtime type | subscribe, change_target, re-bind |
//! | `MissingNotificationCapability` | intermediate object cannot announce changes | bind |
//! | `UnresolvedChain` | a registered path does not reach a node | status value lookup |
//! | `InvalidPath` | empty path or empty segment | path parsing, subscribe |
//!
//! None of these are retried: each one describes a mismatch between the
//! requested path and the live object graph.

use thiserror::Error;

use crate::path::ChainPath;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("property '{segment}' not found on type {type_name}")]
    SegmentNotFound { segment: String, type_name: String },

    #[error(
        "observed target {root}: the value at '{path}' must support change notification to be observed further"
    )]
    MissingNotificationCapability { path: ChainPath, root: String },

    #[error("chain '{path}' is duplicated or not registered")]
    UnresolvedChain { path: ChainPath },

    #[error("invalid chain path '{input}': {reason}")]
    InvalidPath { input: String, reason: &'static str },
}

impl ChainError {
    #[must_use]
    pub fn segment_not_found(segment: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::SegmentNotFound {
            segment: segment.into(),
            type_name: type_name.into(),
        }
    }

    #[must_use]
    pub fn invalid_path(input: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            input: input.into(),
            reason,
        }
    }

    /// Stable short name of the error kind, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SegmentNotFound { .. } => "segment_not_found",
            Self::MissingNotificationCapability { .. } => "missing_notification_capability",
            Self::UnresolvedChain { .. } => "unresolved_chain",
            Self::InvalidPath { .. } => "invalid_path",
        }
    }
}
