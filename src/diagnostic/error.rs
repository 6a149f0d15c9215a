//! Error types.

use std::io;

use thiserror::Error;

use super::record::{ErrorKind, ErrorRecord};
use crate::content::AccessMode;
use crate::handler::Operation;
use crate::tree::NodeId;

/// Error type returned by vtree operations.
///
/// Handler faults are not errors at this level: they are collected as
/// [`ErrorRecord`]s, reported to the host and processing continues. Only
/// contract violations, persist failures and local I/O failures surface here.
///
/// # Example
///
/// ```ignore
/// match drive.list("/subscriptions", &ctx) {
///     Ok(children) => { /* render */ }
///     Err(ProviderError::NotContainer { name }) => {
///         eprintln!("{name} is a leaf");
///     }
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A directory operation was requested on a leaf.
    #[error("'{name}' is not a container node")]
    NotContainer {
        /// Name of the offending node.
        name: String,
    },

    /// A leaf operation was requested on a directory.
    #[error("'{name}' is not a leaf node")]
    NotLeaf {
        /// Name of the offending node.
        name: String,
    },

    /// The root of a tree must be a directory.
    #[error("root node '{name}' must be a container")]
    RootNotContainer {
        /// Name of the offending node.
        name: String,
    },

    /// A handler produced a node without a name.
    #[error("node name must not be empty")]
    EmptyName,

    /// The node id does not refer to a live node.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Path resolution failed.
    #[error("item '{path}' does not exist")]
    NotFound {
        /// The path that could not be resolved.
        path: String,
    },

    /// A handler result did not have the expected shape.
    #[error("{operation} returned an unexpected result for '{name}': expected {expected}")]
    UnexpectedResult {
        /// The operation that produced the result.
        operation: Operation,
        /// Name of the node the operation ran on.
        name: String,
        /// Description of the expected shape.
        expected: &'static str,
    },

    /// The content stream was not opened for the requested access.
    #[error("content stream is not open for {0}")]
    WrongMode(AccessMode),

    /// A handler call whose failure must reach the caller (e.g. persisting content).
    #[error("{operation} failed for '{name}': {}", summary(records))]
    Handler {
        /// The failed operation.
        operation: Operation,
        /// Name of the node the operation ran on.
        name: String,
        /// The collected error records.
        records: Vec<ErrorRecord>,
    },

    /// The handler worker pool could not be created.
    #[error("failed to start handler workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),

    /// Local I/O error (content buffers).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn summary(records: &[ErrorRecord]) -> String {
    match records {
        [] => "no details".to_string(),
        [single] => single.display_message().to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first.display_message(), rest.len()),
    }
}

impl ProviderError {
    /// Check if this error is a programming-contract violation rather than a
    /// runtime failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::NotContainer { .. }
                | Self::NotLeaf { .. }
                | Self::RootNotContainer { .. }
                | Self::EmptyName
                | Self::UnknownNode(_)
                | Self::UnexpectedResult { .. }
                | Self::WrongMode(_)
        )
    }

    /// Get the error records if this is a handler failure.
    pub fn records(&self) -> Option<&[ErrorRecord]> {
        match self {
            Self::Handler { records, .. } => Some(records),
            _ => None,
        }
    }
}

/// Error returned by [`Handler`](crate::Handler) implementations.
///
/// The gateway converts it into an [`ErrorRecord`] tagged with the operation
/// and the node name, so a failing handler never aborts the engine.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler does not implement the operation.
    #[error("{0} is not supported")]
    NotSupported(Operation),

    /// Access to the underlying resource was denied.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// An argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure inside the handler.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A fully specified record.
    #[error("{0}")]
    Record(ErrorRecord),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Create a generic failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Convert into an [`ErrorRecord`] for `operation` on node `target`.
    pub fn into_record(self, operation: Operation, target: &str) -> ErrorRecord {
        let id = |suffix: &str| format!("{}.{suffix}", operation.name());
        match self {
            Self::NotSupported(op) => ErrorRecord::new(
                format!("{}.NotSupported", op.name()),
                ErrorKind::Handler,
                format!("{op} is not supported by '{target}'"),
                target,
            ),
            Self::AccessDenied(message) => {
                ErrorRecord::new(id("AccessDenied"), ErrorKind::Security, message, target)
            }
            Self::InvalidArgument(message) => {
                ErrorRecord::new(id("InvalidArgument"), ErrorKind::Validation, message, target)
            }
            Self::Io(err) => ErrorRecord::from_io(id("IoError"), &err, target),
            Self::Record(mut record) => {
                if record.target.is_empty() {
                    record.target = target.to_string();
                }
                record
            }
            Self::Failed(message) => ErrorRecord::handler(id("Failed"), message, target),
        }
    }
}
