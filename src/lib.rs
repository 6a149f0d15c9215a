//! # vtree
//!
//! A lazily materialized, handler-backed virtual hierarchy.
//!
//! Navigation requests against directory nodes are answered by externally
//! supplied [`Handler`]s. Their results are cached in an arena [`Tree`] or
//! streamed straight back to the caller, depending on the node's policy:
//!
//! - **Engine**: runs handler calls on a worker pool with a bounded,
//!   progress-reporting wait, honors stop signals and force refreshes
//! - **Tree**: arena of nodes with insertion-ordered children and per-node
//!   cache validity
//! - **Content streams**: temporary buffers over leaf content, persisted back
//!   through the handler on close
//! - **Diagnostics**: handler faults become [`ErrorRecord`]s reported to the
//!   [`Host`], never panics
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vtree::{Call, CallContext, Drive, Handler, HandlerResult, LogHost, Node};
//!
//! struct Catalog;
//!
//! impl Handler for Catalog {
//!     fn get_child_item(&self, call: &mut Call<'_>) -> HandlerResult {
//!         call.emit(Node::leaf("readme", Arc::new(Readme)));
//!         Ok(())
//!     }
//! }
//!
//! // Optional: tune the global configuration once at startup
//! vtree::config::ConfigBuilder::new().worker_threads(8).init();
//!
//! let mut drive = Drive::new("catalog", Node::directory("catalog", Arc::new(Catalog)))?;
//! let host = LogHost;
//! let ctx = CallContext::new(&host);
//!
//! for child in drive.list("/", &ctx)? {
//!     println!("{}", child.name());
//! }
//! let lines = drive.read_content("/readme", &ctx)?;
//! ```
//!
//! ## Modules
//!
//! - [`drive`]: path-based facade, the usual entry point
//! - [`engine`]: fetching, caching and content orchestration
//! - [`tree`]: the node arena
//! - [`handler`]: the capability trait handlers implement
//! - [`gateway`]: the single call path into handler code
//! - [`content`]: content streams
//! - [`host`]: host sink and per-call context
//! - [`progress`]: progress reporting
//! - [`diagnostic`]: error records and error types
//! - [`config`]: runtime configuration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod content;
pub mod diagnostic;
pub mod drive;
pub mod engine;
pub mod gateway;
pub mod handler;
pub mod host;
pub mod progress;
pub mod tree;

#[cfg(test)]
mod test_support;

// =============================================================================
// Prelude - import commonly used items with a single `use`
// =============================================================================

/// Prelude module for convenient imports.
///
/// ```ignore
/// use vtree::prelude::*;
/// ```
///
/// This includes the drive and engine, the handler trait with its call types,
/// the host sinks and the error types.
pub mod prelude {
    // Navigation
    pub use crate::{ChildNode, Drive, Engine, NodeId, Tree};

    // Handlers
    pub use crate::{Call, Handler, HandlerResult, Node, NodeKind, Operation, Output, Value};

    // Host
    pub use crate::{CallContext, Host, LogHost, StopSignal};

    // Content
    pub use crate::{AccessMode, ContentStream};

    // Errors
    pub use crate::{ErrorRecord, HandlerError, ProviderError};
}

// =============================================================================
// Navigation
// =============================================================================

pub use drive::Drive;
pub use engine::{ChildNode, Engine, Outcome};
pub use tree::{NodeId, Tree};

// =============================================================================
// Handlers
// =============================================================================

pub use gateway::{Gateway, Invocation, HANDLER_PANICKED};
pub use handler::{Call, Handler, HandlerResult, Node, NodeKind, Operation, Output, Parameters, Value};

// =============================================================================
// Host, Progress, Content
// =============================================================================

pub use content::{AccessMode, ContentStream};
pub use host::{CallContext, Host, LogHost, RecordingHost, ReportedError, StopSignal};
pub use progress::{ProgressRecord, ProgressState, ProgressTracker};

// =============================================================================
// Diagnostics & Configuration
// =============================================================================

pub use config::{Config, ConfigBuilder};
pub use diagnostic::{ErrorKind, ErrorRecord, HandlerError, ProviderError};
