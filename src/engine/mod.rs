//! Invocation engine.
//!
//! The engine turns navigation requests into handler calls and their
//! outcomes into tree mutations:
//!
//! ```text
//! children(dir) ──► cache hit? ──yes──► cached ChildNodes
//!                        │ no
//!                        ▼
//! fetch_children(dir)
//!   ├─► worker (pool, or a dedicated thread when the pool is busy):
//!   │     Gateway::call(GetChildItem) ──► Outcome { results, errors }
//!   ├─► bounded wait: poll every `poll_interval`, progress after the first miss
//!   ├─► errors: report to host, invalidate + detach under force
//!   ├─► cached policy:   stage → replace_children → mark visited
//!   ├─► uncached policy: transient ChildNodes, stop between items
//!   └─► cleanup: cancel worker, end progress, clear dynamic parameters
//! ```
//!
//! Callers serialize fetches of the same node; the tree is borrowed mutably
//! for the duration of a fetch.

mod fetch;
mod item;
mod worker;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

pub use fetch::ChildNode;
pub use worker::Outcome;

use crate::config::{self, Config};
use crate::diagnostic::ProviderError;
use crate::gateway::Gateway;
use crate::handler::Node;
use crate::progress::ProgressTracker;

/// Progress bar id used for every engine-driven call.
const PROGRESS_ID: u32 = 1;

struct Inner {
    gateway: Arc<Gateway>,
    pool: rayon::ThreadPool,
    /// Pool threads currently reserved by a call.
    busy: Arc<AtomicUsize>,
    workers: usize,
    config: Config,
}

/// Orchestrates handler calls for a tree. Cheap to clone; clones share the
/// worker pool and the gateway.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Create an engine from the global configuration.
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_config(config::get())
    }

    /// Create an engine with an explicit configuration.
    pub fn with_config(config: &Config) -> Result<Self, ProviderError> {
        let workers = config.worker_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("vtree-worker-{index}"))
            .build()?;
        Ok(Self {
            inner: Arc::new(Inner {
                gateway: Arc::new(Gateway::new()),
                pool,
                busy: Arc::new(AtomicUsize::new(0)),
                workers,
                config: config.clone(),
            }),
        })
    }

    /// The engine's configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The gateway all handler calls go through.
    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    fn progress_for(&self, node: &Node) -> ProgressTracker {
        ProgressTracker::new(
            PROGRESS_ID,
            self.inner.config.progress_activity.as_str(),
            format!("Fetching data for '{}'", node.name()),
            node.builtin_progress(),
        )
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("active_calls", &self.inner.gateway.active_calls())
            .finish()
    }
}
