//! Path-addressed facade over a tree and its engine.
//!
//! # Example
//!
//! ```ignore
//! use vtree::{CallContext, Drive, LogHost, Node};
//!
//! let mut drive = Drive::new("cloud", Node::directory("cloud", Arc::new(Root)))?;
//! let host = LogHost;
//! let ctx = CallContext::new(&host);
//!
//! for child in drive.list("/subscriptions", &ctx)? {
//!     println!("{}", child.name());
//! }
//! let lines = drive.read_content("/subscriptions/prod/notes", &ctx)?;
//! ```

use crate::content::{AccessMode, ContentStream};
use crate::diagnostic::ProviderError;
use crate::engine::{ChildNode, Engine};
use crate::handler::{Node, Value};
use crate::host::CallContext;
use crate::tree::{NodeId, Tree};

/// A named tree mounted for path-based navigation.
#[derive(Debug)]
pub struct Drive {
    name: String,
    tree: Tree,
    engine: Engine,
}

impl Drive {
    /// Mount `root` under `name` with an engine built from the global
    /// configuration.
    pub fn new(name: impl Into<String>, root: Node) -> Result<Self, ProviderError> {
        Self::with_engine(name, root, Engine::new()?)
    }

    /// Mount `root` under `name` using `engine`.
    pub fn with_engine(
        name: impl Into<String>,
        root: Node,
        engine: Engine,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            tree: Tree::new(root)?,
            engine,
        })
    }

    /// The mount name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mounted tree.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Mutable access to the tree, e.g. for [`Tree::invalidate`].
    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    /// The engine running handler calls.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Find the node at `path`, fetching directory listings on the way.
    ///
    /// Segments are separated by `/` or `\`, empty segments are ignored and
    /// the empty path is the root. Intermediate listings never use force
    /// semantics or dynamic parameters. Children of uncached directories are
    /// adopted so they get a stable id.
    pub fn resolve(&mut self, path: &str, ctx: &CallContext<'_>) -> Result<NodeId, ProviderError> {
        let mut current = self.tree.root();
        let mut walked = String::new();

        for segment in segments(path) {
            walked.push('/');
            walked.push_str(segment);
            current = self.step(current, segment, &walked, ctx)?;
        }

        Ok(current)
    }

    /// List the directory at `path`.
    pub fn list(&mut self, path: &str, ctx: &CallContext<'_>) -> Result<Vec<ChildNode>, ProviderError> {
        let id = self.resolve(path, ctx)?;
        self.engine
            .children(&mut self.tree, id, &ctx.for_path(normalize(path)))
    }

    /// Open the leaf at `path` for reading.
    pub fn get_content(&mut self, path: &str, ctx: &CallContext<'_>) -> Result<ContentStream, ProviderError> {
        let id = self.resolve(path, ctx)?;
        self.engine
            .open_content(&self.tree, id, AccessMode::Read, &ctx.for_path(normalize(path)))
    }

    /// Read every line of the leaf at `path`.
    pub fn read_content(&mut self, path: &str, ctx: &CallContext<'_>) -> Result<Vec<String>, ProviderError> {
        let mut stream = self.get_content(path, ctx)?;
        let lines = stream.read(0, ctx);
        stream.close(ctx)?;
        lines
    }

    /// Replace the content of the leaf at `path` with `values` and return
    /// what was written once it is persisted.
    pub fn set_content(
        &mut self,
        path: &str,
        values: Vec<Value>,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<Value>, ProviderError> {
        let id = self.resolve(path, ctx)?;
        let mut stream =
            self.engine
                .open_content(&self.tree, id, AccessMode::Write, &ctx.for_path(normalize(path)))?;
        let written = stream.write(values);
        let closed = stream.close(ctx);
        let written = written?;
        closed?;
        Ok(written)
    }

    /// Run the default action of the item at `path`.
    pub fn invoke_item(&mut self, path: &str, ctx: &CallContext<'_>) -> Result<Vec<Value>, ProviderError> {
        let id = self.resolve(path, ctx)?;
        let path = normalize(path);
        self.engine
            .invoke_item(&mut self.tree, id, &path, &ctx.for_path(path.as_str()))
    }

    fn step(
        &mut self,
        parent: NodeId,
        segment: &str,
        walked: &str,
        ctx: &CallContext<'_>,
    ) -> Result<NodeId, ProviderError> {
        if let Some(child) = self.tree.child(parent, segment) {
            return Ok(child);
        }
        if !self.tree.node(parent)?.is_directory() {
            return Err(ProviderError::NotFound {
                path: walked.to_string(),
            });
        }

        let navigation = ctx.navigation(self.tree.path(parent));
        let listing = self.engine.children(&mut self.tree, parent, &navigation)?;
        let found = listing
            .into_iter()
            .find(|child| child.name() == segment)
            .ok_or_else(|| ProviderError::NotFound {
                path: walked.to_string(),
            })?;

        match found.id() {
            Some(id) => Ok(id),
            None => self.tree.adopt(parent, found.node().clone()),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|segment| !segment.is_empty())
}

fn normalize(path: &str) -> String {
    let mut normalized = String::new();
    for segment in segments(path) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}
