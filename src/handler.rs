//! Handler capability trait and node descriptors.
//!
//! A [`Handler`] is the externally supplied logic behind a node: it answers
//! the navigation and content operations of that node. Handlers push their
//! results and errors through a [`Call`] instead of returning collections,
//! so partial results survive a later failure.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vtree::{Call, Handler, HandlerResult, Node};
//!
//! struct Catalog;
//!
//! impl Handler for Catalog {
//!     fn get_child_item(&self, call: &mut Call<'_>) -> HandlerResult {
//!         call.emit(Node::leaf("readme", Arc::new(Readme)));
//!         call.emit(Node::directory("books", Arc::new(Books)));
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use crate::diagnostic::{ErrorRecord, HandlerError};
use crate::host::StopSignal;

/// Result objects and parameter values exchanged with handlers.
pub type Value = serde_json::Value;

/// Named dynamic parameters bound to a single call.
pub type Parameters = serde_json::Map<String, Value>;

/// Return type of every [`Handler`] method.
pub type HandlerResult = Result<(), HandlerError>;

// =============================================================================
// Operation
// =============================================================================

/// Logical operation names a handler answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// List the children of a directory.
    GetChildItem,
    /// Describe the dynamic parameters accepted by `GetChildItem`.
    GetChildItemDynamicParameters,
    /// Produce the content of a leaf.
    GetContent,
    /// Persist content written to a transient buffer.
    SetContent,
    /// Perform the default action of an item.
    InvokeItem,
    /// Describe the dynamic parameters accepted by `InvokeItem`.
    InvokeItemDynamicParameters,
}

impl Operation {
    /// The operation name as handlers know it.
    pub const fn name(self) -> &'static str {
        match self {
            Self::GetChildItem => "GetChildItem",
            Self::GetChildItemDynamicParameters => "GetChildItemDynamicParameters",
            Self::GetContent => "GetContent",
            Self::SetContent => "SetContent",
            Self::InvokeItem => "InvokeItem",
            Self::InvokeItemDynamicParameters => "InvokeItemDynamicParameters",
        }
    }

    /// The operation that describes this operation's dynamic parameters.
    ///
    /// The two query operations map to themselves; content operations take no
    /// dynamic parameters.
    pub const fn dynamic_parameters_query(self) -> Option<Self> {
        match self {
            Self::GetChildItem | Self::GetChildItemDynamicParameters => {
                Some(Self::GetChildItemDynamicParameters)
            }
            Self::InvokeItem | Self::InvokeItemDynamicParameters => {
                Some(Self::InvokeItemDynamicParameters)
            }
            Self::GetContent | Self::SetContent => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Node Descriptor
// =============================================================================

/// Node variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Has children, answers `GetChildItem`.
    Directory,
    /// Has content, answers `GetContent`/`SetContent`.
    Leaf,
}

/// A node as discovered by a handler: name, variant, policy flags and the
/// handler that answers calls for it.
#[derive(Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    handler: Arc<dyn Handler>,
    use_cache: bool,
    builtin_progress: bool,
}

impl Node {
    /// Create a directory node. Caching and built-in progress are enabled.
    pub fn directory(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self::new(name, NodeKind::Directory, handler)
    }

    /// Create a leaf node.
    pub fn leaf(name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self::new(name, NodeKind::Leaf, handler)
    }

    fn new(name: impl Into<String>, kind: NodeKind, handler: Arc<dyn Handler>) -> Self {
        Self {
            name: name.into(),
            kind,
            handler,
            use_cache: true,
            builtin_progress: true,
        }
    }

    /// Set whether fetched children are cached.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set whether the engine shows its own progress while this node's
    /// handler runs.
    pub fn with_builtin_progress(mut self, enabled: bool) -> Self {
        self.builtin_progress = enabled;
        self
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node variant.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Check if this is a leaf.
    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    /// The handler answering calls for this node.
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Cache policy.
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    /// Built-in progress policy.
    pub fn builtin_progress(&self) -> bool {
        self.builtin_progress
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("use_cache", &self.use_cache)
            .field("builtin_progress", &self.builtin_progress)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Output
// =============================================================================

/// A single result object emitted by a handler.
#[derive(Debug, Clone)]
pub enum Output {
    /// A discovered node (expected from `GetChildItem`).
    Node(Node),
    /// A plain value (content lines, parameter descriptions, ...).
    Value(Value),
}

impl Output {
    /// Check if this is a null value, which the engine skips.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(Value::Null))
    }
}

impl From<Node> for Output {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Output {
    fn from(text: &str) -> Self {
        Self::Value(Value::String(text.to_string()))
    }
}

impl From<String> for Output {
    fn from(text: String) -> Self {
        Self::Value(Value::String(text))
    }
}

// =============================================================================
// Call
// =============================================================================

/// The view a handler gets of one invocation.
pub struct Call<'a> {
    pub(crate) node: &'a str,
    pub(crate) operation: Operation,
    pub(crate) args: &'a [String],
    pub(crate) parameters: Option<&'a Parameters>,
    pub(crate) stop: &'a StopSignal,
    pub(crate) channel_stop: &'a StopSignal,
    pub(crate) debug: bool,
    pub(crate) verbose: bool,
    pub(crate) output: &'a mut dyn FnMut(Output),
    pub(crate) errors: &'a mut dyn FnMut(ErrorRecord),
}

impl Call<'_> {
    /// Name of the node the call is addressed to.
    pub fn node_name(&self) -> &str {
        self.node
    }

    /// The operation being invoked.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Positional string arguments.
    pub fn args(&self) -> &[String] {
        self.args
    }

    /// Positional argument `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Dynamic parameters bound to this call.
    pub fn dynamic_parameters(&self) -> Option<&Parameters> {
        self.parameters
    }

    /// Whether the caller or the engine asked this call to stop.
    ///
    /// Long-running handlers should poll this between items.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_raised() || self.channel_stop.is_raised()
    }

    /// Debug switch of the caller.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Verbose switch of the caller.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Emit one result object.
    pub fn emit(&mut self, output: impl Into<Output>) {
        (self.output)(output.into());
    }

    /// Emit several result objects.
    pub fn emit_all<I>(&mut self, outputs: I)
    where
        I: IntoIterator,
        I::Item: Into<Output>,
    {
        for output in outputs {
            self.emit(output);
        }
    }

    /// Write a non-terminating error and keep going.
    pub fn write_error(&mut self, mut record: ErrorRecord) {
        if record.target.is_empty() {
            record.target = self.node.to_string();
        }
        (self.errors)(record);
    }
}

// =============================================================================
// Handler Trait
// =============================================================================

/// Capability interface of a node's underlying object.
///
/// Directories are asked for [`get_child_item`](Self::get_child_item), leaves
/// for content operations; every method defaults to "not supported" except
/// the dynamic-parameter queries, which default to "no parameters".
pub trait Handler: Send + Sync {
    /// Emit the children of a directory as [`Output::Node`] values.
    fn get_child_item(&self, _call: &mut Call<'_>) -> HandlerResult {
        Err(HandlerError::NotSupported(Operation::GetChildItem))
    }

    /// Emit a description of the dynamic parameters `get_child_item` accepts.
    fn get_child_item_dynamic_parameters(&self, _call: &mut Call<'_>) -> HandlerResult {
        Ok(())
    }

    /// Emit the content of a leaf, one value per line.
    fn get_content(&self, _call: &mut Call<'_>) -> HandlerResult {
        Err(HandlerError::NotSupported(Operation::GetContent))
    }

    /// Persist content. `arg(0)` is the path of the buffer holding the new
    /// content, `arg(1)` the logical path of the item.
    fn set_content(&self, _call: &mut Call<'_>) -> HandlerResult {
        Err(HandlerError::NotSupported(Operation::SetContent))
    }

    /// Perform the default action of the item at `arg(0)`.
    fn invoke_item(&self, _call: &mut Call<'_>) -> HandlerResult {
        Err(HandlerError::NotSupported(Operation::InvokeItem))
    }

    /// Emit a description of the dynamic parameters `invoke_item` accepts.
    fn invoke_item_dynamic_parameters(&self, _call: &mut Call<'_>) -> HandlerResult {
        Ok(())
    }
}

/// Route a call to the handler method of its operation.
pub(crate) fn dispatch(handler: &dyn Handler, call: &mut Call<'_>) -> HandlerResult {
    match call.operation {
        Operation::GetChildItem => handler.get_child_item(call),
        Operation::GetChildItemDynamicParameters => handler.get_child_item_dynamic_parameters(call),
        Operation::GetContent => handler.get_content(call),
        Operation::SetContent => handler.set_content(call),
        Operation::InvokeItem => handler.invoke_item(call),
        Operation::InvokeItemDynamicParameters => handler.invoke_item_dynamic_parameters(call),
    }
}
