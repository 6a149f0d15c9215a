//! Leaf content, item invocation and dynamic-parameter queries.

use std::path::Path;

use super::Engine;
use crate::content::{AccessMode, ContentStream};
use crate::diagnostic::{report_errors, ErrorRecord, ProviderError};
use crate::gateway::Invocation;
use crate::handler::{Node, Operation, Output, Value};
use crate::host::CallContext;
use crate::tree::{NodeId, Tree};

impl Engine {
    /// Open a content stream on leaf `id`.
    ///
    /// Read streams are filled from the leaf's `GetContent` results, one line
    /// per value; handler errors are reported and whatever arrived is still
    /// readable. Write streams start empty and persist through `SetContent`
    /// when closed. The logical path is the context path, or the tree path of
    /// `id` when the context carries none.
    pub fn open_content(
        &self,
        tree: &Tree,
        id: NodeId,
        mode: AccessMode,
        ctx: &CallContext<'_>,
    ) -> Result<ContentStream, ProviderError> {
        let node = tree.node(id)?;
        if !node.is_leaf() {
            return Err(ProviderError::NotLeaf {
                name: node.name().to_string(),
            });
        }

        let logical_path = match ctx.path() {
            "" => tree.path(id),
            path => path.to_string(),
        };
        let initial = match mode {
            AccessMode::Read => {
                let invocation = Invocation::from_context(Operation::GetContent, node.name(), ctx)
                    .with_args([logical_path.as_str()]);
                self.values(node, invocation, ctx)?
            }
            AccessMode::Write => Vec::new(),
        };

        ContentStream::create(self.clone(), node.clone(), logical_path, mode, &initial)
    }

    /// Run `InvokeItem(path)` on node `id` and return the non-null result
    /// values. The context's dynamic parameters are bound to the node for the
    /// duration of the call.
    pub fn invoke_item(
        &self,
        tree: &mut Tree,
        id: NodeId,
        path: &str,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<Value>, ProviderError> {
        let node = tree.node(id)?.clone();

        tree.set_dynamic_parameters(id, ctx.dynamic_parameters().cloned());
        let invocation =
            Invocation::from_context(Operation::InvokeItem, node.name(), ctx).with_args([path]);
        let values = self.values(&node, invocation, ctx);
        tree.clear_dynamic_parameters(id);

        values
    }

    /// Ask node `id` which dynamic parameters `operation` accepts.
    ///
    /// Returns the first non-null value the matching query produced, or `None`
    /// for operations without dynamic parameters.
    pub fn dynamic_parameters(
        &self,
        tree: &Tree,
        id: NodeId,
        operation: Operation,
        ctx: &CallContext<'_>,
    ) -> Result<Option<Value>, ProviderError> {
        let node = tree.node(id)?;
        let Some(query) = operation.dynamic_parameters_query() else {
            return Ok(None);
        };

        let path = match ctx.path() {
            "" => tree.path(id),
            path => path.to_string(),
        };
        let invocation = Invocation::from_context(query, node.name(), ctx).with_args([path]);
        Ok(self.values(node, invocation, ctx)?.into_iter().next())
    }

    /// Hand a written buffer to the leaf's `SetContent` handler.
    ///
    /// Unlike navigation, a failed persist is an error for the caller: the
    /// records are reported and returned. A stop request does not abandon the
    /// handler: this returns only once the handler has.
    pub(crate) fn persist(
        &self,
        node: &Node,
        buffer: &Path,
        logical_path: &str,
        ctx: &CallContext<'_>,
    ) -> Result<(), ProviderError> {
        let invocation = Invocation::from_context(Operation::SetContent, node.name(), ctx)
            .with_args([buffer.display().to_string(), logical_path.to_string()]);
        let mut progress = self.progress_for(node);
        // The handler reads the buffer; it must have returned before the
        // caller deletes it.
        let outcome = self.run_settled(node.handler().clone(), invocation, ctx, &mut progress);

        let records = if outcome.has_errors() {
            report_errors(node.name(), ctx, &outcome.errors, &self.inner.config.error_source);
            outcome.errors
        } else if !outcome.completed() {
            vec![ErrorRecord::handler(
                "SetContent.Stopped",
                "cancelled before the handler started",
                node.name(),
            )]
        } else {
            return Ok(());
        };

        log::warn!("persisting '{logical_path}' failed");
        Err(ProviderError::Handler {
            operation: Operation::SetContent,
            name: node.name().to_string(),
            records,
        })
    }

    /// Run a value-producing call, report its errors and keep the non-null
    /// values.
    fn values(
        &self,
        node: &Node,
        invocation: Invocation,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<Value>, ProviderError> {
        let operation = invocation.operation();
        let mut progress = self.progress_for(node);
        let outcome = self.run(node.handler().clone(), invocation, ctx, &mut progress);

        if outcome.has_errors() {
            report_errors(node.name(), ctx, &outcome.errors, &self.inner.config.error_source);
        }

        let mut values = Vec::with_capacity(outcome.results.len());
        for output in outcome.results {
            match output {
                Output::Value(Value::Null) => {}
                Output::Value(value) => values.push(value),
                Output::Node(_) => {
                    return Err(ProviderError::UnexpectedResult {
                        operation,
                        name: node.name().to_string(),
                        expected: "a value",
                    });
                }
            }
        }
        Ok(values)
    }
}
