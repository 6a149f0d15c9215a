//! Fetching directory children and materializing them into the tree.

use super::worker::Outcome;
use super::Engine;
use crate::diagnostic::{report_errors, ProviderError};
use crate::gateway::Invocation;
use crate::handler::{Node, Operation, Output, Value};
use crate::host::CallContext;
use crate::tree::{NodeId, Tree};

/// One entry of a directory listing.
///
/// Cached entries carry the id of the child in the tree; entries of uncached
/// listings are transient views that were never inserted.
#[derive(Debug, Clone)]
pub struct ChildNode {
    id: Option<NodeId>,
    node: Node,
}

impl ChildNode {
    fn cached(id: NodeId, node: Node) -> Self {
        Self { id: Some(id), node }
    }

    fn transient(node: Node) -> Self {
        Self { id: None, node }
    }

    /// Tree id of a cached entry.
    pub fn id(&self) -> Option<NodeId> {
        self.id
    }

    /// Check if this entry lives in the tree.
    pub fn is_cached(&self) -> bool {
        self.id.is_some()
    }

    /// The node descriptor.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Shorthand for `node().name()`.
    pub fn name(&self) -> &str {
        self.node.name()
    }
}

impl Engine {
    /// List the children of directory `id`, serving them from the cache when
    /// possible.
    ///
    /// The cache answers when the node caches, its last fetch succeeded, and the
    /// call neither forces a refresh nor binds dynamic parameters. Otherwise
    /// this is [`fetch_children`](Self::fetch_children).
    pub fn children(
        &self,
        tree: &mut Tree,
        id: NodeId,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<ChildNode>, ProviderError> {
        let node = directory(tree, id)?;
        if node.use_cache()
            && tree.is_cache_valid(id)
            && !ctx.force()
            && !ctx.uses_dynamic_parameters()
        {
            log::debug!("cache hit for '{}'", node.name());
            return Ok(cached_listing(tree, id));
        }
        self.fetch_children(tree, id, ctx)
    }

    /// Call the directory's `GetChildItem` handler and merge the outcome.
    ///
    /// Handler errors are reported to the host and never fail the fetch:
    /// results that arrived alongside them are still processed. Under force
    /// semantics a failing node is invalidated and removed from its parent.
    /// Only contract violations (a result that is not a node, an unnamed
    /// node) are returned as errors.
    pub fn fetch_children(
        &self,
        tree: &mut Tree,
        id: NodeId,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<ChildNode>, ProviderError> {
        let node = directory(tree, id)?.clone();

        tree.set_dynamic_parameters(id, ctx.dynamic_parameters().cloned());
        let listing = self.fetch_and_merge(tree, id, &node, ctx);
        tree.clear_dynamic_parameters(id);

        listing
    }

    fn fetch_and_merge(
        &self,
        tree: &mut Tree,
        id: NodeId,
        node: &Node,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<ChildNode>, ProviderError> {
        let invocation = Invocation::from_context(Operation::GetChildItem, node.name(), ctx);
        let mut progress = self.progress_for(node);
        let outcome = self.run(node.handler().clone(), invocation, ctx, &mut progress);
        let completed = outcome.completed();
        let Outcome { results, errors, .. } = outcome;

        if !errors.is_empty() {
            if ctx.force() {
                // A node that keeps failing must not linger in its parent's listing.
                tree.invalidate(id);
                tree.detach(id);
            }
            report_errors(node.name(), ctx, &errors, &self.inner.config.error_source);
        }

        if !completed {
            log::debug!(
                "'{}' stopped with {} partial result(s), nothing merged",
                node.name(),
                results.len()
            );
            return Ok(Vec::new());
        }

        if results.is_empty() {
            ctx.host().write_debug(&format!(
                "{} returned nothing for '{}' at '{}'",
                Operation::GetChildItem,
                node.name(),
                ctx.path()
            ));

            // An error must not look like "already fetched".
            if errors.is_empty() {
                tree.mark_visited(id);
            }
            if ctx.force() {
                tree.clear_children(id);
            }
            return Ok(Vec::new());
        }

        if node.use_cache() && !ctx.uses_dynamic_parameters() {
            self.merge_cached(tree, id, node, results, errors.is_empty(), ctx)
        } else {
            self.stream_uncached(node, results, ctx)
        }
    }

    /// Stage every result first, then swap the children in one step, so a stop
    /// request never leaves a half-populated child set behind.
    fn merge_cached(
        &self,
        tree: &mut Tree,
        id: NodeId,
        node: &Node,
        results: Vec<Output>,
        clean: bool,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<ChildNode>, ProviderError> {
        let mut staged = Vec::with_capacity(results.len());
        for output in results {
            if ctx.stopping() {
                log::debug!("stopped while caching children of '{}'", node.name());
                return Ok(Vec::new());
            }
            if let Some(child) = expect_node(output, node.name())? {
                staged.push(child);
            }
        }

        let ids = tree.replace_children(id, staged);
        if clean {
            tree.mark_visited(id);
        }

        Ok(ids
            .into_iter()
            .filter_map(|child| tree.get(child).map(|n| ChildNode::cached(child, n.clone())))
            .collect())
    }

    fn stream_uncached(
        &self,
        node: &Node,
        results: Vec<Output>,
        ctx: &CallContext<'_>,
    ) -> Result<Vec<ChildNode>, ProviderError> {
        let mut listing = Vec::with_capacity(results.len());
        for output in results {
            if ctx.stopping() {
                log::debug!("stopped while listing '{}'", node.name());
                break;
            }
            if let Some(child) = expect_node(output, node.name())? {
                listing.push(ChildNode::transient(child));
            }
        }
        Ok(listing)
    }
}

fn directory(tree: &Tree, id: NodeId) -> Result<&Node, ProviderError> {
    let node = tree.node(id)?;
    if node.is_directory() {
        Ok(node)
    } else {
        Err(ProviderError::NotContainer {
            name: node.name().to_string(),
        })
    }
}

fn cached_listing(tree: &Tree, id: NodeId) -> Vec<ChildNode> {
    tree.children(id)
        .iter()
        .filter_map(|child| tree.get(*child).map(|n| ChildNode::cached(*child, n.clone())))
        .collect()
}

/// Nulls are skipped; anything else that is not a named node breaks the
/// `GetChildItem` contract.
fn expect_node(output: Output, parent: &str) -> Result<Option<Node>, ProviderError> {
    match output {
        Output::Node(node) if node.name().is_empty() => Err(ProviderError::EmptyName),
        Output::Node(node) => Ok(Some(node)),
        Output::Value(Value::Null) => Ok(None),
        Output::Value(_) => Err(ProviderError::UnexpectedResult {
            operation: Operation::GetChildItem,
            name: parent.to_string(),
            expected: "a node",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::diagnostic::ErrorRecord;
    use crate::host::{RecordingHost, StopSignal};
    use crate::test_support::{
        dir, engine_with_interval, engine_with_workers, leaf, ScriptedDir, SlowHandler,
    };
    use serde_json::json;

    fn setup(handler: &Arc<ScriptedDir>) -> (Tree, NodeId, NodeId) {
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let root_id = tree.root();
        let ids = tree.replace_children(
            root_id,
            vec![Node::directory("vms", handler.clone()), leaf("readme")],
        );
        (tree, root_id, ids[0])
    }

    fn names(listing: &[ChildNode]) -> Vec<&str> {
        listing.iter().map(ChildNode::name).collect()
    }

    #[test]
    fn test_cache_hit_skips_handler() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a"), dir("b")]));
        let (mut tree, _, vms) = setup(&handler);

        let first = engine.children(&mut tree, vms, &ctx).unwrap();
        let second = engine.children(&mut tree, vms, &ctx).unwrap();

        assert_eq!(handler.calls(), 1);
        assert_eq!(names(&first), vec!["a", "b"]);
        assert_eq!(
            first.iter().map(ChildNode::id).collect::<Vec<_>>(),
            second.iter().map(ChildNode::id).collect::<Vec<_>>()
        );
        assert!(tree.is_cache_valid(vms));
    }

    #[test]
    fn test_force_refetches() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a")]));
        let (mut tree, _, vms) = setup(&handler);

        engine.children(&mut tree, vms, &CallContext::new(&host)).unwrap();
        handler.set_children(vec![leaf("a"), leaf("c")]);
        let forced = engine
            .children(&mut tree, vms, &CallContext::new(&host).with_force(true))
            .unwrap();

        assert_eq!(handler.calls(), 2);
        assert_eq!(names(&forced), vec!["a", "c"]);
    }

    #[test]
    fn test_empty_result_marks_visited() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host).with_path("/vms");
        let handler = Arc::new(ScriptedDir::new(Vec::new()));
        let (mut tree, _, vms) = setup(&handler);

        assert!(engine.children(&mut tree, vms, &ctx).unwrap().is_empty());
        assert!(tree.is_cache_valid(vms));
        assert!(engine.children(&mut tree, vms, &ctx).unwrap().is_empty());
        assert_eq!(handler.calls(), 1);
        assert!(host.debug_messages().iter().any(|m| m.contains("'/vms'")));
    }

    #[test]
    fn test_errors_only_without_force_keeps_node() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a")]));
        let (mut tree, root, vms) = setup(&handler);
        engine.children(&mut tree, vms, &CallContext::new(&host)).unwrap();

        handler.set_children(Vec::new());
        handler.set_errors(vec![ErrorRecord::handler("Login.Failed", "expired", "")]);
        let listing = engine
            .fetch_children(&mut tree, vms, &CallContext::new(&host))
            .unwrap();

        assert!(listing.is_empty());
        assert!(tree.is_attached(vms));
        assert_eq!(tree.child(root, "vms"), Some(vms));
        assert_eq!(tree.children(vms).len(), 1, "previous children intact");
        assert_eq!(host.reported().len(), 1);
        assert_eq!(host.reported()[0].id, "Login.Failed");
    }

    #[test]
    fn test_errors_only_with_force_removes_node() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a")]));
        let (mut tree, root, vms) = setup(&handler);
        engine.children(&mut tree, vms, &CallContext::new(&host)).unwrap();

        handler.set_children(Vec::new());
        handler.set_errors(vec![ErrorRecord::handler("Login.Failed", "expired", "")]);
        let ctx = CallContext::new(&host).with_force(true);
        let listing = engine.children(&mut tree, vms, &ctx).unwrap();

        assert!(listing.is_empty());
        assert_eq!(tree.child(root, "vms"), None);
        assert!(tree.children(vms).is_empty());
        assert!(!tree.is_cache_valid(vms), "errors never mark the node visited");
    }

    #[test]
    fn test_partial_results_are_kept_but_not_cached() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let ctx = CallContext::new(&host);
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a"), leaf("b")]));
        handler.set_errors(vec![ErrorRecord::handler("Partial", "page 2 failed", "")]);
        let (mut tree, _, vms) = setup(&handler);

        let listing = engine.children(&mut tree, vms, &ctx).unwrap();
        assert_eq!(names(&listing), vec!["a", "b"]);
        assert!(!tree.is_cache_valid(vms));

        engine.children(&mut tree, vms, &ctx).unwrap();
        assert_eq!(handler.calls(), 2, "an erroring fetch is retried");
    }

    #[test]
    fn test_dynamic_parameters_bypass_cache() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a")]));
        let (mut tree, _, vms) = setup(&handler);

        let mut params = crate::handler::Parameters::new();
        params.insert("filter".into(), json!("a*"));
        let ctx = CallContext::new(&host).with_dynamic_parameters(params);
        let listing = engine.children(&mut tree, vms, &ctx).unwrap();

        assert_eq!(names(&listing), vec!["a"]);
        assert!(listing.iter().all(|c| !c.is_cached()));
        assert!(tree.children(vms).is_empty());
        assert!(!tree.is_cache_valid(vms));
        assert!(tree.dynamic_parameters(vms).is_none(), "cleared after the call");
        assert_eq!(handler.last_parameters().and_then(|p| p.get("filter").cloned()), Some(json!("a*")));
    }

    #[test]
    fn test_uncached_listing_skips_nulls() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a")]).with_trailing_null());
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let ids = tree.replace_children(
            tree.root(),
            vec![Node::directory("live", handler.clone()).with_cache(false)],
        );

        let listing = engine
            .children(&mut tree, ids[0], &CallContext::new(&host))
            .unwrap();
        assert_eq!(names(&listing), vec!["a"]);
        engine
            .children(&mut tree, ids[0], &CallContext::new(&host))
            .unwrap();
        assert_eq!(handler.calls(), 2, "uncached nodes always call the handler");
    }

    #[test]
    fn test_stop_halts_uncached_streaming() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let stop = StopSignal::new();
        let handler = Arc::new(
            ScriptedDir::new(vec![leaf("a"), leaf("b"), leaf("c")]).raising(stop.clone()),
        );
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let ids = tree.replace_children(
            tree.root(),
            vec![Node::directory("live", handler).with_cache(false)],
        );

        let ctx = CallContext::new(&host).with_stop_signal(stop);
        let listing = engine.children(&mut tree, ids[0], &ctx).unwrap();
        assert!(listing.is_empty());
    }

    #[test]
    fn test_stop_never_leaves_partial_cache() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(vec![leaf("a")]));
        let (mut tree, _, vms) = setup(&handler);
        engine.children(&mut tree, vms, &CallContext::new(&host)).unwrap();

        let stop = StopSignal::new();
        handler.set_children(vec![leaf("x"), leaf("y")]);
        handler.raise_on_call(stop.clone());
        let ctx = CallContext::new(&host).with_force(true).with_stop_signal(stop);
        let listing = engine.children(&mut tree, vms, &ctx).unwrap();

        assert!(listing.is_empty());
        let kept: Vec<_> = tree
            .children(vms)
            .iter()
            .map(|c| tree.get(*c).unwrap().name().to_string())
            .collect();
        assert_eq!(kept, vec!["a"]);
    }

    #[test]
    fn test_value_result_is_contract_violation() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(Vec::new()).with_value(json!(42)));
        let (mut tree, _, vms) = setup(&handler);

        let err = engine
            .children(&mut tree, vms, &CallContext::new(&host))
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(tree.dynamic_parameters(vms).is_none());
    }

    #[test]
    fn test_leaf_is_not_a_container() {
        let engine = engine_with_interval(500);
        let host = RecordingHost::new();
        let handler = Arc::new(ScriptedDir::new(Vec::new()));
        let (mut tree, root, _) = setup(&handler);
        let readme = tree.child(root, "readme").unwrap();

        assert!(matches!(
            engine.children(&mut tree, readme, &CallContext::new(&host)),
            Err(ProviderError::NotContainer { .. })
        ));
    }

    fn raise_after(stop: &StopSignal, millis: u64) -> thread::JoinHandle<()> {
        let stop = stop.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(millis));
            stop.raise();
        })
    }

    #[test]
    fn test_errors_before_stop_are_reported() {
        let engine = engine_with_interval(20);
        let host = RecordingHost::new();
        let stop = StopSignal::new();
        let ctx = CallContext::new(&host).with_stop_signal(stop.clone());
        let handler = Arc::new(
            SlowHandler::new(Duration::from_millis(400))
                .with_error(ErrorRecord::handler("Login.Failed", "token expired", "")),
        );
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let ids = tree.replace_children(tree.root(), vec![Node::directory("vms", handler)]);

        let raiser = raise_after(&stop, 80);
        let listing = engine.children(&mut tree, ids[0], &ctx).unwrap();
        raiser.join().unwrap();

        assert!(listing.is_empty());
        let reported = host.reported();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].id, "Login.Failed");
        assert!(!tree.is_cache_valid(ids[0]));
    }

    #[test]
    fn test_abandoned_call_does_not_hold_up_next_fetch() {
        let engine = engine_with_workers(100, 1);
        let stuck = Arc::new(SlowHandler::new(Duration::from_millis(1500)).ignoring_stop());
        let quick = Arc::new(ScriptedDir::new(vec![leaf("a")]));
        let root = Arc::new(ScriptedDir::new(Vec::new()));
        let mut tree = Tree::new(Node::directory("root", root)).unwrap();
        let ids = tree.replace_children(
            tree.root(),
            vec![Node::directory("stuck", stuck), Node::directory("quick", quick)],
        );

        let stop = StopSignal::new();
        let stopped = RecordingHost::new();
        let raiser = raise_after(&stop, 50);
        let ctx = CallContext::new(&stopped).with_stop_signal(stop);
        assert!(engine.children(&mut tree, ids[0], &ctx).unwrap().is_empty());
        raiser.join().unwrap();

        let host = RecordingHost::new();
        let started = Instant::now();
        let listing = engine
            .children(&mut tree, ids[1], &CallContext::new(&host))
            .unwrap();

        assert_eq!(names(&listing), vec!["a"]);
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(host.progress().is_empty(), "finished within the first interval");
    }
}
