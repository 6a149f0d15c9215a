//! Scripted handlers shared by unit tests.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::ConfigBuilder;
use crate::diagnostic::{ErrorRecord, HandlerError};
use crate::engine::Engine;
use crate::handler::{Call, Handler, HandlerResult, Node, Parameters, Value};
use crate::host::StopSignal;

pub(crate) fn engine_with_interval(millis: u64) -> Engine {
    engine_with_workers(millis, 2)
}

pub(crate) fn engine_with_workers(millis: u64, workers: usize) -> Engine {
    let config = ConfigBuilder::new()
        .poll_interval(Duration::from_millis(millis))
        .worker_threads(workers)
        .build();
    Engine::with_config(&config).unwrap()
}

/// A leaf whose handler supports nothing.
pub(crate) fn leaf(name: &str) -> Node {
    struct Blank;
    impl Handler for Blank {}
    Node::leaf(name, Arc::new(Blank))
}

/// An empty caching directory.
pub(crate) fn dir(name: &str) -> Node {
    Node::directory(name, Arc::new(ScriptedDir::new(Vec::new())))
}

// =============================================================================
// ScriptedDir
// =============================================================================

#[derive(Default)]
struct Script {
    children: Vec<Node>,
    errors: Vec<ErrorRecord>,
    value: Option<Value>,
    trailing_null: bool,
    raise: Option<StopSignal>,
    last_parameters: Option<Parameters>,
}

/// Directory handler answering `GetChildItem` from a mutable script.
pub(crate) struct ScriptedDir {
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl ScriptedDir {
    pub(crate) fn new(children: Vec<Node>) -> Self {
        Self {
            script: Mutex::new(Script {
                children,
                ..Script::default()
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Emit `value` after the children.
    pub(crate) fn with_value(self, value: Value) -> Self {
        self.script.lock().value = Some(value);
        self
    }

    /// Emit a null after the children.
    pub(crate) fn with_trailing_null(self) -> Self {
        self.script.lock().trailing_null = true;
        self
    }

    /// Raise `stop` at the end of every call.
    pub(crate) fn raising(self, stop: StopSignal) -> Self {
        self.raise_on_call(stop);
        self
    }

    pub(crate) fn raise_on_call(&self, stop: StopSignal) {
        self.script.lock().raise = Some(stop);
    }

    pub(crate) fn set_children(&self, children: Vec<Node>) {
        self.script.lock().children = children;
    }

    pub(crate) fn set_errors(&self, errors: Vec<ErrorRecord>) {
        self.script.lock().errors = errors;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_parameters(&self) -> Option<Parameters> {
        self.script.lock().last_parameters.clone()
    }
}

impl Handler for ScriptedDir {
    fn get_child_item(&self, call: &mut Call<'_>) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        script.last_parameters = call.dynamic_parameters().cloned();

        call.emit_all(script.children.iter().cloned());
        if let Some(value) = &script.value {
            call.emit(value.clone());
        }
        if script.trailing_null {
            call.emit(Value::Null);
        }
        for error in &script.errors {
            call.write_error(error.clone());
        }
        if let Some(stop) = &script.raise {
            stop.raise();
        }
        Ok(())
    }
}

// =============================================================================
// SlowHandler
// =============================================================================

/// Directory handler that takes `delay` to list one leaf, giving up early
/// when asked to stop unless told to ignore it.
pub(crate) struct SlowHandler {
    delay: Duration,
    honor_stop: bool,
    first_error: Option<ErrorRecord>,
}

impl SlowHandler {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            honor_stop: true,
            first_error: None,
        }
    }

    /// Keep running after a stop request.
    pub(crate) fn ignoring_stop(mut self) -> Self {
        self.honor_stop = false;
        self
    }

    /// Write `record` before starting to wait.
    pub(crate) fn with_error(mut self, record: ErrorRecord) -> Self {
        self.first_error = Some(record);
        self
    }
}

impl Handler for SlowHandler {
    fn get_child_item(&self, call: &mut Call<'_>) -> HandlerResult {
        if let Some(record) = &self.first_error {
            call.write_error(record.clone());
        }
        let started = Instant::now();
        while started.elapsed() < self.delay {
            if self.honor_stop && call.is_stopping() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(10));
        }
        call.emit(leaf("done"));
        Ok(())
    }
}

/// Leaf handler whose `SetContent` takes `delay` and then records whether the
/// buffer it was given still exists.
pub(crate) struct SlowSink {
    delay: Duration,
    buffer_seen: Mutex<Option<bool>>,
}

impl SlowSink {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            buffer_seen: Mutex::new(None),
        }
    }

    pub(crate) fn buffer_seen(&self) -> Option<bool> {
        *self.buffer_seen.lock()
    }
}

impl Handler for SlowSink {
    fn set_content(&self, call: &mut Call<'_>) -> HandlerResult {
        thread::sleep(self.delay);
        let exists = call.arg(0).is_some_and(|path| Path::new(path).exists());
        *self.buffer_seen.lock() = Some(exists);
        Ok(())
    }
}

// =============================================================================
// NotesLeaf
// =============================================================================

/// Leaf handler serving fixed lines and recording every persist.
pub(crate) struct NotesLeaf {
    lines: Vec<String>,
    fail_persist: bool,
    persisted: Mutex<Vec<(String, String)>>,
}

impl NotesLeaf {
    pub(crate) fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            fail_persist: false,
            persisted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_persist(mut self) -> Self {
        self.fail_persist = true;
        self
    }

    pub(crate) fn persist_calls(&self) -> usize {
        self.persisted.lock().len()
    }

    /// `(buffer content, logical path)` of every persist call.
    pub(crate) fn persisted(&self) -> Vec<(String, String)> {
        self.persisted.lock().clone()
    }
}

impl Handler for NotesLeaf {
    fn get_content(&self, call: &mut Call<'_>) -> HandlerResult {
        call.emit_all(self.lines.iter().map(String::as_str));
        Ok(())
    }

    fn set_content(&self, call: &mut Call<'_>) -> HandlerResult {
        let buffer = call.arg(0).unwrap_or_default();
        let content = fs::read_to_string(buffer)?;
        let logical = call.arg(1).unwrap_or_default().to_string();
        self.persisted.lock().push((content, logical));

        if self.fail_persist {
            return Err(HandlerError::AccessDenied("share is read-only".into()));
        }
        Ok(())
    }
}
