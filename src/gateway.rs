//! External handler gateway.
//!
//! The gateway is the only place that calls into handler code. It owns no
//! caching or retry policy: it routes one [`Invocation`] to the matching
//! [`Handler`] method, pushes results and errors to the caller's sinks as they
//! arrive, and turns handler failures (including panics) into
//! [`ErrorRecord`]s so nothing escapes as a raw fault.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::diagnostic::ErrorRecord;
use crate::handler::{dispatch, Call, Handler, Operation, Output, Parameters};
use crate::host::{CallContext, StopSignal};

/// Error id of records produced from a panicking handler.
pub const HANDLER_PANICKED: &str = "HandlerPanicked";

// =============================================================================
// Invocation
// =============================================================================

/// Everything needed to run one handler operation, detached from the caller's
/// thread.
#[derive(Debug, Clone)]
pub struct Invocation {
    operation: Operation,
    node: String,
    args: Vec<String>,
    parameters: Option<Parameters>,
    stop: StopSignal,
    cancel: StopSignal,
    debug: bool,
    verbose: bool,
}

impl Invocation {
    /// Create an invocation of `operation` on the node named `node`.
    pub fn new(operation: Operation, node: impl Into<String>) -> Self {
        Self {
            operation,
            node: node.into(),
            args: Vec::new(),
            parameters: None,
            stop: StopSignal::new(),
            cancel: StopSignal::new(),
            debug: false,
            verbose: false,
        }
    }

    /// Create an invocation carrying the caller's stop signal, switches and
    /// dynamic parameters.
    pub fn from_context(operation: Operation, node: impl Into<String>, ctx: &CallContext<'_>) -> Self {
        Self {
            parameters: ctx.dynamic_parameters().cloned(),
            stop: ctx.stop_signal().clone(),
            debug: ctx.debug(),
            verbose: ctx.verbose(),
            ..Self::new(operation, node)
        }
    }

    /// Set the positional arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Use `cancel` as this call's channel stop signal.
    pub fn with_cancel(mut self, cancel: StopSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// The operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The node name.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The signal that stops this call's channel.
    pub fn cancel_signal(&self) -> &StopSignal {
        &self.cancel
    }
}

// =============================================================================
// Gateway
// =============================================================================

struct ActiveCall {
    operation: Operation,
    cancel: StopSignal,
}

#[derive(Default)]
struct Channels {
    next_id: u64,
    active: FxHashMap<u64, ActiveCall>,
}

/// Synchronous call contract between the engine and handler code.
#[derive(Default)]
pub struct Gateway {
    channels: Mutex<Channels>,
}

impl Gateway {
    /// Create a gateway with no active calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke `target` and push every result to `output` and every fault to
    /// `errors`, in arrival order.
    ///
    /// Never panics because of the handler: a returned [`HandlerError`]
    /// becomes one record, a panic becomes a [`HANDLER_PANICKED`] record.
    ///
    /// [`HandlerError`]: crate::HandlerError
    pub fn call(
        &self,
        target: &dyn Handler,
        invocation: &Invocation,
        output: &mut dyn FnMut(Output),
        errors: &mut dyn FnMut(ErrorRecord),
    ) {
        let _channel = self.attach(invocation);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut call = Call {
                node: &invocation.node,
                operation: invocation.operation,
                args: &invocation.args,
                parameters: invocation.parameters.as_ref(),
                stop: &invocation.stop,
                channel_stop: &invocation.cancel,
                debug: invocation.debug,
                verbose: invocation.verbose,
                output: &mut *output,
                errors: &mut *errors,
            };
            dispatch(target, &mut call)
        }));

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors(err.into_record(invocation.operation, &invocation.node)),
            Err(payload) => {
                log::warn!(
                    "{} handler for '{}' panicked",
                    invocation.operation,
                    invocation.node
                );
                errors(ErrorRecord::handler(
                    HANDLER_PANICKED,
                    panic_message(payload.as_ref()),
                    invocation.node.as_str(),
                ));
            }
        }
    }

    /// Ask every running call to stop.
    pub fn stop_all(&self) {
        for call in self.channels.lock().active.values() {
            call.cancel.raise();
        }
    }

    /// Number of calls currently inside handler code.
    pub fn active_calls(&self) -> usize {
        self.channels.lock().active.len()
    }

    /// Operations currently inside handler code.
    pub fn active_operations(&self) -> Vec<Operation> {
        self.channels
            .lock()
            .active
            .values()
            .map(|call| call.operation)
            .collect()
    }

    fn attach(&self, invocation: &Invocation) -> ChannelGuard<'_> {
        let mut channels = self.channels.lock();
        let id = channels.next_id;
        channels.next_id += 1;
        channels.active.insert(
            id,
            ActiveCall {
                operation: invocation.operation,
                cancel: invocation.cancel.clone(),
            },
        );
        ChannelGuard { gateway: self, id }
    }
}

/// Detaches a call from the gateway on every exit path, panics included.
struct ChannelGuard<'a> {
    gateway: &'a Gateway,
    id: u64,
}

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        self.gateway.channels.lock().active.remove(&self.id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
