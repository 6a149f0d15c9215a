//! Running a handler call on the worker pool with a bounded, progress-reporting
//! wait on the caller's thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::Engine;
use crate::diagnostic::ErrorRecord;
use crate::gateway::{Gateway, Invocation};
use crate::handler::{Handler, Output};
use crate::host::{CallContext, StopSignal};
use crate::progress::ProgressTracker;

/// Error id used when no worker thread could be started for a call.
const WORKER_UNAVAILABLE: &str = "WorkerUnavailable";

/// Everything one handler call produced.
///
/// Results and errors are not exclusive: a handler may emit partial results
/// and then fail. An outcome taken from an interrupted wait holds whatever
/// arrived before the caller stopped waiting.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Result objects in emission order.
    pub results: Vec<Output>,
    /// Error records in emission order.
    pub errors: Vec<ErrorRecord>,
    completed: bool,
}

impl Outcome {
    /// Whether the handler call ran to completion before the caller stopped
    /// waiting.
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Whether any error was collected.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Default)]
struct Shared {
    outcome: Outcome,
    done: bool,
}

/// Collection point shared by a worker and the waiting caller. The worker
/// pushes as the handler emits, so an interrupted wait still sees what
/// arrived.
#[derive(Default)]
struct Completion {
    state: Mutex<Shared>,
    ready: Condvar,
}

impl Completion {
    fn push_result(&self, output: Output) {
        self.state.lock().outcome.results.push(output);
    }

    fn push_error(&self, error: ErrorRecord) {
        self.state.lock().outcome.errors.push(error);
    }

    /// Mark the worker finished; `ran` is false when the handler was never
    /// entered.
    fn finish(&self, ran: bool) {
        let mut state = self.state.lock();
        state.done = true;
        state.outcome.completed = ran;
        self.ready.notify_all();
    }

    /// Wait up to `timeout`; returns whether the worker finished.
    fn wait_for(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        self.ready
            .wait_while_for(&mut state, |state| !state.done, timeout);
        state.done
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        self.ready.wait_while(&mut state, |state| !state.done);
    }

    /// Take what has arrived so far.
    fn take(&self) -> Outcome {
        std::mem::take(&mut self.state.lock().outcome)
    }
}

/// Raises the worker's cancellation signal when the waiting scope exits.
struct CancelOnDrop(StopSignal);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.raise();
    }
}

/// Returns a reserved pool slot when the pooled task ends.
struct PoolSlot(Arc<AtomicUsize>);

impl Drop for PoolSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What `run` does when the wait ends before the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    /// Return right away; the cancelled worker winds down on its own.
    Detach,
    /// Cancel, then wait for the worker to leave the handler.
    Wait,
}

impl Engine {
    /// Run `invocation` against `handler` on a worker and wait for it.
    ///
    /// The first wait lasts one poll interval without any output. If the call
    /// is still running and nobody asked to stop, `progress` is started and
    /// updated once per further interval. The wait ends on completion, on
    /// cancellation or when the caller's stop signal is raised; in the latter
    /// cases the returned outcome holds what arrived so far and is not
    /// [`completed`](Outcome::completed).
    ///
    /// The invocation's cancel signal is raised on return, so a handler that
    /// polls [`Call::is_stopping`](crate::Call::is_stopping) winds down
    /// instead of running orphaned.
    pub(crate) fn run(
        &self,
        handler: Arc<dyn Handler>,
        invocation: Invocation,
        ctx: &CallContext<'_>,
        progress: &mut ProgressTracker,
    ) -> Outcome {
        self.run_with(handler, invocation, ctx, progress, Settle::Detach)
    }

    /// Like [`run`](Self::run), but an interrupted wait cancels the worker and
    /// then blocks until the handler has returned. Used when the caller
    /// releases resources the handler is working on.
    pub(crate) fn run_settled(
        &self,
        handler: Arc<dyn Handler>,
        invocation: Invocation,
        ctx: &CallContext<'_>,
        progress: &mut ProgressTracker,
    ) -> Outcome {
        self.run_with(handler, invocation, ctx, progress, Settle::Wait)
    }

    fn run_with(
        &self,
        handler: Arc<dyn Handler>,
        invocation: Invocation,
        ctx: &CallContext<'_>,
        progress: &mut ProgressTracker,
        settle: Settle,
    ) -> Outcome {
        let cancel = invocation.cancel_signal().clone();
        let _cancel_guard = CancelOnDrop(cancel.clone());
        let completion = Arc::new(Completion::default());

        log::debug!("starting {} for '{}'", invocation.operation(), invocation.node());
        self.spawn(handler, invocation, completion.clone());

        let interval = self.inner.config.poll_interval;
        let mut done = completion.wait_for(interval);

        if !done && !cancel.is_raised() && !ctx.stopping() {
            progress.start(ctx.host());
        }

        let mut percent = 1;
        while !done && !cancel.is_raised() && !ctx.stopping() {
            done = completion.wait_for(interval);
            percent += 1;
            log::trace!("still waiting, tick {percent}");
            progress.update(percent, ctx.host());
        }

        progress.end(ctx.host());

        if !done {
            match settle {
                Settle::Detach => log::debug!("stopped waiting before the handler finished"),
                Settle::Wait => {
                    log::debug!("stopped, waiting for the handler to return");
                    cancel.raise();
                    completion.wait();
                }
            }
        }

        completion.take()
    }

    /// Start the call on a pool thread when one is free, otherwise on a
    /// dedicated thread, so a new call never queues behind abandoned ones.
    fn spawn(&self, handler: Arc<dyn Handler>, invocation: Invocation, completion: Arc<Completion>) {
        let gateway = self.inner.gateway.clone();

        if let Some(slot) = self.reserve_pool_slot() {
            self.inner.pool.spawn(move || {
                let _slot = slot;
                execute(&gateway, handler.as_ref(), &invocation, &completion);
            });
            return;
        }

        log::debug!(
            "all {} workers busy, starting a dedicated thread for {}",
            self.inner.workers,
            invocation.operation()
        );
        let fallback = completion.clone();
        let node = invocation.node().to_string();
        let spawned = thread::Builder::new()
            .name("vtree-overflow".to_string())
            .spawn(move || execute(&gateway, handler.as_ref(), &invocation, &completion));
        if let Err(err) = spawned {
            log::warn!("failed to start a worker thread: {err}");
            fallback.push_error(ErrorRecord::from_io(WORKER_UNAVAILABLE, &err, node));
            fallback.finish(false);
        }
    }

    fn reserve_pool_slot(&self) -> Option<PoolSlot> {
        let busy = &self.inner.busy;
        busy.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
            (n < self.inner.workers).then_some(n + 1)
        })
        .ok()
        .map(|_| PoolSlot(busy.clone()))
    }
}

fn execute(gateway: &Gateway, handler: &dyn Handler, invocation: &Invocation, completion: &Completion) {
    if invocation.cancel_signal().is_raised() {
        completion.finish(false);
        return;
    }

    gateway.call(
        handler,
        invocation,
        &mut |output| completion.push_result(output),
        &mut |error| completion.push_error(error),
    );
    completion.finish(true);
}
