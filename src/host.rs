//! Host sink contract and per-call context.
//!
//! The host is whatever presents results to the user (a shell, a UI, a test).
//! The engine and content streams only talk to it through [`Host`], and every
//! call carries an explicit [`CallContext`] instead of ambient provider state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::diagnostic::{ErrorKind, ErrorRecord};
use crate::handler::Parameters;
use crate::progress::ProgressRecord;

// =============================================================================
// Host Trait
// =============================================================================

/// Sink for errors, debug output and progress produced while serving a call.
///
/// # Example
///
/// ```ignore
/// use vtree::{ErrorKind, ErrorRecord, Host};
///
/// struct Console;
///
/// impl Host for Console {
///     fn write_error(&self, record: &ErrorRecord) {
///         eprintln!("error: {record}");
///     }
///
///     fn write_debug(&self, message: &str) {
///         eprintln!("debug: {message}");
///     }
///
///     fn report_error(&self, id: &str, message: &str, kind: ErrorKind, source: &str) {
///         eprintln!("[{source}] {id} ({kind}): {message}");
///     }
/// }
/// ```
pub trait Host {
    /// Write a non-terminating error.
    fn write_error(&self, record: &ErrorRecord);

    /// Write a debug-level message.
    fn write_debug(&self, message: &str);

    /// Report a handler error collected during a call.
    fn report_error(&self, id: &str, message: &str, kind: ErrorKind, source: &str);

    /// Show or update a progress indication.
    fn write_progress(&self, _record: &ProgressRecord) {}
}

// =============================================================================
// LogHost - Default Implementation
// =============================================================================

/// Host that forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHost;

impl Host for LogHost {
    fn write_error(&self, record: &ErrorRecord) {
        log::error!("{record}");
    }

    fn write_debug(&self, message: &str) {
        log::debug!("{message}");
    }

    fn report_error(&self, id: &str, message: &str, kind: ErrorKind, source: &str) {
        log::error!("[{source}] {id} ({kind}): {message}");
    }

    fn write_progress(&self, record: &ProgressRecord) {
        if record.completed {
            log::info!("{}: completed", record.activity);
        } else {
            log::info!("{}: {} ({}%)", record.activity, record.status, record.percent);
        }
    }
}

// =============================================================================
// RecordingHost - In-memory Implementation
// =============================================================================

/// An error passed to [`Host::report_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    /// Error identifier.
    pub id: String,
    /// Formatted message.
    pub message: String,
    /// Classification.
    pub kind: ErrorKind,
    /// Source tag.
    pub source: String,
}

#[derive(Default)]
struct Recorded {
    errors: Vec<ErrorRecord>,
    debug: Vec<String>,
    reported: Vec<ReportedError>,
    progress: Vec<ProgressRecord>,
}

/// Host that keeps everything it receives in memory.
///
/// Useful for embedding (render after the call) and for tests.
#[derive(Default)]
pub struct RecordingHost {
    recorded: Mutex<Recorded>,
}

impl RecordingHost {
    /// Create an empty recording host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors passed to [`Host::write_error`].
    pub fn written_errors(&self) -> Vec<ErrorRecord> {
        self.recorded.lock().errors.clone()
    }

    /// Messages passed to [`Host::write_debug`].
    pub fn debug_messages(&self) -> Vec<String> {
        self.recorded.lock().debug.clone()
    }

    /// Errors passed to [`Host::report_error`].
    pub fn reported(&self) -> Vec<ReportedError> {
        self.recorded.lock().reported.clone()
    }

    /// Progress records, in the order they were written.
    pub fn progress(&self) -> Vec<ProgressRecord> {
        self.recorded.lock().progress.clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        *self.recorded.lock() = Recorded::default();
    }
}

impl Host for RecordingHost {
    fn write_error(&self, record: &ErrorRecord) {
        self.recorded.lock().errors.push(record.clone());
    }

    fn write_debug(&self, message: &str) {
        self.recorded.lock().debug.push(message.to_string());
    }

    fn report_error(&self, id: &str, message: &str, kind: ErrorKind, source: &str) {
        self.recorded.lock().reported.push(ReportedError {
            id: id.to_string(),
            message: message.to_string(),
            kind,
            source: source.to_string(),
        });
    }

    fn write_progress(&self, record: &ProgressRecord) {
        self.recorded.lock().progress.push(record.clone());
    }
}

// =============================================================================
// StopSignal
// =============================================================================

/// A shared flag raised to ask running work to stop.
///
/// Clones observe the same flag. Used both for the host-level "stopping"
/// request and for the engine's own cancellation of a worker.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create a signal that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether the signal was raised.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// CallContext
// =============================================================================

/// Everything a single navigation or content call needs from its caller.
///
/// Built once per call and passed by reference through the engine, the
/// gateway and content streams.
#[derive(Clone)]
pub struct CallContext<'h> {
    host: &'h dyn Host,
    path: String,
    force: bool,
    stop: StopSignal,
    dynamic_parameters: Option<Parameters>,
    debug: bool,
    verbose: bool,
}

impl<'h> CallContext<'h> {
    /// Create a context that reports to `host`.
    pub fn new(host: &'h dyn Host) -> Self {
        Self {
            host,
            path: String::new(),
            force: false,
            stop: StopSignal::new(),
            dynamic_parameters: None,
            debug: false,
            verbose: false,
        }
    }

    /// Set the logical path the call is addressed to.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Request force semantics.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Share a stop signal with the caller.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Bind dynamic parameters for this call.
    pub fn with_dynamic_parameters(mut self, parameters: Parameters) -> Self {
        self.dynamic_parameters = Some(parameters);
        self
    }

    /// Forward the debug switch to handlers.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Forward the verbose switch to handlers.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The host sink.
    pub fn host(&self) -> &'h dyn Host {
        self.host
    }

    /// The logical path of the call.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether force semantics were requested.
    pub fn force(&self) -> bool {
        self.force
    }

    /// Whether the caller asked to stop.
    pub fn stopping(&self) -> bool {
        self.stop.is_raised()
    }

    /// The caller's stop signal.
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// The bound dynamic parameters, if any.
    pub fn dynamic_parameters(&self) -> Option<&Parameters> {
        self.dynamic_parameters.as_ref()
    }

    /// Whether the call carries dynamic parameters, which makes its results
    /// call-specific.
    pub fn uses_dynamic_parameters(&self) -> bool {
        self.dynamic_parameters.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Debug switch.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Verbose switch.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Derive a context for another path, keeping everything else.
    pub fn for_path(&self, path: impl Into<String>) -> Self {
        self.clone().with_path(path)
    }

    /// Derive the context used to walk intermediate path segments: same host,
    /// stop signal and switches, but no force and no dynamic parameters, which
    /// only apply to the addressed item.
    pub fn navigation(&self, path: impl Into<String>) -> Self {
        Self {
            force: false,
            dynamic_parameters: None,
            ..self.for_path(path)
        }
    }
}
