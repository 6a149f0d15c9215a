//! Error records produced by handlers and content streams.

use std::fmt;
use std::io;

/// Broad classification of an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Reading or writing data failed.
    Io,
    /// An argument or value was rejected.
    Validation,
    /// The caller lacks permission.
    Security,
    /// The handler reported a failure of its own.
    Handler,
}

impl ErrorKind {
    /// Classify an I/O error.
    ///
    /// Permission failures map to [`ErrorKind::Security`], malformed data to
    /// [`ErrorKind::Validation`], everything else to [`ErrorKind::Io`].
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::Security,
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => Self::Validation,
            _ => Self::Io,
        }
    }

    /// Stable name of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Io => "io",
            Self::Validation => "validation",
            Self::Security => "security",
            Self::Handler => "handler",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single fault raised by a handler or a content stream.
///
/// Records are values: they are collected per call, reported to the host and
/// never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Fully qualified error identifier, e.g. `SetContent.NotSupported`.
    pub id: String,
    /// Classification.
    pub kind: ErrorKind,
    /// Error message.
    pub message: String,
    /// Name of the node the error originated from.
    pub target: String,
    /// User-facing message that replaces `message` when reporting.
    pub details: Option<String>,
    /// Script or call stack hint, written to the host's debug stream.
    pub stack: Option<String>,
}

impl ErrorRecord {
    /// Create a record.
    pub fn new(
        id: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            message: message.into(),
            target: target.into(),
            details: None,
            stack: None,
        }
    }

    /// Create a handler-kind record.
    pub fn handler(
        id: impl Into<String>,
        message: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::new(id, ErrorKind::Handler, message, target)
    }

    /// Create a record from an I/O error.
    pub fn from_io(id: impl Into<String>, err: &io::Error, target: impl Into<String>) -> Self {
        Self::new(id, ErrorKind::from_io(err), err.to_string(), target)
    }

    /// Attach a user-facing details message.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach a stack hint.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// The message to show the user: details if present, else the message.
    pub fn display_message(&self) -> &str {
        self.details.as_deref().unwrap_or(&self.message)
    }

    /// The stack hint, if it carries anything besides whitespace.
    pub fn stack_hint(&self) -> Option<&str> {
        self.stack.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.id, self.target, self.display_message())
    }
}
