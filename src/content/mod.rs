//! Content streams over transient local buffers.
//!
//! A leaf's content is staged in a temporary file for the lifetime of one
//! open stream. Read streams are filled from `GetContent` results; write
//! streams hand the buffer to `SetContent` when closed.

mod stream;

use std::fmt;

pub use stream::ContentStream;

/// Direction a content stream was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Lines come from the leaf's `GetContent` results.
    Read,
    /// Lines are persisted through `SetContent` on close.
    Write,
}

impl AccessMode {
    /// Lowercase name, as used in messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "reading",
            Self::Write => "writing",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
