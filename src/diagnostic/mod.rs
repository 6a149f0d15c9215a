//! Error records, error types and host reporting.
//!
//! ```text
//! Handler ──► HandlerError ──► ErrorRecord ──┐
//!                                            ├──► Outcome.errors ──► report_errors ──► Host
//! ContentStream read fault ──► ErrorRecord ──┘
//!
//! contract violations / persist failures ──► ProviderError ──► caller
//! ```

mod error;
mod record;
mod report;

pub use error::{HandlerError, ProviderError};
pub use record::{ErrorKind, ErrorRecord};
pub use report::{report_errors, report_message};
