//! Reporting collected error records to the host.

use super::record::ErrorRecord;
use crate::host::CallContext;

/// Format the message reported for a record raised while working on `item`.
pub fn report_message(item: &str, record: &ErrorRecord) -> String {
    format!(
        "Item '{item}' may not exist or is unavailable: {}",
        record.display_message()
    )
}

/// Report every record to the host sink.
///
/// Each record becomes one `report_error` call tagged with `source`; records
/// carrying a stack hint additionally produce a debug message.
pub fn report_errors(item: &str, ctx: &CallContext<'_>, records: &[ErrorRecord], source: &str) {
    for record in records {
        let message = report_message(item, record);
        log::debug!("reporting {} for '{item}': {message}", record.id);
        ctx.host().report_error(&record.id, &message, record.kind, source);

        if let Some(stack) = record.stack_hint() {
            ctx.host().write_debug(stack);
        }
    }
}
