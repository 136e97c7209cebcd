use crate::monitoring::{CommandMonitor, CommandStartedEvent};

/// A monitor that logs outbound commands to the `tracing` crate.
///
/// Log levels:
/// - `debug` - command started (name, database, request id)
/// - `trace` - full command body
/// - `info` - client closed
///
/// # Example
///
/// ```ignore
/// use watchspec::monitors::CommandTracer;
///
/// client.add_command_monitor(Box::new(CommandTracer)).await;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTracer;

impl CommandMonitor for CommandTracer {
    fn on_command_started(&self, event: &CommandStartedEvent) {
        tracing::debug!(
            command = %event.command_name,
            database = %event.database_name,
            request_id = event.request_id,
            connection = %event.connection_id,
            "command started"
        );
        tracing::trace!(
            command = %event.command_name,
            body = ?event.command,
            "command body"
        );
    }

    fn on_client_closed(&self) {
        tracing::info!("client closed");
    }
}
