use crate::monitoring::CommandStartedEvent;

/// Trait for observing commands a client sends to the store.
///
/// Clients call monitors synchronously, in registration order, for every
/// outbound command. All methods have default no-op implementations.
///
/// # Example
///
/// ```rust
/// use watchspec::monitoring::{CommandMonitor, CommandStartedEvent};
///
/// struct Printer;
///
/// impl CommandMonitor for Printer {
///     fn on_command_started(&self, event: &CommandStartedEvent) {
///         println!("[{}] {}", event.database_name, event.command_name);
///     }
/// }
/// ```
pub trait CommandMonitor: Send + Sync {
    /// Called right before a command is sent.
    fn on_command_started(&self, event: &CommandStartedEvent) {
        let _e = event;
    }

    /// Called when the owning client closes. No further callbacks follow.
    fn on_client_closed(&self) {}
}
