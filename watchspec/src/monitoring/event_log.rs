use std::fmt;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::monitoring::{CommandMonitor, CommandStartedEvent};

/// Monitor half of an [`EventLog`]: forwards every command-started event
/// into the log's channel.
#[derive(Debug, Clone)]
pub struct EventCollector {
    sender: UnboundedSender<CommandStartedEvent>,
}

impl CommandMonitor for EventCollector {
    fn on_command_started(&self, event: &CommandStartedEvent) {
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!(command = %event.command_name, "event log dropped, discarding event");
        }
    }
}

/// Append-only log of the command-started events of one client.
///
/// The log and its [`EventCollector`] are created together; register the
/// collector on the client and call [`collect`](Self::collect) to move
/// pending events into the log. Events keep the order in which the client
/// emitted them.
///
/// # Example
///
/// ```ignore
/// let (mut log, collector) = EventLog::new();
/// client.add_command_monitor(Box::new(collector)).await;
///
/// // ... run commands ...
///
/// log.collect();
/// assert_eq!(log.events()[0].command_name, "aggregate");
/// ```
///
/// # Warning
///
/// The log uses an unbounded channel. It is scoped to a single scenario and
/// is not meant for long-lived clients.
pub struct EventLog {
    events: Vec<CommandStartedEvent>,
    receiver: UnboundedReceiver<CommandStartedEvent>,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

impl EventLog {
    pub fn new() -> (Self, EventCollector) {
        let (tx, rx) = unbounded_channel();
        let log = Self {
            events: Vec::new(),
            receiver: rx,
        };
        (log, EventCollector { sender: tx })
    }

    /// Move every pending event from the collector into the log.
    ///
    /// Returns the number of events appended.
    pub fn collect(&mut self) -> usize {
        let before = self.events.len();
        while let Ok(event) = self.receiver.try_recv() {
            self.events.push(event);
        }
        self.events.len() - before
    }

    /// Recorded events, oldest first.
    #[inline]
    pub fn events(&self) -> &[CommandStartedEvent] {
        &self.events
    }

    /// Returns the number of recorded events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
