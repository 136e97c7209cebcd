//! Command monitoring: observing the commands a client sends to the store.
//!
//! # Overview
//!
//! Clients report every outbound command to their registered
//! [`CommandMonitor`]s as a [`CommandStartedEvent`]. The interpreter records
//! those events per scenario through an [`EventLog`], then compares them
//! against the fixture expectations after [`normalize`]-ing their keys.
//!
//! # Example
//!
//! ```ignore
//! use watchspec::monitoring::EventLog;
//!
//! let (mut log, collector) = EventLog::new();
//! client.add_command_monitor(Box::new(collector)).await;
//!
//! // ... run the scenario ...
//!
//! log.collect();
//! for event in log.events() {
//!     println!("{} on {}", event.command_name, event.database_name);
//! }
//! ```

mod command_event;
mod event_log;
mod monitor;
pub mod normalize;

pub use command_event::CommandStartedEvent;
pub use event_log::{EventCollector, EventLog};
pub use monitor::CommandMonitor;
pub use normalize::normalize;
