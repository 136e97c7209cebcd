//! Ready-to-use command monitors.
//!
//! # Available Monitors
//!
//! - [`CommandTracer`] - Logs outbound commands via `tracing` crate
//! - [`Recorder`] - Records commands to a JSON Lines file (requires `recorder` feature)
//!
//! # Example
//!
//! ```ignore
//! use watchspec::monitors::CommandTracer;
//!
//! client.add_command_monitor(Box::new(CommandTracer)).await;
//! ```

mod tracer;
pub use tracer::CommandTracer;

#[cfg(feature = "recorder")]
mod recorder;

#[cfg(feature = "recorder")]
#[cfg_attr(docsrs, doc(cfg(feature = "recorder")))]
pub use recorder::Recorder;
