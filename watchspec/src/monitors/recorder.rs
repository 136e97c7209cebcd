use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::monitoring::{CommandMonitor, CommandStartedEvent};

/// A monitor that records command-started events to a file in JSON Lines format.
///
/// Each event is written as a JSON object on its own line, keyed as the
/// client names its fields. Lines are flushed immediately (not optimized for
/// high-throughput).
///
/// # Example
///
/// ```ignore
/// let recorder = Recorder::new("commands.jsonl")?;
/// client.add_command_monitor(Box::new(recorder)).await;
/// ```
#[derive(Debug)]
pub struct Recorder {
    writer: Mutex<BufWriter<File>>,
}

impl Recorder {
    /// Create a new recorder that writes to the specified path.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] if the file cannot be created.
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl CommandMonitor for Recorder {
    fn on_command_started(&self, event: &CommandStartedEvent) {
        let Ok(mut writer) = self.writer.lock() else {
            tracing::warn!("Recorder writer poisoned, event dropped");
            return;
        };
        if let Err(e) = write_line(&mut *writer, event) {
            tracing::warn!(command = %event.command_name, error = %e, "Recorder failed to write event");
        }
    }
}

fn write_line<W: Write>(writer: &mut W, event: &CommandStartedEvent) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, event)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
