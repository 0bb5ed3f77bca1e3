//! Event log - append-only record of every clock-affecting event

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use clockmesh_core::{ClockError, ClockResult};
use clockmesh_time::ClockEvent;

/// One event with the wall-clock time it was recorded
#[derive(Clone, Debug)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub event: ClockEvent,
}

impl LogEntry {
    pub fn now(event: ClockEvent) -> Self {
        LogEntry {
            at: Local::now(),
            event,
        }
    }

    /// Text line without the trailing newline
    pub fn format_line(&self) -> String {
        let at = self.at.format("%H:%M:%S%.3f");
        match &self.event {
            ClockEvent::Received {
                remote,
                clock,
                queue_remaining,
            } => format!("{at} received clock={clock} queue={queue_remaining} remote={remote}"),
            ClockEvent::Sent { clock, peers } => {
                let peers: Vec<String> = peers.iter().map(ToString::to_string).collect();
                format!("{at} sent clock={clock} peers={}", peers.join(","))
            }
            ClockEvent::Internal { clock } => format!("{at} internal clock={clock}"),
        }
    }
}

/// Destination for formatted log lines
pub trait EventSink: Send {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// Append-mode log file
pub struct FileEventLog {
    path: PathBuf,
    file: File,
}

impl FileEventLog {
    pub fn open(path: impl AsRef<Path>) -> ClockResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(ClockError::Logging)?;
        Ok(FileEventLog { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileEventLog {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{line}")
    }
}

/// In-memory log; clones share the same lines
#[derive(Clone, Debug, Default)]
pub struct MemoryEventLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl EventSink for MemoryEventLog {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}

/// Records clock events to a sink.
///
/// Write failures are reported through tracing and counted; they never
/// propagate into the clock loop.
pub struct EventLogger {
    sink: Box<dyn EventSink>,
    failures: u64,
}

impl EventLogger {
    pub fn new(sink: impl EventSink + 'static) -> Self {
        EventLogger {
            sink: Box::new(sink),
            failures: 0,
        }
    }

    pub fn record(&mut self, event: &ClockEvent) {
        let entry = LogEntry::now(event.clone());
        if let Err(e) = self.sink.write_line(&entry.format_line()) {
            self.failures += 1;
            let error = ClockError::Logging(e);
            tracing::error!(
                %error,
                kind = event.kind(),
                clock = %event.clock(),
                "event log write failed"
            );
        }
    }

    /// Number of entries that could not be written
    pub fn failures(&self) -> u64 {
        self.failures
    }
}
