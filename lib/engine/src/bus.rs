//! Synchronous event bus and the append-only event log.
//!
//! Emission happens from the worker only; subscribers run sequentially in
//! emission order and may hand events off to asynchronous transports, but
//! must not reorder them. A panicking subscriber is caught and logged so it
//! can never take the worker down.
//!
//! The log is one JSON line per event. Workspaces share a single
//! process-wide log file (records carry their `workspace_id`); at
//! [`DEFAULT_MAX_SEGMENT_LEN`] the file is renamed `events.log.N` and a
//! fresh segment is opened.

use crate::event::{Event, EventKind};
use chrono::Utc;
use shellflow_core::WorkspaceId;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Rotation threshold for a log segment: 10 MiB.
pub const DEFAULT_MAX_SEGMENT_LEN: u64 = 10 * 1024 * 1024;

/// File name of the active log segment.
pub const LOG_FILE_NAME: &str = "events.log";

/// A subscriber callback; invoked synchronously for every published event.
pub type Subscriber = Box<dyn FnMut(&Event) + Send>;

/// Returns the per-user state directory for shellflow.
///
/// `$XDG_STATE_HOME/shellflow`, falling back to `~/.local/state/shellflow`,
/// and finally the system temp directory when no home is known.
#[must_use]
pub fn default_state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(dir).join("shellflow");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".local").join("state").join("shellflow");
    }
    std::env::temp_dir().join("shellflow")
}

/// The append-only, rotating event log.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    file: File,
    len: u64,
    max_len: u64,
}

impl EventLog {
    /// Opens (or creates) the log file inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open(dir: &std::path::Path) -> std::io::Result<Self> {
        Self::open_with_max_len(dir, DEFAULT_MAX_SEGMENT_LEN)
    }

    /// Opens the log with a custom rotation threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open_with_max_len(dir: &std::path::Path, max_len: u64) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            len,
            max_len,
        })
    }

    /// Appends one event as a JSON line, rotating the segment first if the
    /// line would push it past the threshold.
    ///
    /// # Errors
    ///
    /// Returns an error on encoding or filesystem failure.
    pub fn append(&mut self, event: &Event) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(event).map_err(std::io::Error::other)?;
        line.push(b'\n');

        if self.len > 0 && self.len + line.len() as u64 > self.max_len {
            self.rotate()?;
        }

        self.file.write_all(&line)?;
        self.len += line.len() as u64;
        Ok(())
    }

    /// Path of the active segment.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        let mut n = 1u32;
        let rotated = loop {
            let candidate = self.path.with_file_name(format!("{LOG_FILE_NAME}.{n}"));
            if !candidate.exists() {
                break candidate;
            }
            n += 1;
        };
        fs::rename(&self.path, &rotated)?;
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.len = 0;
        Ok(())
    }
}

/// The per-workspace synchronous publish/subscribe bus.
pub struct EventBus {
    workspace_id: WorkspaceId,
    next_seq: u64,
    subscribers: Vec<Subscriber>,
    log: Option<Arc<Mutex<EventLog>>>,
}

impl EventBus {
    /// Creates a bus for a workspace, optionally wired to the shared log.
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, log: Option<Arc<Mutex<EventLog>>>) -> Self {
        Self {
            workspace_id,
            next_seq: 0,
            subscribers: Vec::new(),
            log,
        }
    }

    /// Registers a subscriber invoked for every subsequent event.
    pub fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }

    /// Publishes an event: assigns the next sequence number and timestamp,
    /// appends it to the log, and dispatches to subscribers in order.
    pub fn publish(&mut self, kind: EventKind) -> Event {
        let event = Event {
            workspace_id: self.workspace_id.clone(),
            seq: self.next_seq,
            ts: Utc::now(),
            kind,
        };
        self.next_seq += 1;

        if let Some(log) = &self.log {
            match log.lock() {
                Ok(mut log) => {
                    if let Err(err) = log.append(&event) {
                        tracing::warn!(error = %err, "failed to append event log record");
                    }
                }
                Err(_) => {
                    tracing::warn!("event log mutex poisoned; skipping append");
                }
            }
        }

        for subscriber in &mut self.subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber(&event)));
            if outcome.is_err() {
                tracing::error!(
                    workspace_id = %event.workspace_id,
                    seq = event.seq,
                    "event subscriber panicked; continuing"
                );
            }
        }

        event
    }
}
