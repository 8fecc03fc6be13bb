//! The local logging facility: ledger channel, writer task and rotation

pub mod archive;
pub mod rotation;
pub mod sinks;
pub mod writer;

pub use rotation::rotation_date;
pub use sinks::RemoteWriter;

use crate::config::LoggerConfig;
use crate::types::codes::{Code, CodeTable, CodedError};
use crate::types::entry::{self, column};
use crate::types::Entry;
use crate::{LogLedgerError, Result};
use chrono::Local;
use sinks::SinkSet;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};

/// Capacity of the ledger channel between producers and the writer task
const LEDGER_CAPACITY: usize = 1000;

/// State shared between the logger handle and its background tasks
pub(crate) struct Shared {
    pub(crate) active: AtomicBool,
    pub(crate) config: LoggerConfig,
    pub(crate) columns: Vec<i64>,
    pub(crate) codes: StdMutex<CodeTable>,
    pub(crate) tx: mpsc::Sender<Entry>,
    pub(crate) in_flight: AtomicI64,
    pub(crate) drained: Notify,
    pub(crate) overflow: AtomicU64,
    pub(crate) sinks: Mutex<SinkSet>,
    pub(crate) shutdown: broadcast::Sender<()>,
}

impl Shared {
    /// Builds a fully populated entry and enqueues it. Returns an error
    /// carrying the formatted message iff the resolved code is an error;
    /// the entry is submitted either way.
    #[track_caller]
    pub(crate) fn push(
        &self,
        caller: &str,
        code: i64,
        msg: impl Into<String>,
    ) -> std::result::Result<(), CodedError> {
        let location = std::panic::Location::caller();
        let msg = msg.into();
        let (name, is_err) = self.resolve(code);
        let now = Local::now();

        let mut entry = Entry::new();
        entry.insert(column::DATE_YMD, now.format("%Y-%m-%d").to_string());
        entry.insert(
            column::DATE_YMD_HMS,
            now.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        entry.insert(
            column::DATE_YMD_HMS_NANO,
            now.format("%Y-%m-%d %H:%M:%S.%f").to_string(),
        );
        entry.insert(column::TIMESTAMP, now.timestamp().to_string());
        entry.insert(column::SERVICE, self.config.service.clone());
        entry.insert(column::INSTANCE, self.config.instance.clone());
        entry.insert(column::CALLER, caller);
        entry.insert(column::MSG_TYPE_SHORT, if is_err { "ERR" } else { "MSG" });
        entry.insert(column::MSG_TYPE_INT, code.to_string());
        entry.insert(column::MSG_TYPE_STR, name);
        entry.insert(column::MSG, msg.clone());
        entry.insert(column::FILE, location.file());
        entry.insert(column::LINE, location.line().to_string());

        self.enqueue(entry);

        if is_err {
            Err(CodedError::new(code, msg))
        } else {
            Ok(())
        }
    }

    /// Non-blocking enqueue. A full ledger drops the entry and bumps the
    /// overflow counter, which the writer task reports.
    pub(crate) fn enqueue(&self, entry: Entry) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.tx.try_send(entry).is_err() {
            self.overflow.fetch_add(1, Ordering::SeqCst);
            self.finish_one();
        }
    }

    pub(crate) fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    pub(crate) fn resolve(&self, code: i64) -> (String, bool) {
        self.codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(code)
    }

    /// Self-reporting path for background failures
    pub(crate) fn system_log(&self, msg: String) {
        let _ = self.push("system", 1, msg);
    }
}

/// The main logging facility.
///
/// Entries submitted through [`Logger::log`], [`Logger::log_fields`] or
/// [`Logger::raw_entry`] flow through a bounded ledger channel into a
/// single writer task that fans them out to the local logfile, stdout
/// and all registered remote destinations. A rotation task swaps the
/// logfile at calendar boundaries and archives closed files.
///
/// Submission never blocks the caller: a full ledger drops the entry and
/// the drop count is reported through the logger itself. Per-caller
/// submission order is preserved.
///
/// Cloning is cheap; all clones share the same pipeline.
#[derive(Clone)]
pub struct Logger {
    shared: Arc<Shared>,
}

impl Logger {
    /// Create a new logging facility. Validates the configuration, opens
    /// the initial logfile (sweeping unarchived files when compression
    /// is on) and starts the writer and rotation tasks. Returns once the
    /// initial sink is available.
    pub async fn new(config: LoggerConfig) -> Result<Logger> {
        config.validate()?;

        let columns = config.effective_columns();
        let (tx, rx) = mpsc::channel(LEDGER_CAPACITY);
        let (shutdown, _) = broadcast::channel(4);

        let shared = Arc::new(Shared {
            active: AtomicBool::new(true),
            sinks: Mutex::new(SinkSet::new(config.output.writes_stdout())),
            config,
            columns,
            codes: StdMutex::new(CodeTable::default()),
            tx,
            in_flight: AtomicI64::new(0),
            drained: Notify::new(),
            overflow: AtomicU64::new(0),
            shutdown,
        });

        if shared.config.output.writes_file() {
            let current = rotation::today();

            if shared.config.compress {
                let folder = shared.config.folder.clone();
                let keep = format!("{}_{}", shared.config.filestem, current);
                let failures = tokio::task::spawn_blocking(move || archive::sweep(&folder, &keep))
                    .await
                    .unwrap_or_default();
                for (name, err) in failures {
                    shared.system_log(format!("sweep: could not archive '{}': {}", name, err));
                }
            }

            let sink = rotation::open_logfile(&shared.config, &shared.columns, &current).await?;
            shared.sinks.lock().await.logfile = Some(sink);

            rotation::spawn(Arc::clone(&shared), current);
        }

        writer::spawn(Arc::clone(&shared), rx);

        Ok(Logger { shared })
    }

    /// Log a message. The returned error carries the formatted message
    /// iff the resolved code is an error; the entry is submitted either
    /// way, so call sites can both log and propagate.
    #[track_caller]
    pub fn log(
        &self,
        caller: &str,
        code: i64,
        msg: impl Into<String>,
    ) -> std::result::Result<(), CodedError> {
        self.shared.push(caller, code, msg)
    }

    /// Log a structured message: the payload map is JSON-encoded into
    /// the message column. An unencodable payload is reported through
    /// the system caller instead.
    #[track_caller]
    pub fn log_fields(
        &self,
        caller: &str,
        code: i64,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<(), CodedError> {
        match serde_json::to_string(fields) {
            Ok(payload) => self.shared.push(caller, code, payload),
            Err(e) => self.shared.push(
                "system",
                1,
                format!("log_fields: could not encode message to JSON: {}", e),
            ),
        }
    }

    /// A logging handle bound to a fixed caller name
    pub fn caller(&self, name: impl Into<String>) -> CallerLog {
        CallerLog {
            shared: Arc::clone(&self.shared),
            caller: name.into(),
        }
    }

    /// A logging handle bound to a fixed caller name and message code
    pub fn caller_with_code(&self, name: impl Into<String>, code: i64) -> CallerCodeLog {
        CallerCodeLog {
            shared: Arc::clone(&self.shared),
            caller: name.into(),
            code,
        }
    }

    /// Submit an already populated entry. The entry must carry every
    /// default column.
    pub fn raw_entry(&self, entry: Entry) -> Result<()> {
        for col in entry::default_columns() {
            if !entry.contains(col) {
                return Err(LogLedgerError::Entry(format!("missing column '{}'", col)));
            }
        }
        self.shared.enqueue(entry);
        Ok(())
    }

    /// Replace message codes with custom ones. Codes outside the open
    /// interval (1, 999) are silently ignored.
    pub fn use_custom_codes(&self, codes: HashMap<i64, Code>) {
        self.shared
            .codes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .merge(codes);
    }

    /// Register a named remote destination. Fails if the name is taken.
    pub async fn add_destination(
        &self,
        name: impl Into<String>,
        writer: Arc<dyn RemoteWriter>,
    ) -> Result<()> {
        self.shared.sinks.lock().await.add_remote(name.into(), writer)
    }

    /// Unregister a named remote destination and close it. Fails if the
    /// name is unknown.
    pub async fn remove_destination(&self, name: &str) -> Result<()> {
        let writer = self.shared.sinks.lock().await.remove_remote(name)?;
        if let Err(e) = writer.close().await {
            self.shared
                .system_log(format!("remove_destination: could not close '{}': {}", name, e));
        }
        Ok(())
    }

    /// List all destinations: local sinks first, then remote names in
    /// lexicographic order
    pub async fn list_destinations(&self) -> Vec<String> {
        self.shared.sinks.lock().await.list()
    }

    /// Whether the logger still accepts entries
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Stop the facility: refuse new entries, drain everything already
    /// in the ledger, stop the background tasks and close the logfile.
    /// The logger cannot be restarted.
    pub async fn quit(&self) {
        self.shared.active.store(false, Ordering::SeqCst);

        loop {
            let notified = self.shared.drained.notified();
            if self.shared.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }

        let _ = self.shared.shutdown.send(());

        let mut sinks = self.shared.sinks.lock().await;
        if let Some(sink) = sinks.logfile.take() {
            let mut file = sink.file;
            let _ = file.flush().await;
            let _ = file.sync_all().await;
        }
    }
}

/// A logging handle bound to a fixed caller name, created with
/// [`Logger::caller`]
pub struct CallerLog {
    shared: Arc<Shared>,
    caller: String,
}

impl CallerLog {
    /// Log a message under the bound caller name
    #[track_caller]
    pub fn log(&self, code: i64, msg: impl Into<String>) -> std::result::Result<(), CodedError> {
        self.shared.push(&self.caller, code, msg)
    }

    /// Log a structured message under the bound caller name
    #[track_caller]
    pub fn log_fields(
        &self,
        code: i64,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<(), CodedError> {
        match serde_json::to_string(fields) {
            Ok(payload) => self.shared.push(&self.caller, code, payload),
            Err(e) => self.shared.push(
                "system",
                1,
                format!("log_fields: could not encode message to JSON: {}", e),
            ),
        }
    }
}

/// A logging handle bound to a fixed caller name and message code,
/// created with [`Logger::caller_with_code`]
pub struct CallerCodeLog {
    shared: Arc<Shared>,
    caller: String,
    code: i64,
}

impl CallerCodeLog {
    /// Log a message under the bound caller name and code
    #[track_caller]
    pub fn log(&self, msg: impl Into<String>) -> std::result::Result<(), CodedError> {
        self.shared.push(&self.caller, self.code, msg)
    }
}
