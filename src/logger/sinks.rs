//! Sink set: the local logfile, stdout and named remote destinations

use crate::{LogLedgerError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A destination for serialized log entries, registered with a `Logger`
/// under a unique name. Implementations are expected to apply their own
/// per-entry timeout.
#[async_trait::async_trait]
pub trait RemoteWriter: Send + Sync {
    /// Deliver one JSON-encoded entry
    async fn write_entry(&self, payload: &[u8]) -> Result<()>;

    /// Release any underlying connection
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// The currently open logfile and its on-disk path
pub(crate) struct LogSink {
    pub(crate) file: tokio::fs::File,
    pub(crate) path: PathBuf,
}

/// All writers owned by a `Logger`. Mutated only under the logger's
/// sink mutex.
pub(crate) struct SinkSet {
    pub(crate) logfile: Option<LogSink>,
    pub(crate) stdout: Option<tokio::io::Stdout>,
    pub(crate) remotes: BTreeMap<String, Arc<dyn RemoteWriter>>,
}

impl SinkSet {
    pub(crate) fn new(with_stdout: bool) -> Self {
        SinkSet {
            logfile: None,
            stdout: with_stdout.then(tokio::io::stdout),
            remotes: BTreeMap::new(),
        }
    }

    pub(crate) fn add_remote(
        &mut self,
        name: String,
        writer: Arc<dyn RemoteWriter>,
    ) -> Result<()> {
        if self.remotes.contains_key(&name) {
            return Err(LogLedgerError::Client(format!(
                "destination '{}' already exists",
                name
            )));
        }
        self.remotes.insert(name, writer);
        Ok(())
    }

    pub(crate) fn remove_remote(&mut self, name: &str) -> Result<Arc<dyn RemoteWriter>> {
        self.remotes
            .remove(name)
            .ok_or_else(|| LogLedgerError::Client(format!("no such destination '{}'", name)))
    }

    /// Local sinks first, then remote names in lexicographic order
    pub(crate) fn list(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(2 + self.remotes.len());
        if self.stdout.is_some() {
            names.push("stdout".to_string());
        }
        if let Some(sink) = &self.logfile {
            names.push(sink.path.display().to_string());
        }
        names.extend(self.remotes.keys().cloned());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullWriter;

    #[async_trait::async_trait]
    impl RemoteWriter for NullWriter {
        async fn write_entry(&self, _payload: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_add_duplicate_remote_fails() {
        let mut sinks = SinkSet::new(false);
        sinks
            .add_remote("kafka://h:1".to_string(), Arc::new(NullWriter))
            .unwrap();
        assert!(sinks
            .add_remote("kafka://h:1".to_string(), Arc::new(NullWriter))
            .is_err());
    }

    #[test]
    fn test_remove_absent_remote_fails() {
        let mut sinks = SinkSet::new(false);
        assert!(sinks.remove_remote("nope").is_err());
    }

    #[test]
    fn test_list_order() {
        let mut sinks = SinkSet::new(true);
        sinks
            .add_remote("b-remote".to_string(), Arc::new(NullWriter))
            .unwrap();
        sinks
            .add_remote("a-remote".to_string(), Arc::new(NullWriter))
            .unwrap();
        assert_eq!(sinks.list(), vec!["stdout", "a-remote", "b-remote"]);
    }
}
