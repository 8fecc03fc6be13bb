//! The writer task: sole consumer of the ledger channel

use super::Shared;
use crate::types::Entry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Spawns the writer task. For every entry it takes the sink mutex and
/// writes to stdout, the logfile and every named remote in turn. Sink
/// failures are reported through the logger itself and never abort the
/// pipeline.
pub(crate) fn spawn(shared: Arc<Shared>, mut rx: mpsc::Receiver<Entry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = shared.shutdown.subscribe();
        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(entry) = received else { break };
                    write_entry(&shared, entry).await;
                    shared.finish_one();
                    report_overflow(&shared);
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

async fn write_entry(shared: &Shared, mut entry: Entry) {
    entry.sanitize();

    let mut sinks = shared.sinks.lock().await;

    if let Some(stdout) = sinks.stdout.as_mut() {
        let line = format!("{}\n", entry.to_tab(&shared.columns));
        let _ = stdout.write_all(line.as_bytes()).await;
        let _ = stdout.flush().await;
    }

    if let Some(sink) = sinks.logfile.as_mut() {
        let line = if shared.config.json {
            match entry.to_json(&shared.columns) {
                Ok(json) => Some(json),
                Err(e) => {
                    shared.system_log(format!("write: could not encode log entry: {}", e));
                    None
                }
            }
        } else {
            Some(entry.to_tab(&shared.columns))
        };

        if let Some(line) = line {
            let write = async {
                sink.file.write_all(format!("{}\n", line).as_bytes()).await?;
                sink.file.flush().await
            };
            if let Err(e) = write.await {
                shared.system_log(format!("write: could not write to logfile: {}", e));
            }
        }
    }

    if !sinks.remotes.is_empty() {
        match serde_json::to_vec(&entry) {
            Ok(payload) => {
                for (name, remote) in &sinks.remotes {
                    if let Err(e) = remote.write_entry(&payload).await {
                        shared.system_log(format!(
                            "write: could not send log to remote backend '{}': {}",
                            name, e
                        ));
                    }
                }
            }
            Err(e) => shared.system_log(format!("write: could not encode log entry: {}", e)),
        }
    }
}

// Entries refused by a full ledger are counted at the ingress; the
// writer folds the count into a single system entry once it catches up.
fn report_overflow(shared: &Shared) {
    let dropped = shared.overflow.swap(0, Ordering::AcqRel);
    if dropped > 0 {
        shared.system_log(format!("write: dropped {} entries on a full ledger", dropped));
    }
}
