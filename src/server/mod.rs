//! The aggregation server: authenticated ingress, token and statistics
//! stores and the administrative command channel

pub mod admin;
pub mod console;
pub mod ingress;
pub mod stats;
pub mod tokens;

pub use admin::{CommandArgs, CommandRequest, CommandResponse};
pub use console::ManagementConsole;
pub use stats::{AggregateStatistics, HourlyStatistics, Statistic};

use crate::config::ServerConfig;
use crate::logger::Logger;
use crate::{LogLedgerError, Result};
use chrono::{DateTime, Utc};
use stats::StatsStore;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokens::TokenStore;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time;

/// How often the statistics map is written to disk
const STATS_DUMP_PERIOD: Duration = Duration::from_secs(60);

/// Token and statistics maps, guarded by one mutex. The guard is never
/// held across an acquisition of the logger's sink mutex.
pub(crate) struct ServerState {
    pub(crate) tokens: TokenStore,
    pub(crate) stats: StatsStore,
}

/// State shared between the server handle, its background tasks and the
/// management console
pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) logger: Logger,
    pub(crate) state: Mutex<ServerState>,
    pub(crate) shutdown: broadcast::Sender<()>,
    pub(crate) kill_tx: mpsc::Sender<()>,
    pub(crate) local_addr: SocketAddr,
}

/// One row of the per-instance token listing
pub(crate) struct InstanceRow {
    pub(crate) instance: String,
    pub(crate) token_preview: String,
    pub(crate) last_ip: String,
    pub(crate) logs: i64,
    pub(crate) volume: i64,
}

/// One row of the per-service token listing
pub(crate) struct ServiceRow {
    pub(crate) service: String,
    pub(crate) instances: usize,
    pub(crate) last_active: Option<DateTime<Utc>>,
    pub(crate) logs: i64,
}

impl ServerShared {
    pub(crate) async fn add_token(&self, service: &str, instance: &str) -> Result<String> {
        self.state.lock().await.tokens.add(service, instance).await
    }

    pub(crate) async fn remove_token(&self, service: &str, instance: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .tokens
            .remove(service, instance)
            .await
    }

    pub(crate) async fn remove_service_tokens(&self, service: &str) -> Result<Vec<String>> {
        self.state
            .lock()
            .await
            .tokens
            .remove_service(service)
            .await
    }

    pub(crate) async fn statistics(&self) -> HashMap<String, Statistic> {
        self.state.lock().await.stats.snapshot()
    }

    pub(crate) async fn aggregate_statistics(
        &self,
    ) -> (i64, Vec<AggregateStatistics>, HourlyStatistics) {
        self.state.lock().await.stats.aggregate()
    }

    pub(crate) async fn instances_of(&self, service: &str) -> Vec<InstanceRow> {
        let state = self.state.lock().await;
        let prefix = format!("{}/", service);

        let mut rows = Vec::new();
        for key in state.tokens.keys() {
            let Some(instance) = key.strip_prefix(&prefix) else {
                continue;
            };
            let token = state.tokens.token(key).unwrap_or("");
            let preview = format!("{}...", &token[..token.len().min(10)]);
            let (last_ip, logs, volume) = match state.stats.get(key) {
                Some(stat) => (
                    stat.last_ip.clone(),
                    stat.logs_parsed.iter().sum(),
                    stat.logs_parsed_bytes.iter().sum(),
                ),
                None => ("N/A".to_string(), 0, 0),
            };
            rows.push(InstanceRow {
                instance: instance.to_string(),
                token_preview: preview,
                last_ip,
                logs,
                volume,
            });
        }

        rows.sort_by(|a, b| a.instance.cmp(&b.instance));
        rows
    }

    pub(crate) async fn service_rows(&self) -> Vec<ServiceRow> {
        let state = self.state.lock().await;

        let mut rows: BTreeMap<String, ServiceRow> = BTreeMap::new();
        for key in state.tokens.keys() {
            let Some((service, _)) = key.split_once('/') else {
                continue;
            };
            let row = rows.entry(service.to_string()).or_insert_with(|| ServiceRow {
                service: service.to_string(),
                instances: 0,
                last_active: None,
                logs: 0,
            });
            row.instances += 1;
            if let Some(stat) = state.stats.get(key) {
                row.logs += stat.logs_parsed.iter().sum::<i64>();
                row.last_active = match row.last_active {
                    Some(prev) if prev >= stat.last_active => Some(prev),
                    _ => Some(stat.last_active),
                };
            }
        }

        rows.into_values().collect()
    }

    /// Files in the log folder with pretty-printed sizes, sorted by name
    pub(crate) async fn logfiles(&self) -> Result<Vec<(String, String)>> {
        let mut dir = tokio::fs::read_dir(&self.config.logger.folder)
            .await
            .map_err(|e| LogLedgerError::Server(format!("could not list logfiles: {}", e)))?;

        let mut files = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| LogLedgerError::Server(format!("could not list logfiles: {}", e)))?
        {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if metadata.is_dir() {
                continue;
            }
            files.push((
                entry.file_name().to_string_lossy().to_string(),
                stats::pretty_bytes(metadata.len() as i64),
            ));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// Request graceful shutdown of the hosting process
    pub(crate) fn kill(&self) {
        let _ = self.kill_tx.try_send(());
    }
}

/// The aggregation server.
///
/// Receives authenticated log entries over TCP, merges them into its own
/// [`Logger`], keeps per-key hourly statistics persisted to disk and
/// serves operator commands over a unix domain socket.
pub struct LogServer {
    shared: Arc<ServerShared>,
    kill_rx: Option<mpsc::Receiver<()>>,
}

impl LogServer {
    /// Create and start a server: binds the admin socket and the ingress
    /// listener, loads tokens and statistics, attaches the console and
    /// starts all background tasks. The inner logger is constructed and
    /// owned by the server.
    pub async fn new(config: ServerConfig, console: ManagementConsole) -> Result<LogServer> {
        config.validate()?;

        if config.unix_socket.exists() {
            std::fs::remove_file(&config.unix_socket)?;
        }
        let admin_listener = UnixListener::bind(&config.unix_socket)
            .map_err(|e| LogLedgerError::Server(format!("could not bind admin socket: {}", e)))?;

        let ingress_listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                LogLedgerError::Server(format!("could not bind ingress listener: {}", e))
            })?;
        let local_addr = ingress_listener
            .local_addr()
            .map_err(|e| LogLedgerError::Server(format!("could not read local address: {}", e)))?;

        let logger = Logger::new(config.logger.clone()).await?;

        let tokens = TokenStore::load(&config.token_file).await?;
        let stats = StatsStore::load(&config.stats_file).await?;

        let (kill_tx, kill_rx) = mpsc::channel(1);
        let (shutdown, _) = broadcast::channel(4);

        let shared = Arc::new(ServerShared {
            config,
            logger,
            state: Mutex::new(ServerState { tokens, stats }),
            shutdown,
            kill_tx,
            local_addr,
        });

        console.attach(Arc::clone(&shared));
        let console = Arc::new(console);

        spawn_stats_dumper(Arc::clone(&shared));
        ingress::spawn(Arc::clone(&shared), ingress_listener);
        admin::spawn(console, admin_listener, shared.shutdown.subscribe());

        Ok(LogServer {
            shared,
            kill_rx: Some(kill_rx),
        })
    }

    /// The server's own logging facility
    pub fn logger(&self) -> &Logger {
        &self.shared.logger
    }

    /// Actual address of the ingress listener
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Takes the kill-switch receiver. The management console signals it
    /// to request graceful shutdown; can only be taken once.
    pub fn kill_switch(&mut self) -> Option<mpsc::Receiver<()>> {
        self.kill_rx.take()
    }

    /// Create a token for a service/instance
    pub async fn add_token(&self, service: &str, instance: &str) -> Result<String> {
        self.shared.add_token(service, instance).await
    }

    /// Remove the token of a service/instance
    pub async fn remove_token(&self, service: &str, instance: &str) -> Result<()> {
        self.shared.remove_token(service, instance).await
    }

    /// Remove the tokens of every instance of a service, returning the
    /// removed keys
    pub async fn remove_service_tokens(&self, service: &str) -> Result<Vec<String>> {
        self.shared.remove_service_tokens(service).await
    }

    /// A copy of the current statistics map
    pub async fn statistics(&self) -> HashMap<String, Statistic> {
        self.shared.statistics().await
    }

    /// Global volume, per-service aggregates ordered by share and hourly
    /// totals
    pub async fn aggregate_statistics(
        &self,
    ) -> (i64, Vec<AggregateStatistics>, HourlyStatistics) {
        self.shared.aggregate_statistics().await
    }

    /// Files in the log folder with pretty-printed sizes
    pub async fn logfiles(&self) -> Result<Vec<(String, String)>> {
        self.shared.logfiles().await
    }

    /// Stop the server: stops the ingress and admin loops and the
    /// statistics dumper, writes a final statistics dump, drains and
    /// closes the inner logger and removes the admin socket file.
    pub async fn quit(&self) {
        let _ = self.shared.shutdown.send(());

        {
            let state = self.shared.state.lock().await;
            if let Err(e) = state.stats.dump().await {
                let _ = self
                    .shared
                    .logger
                    .log("system", 1, format!("quit: could not dump statistics: {}", e));
            }
        }

        self.shared.logger.quit().await;

        let _ = tokio::fs::remove_file(&self.shared.config.unix_socket).await;
    }
}

fn spawn_stats_dumper(shared: Arc<ServerShared>) {
    tokio::spawn(async move {
        let mut shutdown = shared.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = time::sleep(STATS_DUMP_PERIOD) => {
                    let state = shared.state.lock().await;
                    if let Err(e) = state.stats.dump().await {
                        let _ = shared
                            .logger
                            .log("system", 1, format!("could not dump statistics: {}", e));
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    });
}

/// Makes sure a backing file and its parent directory exist
pub(crate) async fn ensure_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    if !path.exists() {
        tokio::fs::File::create(path).await?;
    }
    Ok(())
}
