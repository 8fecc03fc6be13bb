//! TCP ingress: authenticated reception of remote log entries

use super::tokens::TokenStore;
use super::ServerShared;
use crate::rpc::{LogRequest, LogResponse, METADATA_KEYS};
use crate::{LogLedgerError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Credentials extracted from a request's metadata
#[derive(Debug, Clone)]
pub(crate) struct Caller {
    pub(crate) service: String,
    pub(crate) instance: String,
    pub(crate) key: String,
    pub(crate) token: String,
    pub(crate) ip: String,
}

/// Extracts and validates the credential metadata. Every required key
/// must be present exactly once.
pub(crate) fn extract_caller(metadata: &HashMap<String, String>) -> Result<Caller> {
    for key in METADATA_KEYS {
        if !metadata.contains_key(key) {
            return Err(LogLedgerError::Auth(format!("missing {}", key)));
        }
    }

    let field = |name: &str| metadata.get(name).cloned().unwrap_or_default();
    let service = field("service");
    let instance = field("instance");

    Ok(Caller {
        key: format!(
            "{}/{}",
            service.to_lowercase(),
            instance.to_lowercase()
        ),
        service,
        instance,
        token: field("token"),
        ip: field("ip"),
    })
}

/// Checks the caller against the token store. Runs ahead of every
/// request; an unknown key and a mismatched token are distinct failures.
pub(crate) fn authorize(tokens: &TokenStore, caller: &Caller) -> Result<()> {
    match tokens.token(&caller.key) {
        None => Err(LogLedgerError::Auth(
            "unknown service/instance".to_string(),
        )),
        Some(real) if real != caller.token => {
            Err(LogLedgerError::Auth("bad token".to_string()))
        }
        Some(_) => Ok(()),
    }
}

/// Spawns the ingress accept loop
pub(crate) fn spawn(shared: Arc<ServerShared>, listener: TcpListener) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = shared.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            tokio::spawn(handle_connection(Arc::clone(&shared), stream));
                        }
                        Err(e) => {
                            let _ = shared
                                .logger
                                .log("system", 1, format!("ingress: accept failed: {}", e));
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

async fn handle_connection(shared: Arc<ServerShared>, stream: TcpStream) {
    let mut stream = BufStream::new(stream);
    let mut line = String::new();

    loop {
        line.clear();
        match stream.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let response = match remote_log(&shared, trimmed).await {
                    Ok(()) => LogResponse::ack(),
                    Err(e) => LogResponse::nack(e.to_string()),
                };
                let Ok(mut payload) = serde_json::to_string(&response) else {
                    break;
                };
                payload.push('\n');
                if stream.write_all(payload.as_bytes()).await.is_err() {
                    break;
                }
                if stream.flush().await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Handles one framed log submission: decode, authenticate, record
/// statistics (asynchronously) and hand the entry to the inner logger.
/// Any failure becomes the response error; a refused entry touches
/// neither statistics nor the logger.
pub(crate) async fn remote_log(shared: &Arc<ServerShared>, line: &str) -> Result<()> {
    let request: LogRequest = serde_json::from_str(line)
        .map_err(|e| LogLedgerError::Server(format!("could not decode request: {}", e)))?;

    let caller = extract_caller(&request.metadata)?;

    {
        let state = shared.state.lock().await;
        authorize(&state.tokens, &caller)?;
    }

    let bytes = serde_json::to_vec(&request.entry)
        .map(|payload| payload.len())
        .unwrap_or(0);
    let stats_shared = Arc::clone(shared);
    tokio::spawn(async move {
        let mut state = stats_shared.state.lock().await;
        state.stats.ingest(
            &caller.service,
            &caller.instance,
            &caller.key,
            &caller.ip,
            bytes,
        );
    });

    shared.logger.raw_entry(request.entry)
}
