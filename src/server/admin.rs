//! Administrative command channel over a unix domain socket

use super::console::ManagementConsole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Dynamic arguments of an administrative command
pub type CommandArgs = HashMap<String, serde_json::Value>;

/// One framed command request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Command name, e.g. `tokens.add`
    pub command: String,
    /// Named arguments
    #[serde(default)]
    pub args: CommandArgs,
}

/// One framed command response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// `success` or `failure`
    pub status: String,
    /// Human-readable result, empty on failure
    #[serde(default)]
    pub payload: String,
    /// Failure description, empty on success
    #[serde(default)]
    pub error: String,
}

impl CommandResponse {
    /// A successful response carrying a payload
    pub fn success(payload: impl Into<String>) -> Self {
        CommandResponse {
            status: "success".to_string(),
            payload: payload.into(),
            error: String::new(),
        }
    }

    /// A failure response carrying an error description
    pub fn failure(error: impl Into<String>) -> Self {
        CommandResponse {
            status: "failure".to_string(),
            payload: String::new(),
            error: error.into(),
        }
    }

    /// Whether the command succeeded
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Spawns the admin socket accept loop
pub(crate) fn spawn(
    console: Arc<ManagementConsole>,
    listener: UnixListener,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    if let Ok((stream, _)) = accepted {
                        tokio::spawn(handle_connection(Arc::clone(&console), stream));
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    })
}

async fn handle_connection(console: Arc<ManagementConsole>, stream: UnixStream) {
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
                let response = match serde_json::from_str::<CommandRequest>(trimmed) {
                    Ok(request) => console.execute(&request.command, &request.args).await,
                    Err(e) => {
                        CommandResponse::failure(format!("could not decode command: {}", e))
                    }
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
