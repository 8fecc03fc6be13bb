//! Client for forwarding log entries to an aggregation server

use crate::logger::RemoteWriter;
use crate::rpc::{LogRequest, LogResponse, TokenCredentials};
use crate::types::Entry;
use crate::{LogLedgerError, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default per-entry delivery timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A remote destination backed by an aggregation server.
///
/// The TCP connection is established lazily on the first write and
/// re-established after transport failures. Every outbound entry carries
/// the client's credential metadata and is bounded by the configured
/// timeout.
pub struct RemoteClient {
    address: String,
    credentials: TokenCredentials,
    timeout: Duration,
    conn: Mutex<Option<BufStream<TcpStream>>>,
}

impl RemoteClient {
    /// Create a client for the given server and credentials. No I/O
    /// happens until the first entry is written.
    pub fn connect(
        host: &str,
        port: u16,
        service: &str,
        instance: &str,
        token: &str,
        timeout: Option<Duration>,
    ) -> RemoteClient {
        RemoteClient {
            address: format!("{}:{}", host, port),
            credentials: TokenCredentials {
                service: service.to_string(),
                instance: instance.to_string(),
                token: token.to_string(),
                ip: local_ip(),
            },
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            conn: Mutex::new(None),
        }
    }

    async fn send(
        conn: &mut Option<BufStream<TcpStream>>,
        address: &str,
        line: &str,
    ) -> Result<LogResponse> {
        if conn.is_none() {
            let stream = TcpStream::connect(address)
                .await
                .map_err(|e| LogLedgerError::Connection(format!("failed to connect: {}", e)))?;
            *conn = Some(BufStream::new(stream));
        }

        let Some(stream) = conn.as_mut() else {
            return Err(LogLedgerError::Connection("no connection".to_string()));
        };

        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;

        let mut response = String::new();
        if stream.read_line(&mut response).await? == 0 {
            return Err(LogLedgerError::Connection(
                "server closed the connection".to_string(),
            ));
        }

        Ok(serde_json::from_str(&response)?)
    }
}

#[async_trait::async_trait]
impl RemoteWriter for RemoteClient {
    async fn write_entry(&self, payload: &[u8]) -> Result<()> {
        let entry: Entry = serde_json::from_slice(payload)
            .map_err(|e| LogLedgerError::Client(format!("could not decode log entry: {}", e)))?;

        let request = LogRequest {
            metadata: self.credentials.metadata(),
            entry,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let mut guard = self.conn.lock().await;
        match tokio::time::timeout(self.timeout, Self::send(&mut guard, &self.address, &line)).await
        {
            Ok(Ok(response)) if response.ok => Ok(()),
            Ok(Ok(response)) => Err(LogLedgerError::Client(format!(
                "remote backend refused entry: {}",
                response.error.unwrap_or_default()
            ))),
            Ok(Err(e)) => {
                *guard = None;
                Err(e)
            }
            Err(_) => {
                *guard = None;
                Err(LogLedgerError::Connection(format!(
                    "no response within {:?}",
                    self.timeout
                )))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if let Some(mut stream) = guard.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

// Discovers the local IP by opening a UDP socket towards a public
// address; nothing is sent. Falls back to N/A.
fn local_ip() -> String {
    fn probe() -> std::io::Result<String> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip().to_string())
    }
    probe().unwrap_or_else(|_| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::entry::column;
    use tokio::net::TcpListener;

    fn sample_payload() -> Vec<u8> {
        let mut entry = Entry::new();
        entry.insert(column::MSG, "hello");
        serde_json::to_vec(&entry).unwrap()
    }

    async fn respond_with(listener: TcpListener, response: &'static str) {
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut stream = BufStream::new(stream);
                    let mut line = String::new();
                    while stream.read_line(&mut line).await.unwrap_or(0) > 0 {
                        stream
                            .write_all(format!("{}\n", response).as_bytes())
                            .await
                            .unwrap();
                        stream.flush().await.unwrap();
                        line.clear();
                    }
                });
            }
        });
    }

    #[test]
    fn test_connect_is_lazy() {
        // no listener on the port, construction must still succeed
        let client = RemoteClient::connect("127.0.0.1", 9, "svc", "main", "tok", None);
        assert_eq!(client.address, "127.0.0.1:9");
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_write_entry_acknowledged() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        respond_with(listener, r#"{"ok":true}"#).await;

        let client =
            RemoteClient::connect("127.0.0.1", addr.port(), "svc", "main", "tok", None);
        client.write_entry(&sample_payload()).await.unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_entry_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        respond_with(listener, r#"{"ok":false,"error":"bad token"}"#).await;

        let client =
            RemoteClient::connect("127.0.0.1", addr.port(), "svc", "main", "wrong", None);
        let err = client.write_entry(&sample_payload()).await.unwrap_err();
        match err {
            LogLedgerError::Client(msg) => assert!(msg.contains("bad token")),
            other => panic!("expected client error, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_write_entry_connection_refused() {
        let client = RemoteClient::connect(
            "127.0.0.1",
            1,
            "svc",
            "main",
            "tok",
            Some(Duration::from_millis(500)),
        );
        assert!(client.write_entry(&sample_payload()).await.is_err());
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let client = RemoteClient::connect("127.0.0.1", 9, "svc", "main", "tok", None);
            assert!(client.write_entry(b"not json").await.is_err());
        });
    }
}
