//! # LogLedger - Structured Logging with Central Aggregation
//!
//! LogLedger is a structured logging facility paired with an aggregation
//! server. A `Logger` accepts column-keyed entries from caller code and
//! fans them out to a rotating local logfile, stdout and any number of
//! named remote backends. A `LogServer` receives entries from many
//! loggers over TCP, authenticates each caller with a per-instance token,
//! merges everything into its own `Logger` and keeps hourly usage
//! statistics, while an operator console listens on a unix domain socket.
//!
//! ## Features
//!
//! - **Concurrent fan-out**: one writer task serves a bounded ledger
//!   channel; callers never block on a full ledger
//! - **Scheduled rotation**: daily/weekly/monthly/annual logfile rotation
//!   with gzip archival of closed files
//! - **Token authentication**: durable service/instance token store
//! - **Usage statistics**: 24-bucket hourly counters persisted to disk
//! - **Runtime administration**: unix-socket command channel for tokens,
//!   remote backends and statistics
//!
//! ## Quick Start
//!
//! ### Local logging
//! ```no_run
//! use logledger::config::{LoggerConfig, Output, Rotation};
//! use logledger::logger::Logger;
//!
//! #[tokio::main]
//! async fn main() -> logledger::Result<()> {
//!     let logger = Logger::new(LoggerConfig {
//!         service: "myservice".into(),
//!         instance: "main".into(),
//!         folder: "/var/log/myservice".into(),
//!         filestem: "myservice".into(),
//!         rotation: Rotation::Daily,
//!         output: Output::FileAndStdout,
//!         ..Default::default()
//!     })
//!     .await?;
//!
//!     let _ = logger.log("startup", 0, "Hello, World!");
//!     logger.quit().await;
//!     Ok(())
//! }
//! ```
//!
//! ### Aggregation server
//! ```no_run
//! use logledger::config::ServerConfig;
//! use logledger::server::{LogServer, ManagementConsole};
//!
//! #[tokio::main]
//! async fn main() -> logledger::Result<()> {
//!     let config = ServerConfig::from_file("config/server.toml")?;
//!     let server = LogServer::new(config, ManagementConsole::new()).await?;
//!     tokio::signal::ctrl_c().await.ok();
//!     server.quit().await;
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod logger;
pub mod rpc;
pub mod server;
pub mod types;

/// Common error types used throughout LogLedger
pub mod error {
    use std::fmt;

    /// LogLedger error types
    #[derive(Debug)]
    pub enum LogLedgerError {
        /// I/O operation failed
        Io(std::io::Error),
        /// Serialization/deserialization failed
        Serde(serde_json::Error),
        /// Configuration error
        Config(String),
        /// Malformed or incomplete log entry
        Entry(String),
        /// Token lifecycle error
        Token(String),
        /// Authentication failure
        Auth(String),
        /// Server error
        Server(String),
        /// Client error
        Client(String),
        /// Connection error
        Connection(String),
    }

    impl fmt::Display for LogLedgerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                LogLedgerError::Io(e) => write!(f, "I/O error: {}", e),
                LogLedgerError::Serde(e) => write!(f, "Serialization error: {}", e),
                LogLedgerError::Config(e) => write!(f, "Configuration error: {}", e),
                LogLedgerError::Entry(e) => write!(f, "Entry error: {}", e),
                LogLedgerError::Token(e) => write!(f, "Token error: {}", e),
                LogLedgerError::Auth(e) => write!(f, "Authentication error: {}", e),
                LogLedgerError::Server(e) => write!(f, "Server error: {}", e),
                LogLedgerError::Client(e) => write!(f, "Client error: {}", e),
                LogLedgerError::Connection(e) => write!(f, "Connection error: {}", e),
            }
        }
    }

    impl std::error::Error for LogLedgerError {}

    impl From<std::io::Error> for LogLedgerError {
        fn from(err: std::io::Error) -> Self {
            LogLedgerError::Io(err)
        }
    }

    impl From<serde_json::Error> for LogLedgerError {
        fn from(err: serde_json::Error) -> Self {
            LogLedgerError::Serde(err)
        }
    }

    /// Result type alias for LogLedger operations
    pub type Result<T> = std::result::Result<T, LogLedgerError>;
}

pub use error::{LogLedgerError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::RemoteClient;
    pub use crate::config::{LoggerConfig, Output, Rotation, ServerConfig};
    pub use crate::logger::{Logger, RemoteWriter};
    pub use crate::server::{LogServer, ManagementConsole};
    pub use crate::types::{Code, CodedError, Entry};
    pub use crate::{LogLedgerError, Result};
}
