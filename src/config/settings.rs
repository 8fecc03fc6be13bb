//! Configuration structures for LogLedger

use crate::types::entry::{self, COLUMNS};
use crate::{LogLedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Logfile rotation frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    /// Never rotate
    None = 0,
    /// Rotate every day
    Daily = 1,
    /// Rotate every Monday
    Weekly = 2,
    /// Rotate on the first of every month
    Monthly = 3,
    /// Rotate on January 1st
    Annually = 4,
}

impl FromStr for Rotation {
    type Err = LogLedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Rotation::None),
            "daily" => Ok(Rotation::Daily),
            "weekly" => Ok(Rotation::Weekly),
            "monthly" => Ok(Rotation::Monthly),
            "annually" => Ok(Rotation::Annually),
            other => Err(LogLedgerError::Config(format!(
                "invalid rotation option '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<i64> for Rotation {
    type Error = LogLedgerError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Rotation::None),
            1 => Ok(Rotation::Daily),
            2 => Ok(Rotation::Weekly),
            3 => Ok(Rotation::Monthly),
            4 => Ok(Rotation::Annually),
            other => Err(LogLedgerError::Config(format!(
                "invalid rotation option '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rotation::None => "none",
            Rotation::Daily => "daily",
            Rotation::Weekly => "weekly",
            Rotation::Monthly => "monthly",
            Rotation::Annually => "annually",
        };
        f.write_str(name)
    }
}

/// Logger output selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    /// Write to the local logfile only
    #[serde(rename = "file")]
    File = 0,
    /// Write to stdout only
    #[serde(rename = "stdout")]
    Stdout = 1,
    /// Write to both the logfile and stdout
    #[serde(rename = "both")]
    FileAndStdout = 2,
}

impl Output {
    /// Whether this output mode writes to the local logfile
    pub fn writes_file(&self) -> bool {
        matches!(self, Output::File | Output::FileAndStdout)
    }

    /// Whether this output mode writes to stdout
    pub fn writes_stdout(&self) -> bool {
        matches!(self, Output::Stdout | Output::FileAndStdout)
    }
}

impl FromStr for Output {
    type Err = LogLedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Output::File),
            "stdout" => Ok(Output::Stdout),
            "both" => Ok(Output::FileAndStdout),
            other => Err(LogLedgerError::Config(format!(
                "invalid output option '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<i64> for Output {
    type Error = LogLedgerError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Output::File),
            1 => Ok(Output::Stdout),
            2 => Ok(Output::FileAndStdout),
            other => Err(LogLedgerError::Config(format!(
                "invalid output option '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Output::File => "file",
            Output::Stdout => "stdout",
            Output::FileAndStdout => "both",
        };
        f.write_str(name)
    }
}

/// Settings for a local logging facility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Service name stamped into every entry
    pub service: String,
    /// Instance name stamped into every entry
    pub instance: String,
    /// Folder to store logfiles in (may be empty for stdout-only logging)
    pub folder: PathBuf,
    /// Logfile name stem, without date suffix and extension
    pub filestem: String,
    /// Logfile rotation frequency
    pub rotation: Rotation,
    /// Output selection
    pub output: Output,
    /// Whether new logfiles start with a column header line
    pub headers: bool,
    /// Whether file entries are written as JSON instead of tab-delimited
    pub json: bool,
    /// Whether rotated logfiles are gzip-compressed
    pub compress: bool,
    /// Column selection (empty means the default columns)
    #[serde(default)]
    pub columns: Vec<i64>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            instance: String::new(),
            folder: PathBuf::from("/var/log/logledger"),
            filestem: "aggregate".to_string(),
            rotation: Rotation::Daily,
            output: Output::File,
            headers: true,
            json: true,
            compress: true,
            columns: Vec::new(),
        }
    }
}

impl LoggerConfig {
    /// Validate the configuration. Fails on unknown column codes and,
    /// when file output is selected, on an unwritable log folder.
    pub fn validate(&self) -> Result<()> {
        for col in &self.columns {
            if !COLUMNS.contains(col) {
                return Err(LogLedgerError::Config(format!("invalid column '{}'", col)));
            }
        }

        if self.output.writes_file() {
            if self.filestem.is_empty() {
                return Err(LogLedgerError::Config(
                    "logfile stem cannot be empty".to_string(),
                ));
            }
            if !can_write(&self.folder) {
                return Err(LogLedgerError::Config(format!(
                    "cannot write to '{}'",
                    self.folder.display()
                )));
            }
        }

        Ok(())
    }

    /// The column selection in effect: the configured columns, or the
    /// defaults when none were configured
    pub fn effective_columns(&self) -> Vec<i64> {
        if self.columns.is_empty() {
            entry::default_columns()
        } else {
            self.columns.clone()
        }
    }
}

/// Settings for the aggregation server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind the ingress listener to
    pub host: String,
    /// Port to bind the ingress listener to
    pub port: u16,
    /// Path of the administrative unix domain socket
    pub unix_socket: PathBuf,
    /// Path of the token database file
    pub token_file: PathBuf,
    /// Path of the statistics database file
    pub stats_file: PathBuf,
    /// Settings for the server's own logging facility
    pub logger: LoggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4332,
            unix_socket: PathBuf::from("/tmp/logledger.sock"),
            token_file: PathBuf::from("/var/lib/logledger/tokens.db"),
            stats_file: PathBuf::from("/var/lib/logledger/stats.db"),
            logger: LoggerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LogLedgerError::Config(format!("failed to read config file: {}", e)))?;

        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| LogLedgerError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.unix_socket.as_os_str().is_empty() {
            return Err(LogLedgerError::Config(
                "unix socket path cannot be empty".to_string(),
            ));
        }
        if self.token_file.as_os_str().is_empty() {
            return Err(LogLedgerError::Config(
                "token file path cannot be empty".to_string(),
            ));
        }
        if self.stats_file.as_os_str().is_empty() {
            return Err(LogLedgerError::Config(
                "statistics file path cannot be empty".to_string(),
            ));
        }
        self.logger.validate()
    }
}

// Probes writability by creating (and immediately removing) a tempfile.
fn can_write(folder: &Path) -> bool {
    tempfile::NamedTempFile::new_in(folder).is_ok()
}
