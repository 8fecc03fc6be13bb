//! Hourly usage statistics per service/instance

use crate::Result;
use chrono::{DateTime, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Usage counters for one service/instance. The two arrays hold one
/// bucket per local-time hour of day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    /// Service name as supplied at authentication
    #[serde(rename = "Service")]
    pub service: String,
    /// Instance name as supplied at authentication
    #[serde(rename = "Instance")]
    pub instance: String,
    /// Entries received, per hour of day
    #[serde(rename = "LogsParsed")]
    pub logs_parsed: [i64; 24],
    /// Entry bytes received, per hour of day
    #[serde(rename = "LogsParsedBytes")]
    pub logs_parsed_bytes: [i64; 24],
    /// Address the last entry arrived from
    #[serde(rename = "LastIP")]
    pub last_ip: String,
    /// Time of the last entry
    #[serde(rename = "LastActive")]
    pub last_active: DateTime<Utc>,
}

/// Per-service aggregation of all instance statistics
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateStatistics {
    /// Service name
    pub service: String,
    /// Number of known instances
    pub instances: usize,
    /// Total entries received over all hours and instances
    pub logs: i64,
    /// Total entry bytes received over all hours and instances
    pub volume: i64,
    /// This service's share of the global volume, in [0, 1]
    pub share: f64,
}

/// Hourly totals over all services: (entries, bytes) per hour of day
pub type HourlyStatistics = [(i64, i64); 24];

/// In-memory statistics map with a JSON file behind it
pub(crate) struct StatsStore {
    path: PathBuf,
    stats: HashMap<String, Statistic>,
}

impl StatsStore {
    /// Load the store from disk, creating the backing file if missing.
    /// An empty file yields an empty map.
    pub(crate) async fn load(path: &Path) -> Result<Self> {
        super::ensure_file(path).await?;

        let content = tokio::fs::read(path).await?;
        let stats = if content.is_empty() {
            HashMap::new()
        } else {
            serde_json::from_slice(&content)?
        };

        Ok(StatsStore {
            path: path.to_path_buf(),
            stats,
        })
    }

    /// Record one received entry for the key
    pub(crate) fn ingest(
        &mut self,
        service: &str,
        instance: &str,
        key: &str,
        ip: &str,
        bytes: usize,
    ) {
        let now = Local::now();
        let hour = now.hour() as usize;

        let stat = self.stats.entry(key.to_string()).or_insert_with(|| Statistic {
            service: service.to_string(),
            instance: instance.to_string(),
            logs_parsed: [0; 24],
            logs_parsed_bytes: [0; 24],
            last_ip: String::new(),
            last_active: now.with_timezone(&Utc),
        });

        stat.logs_parsed[hour] += 1;
        stat.logs_parsed_bytes[hour] += bytes as i64;
        stat.last_ip = ip.to_string();
        stat.last_active = now.with_timezone(&Utc);
    }

    /// The record for a key
    pub(crate) fn get(&self, key: &str) -> Option<&Statistic> {
        self.stats.get(key)
    }

    /// A deep copy of the whole map
    pub(crate) fn snapshot(&self) -> HashMap<String, Statistic> {
        self.stats.clone()
    }

    /// Aggregates all records: global volume, per-service totals ordered
    /// by share (largest first) and hourly totals.
    pub(crate) fn aggregate(&self) -> (i64, Vec<AggregateStatistics>, HourlyStatistics) {
        let mut total = 0i64;
        let mut hourly: HourlyStatistics = [(0, 0); 24];
        let mut services: HashMap<String, AggregateStatistics> = HashMap::new();

        for stat in self.stats.values() {
            let logs: i64 = stat.logs_parsed.iter().sum();
            let bytes: i64 = stat.logs_parsed_bytes.iter().sum();

            for hour in 0..24 {
                hourly[hour].0 += stat.logs_parsed[hour];
                hourly[hour].1 += stat.logs_parsed_bytes[hour];
            }

            let aggregate = services
                .entry(stat.service.clone())
                .or_insert_with(|| AggregateStatistics {
                    service: stat.service.clone(),
                    instances: 0,
                    logs: 0,
                    volume: 0,
                    share: 0.0,
                });
            aggregate.instances += 1;
            aggregate.logs += logs;
            aggregate.volume += bytes;

            total += bytes;
        }

        let mut services: Vec<AggregateStatistics> = services.into_values().collect();
        for service in &mut services {
            service.share = if total > 0 {
                service.volume as f64 / total as f64
            } else {
                0.0
            };
        }
        services.sort_by(|a, b| {
            b.share
                .partial_cmp(&a.share)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.service.cmp(&b.service))
        });

        (total, services, hourly)
    }

    /// Write the whole map to the backing file as a single JSON object
    pub(crate) async fn dump(&self) -> Result<()> {
        super::ensure_file(&self.path).await?;
        let payload = serde_json::to_vec(&self.stats)?;
        tokio::fs::write(&self.path, payload).await?;
        Ok(())
    }
}

/// Formats an entry count with `.` as the thousands separator
pub(crate) fn pretty_logs(count: i64) -> String {
    let digits = count.to_string();
    if !digits.as_bytes().first().is_some_and(|b| b.is_ascii_digit()) {
        return digits;
    }

    let mut groups: Vec<&str> = Vec::new();
    let mut end = digits.len();
    while end > 3 {
        groups.push(&digits[end - 3..end]);
        end -= 3;
    }
    groups.push(&digits[..end]);
    groups.reverse();
    groups.join(".")
}

/// Formats a byte count scaled to a human-readable magnitude
pub(crate) fn pretty_bytes(bytes: i64) -> String {
    let (value, suffix) = if bytes <= 1_000 {
        (bytes as f64, "B")
    } else if bytes <= 1_000_000 {
        (bytes as f64 / 1e3, "kB")
    } else if bytes <= 1_000_000_000 {
        (bytes as f64 / 1e6, "MB")
    } else if bytes <= 1_000_000_000_000 {
        (bytes as f64 / 1e9, "GB")
    } else if bytes <= 1_000_000_000_000_000 {
        (bytes as f64 / 1e12, "TB")
    } else {
        (bytes as f64 / 1e15, "PB")
    };

    format!("{:.2} {}", value, suffix)
}
