//! Rotation clock and the logfile rotation task

use super::archive;
use super::sinks::LogSink;
use super::Shared;
use crate::config::{LoggerConfig, Rotation};
use crate::types::entry;
use chrono::{Datelike, Days, Local, Months, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time;

/// Returns the rotation boundary `offset` periods away from now as a
/// `YYYY-MM-DD` string. Offset 0 is the current boundary, 1 the next,
/// -1 the previous.
pub fn rotation_date(rotation: Rotation, offset: i32) -> String {
    rotation_date_from(Local::now().date_naive(), rotation, offset)
}

fn rotation_date_from(today: NaiveDate, rotation: Rotation, offset: i32) -> String {
    let date = match rotation {
        Rotation::None => today,
        Rotation::Daily => shift_days(today, offset as i64),
        Rotation::Weekly => {
            let shifted = shift_days(today, 7 * offset as i64);
            // snap back to the week's Monday
            shift_days(shifted, -(shifted.weekday().num_days_from_monday() as i64))
        }
        Rotation::Monthly => {
            let shifted = shift_months(today, offset);
            shifted.with_day(1).unwrap_or(shifted)
        }
        Rotation::Annually => {
            NaiveDate::from_ymd_opt(today.year() + offset, 1, 1).unwrap_or(today)
        }
    };

    date.format("%Y-%m-%d").to_string()
}

fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days as u64))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.unwrap_or(date)
}

fn shift_months(date: NaiveDate, months: i32) -> NaiveDate {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(date)
}

/// Today's local date as a `YYYY-MM-DD` string
pub(crate) fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Opens (creating if necessary) the dated logfile for the given
/// boundary. A freshly created file gets the column header line when
/// headers are enabled and JSON mode is off.
pub(crate) async fn open_logfile(
    config: &LoggerConfig,
    columns: &[i64],
    date: &str,
) -> crate::Result<LogSink> {
    let path = config
        .folder
        .join(format!("{}_{}.log", config.filestem, date));
    let is_new = !path.exists();

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(&path)
        .await?;

    if is_new && config.headers && !config.json {
        file.write_all(format!("{}\n", entry::header_line(columns)).as_bytes())
            .await?;
        file.flush().await?;
    }

    Ok(LogSink { file, path })
}

/// Spawns the rotation task. It wakes at least once per second; when the
/// local date crosses the computed boundary it opens the new dated file,
/// swaps it in under the sink mutex and hands the closed file to the
/// archiver, then sleeps until one minute before the next boundary.
pub(crate) fn spawn(shared: Arc<Shared>, initial_date: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown = shared.shutdown.subscribe();
        let mut prev = initial_date;
        let mut next = rotation_date(shared.config.rotation, 1);

        loop {
            tokio::select! {
                _ = time::sleep(Duration::from_secs(1)) => {}
                _ = shutdown.recv() => break,
            }

            let current = today();
            if current == prev || current != next {
                continue;
            }

            let sink = match open_logfile(&shared.config, &shared.columns, &current).await {
                Ok(sink) => sink,
                Err(e) => {
                    shared.system_log(format!("rotate: could not open a new logfile: {}", e));
                    continue;
                }
            };

            {
                let mut sinks = shared.sinks.lock().await;
                if let Some(old) = sinks.logfile.replace(sink) {
                    let mut file = old.file;
                    let _ = file.flush().await;
                }
            }

            if shared.config.compress {
                let folder = shared.config.folder.clone();
                let name = format!("{}_{}", shared.config.filestem, prev);
                match tokio::task::spawn_blocking(move || archive::compress(&folder, &name)).await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        shared.system_log(format!("rotate: could not compress old logfile: {}", e))
                    }
                    Err(e) => shared.system_log(format!("rotate: archive task failed: {}", e)),
                }
            }

            prev = current;
            next = rotation_date(shared.config.rotation, 1);

            if let Some(delta) = long_wait(&next) {
                tokio::select! {
                    _ = time::sleep(delta) => {}
                    _ = shutdown.recv() => break,
                }
            }
        }
    })
}

// Time to sleep until one minute before the boundary, if that instant is
// still ahead of us.
fn long_wait(next: &str) -> Option<Duration> {
    let boundary = NaiveDate::parse_from_str(next, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?;
    let delta = boundary
        .signed_duration_since(Local::now().naive_local())
        .num_seconds()
        - 60;
    (delta > 0).then(|| Duration::from_secs(delta as u64))
}
