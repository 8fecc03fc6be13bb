//! Gzip archival of closed logfiles

use crate::{LogLedgerError, Result};
use chrono::Utc;
use flate2::{Compression, GzBuilder};
use std::fs;
use std::path::Path;

/// Compresses `<folder>/<name>.log` to `<folder>/<name>.log.gz` and
/// removes the original. The archive keeps the inner filename and is
/// stamped with the current UTC time.
pub(crate) fn compress(folder: &Path, name: &str) -> Result<()> {
    let source = folder.join(format!("{}.log", name));
    let target = folder.join(format!("{}.log.gz", name));

    let mut input =
        fs::File::open(&source).map_err(|e| archive_error("could not open logfile", e.into()))?;

    let output = fs::File::create(&target)
        .map_err(|e| archive_error("could not create archive", e.into()))?;

    let mut encoder = GzBuilder::new()
        .filename(format!("{}.log", name))
        .comment("archived logfile")
        .mtime(Utc::now().timestamp() as u32)
        .write(output, Compression::best());

    std::io::copy(&mut input, &mut encoder)
        .map_err(|e| archive_error("could not archive logfile", e.into()))?;

    let archive = encoder
        .finish()
        .map_err(|e| archive_error("could not finish archive", e.into()))?;
    archive
        .sync_all()
        .map_err(|e| archive_error("could not sync archive", e.into()))?;

    fs::remove_file(&source).map_err(|e| archive_error("could not delete old logfile", e.into()))?;

    Ok(())
}

/// Compresses every `*.log` file in the folder except the named current
/// one. Best effort: failures are collected and reported by the caller.
pub(crate) fn sweep(folder: &Path, keep: &str) -> Vec<(String, LogLedgerError)> {
    let mut failures = Vec::new();
    let current = format!("{}.log", keep);

    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) => {
            failures.push((folder.display().to_string(), e.into()));
            return failures;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if !name.ends_with(".log") || name == current {
            continue;
        }
        if entry.path().is_dir() {
            continue;
        }
        let stem = name.trim_end_matches(".log").to_string();
        if let Err(e) = compress(folder, &stem) {
            failures.push((name.to_string(), e));
        }
    }

    failures
}

fn archive_error(context: &str, err: LogLedgerError) -> LogLedgerError {
    LogLedgerError::Server(format!("{}: {}", context, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_compress_roundtrip_and_removal() {
        let temp_dir = tempdir().unwrap();
        let name = "app_2024-01-01";
        let source = temp_dir.path().join(format!("{}.log", name));
        fs::write(&source, "line one\nline two\n").unwrap();

        compress(temp_dir.path(), name).unwrap();

        assert!(!source.exists());
        let archive = temp_dir.path().join(format!("{}.log.gz", name));
        assert!(archive.exists());

        let mut decoder = GzDecoder::new(fs::File::open(&archive).unwrap());
        let mut content = String::new();
        decoder.read_to_string(&mut content).unwrap();
        assert_eq!(content, "line one\nline two\n");
    }

    #[test]
    fn test_compress_missing_file_fails() {
        let temp_dir = tempdir().unwrap();
        assert!(compress(temp_dir.path(), "absent_2024-01-01").is_err());
    }

    #[test]
    fn test_sweep_skips_current() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("app_2024-01-01.log"), "old\n").unwrap();
        fs::write(temp_dir.path().join("app_2024-01-02.log"), "current\n").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored\n").unwrap();

        let failures = sweep(temp_dir.path(), "app_2024-01-02");
        assert!(failures.is_empty());

        assert!(temp_dir.path().join("app_2024-01-01.log.gz").exists());
        assert!(!temp_dir.path().join("app_2024-01-01.log").exists());
        assert!(temp_dir.path().join("app_2024-01-02.log").exists());
        assert!(temp_dir.path().join("notes.txt").exists());
    }
}
