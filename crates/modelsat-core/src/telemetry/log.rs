//! CSV telemetry log
//!
//! One header row followed by one row per packet, appended. The file is
//! reopened for every row so a power cut loses at most the row in flight.
//! On a fresh session any existing file is moved into the backup directory
//! as `D_M_Y_H_M_S_<name>` before a new one is begun; a resumed session
//! keeps appending to the same file.

use super::packet::{TelemetryPacket, CSV_HEADER};
use super::sequencer::SessionKind;
use crate::error::{Result, TelemetryError};
use chrono::NaiveDateTime;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Timestamp prefix used for archived files
pub fn archive_timestamp(time: NaiveDateTime) -> String {
    time.format("%-d_%-m_%Y_%-H_%-M_%-S").to_string()
}

/// Appending CSV writer for packets
#[derive(Debug)]
pub struct TelemetryLog {
    path: PathBuf,
    backup_dir: PathBuf,
    mission_id: u32,
    rows_written: u64,
}

impl TelemetryLog {
    /// Prepare the log for this session, archiving old data on a fresh start
    ///
    /// Failures here are logged and never fatal: the log is returned anyway
    /// and every [`append`](Self::append) retries the directory and header.
    pub fn open(
        path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        mission_id: u32,
        session: &SessionKind,
        now: NaiveDateTime,
    ) -> Self {
        let log = Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
            mission_id,
            rows_written: 0,
        };

        match session {
            SessionKind::Resumed(_) => {
                tracing::info!(path = %log.path.display(), "Skipping CSV backup due to detected restart");
            }
            SessionKind::Fresh => {
                if let Err(e) = log.archive(now) {
                    tracing::error!(error = %e, "Failed to back up CSV file, appending to it instead");
                }
            }
        }
        if let Err(e) = log.ensure_header() {
            tracing::error!(error = %e, "Failed to begin CSV file");
        }
        log
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Move the current file into the backup directory, if there is one
    pub fn archive(&self, now: NaiveDateTime) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            tracing::info!(path = %self.path.display(), "No CSV file to back up");
            return Ok(None);
        }
        fs::create_dir_all(&self.backup_dir).map_err(|e| TelemetryError::io(&self.backup_dir, e))?;

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "telemetry.csv".to_string());
        let target = self
            .backup_dir
            .join(format!("{}_{}", archive_timestamp(now), name));

        if fs::rename(&self.path, &target).is_err() {
            // rename fails across filesystems
            fs::copy(&self.path, &target).map_err(|e| TelemetryError::io(&target, e))?;
            fs::remove_file(&self.path).map_err(|e| TelemetryError::io(&self.path, e))?;
        }
        tracing::info!(backup = %target.display(), "Backup created");
        Ok(Some(target))
    }

    fn is_empty_or_missing(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true)
    }

    fn ensure_header(&self) -> Result<()> {
        if !self.is_empty_or_missing() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| TelemetryError::io(parent, e))?;
        }
        self.append_record(&CSV_HEADER)
    }

    fn append_record<I, T>(&self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TelemetryError::io(&self.path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(record)?;
        writer.flush().map_err(|e| TelemetryError::io(&self.path, e))?;
        Ok(())
    }

    /// Append one packet row, writing the header first if the file was removed
    pub fn append(&mut self, packet: &TelemetryPacket) -> Result<()> {
        self.ensure_header()?;
        self.append_record(packet.csv_row(self.mission_id))?;
        self.rows_written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::packet::tests::sample_packet;
    use crate::telemetry::phase::FlightPhase;
    use crate::telemetry::record::PersistedRecord;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 30)
            .unwrap()
            .and_hms_opt(14, 3, 9)
            .unwrap()
    }

    fn resumed() -> SessionKind {
        SessionKind::Resumed(PersistedRecord {
            packet_count: 3,
            baseline_a: 1000.0,
            baseline_b: 1000.0,
            phase: FlightPhase::ReadyToFlight,
        })
    }

    #[test]
    fn test_archive_timestamp_format() {
        assert_eq!(archive_timestamp(now()), "30_8_2024_14_3_9");
    }

    #[test]
    fn test_fresh_session_archives_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("telemetry.csv");
        let backup = dir.path().join("backup");
        std::fs::write(&csv, "old,data\n").unwrap();

        let log = TelemetryLog::open(&csv, &backup, 335592, &SessionKind::Fresh, now());

        let archived = backup.join("30_8_2024_14_3_9_telemetry.csv");
        assert_eq!(std::fs::read_to_string(&archived).unwrap(), "old,data\n");

        let fresh = std::fs::read_to_string(log.path()).unwrap();
        assert!(fresh.starts_with("Packet_Count,Satellite_Status,Error_Code"));
        assert_eq!(fresh.lines().count(), 1);
    }

    #[test]
    fn test_backup_failure_keeps_logging() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("telemetry.csv");
        let backup = dir.path().join("backup");
        std::fs::write(&csv, "old,data\n").unwrap();
        // A regular file where the backup directory should be
        std::fs::write(&backup, "not a directory").unwrap();

        let mut log = TelemetryLog::open(&csv, &backup, 335592, &SessionKind::Fresh, now());
        assert!(log.archive(now()).is_err());

        log.append(&sample_packet()).unwrap();
        let text = std::fs::read_to_string(&csv).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "old,data");
        assert!(lines[1].starts_with("7,"));
        assert_eq!(log.rows_written(), 1);
    }

    #[test]
    fn test_missing_directory_created_on_append() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("blackbox").join("telemetry.csv");
        let mut log =
            TelemetryLog::open(&csv, dir.path().join("backup"), 1, &SessionKind::Fresh, now());
        std::fs::remove_dir_all(dir.path().join("blackbox")).unwrap();

        log.append(&sample_packet()).unwrap();
        let text = std::fs::read_to_string(&csv).unwrap();
        assert!(text.starts_with("Packet_Count,"));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_resumed_session_appends() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("telemetry.csv");
        let backup = dir.path().join("backup");
        std::fs::write(&csv, "header\nrow0\n").unwrap();

        let mut log = TelemetryLog::open(&csv, &backup, 335592, &resumed(), now());
        log.append(&sample_packet()).unwrap();

        assert!(!backup.exists());
        let text = std::fs::read_to_string(&csv).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "header");
        assert!(lines[2].starts_with("7,1,00010,30/8/2024; 9:5:7,"));
        assert!(lines[2].ends_with(",0N0N,23,335592"));
    }

    #[test]
    fn test_fresh_session_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("telemetry.csv");
        let backup = dir.path().join("backup");
        let mut log = TelemetryLog::open(&csv, &backup, 1, &SessionKind::Fresh, now());
        log.append(&sample_packet()).unwrap();
        log.append(&sample_packet()).unwrap();

        assert!(!backup.exists());
        assert_eq!(log.rows_written(), 2);
        let text = std::fs::read_to_string(&csv).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_resumed_session_missing_file_gets_header() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("telemetry.csv");
        let log =
            TelemetryLog::open(&csv, dir.path().join("backup"), 1, &resumed(), now());
        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().next().unwrap().split(',').count(), 21);
    }

    #[test]
    fn test_free_text_with_comma_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("telemetry.csv");
        let mut log = TelemetryLog::open(
            &csv,
            dir.path().join("backup"),
            1,
            &SessionKind::Fresh,
            now(),
        );
        let mut packet = sample_packet();
        packet.iot = Some("a,b".into());
        log.append(&packet).unwrap();

        let mut reader = csv::Reader::from_path(&csv).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.len(), 21);
        assert_eq!(&row[19], "a,b");
    }
}
