//! CSV snapshot of the metrics table.
//!
//! The snapshot is a directory holding `part-00000.csv` (header plus one
//! row per user) and an empty `_SUCCESS` marker. A new snapshot is built
//! next to the destination and renamed into place, so a failed write keeps
//! the previous snapshot.

use onboarding_core::types::{MetricsRecord, METRICS_COLUMNS};
use onboarding_core::{EtlError, EtlResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const PART_FILE: &str = "part-00000.csv";
pub const SUCCESS_MARKER: &str = "_SUCCESS";

pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Overwrite the snapshot directory with `records`.
    pub fn write(&self, records: &[MetricsRecord]) -> EtlResult<u64> {
        let parent = match self.dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = self
            .dir
            .file_name()
            .ok_or_else(|| {
                EtlError::Snapshot(format!("invalid snapshot dir {}", self.dir.display()))
            })?
            .to_string_lossy()
            .into_owned();
        fs::create_dir_all(&parent)?;

        let run = Uuid::new_v4().simple();
        let staging = parent.join(format!(".{name}.tmp-{run}"));
        let backup = parent.join(format!(".{name}.old-{run}"));

        if let Err(e) = write_parts(&staging, records) {
            let _ = fs::remove_dir_all(&staging);
            metrics::counter!("snapshot.write_errors").increment(1);
            return Err(e);
        }

        let had_previous = self.dir.exists();
        if had_previous {
            fs::rename(&self.dir, &backup)?;
        }
        if let Err(e) = fs::rename(&staging, &self.dir) {
            if had_previous {
                let _ = fs::rename(&backup, &self.dir);
            }
            let _ = fs::remove_dir_all(&staging);
            metrics::counter!("snapshot.write_errors").increment(1);
            return Err(EtlError::Snapshot(format!(
                "failed to move snapshot into {}: {e}",
                self.dir.display()
            )));
        }
        if had_previous {
            if let Err(e) = fs::remove_dir_all(&backup) {
                warn!(error = %e, path = %backup.display(), "Failed to remove previous snapshot");
            }
        }

        info!(path = %self.dir.display(), rows = records.len(), "Snapshot written");
        Ok(records.len() as u64)
    }

    /// Read a snapshot back. Used to verify exports.
    pub fn read(&self) -> EtlResult<Vec<MetricsRecord>> {
        let mut rdr = csv::Reader::from_path(self.dir.join(PART_FILE))?;
        let mut records = Vec::new();
        for row in rdr.deserialize::<MetricsRecord>() {
            records.push(row?);
        }
        Ok(records)
    }
}

fn write_parts(dir: &Path, records: &[MetricsRecord]) -> EtlResult<()> {
    fs::create_dir_all(dir)?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(dir.join(PART_FILE))?;
    wtr.write_record(METRICS_COLUMNS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;

    fs::File::create(dir.join(SUCCESS_MARKER))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: &str, habit: i32) -> MetricsRecord {
        MetricsRecord {
            user_id: user_id.to_string(),
            segment: 2,
            ab_group: "control".to_string(),
            drop: 1,
            activacion: 0,
            setup: 0,
            habito_calc: habit,
        }
    }

    #[test]
    fn test_write_creates_part_and_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(tmp.path().join("artifacts").join("metrics"));

        let written = writer.write(&[record("u1", 1), record("u2", 0)]).unwrap();
        assert_eq!(written, 2);
        assert!(writer.dir().join(SUCCESS_MARKER).exists());

        let text = fs::read_to_string(writer.dir().join(PART_FILE)).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("user_id,segment,ab_group,drop,activacion,setup,habito_calc")
        );
        assert_eq!(lines.next(), Some("u1,2,control,1,0,0,1"));
        assert_eq!(writer.read().unwrap().len(), 2);
    }

    #[test]
    fn test_write_overwrites_previous_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(tmp.path().join("metrics"));

        writer.write(&[record("old", 0)]).unwrap();
        fs::write(writer.dir().join("stale.txt"), "leftover").unwrap();
        writer.write(&[record("new", 1)]).unwrap();

        let rows = writer.read().unwrap();
        assert_eq!(rows, vec![record("new", 1)]);
        assert!(!writer.dir().join("stale.txt").exists());

        // No temp or backup directories are left behind.
        let leftovers = fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_empty_snapshot_still_has_header() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(tmp.path().join("metrics"));
        writer.write(&[]).unwrap();

        let text = fs::read_to_string(writer.dir().join(PART_FILE)).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(writer.read().unwrap().is_empty());
    }
}
