use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Trajectory log already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Record steps must be contiguous: expected step {expected}, got {found}")]
    StepOutOfOrder { expected: u64, found: u64 },

    #[error("No record with step {0} in the trajectory log")]
    StepNotFound(u64),

    #[error("I/O error on trajectory log: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error on trajectory log: {0}")]
    Csv(#[from] csv::Error),
}

/// One iteration's result in the run trajectory. Append-only: once written, a
/// record is never edited except for the post-run `selected` and RMSD
/// annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub step: u64,
    /// Conformation name of this step, e.g. `lid#s3`.
    pub label: String,
    pub similarity: f64,
    pub mode: u32,
    pub amplitude: f64,
    /// Mean similarity over the most recent window of steps (or over all
    /// steps when fewer exist than the window).
    pub rolling_avg: f64,
    pub rmsd_to_initial: Option<f64>,
    pub rmsd_to_reference: Option<f64>,
    pub selected: bool,
}

const HEADER: [&str; 9] = [
    "step",
    "label",
    "similarity",
    "mode",
    "amplitude",
    "rolling_avg",
    "rmsd_to_initial",
    "rmsd_to_reference",
    "selected",
];

/// The ordered history of one run, backed by an append-only CSV file. The
/// sole source of truth for convergence decisions and post-hoc analysis.
/// Single writer: only the iteration controller appends.
#[derive(Debug)]
pub struct TrajectoryLog {
    path: PathBuf,
    records: Vec<TrajectoryRecord>,
}

impl TrajectoryLog {
    /// Creates a fresh log with a header row. Refuses to overwrite an
    /// existing file.
    pub fn create(path: &Path) -> Result<Self, LogError> {
        if path.exists() {
            return Err(LogError::AlreadyExists(path.to_path_buf()));
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(HEADER)?;
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            records: Vec::new(),
        })
    }

    /// Opens a completed (or in-progress) log and reads all records.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for (idx, row) in reader.deserialize::<TrajectoryRecord>().enumerate() {
            let record = row?;
            if record.step != idx as u64 {
                return Err(LogError::StepOutOfOrder {
                    expected: idx as u64,
                    found: record.step,
                });
            }
            records.push(record);
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[TrajectoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&TrajectoryRecord> {
        self.records.last()
    }

    /// Mean similarity over the most recent `window` records, or over all of
    /// them when fewer exist. `None` on an empty log.
    pub fn window_average(&self, window: usize) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let take = window.min(self.records.len());
        let sum: f64 = self.records[self.records.len() - take..]
            .iter()
            .map(|r| r.similarity)
            .sum();
        Some(sum / take as f64)
    }

    /// The rolling average a new record with `similarity` would carry: mean
    /// over the last `window - 1` logged similarities plus the candidate.
    pub fn rolling_average_with(&self, similarity: f64, window: usize) -> f64 {
        let take = (window - 1).min(self.records.len());
        let sum: f64 = self.records[self.records.len() - take..]
            .iter()
            .map(|r| r.similarity)
            .sum();
        (sum + similarity) / (take + 1) as f64
    }

    /// Appends one record, enforcing contiguous step indices from 0, and
    /// flushes it to the backing file.
    pub fn append(&mut self, record: TrajectoryRecord) -> Result<(), LogError> {
        let expected = self.records.len() as u64;
        if record.step != expected {
            return Err(LogError::StepOutOfOrder {
                expected,
                found: record.step,
            });
        }

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(&record)?;
        writer.flush()?;

        self.records.push(record);
        Ok(())
    }

    /// Marks `step` as the selected best step and rewrites the backing file.
    /// Re-analysis may move the mark; any earlier selection is cleared so the
    /// log never carries two selected rows.
    pub fn mark_selected(&mut self, step: u64) -> Result<(), LogError> {
        if !self.records.iter().any(|r| r.step == step) {
            return Err(LogError::StepNotFound(step));
        }
        for record in &mut self.records {
            record.selected = record.step == step;
        }
        self.rewrite()
    }

    /// Attaches post-run RMSD values to `step` and rewrites the backing
    /// file. RMSD never feeds back into move selection; it is bookkeeping
    /// added after the run completes.
    pub fn annotate_rmsd(
        &mut self,
        step: u64,
        to_initial: Option<f64>,
        to_reference: Option<f64>,
    ) -> Result<(), LogError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.step == step)
            .ok_or(LogError::StepNotFound(step))?;
        record.rmsd_to_initial = to_initial;
        record.rmsd_to_reference = to_reference;
        self.rewrite()
    }

    fn rewrite(&self) -> Result<(), LogError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        writer.write_record(HEADER)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: u64, similarity: f64) -> TrajectoryRecord {
        TrajectoryRecord {
            step,
            label: format!("lid#s{step}"),
            similarity,
            mode: 7,
            amplitude: 10.0,
            rolling_avg: similarity,
            rmsd_to_initial: None,
            rmsd_to_reference: None,
            selected: false,
        }
    }

    #[test]
    fn create_append_and_reopen_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_log.csv");

        let mut log = TrajectoryLog::create(&path).unwrap();
        log.append(record(0, 0.50)).unwrap();
        log.append(record(1, 0.62)).unwrap();

        let reopened = TrajectoryLog::open(&path).unwrap();
        assert_eq!(reopened.records(), log.records());
    }

    #[test]
    fn create_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_log.csv");
        TrajectoryLog::create(&path).unwrap();
        assert!(matches!(
            TrajectoryLog::create(&path),
            Err(LogError::AlreadyExists(_))
        ));
    }

    #[test]
    fn steps_must_be_contiguous_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TrajectoryLog::create(&dir.path().join("log.csv")).unwrap();
        let err = log.append(record(1, 0.5)).unwrap_err();
        assert!(matches!(
            err,
            LogError::StepOutOfOrder {
                expected: 0,
                found: 1
            }
        ));

        log.append(record(0, 0.5)).unwrap();
        log.append(record(1, 0.6)).unwrap();
        assert!(log.append(record(3, 0.7)).is_err());
    }

    #[test]
    fn window_average_uses_available_records_when_short() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TrajectoryLog::create(&dir.path().join("log.csv")).unwrap();
        assert_eq!(log.window_average(5), None);

        log.append(record(0, 0.2)).unwrap();
        log.append(record(1, 0.4)).unwrap();
        assert!((log.window_average(5).unwrap() - 0.3).abs() < 1e-12);

        for (step, cc) in [(2, 0.6), (3, 0.8), (4, 1.0), (5, 1.0)] {
            log.append(record(step, cc)).unwrap();
        }
        // Last five: 0.4, 0.6, 0.8, 1.0, 1.0
        assert!((log.window_average(5).unwrap() - 0.76).abs() < 1e-12);
    }

    #[test]
    fn rolling_average_with_candidate_matches_manual_mean() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TrajectoryLog::create(&dir.path().join("log.csv")).unwrap();
        assert!((log.rolling_average_with(0.5, 5) - 0.5).abs() < 1e-12);

        log.append(record(0, 0.1)).unwrap();
        log.append(record(1, 0.3)).unwrap();
        // (0.1 + 0.3 + 0.5) / 3
        assert!((log.rolling_average_with(0.5, 5) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn mark_selected_keeps_exactly_one_row_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = TrajectoryLog::create(&path).unwrap();
        log.append(record(0, 0.2)).unwrap();
        log.append(record(1, 0.4)).unwrap();

        log.mark_selected(1).unwrap();
        let reopened = TrajectoryLog::open(&path).unwrap();
        assert!(!reopened.records()[0].selected);
        assert!(reopened.records()[1].selected);

        // Re-analysis moves the mark rather than piling up a second one.
        log.mark_selected(0).unwrap();
        let reopened = TrajectoryLog::open(&path).unwrap();
        assert!(reopened.records()[0].selected);
        assert!(!reopened.records()[1].selected);
    }

    #[test]
    fn mark_selected_rejects_unknown_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TrajectoryLog::create(&dir.path().join("log.csv")).unwrap();
        log.append(record(0, 0.2)).unwrap();
        assert!(matches!(log.mark_selected(9), Err(LogError::StepNotFound(9))));
    }

    #[test]
    fn annotate_rmsd_survives_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = TrajectoryLog::create(&path).unwrap();
        log.append(record(0, 0.2)).unwrap();
        log.append(record(1, 0.4)).unwrap();

        log.annotate_rmsd(0, Some(0.0), None).unwrap();
        log.annotate_rmsd(1, Some(3.2), Some(8.1)).unwrap();
        assert!(matches!(
            log.annotate_rmsd(7, Some(1.0), None),
            Err(LogError::StepNotFound(7))
        ));

        let reopened = TrajectoryLog::open(&path).unwrap();
        assert_eq!(reopened.records()[0].rmsd_to_initial, Some(0.0));
        assert_eq!(reopened.records()[1].rmsd_to_reference, Some(8.1));
    }

    #[test]
    fn optional_rmsd_fields_survive_the_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut log = TrajectoryLog::create(&path).unwrap();

        let mut with_rmsd = record(0, 0.5);
        with_rmsd.rmsd_to_initial = Some(0.0);
        with_rmsd.rmsd_to_reference = Some(12.75);
        log.append(with_rmsd.clone()).unwrap();
        log.append(record(1, 0.6)).unwrap();

        let reopened = TrajectoryLog::open(&path).unwrap();
        assert_eq!(reopened.records()[0], with_rmsd);
        assert_eq!(reopened.records()[1].rmsd_to_reference, None);
    }
}
