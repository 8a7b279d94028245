use super::config::Termination;
use super::trajectory::{TrajectoryLog, TrajectoryRecord};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

impl Termination {
    /// Decides whether the loop continues past the current iteration.
    ///
    /// `log` is the trajectory *before* the candidate record is appended;
    /// `candidate` carries the current similarity, its rolling average, and
    /// the chosen move. The candidate is appended regardless of the outcome,
    /// so the triggering iteration is always recorded.
    pub fn decide(
        &self,
        log: &TrajectoryLog,
        candidate: &TrajectoryRecord,
        deformed_times: usize,
        iteration_budget: usize,
        window: usize,
    ) -> Decision {
        let decision = match self {
            // Iteration budget with early exit on a zero move; not a
            // similarity rule even though similarity is recorded.
            Termination::Numeric => {
                if deformed_times >= iteration_budget || candidate.amplitude == 0.0 {
                    Decision::Stop
                } else {
                    Decision::Continue
                }
            }
            Termination::Average => {
                // Missing history on the very first iteration reads as a
                // baseline of 0, not an error.
                let previous = log.window_average(window).unwrap_or(0.0);
                if candidate.rolling_avg > previous {
                    Decision::Continue
                } else {
                    Decision::Stop
                }
            }
            Termination::Single => {
                let previous = log.last().map(|r| r.similarity).unwrap_or(0.0);
                if candidate.similarity > previous {
                    Decision::Continue
                } else {
                    Decision::Stop
                }
            }
        };

        debug!(strategy = %self, ?decision, step = candidate.step, "Termination evaluated.");
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: u64, similarity: f64, amplitude: f64, rolling_avg: f64) -> TrajectoryRecord {
        TrajectoryRecord {
            step,
            label: format!("conf#s{step}"),
            similarity,
            mode: 1,
            amplitude,
            rolling_avg,
            rmsd_to_initial: None,
            rmsd_to_reference: None,
            selected: false,
        }
    }

    fn log_with(similarities: &[f64]) -> (tempfile::TempDir, TrajectoryLog) {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TrajectoryLog::create(&dir.path().join("log.csv")).unwrap();
        for (step, &cc) in similarities.iter().enumerate() {
            log.append(record(step as u64, cc, 10.0, cc)).unwrap();
        }
        (dir, log)
    }

    #[test]
    fn numeric_stops_exactly_at_the_budget() {
        let (_dir, log) = log_with(&[0.5, 0.6]);
        let candidate = record(2, 0.7, 10.0, 0.6);

        assert_eq!(
            Termination::Numeric.decide(&log, &candidate, 2, 3, 5),
            Decision::Continue
        );
        assert_eq!(
            Termination::Numeric.decide(&log, &candidate, 3, 3, 5),
            Decision::Stop
        );
    }

    #[test]
    fn numeric_stops_on_a_zero_amplitude_move() {
        let (_dir, log) = log_with(&[0.5]);
        let candidate = record(1, 0.9, 0.0, 0.7);
        assert_eq!(
            Termination::Numeric.decide(&log, &candidate, 1, 100, 5),
            Decision::Stop
        );
    }

    #[test]
    fn average_compares_against_the_previous_window() {
        let (_dir, log) = log_with(&[0.2, 0.4, 0.6]);
        // Previous window mean = 0.4.
        let improving = record(3, 0.8, 10.0, 0.5);
        let flat = record(3, 0.2, 10.0, 0.4);

        assert_eq!(
            Termination::Average.decide(&log, &improving, 3, 100, 5),
            Decision::Continue
        );
        assert_eq!(
            Termination::Average.decide(&log, &flat, 3, 100, 5),
            Decision::Stop
        );
    }

    #[test]
    fn average_uses_zero_baseline_on_the_first_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let log = TrajectoryLog::create(&dir.path().join("log.csv")).unwrap();
        let candidate = record(0, 0.1, 10.0, 0.1);
        assert_eq!(
            Termination::Average.decide(&log, &candidate, 0, 100, 5),
            Decision::Continue
        );
    }

    #[test]
    fn single_compares_against_the_previous_step() {
        let (_dir, log) = log_with(&[0.5, 0.7]);
        let better = record(2, 0.75, 10.0, 0.65);
        let worse = record(2, 0.7, 10.0, 0.63);

        assert_eq!(
            Termination::Single.decide(&log, &better, 2, 100, 5),
            Decision::Continue
        );
        assert_eq!(
            Termination::Single.decide(&log, &worse, 2, 100, 5),
            Decision::Stop
        );
    }
}
