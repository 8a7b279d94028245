use super::error::EngineError;
use crate::core::stats::{self, StatsError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One scored perturbation: the similarity of the structure displaced along
/// `mode` by `amplitude`, against the target image. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub mode: u32,
    pub amplitude: f64,
    pub similarity: f64,
}

/// Linear sensitivity of one mode: similarity regressed against amplitude
/// over that mode's samples. Recomputed every iteration, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeFit {
    pub mode: u32,
    pub slope: f64,
    pub intercept: f64,
}

/// The signed amplitudes sampled per mode for a combined amplitude `A`:
/// `{-A, -h, 0, h, A}` with `h = trunc(A/2)`. The midpoint is truncated to an
/// integer; this fixes the actual set of amplitudes sampled (and their file
/// naming), so it is a contract, not a formatting detail. For `A < 2` the
/// truncated half is zero and the schedule collapses to the three distinct
/// points, so no (mode, amplitude) pair is ever dispatched twice.
pub fn amplitude_schedule(combined_amplitude: f64) -> Vec<f64> {
    let half = (combined_amplitude / 2.0).trunc();
    if half == 0.0 {
        vec![-combined_amplitude, 0.0, combined_amplitude]
    } else {
        vec![
            -combined_amplitude,
            -half,
            0.0,
            half,
            combined_amplitude,
        ]
    }
}

/// The (mode, amplitude, similarity) samples collected in one iteration.
/// Append-only within the iteration; no duplicate (mode, amplitude) pairs.
#[derive(Debug, Clone, Default)]
pub struct SensitivityTable {
    samples: Vec<Sample>,
}

impl SensitivityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn push(&mut self, sample: Sample) {
        debug_assert!(
            !self
                .samples
                .iter()
                .any(|s| s.mode == sample.mode && s.amplitude == sample.amplitude),
            "duplicate (mode, amplitude) sample within one iteration"
        );
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples sorted descending by similarity. The sort is stable, so
    /// ties keep their encounter order; downstream max-similarity queries
    /// depend on this for reproducibility.
    pub fn ranked(&self) -> Vec<Sample> {
        let mut ranked = self.samples.clone();
        ranked.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }

    /// Fits one least-squares line per mode in the inclusive range, in mode
    /// order. A mode whose optimum sits at an amplitude extreme still gets a
    /// meaningful slope sign from the endpoints.
    pub fn fit_modes(&self, first_mode: u32, last_mode: u32) -> Result<Vec<ModeFit>, EngineError> {
        let mut fits = Vec::with_capacity((last_mode - first_mode + 1) as usize);

        for mode in first_mode..=last_mode {
            let mut points: Vec<(f64, f64)> = self
                .samples
                .iter()
                .filter(|s| s.mode == mode)
                .map(|s| (s.amplitude, s.similarity))
                .collect();
            points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
            let ys: Vec<f64> = points.iter().map(|p| p.1).collect();

            let fit = stats::fit_line(&xs, &ys).map_err(|err| match err {
                StatsError::InsufficientData { actual, .. } => EngineError::InsufficientSamples {
                    mode,
                    count: actual,
                },
                StatsError::DegenerateAbscissa => EngineError::InsufficientSamples {
                    mode,
                    count: xs.len(),
                },
                other => EngineError::Internal(other.to_string()),
            })?;

            debug!(mode, slope = fit.slope, intercept = fit.intercept, "Mode fitted.");
            fits.push(ModeFit {
                mode,
                slope: fit.slope,
                intercept: fit.intercept,
            });
        }

        Ok(fits)
    }

    /// Writes the raw ranked table and the per-mode fits as CSV into the
    /// iteration directory for audit and debugging.
    pub fn persist(&self, fits: &[ModeFit], directory: &Path) -> Result<(), EngineError> {
        let mut cc_writer = csv::Writer::from_path(directory.join("cc_table.csv"))?;
        for sample in self.ranked() {
            cc_writer.serialize(sample)?;
        }
        cc_writer.flush().map_err(csv::Error::from)?;

        let mut slope_writer = csv::Writer::from_path(directory.join("slope_table.csv"))?;
        for fit in fits {
            slope_writer.serialize(fit)?;
        }
        slope_writer.flush().map_err(csv::Error::from)?;

        Ok(())
    }
}
