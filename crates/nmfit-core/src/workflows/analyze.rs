use crate::core::stats::{self, ExpDecayFit};
use crate::engine::error::EngineError;
use crate::engine::trajectory::TrajectoryLog;
use tracing::{info, instrument, warn};

/// The step a single decay fraction maps to on the fitted improvement curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayPoint {
    pub fraction: f64,
    pub step: u64,
    /// True when the analytic step fell outside the recorded trajectory and
    /// was clamped to its bounds.
    pub clamped: bool,
    /// Per-step similarity change the model predicts at this step.
    pub predicted_change: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryReport {
    /// Earliest step whose similarity dropped below its predecessor, if any.
    pub first_negative_step: Option<u64>,
    pub decay: ExpDecayFit,
    /// One point per requested fraction, in the order given.
    pub decay_points: Vec<DecayPoint>,
    /// The recommended conformation step, also annotated in the log.
    pub best_step: u64,
}

/// Post-run convergence analysis: fits an exponential decay to the per-step
/// similarity improvements, maps each requested decay fraction to a step, and
/// marks the middle fraction's step as the selected conformation.
///
/// Improvements are indexed by the step they arrive at, so the first change
/// (step 0 to step 1) sits at x = 1 where the model `a * exp(b * (x - 1))`
/// takes the value `a`.
#[instrument(skip_all, name = "analyze_workflow")]
pub fn run(log: &mut TrajectoryLog, fractions: &[f64]) -> Result<TrajectoryReport, EngineError> {
    if fractions.is_empty() {
        return Err(EngineError::Internal(
            "Trajectory analysis needs at least one decay fraction".to_string(),
        ));
    }

    let records = log.records();
    let mut xs = Vec::with_capacity(records.len().saturating_sub(1));
    let mut ys = Vec::with_capacity(xs.capacity());
    let mut first_negative_step = None;
    for pair in records.windows(2) {
        let change = pair[1].similarity - pair[0].similarity;
        if change < 0.0 && first_negative_step.is_none() {
            first_negative_step = Some(pair[1].step);
        }
        xs.push(pair[1].step as f64);
        ys.push(change);
    }

    let decay = stats::fit_exp_decay(&xs, &ys, 1.0, -1.0)
        .map_err(|source| EngineError::FitDivergence { source })?;
    info!(a = decay.a, b = decay.b, "Improvement decay fitted.");

    let last_step = records
        .last()
        .map(|r| r.step)
        .ok_or_else(|| EngineError::Internal("Trajectory log is empty".to_string()))?;

    let decay_points: Vec<DecayPoint> = fractions
        .iter()
        .map(|&fraction| {
            let analytic = (fraction.ln() / decay.b + 1.0).ceil();
            let clamped = analytic < 0.0 || analytic > last_step as f64;
            let step = if analytic < 0.0 {
                0
            } else if analytic > last_step as f64 {
                last_step
            } else {
                analytic as u64
            };
            if clamped {
                warn!(
                    fraction,
                    analytic,
                    last_step,
                    "Decay step fell outside the trajectory; clamped."
                );
            }
            DecayPoint {
                fraction,
                step,
                clamped,
                predicted_change: decay.eval(step as f64),
            }
        })
        .collect();

    let best_step = decay_points[decay_points.len() / 2].step;
    log.mark_selected(best_step)?;
    info!(best_step, "Selected conformation annotated.");

    Ok(TrajectoryReport {
        first_negative_step,
        decay,
        decay_points,
        best_step,
    })
}
