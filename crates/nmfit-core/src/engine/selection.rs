use super::config::ModeSelection;
use super::error::EngineError;
use super::sensitivity::{ModeFit, Sample};
use tracing::debug;

/// The single chosen action for the next perturbation. Exactly one per
/// iteration; immutable once selected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    pub mode: u32,
    pub amplitude: f64,
}

impl ModeSelection {
    /// Turns one iteration's sensitivity estimates into the next move.
    ///
    /// `ranked` must be the sensitivity table sorted descending by
    /// similarity; `fits` must be in mode-encounter order. Ties are broken by
    /// that order in both cases.
    pub fn select(
        &self,
        fits: &[ModeFit],
        ranked: &[Sample],
        combined_amplitude: f64,
    ) -> Result<Move, EngineError> {
        let chosen = match self {
            ModeSelection::Slope => {
                // Replace only on strictly larger |slope| so ties keep the
                // earliest mode.
                let mut best: Option<&ModeFit> = None;
                for fit in fits {
                    match best {
                        Some(current) if fit.slope.abs() <= current.slope.abs() => {}
                        _ => best = Some(fit),
                    }
                }
                let best = best.ok_or(EngineError::NoCandidateMove)?;
                // Positive slope predicts similarity rising with amplitude,
                // so move the full amplitude in the slope's direction.
                Move {
                    mode: best.mode,
                    amplitude: combined_amplitude.copysign(best.slope),
                }
            }
            ModeSelection::MaxCc => {
                let best = ranked.first().ok_or(EngineError::NoCandidateMove)?;
                Move {
                    mode: best.mode,
                    amplitude: best.amplitude,
                }
            }
            ModeSelection::MaxCcForceMove => {
                let best = ranked
                    .iter()
                    .find(|s| s.amplitude != 0.0)
                    .ok_or(EngineError::NoCandidateMove)?;
                Move {
                    mode: best.mode,
                    amplitude: best.amplitude,
                }
            }
        };

        debug!(strategy = %self, mode = chosen.mode, amplitude = chosen.amplitude, "Move selected.");
        Ok(chosen)
    }
}
