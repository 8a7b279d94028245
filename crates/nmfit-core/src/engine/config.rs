use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Unknown {kind} strategy '{value}'")]
    UnknownStrategy { kind: &'static str, value: String },

    #[error("Combined amplitude must be positive, got {0}")]
    AmplitudeNotPositive(f64),

    #[error("Mode range [{first}, {last}] is invalid: first must be >= 1 and <= last")]
    InvalidModeRange { first: u32, last: u32 },

    #[error("Rolling-average window must be at least 1")]
    WindowTooSmall,

    #[error("Decay fraction {0} must lie strictly between 0 and 1")]
    FractionOutOfRange(f64),

    #[error("At least one decay fraction is required")]
    EmptyDecayFractions,
}

/// How the next (mode, amplitude) move is chosen from a sensitivity sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSelection {
    /// Largest absolute regression slope; full amplitude signed to match it.
    Slope,
    /// Globally best-scoring sample, the unperturbed one included.
    MaxCc,
    /// Best-scoring sample among non-zero amplitudes only.
    MaxCcForceMove,
}

impl FromStr for ModeSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slope" => Ok(Self::Slope),
            "maxcc" => Ok(Self::MaxCc),
            "maxcc_force_move" => Ok(Self::MaxCcForceMove),
            other => Err(ConfigError::UnknownStrategy {
                kind: "mode-selection",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ModeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Slope => "slope",
            Self::MaxCc => "maxcc",
            Self::MaxCcForceMove => "maxcc_force_move",
        };
        f.write_str(name)
    }
}

/// When the iteration loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Iteration budget with early exit on a zero-amplitude move.
    Numeric,
    /// Stop when the rolling-average similarity no longer improves.
    Average,
    /// Stop when the per-step similarity no longer improves.
    Single,
}

impl FromStr for Termination {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "numeric" => Ok(Self::Numeric),
            "average" => Ok(Self::Average),
            "single" => Ok(Self::Single),
            other => Err(ConfigError::UnknownStrategy {
                kind: "termination",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Numeric => "numeric",
            Self::Average => "average",
            Self::Single => "single",
        };
        f.write_str(name)
    }
}

/// Geometry handed through to the image-rendering collaborator. The engine
/// never interprets these values; they only have to be identical across one
/// run so all rendered maps share a sampled shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Resolution along x, in nm.
    pub res_x: f64,
    /// Resolution along y, in nm.
    pub res_y: f64,
    /// Resolution along z, in angstrom.
    pub res_z: f64,
    /// Half-range of the imaged area along x, in nm.
    pub size_x: f64,
    /// Half-range of the imaged area along y, in nm.
    pub size_y: f64,
    /// Probe tip radius, in nm.
    pub probe_radius: f64,
    /// Probe half-cone angle, in degrees.
    pub probe_angle: f64,
}

pub const DEFAULT_ROLLING_WINDOW: usize = 5;
pub const DEFAULT_DECAY_FRACTIONS: [f64; 3] = [0.05, 0.03, 0.01];

#[derive(Debug, Clone, PartialEq)]
pub struct FittingConfig {
    pub combined_amplitude: f64,
    /// Inclusive range of normal-mode indices swept each iteration.
    pub first_mode: u32,
    pub last_mode: u32,
    pub mode_selection: ModeSelection,
    pub termination: Termination,
    pub iteration_budget: usize,
    pub rolling_window: usize,
    pub decay_fractions: Vec<f64>,
    pub render: RenderSettings,
}

impl FittingConfig {
    pub fn mode_count(&self) -> usize {
        (self.last_mode - self.first_mode + 1) as usize
    }

    pub fn modes(&self) -> impl Iterator<Item = u32> + '_ {
        self.first_mode..=self.last_mode
    }
}

#[derive(Default)]
pub struct FittingConfigBuilder {
    combined_amplitude: Option<f64>,
    first_mode: Option<u32>,
    last_mode: Option<u32>,
    mode_selection: Option<ModeSelection>,
    termination: Option<Termination>,
    iteration_budget: Option<usize>,
    rolling_window: Option<usize>,
    decay_fractions: Option<Vec<f64>>,
    render: Option<RenderSettings>,
}

impl FittingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn combined_amplitude(mut self, amplitude: f64) -> Self {
        self.combined_amplitude = Some(amplitude);
        self
    }
    pub fn mode_range(mut self, first: u32, last: u32) -> Self {
        self.first_mode = Some(first);
        self.last_mode = Some(last);
        self
    }
    pub fn mode_selection(mut self, strategy: ModeSelection) -> Self {
        self.mode_selection = Some(strategy);
        self
    }
    pub fn termination(mut self, strategy: Termination) -> Self {
        self.termination = Some(strategy);
        self
    }
    pub fn iteration_budget(mut self, budget: usize) -> Self {
        self.iteration_budget = Some(budget);
        self
    }
    pub fn rolling_window(mut self, window: usize) -> Self {
        self.rolling_window = Some(window);
        self
    }
    pub fn decay_fractions(mut self, fractions: Vec<f64>) -> Self {
        self.decay_fractions = Some(fractions);
        self
    }
    pub fn render(mut self, settings: RenderSettings) -> Self {
        self.render = Some(settings);
        self
    }

    pub fn build(self) -> Result<FittingConfig, ConfigError> {
        let combined_amplitude = self
            .combined_amplitude
            .ok_or(ConfigError::MissingParameter("combined_amplitude"))?;
        if combined_amplitude <= 0.0 {
            return Err(ConfigError::AmplitudeNotPositive(combined_amplitude));
        }

        let first_mode = self
            .first_mode
            .ok_or(ConfigError::MissingParameter("mode_range"))?;
        let last_mode = self
            .last_mode
            .ok_or(ConfigError::MissingParameter("mode_range"))?;
        if first_mode < 1 || first_mode > last_mode {
            return Err(ConfigError::InvalidModeRange {
                first: first_mode,
                last: last_mode,
            });
        }

        let rolling_window = self.rolling_window.unwrap_or(DEFAULT_ROLLING_WINDOW);
        if rolling_window == 0 {
            return Err(ConfigError::WindowTooSmall);
        }

        let decay_fractions = self
            .decay_fractions
            .unwrap_or_else(|| DEFAULT_DECAY_FRACTIONS.to_vec());
        if decay_fractions.is_empty() {
            return Err(ConfigError::EmptyDecayFractions);
        }
        for &fraction in &decay_fractions {
            if fraction <= 0.0 || fraction >= 1.0 {
                return Err(ConfigError::FractionOutOfRange(fraction));
            }
        }

        Ok(FittingConfig {
            combined_amplitude,
            first_mode,
            last_mode,
            mode_selection: self
                .mode_selection
                .ok_or(ConfigError::MissingParameter("mode_selection"))?,
            termination: self.termination.unwrap_or(Termination::Numeric),
            iteration_budget: self
                .iteration_budget
                .ok_or(ConfigError::MissingParameter("iteration_budget"))?,
            rolling_window,
            decay_fractions,
            render: self.render.ok_or(ConfigError::MissingParameter("render"))?,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_render_settings() -> RenderSettings {
    RenderSettings {
        res_x: 1.0,
        res_y: 1.0,
        res_z: 0.64,
        size_x: 25.0,
        size_y: 25.0,
        probe_radius: 2.0,
        probe_angle: 10.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> FittingConfigBuilder {
        FittingConfigBuilder::new()
            .combined_amplitude(10.0)
            .mode_range(7, 16)
            .mode_selection(ModeSelection::Slope)
            .iteration_budget(50)
            .render(test_render_settings())
    }

    #[test]
    fn build_applies_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.termination, Termination::Numeric);
        assert_eq!(config.rolling_window, DEFAULT_ROLLING_WINDOW);
        assert_eq!(config.decay_fractions, vec![0.05, 0.03, 0.01]);
        assert_eq!(config.mode_count(), 10);
    }

    #[test]
    fn missing_amplitude_is_an_error() {
        let result = FittingConfigBuilder::new()
            .mode_range(1, 5)
            .mode_selection(ModeSelection::MaxCc)
            .iteration_budget(10)
            .render(test_render_settings())
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::MissingParameter("combined_amplitude")
        );
    }

    #[test]
    fn non_positive_amplitude_is_rejected() {
        let result = builder().combined_amplitude(0.0).build();
        assert_eq!(result.unwrap_err(), ConfigError::AmplitudeNotPositive(0.0));
    }

    #[test]
    fn inverted_mode_range_is_rejected() {
        let result = builder().mode_range(9, 7).build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::InvalidModeRange { first: 9, last: 7 }
        );
    }

    #[test]
    fn strategies_parse_from_names() {
        assert_eq!("slope".parse::<ModeSelection>().unwrap(), ModeSelection::Slope);
        assert_eq!("maxcc".parse::<ModeSelection>().unwrap(), ModeSelection::MaxCc);
        assert_eq!(
            "maxcc_force_move".parse::<ModeSelection>().unwrap(),
            ModeSelection::MaxCcForceMove
        );
        assert_eq!("average".parse::<Termination>().unwrap(), Termination::Average);
    }

    #[test]
    fn unknown_strategy_name_is_fatal_at_parse_time() {
        let err = "gradient".parse::<ModeSelection>().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownStrategy {
                kind: "mode-selection",
                value: "gradient".to_string()
            }
        );
        assert!("sometimes".parse::<Termination>().is_err());
    }

    #[test]
    fn decay_fraction_bounds_are_enforced() {
        let result = builder().decay_fractions(vec![0.05, 1.5]).build();
        assert_eq!(result.unwrap_err(), ConfigError::FractionOutOfRange(1.5));
    }
}
