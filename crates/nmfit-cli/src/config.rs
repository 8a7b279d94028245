use crate::cli::FitArgs;
use crate::error::{CliError, Result};
use nmfit::engine::config::{
    FittingConfig, FittingConfigBuilder, ModeSelection, RenderSettings, Termination,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The `[fitting]` section of the configuration file. Everything is optional
/// here; completeness is enforced after CLI overrides are merged in.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FittingSection {
    pub combined_amplitude: Option<f64>,
    pub first_mode: Option<u32>,
    pub last_mode: Option<u32>,
    pub mode_selection: Option<String>,
    pub termination: Option<String>,
    pub iteration_budget: Option<usize>,
    pub rolling_window: Option<usize>,
    pub decay_fractions: Option<Vec<f64>>,
}

/// The `[render]` section: geometry handed to the AFM image simulator.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RenderSection {
    pub res_x: f64,
    pub res_y: f64,
    pub res_z: f64,
    pub size_x: f64,
    pub size_y: f64,
    pub probe_radius: f64,
    pub probe_angle: f64,
}

impl From<RenderSection> for RenderSettings {
    fn from(s: RenderSection) -> Self {
        Self {
            res_x: s.res_x,
            res_y: s.res_y,
            res_z: s.res_z,
            size_x: s.size_x,
            size_y: s.size_y,
            probe_radius: s.probe_radius,
            probe_angle: s.probe_angle,
        }
    }
}

/// The `[tools]` section: where the external collaborators live.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ToolsSection {
    /// Directory holding the RTB normal-mode scripts (makebloc.pl, rtb2,
    /// movemode.pl).
    pub nma_dir: PathBuf,
    /// Path to the afmize executable.
    pub afmize: PathBuf,
    /// Path to the ProFit executable; only needed for RMSD bookkeeping.
    pub profit: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialFitConfig {
    #[serde(default)]
    pub fitting: FittingSection,
    pub render: RenderSection,
    pub tools: ToolsSection,
}

impl PartialFitConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading configuration file from {:?}", path);
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Merges the file with CLI overrides into the final engine config.
    /// CLI arguments win over the file in every case.
    pub fn merge_with_cli(&self, args: &FitArgs) -> Result<FittingConfig> {
        info!("Merging configuration from file and CLI arguments...");

        let mode_selection = args
            .mode_selection
            .as_deref()
            .or(self.fitting.mode_selection.as_deref())
            .map(str::parse::<ModeSelection>)
            .transpose()?;
        let termination = args
            .termination
            .as_deref()
            .or(self.fitting.termination.as_deref())
            .map(str::parse::<Termination>)
            .transpose()?;

        let mut builder = FittingConfigBuilder::new().render(self.render.clone().into());

        if let Some(amplitude) = args.amplitude.or(self.fitting.combined_amplitude) {
            builder = builder.combined_amplitude(amplitude);
        }
        let first = args.first_mode.or(self.fitting.first_mode);
        let last = args.last_mode.or(self.fitting.last_mode);
        if let (Some(first), Some(last)) = (first, last) {
            builder = builder.mode_range(first, last);
        }
        if let Some(strategy) = mode_selection {
            builder = builder.mode_selection(strategy);
        }
        if let Some(strategy) = termination {
            builder = builder.termination(strategy);
        }
        if let Some(budget) = args.iterations.or(self.fitting.iteration_budget) {
            builder = builder.iteration_budget(budget);
        }
        if let Some(window) = self.fitting.rolling_window {
            builder = builder.rolling_window(window);
        }
        if let Some(fractions) = &self.fitting.decay_fractions {
            builder = builder.decay_fractions(fractions.clone());
        }

        Ok(builder.build()?)
    }
}
