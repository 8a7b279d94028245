use crate::core::image::{self, HeightMap};
use crate::engine::collaborators::{ImageRenderer, NormalModeSolver};
use crate::engine::config::FittingConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::sensitivity::{amplitude_schedule, Sample, SensitivityTable};
use crate::engine::state::{perturbed_file_name, RunState};
use crate::engine::termination::Decision;
use crate::engine::trajectory::{TrajectoryLog, TrajectoryRecord};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Extra passes reserved beyond the nominal iteration budget, so the
/// controller can still record a final row when the selected amplitude
/// reaches zero exactly at the budget boundary.
const ITERATION_SLACK: usize = 10;

#[derive(Debug)]
pub struct RefineOutcome {
    /// The completed trajectory, already flushed to its backing file.
    pub log: TrajectoryLog,
    /// The structure of the last recorded step.
    pub final_structure: PathBuf,
}

struct WorkUnit {
    mode: u32,
    amplitude: f64,
}

/// Drives the adaptive refinement loop: sweep, fit, select, score, record,
/// decide, deform, repeat.
///
/// The loop is sequential across iterations because each move depends on the
/// previous iteration's full sensitivity sweep; within one iteration the
/// per-mode/per-amplitude renders are dispatched in parallel and joined
/// before any mode is fitted. Any collaborator failure aborts the run with
/// no partial record for the failing iteration.
#[instrument(skip_all, name = "refine_workflow")]
pub fn run(
    initial_structure: &Path,
    target: &HeightMap,
    run_root: &Path,
    log_path: &Path,
    config: &FittingConfig,
    solver: &dyn NormalModeSolver,
    renderer: &dyn ImageRenderer,
    reporter: &ProgressReporter,
) -> Result<RefineOutcome, EngineError> {
    let base_name = initial_structure
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            EngineError::Internal(format!(
                "Initial structure path has no usable file stem: {}",
                initial_structure.display()
            ))
        })?
        .to_string();
    let extension = initial_structure
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("pdb")
        .to_string();

    let mut state = RunState::new(run_root, &base_name, &extension);
    state.prepare_iteration()?;
    fs::copy(initial_structure, state.structure_path())?;

    let mut log = TrajectoryLog::create(log_path)?;
    let schedule = amplitude_schedule(config.combined_amplitude);

    info!(
        modes = config.mode_count(),
        amplitude = config.combined_amplitude,
        budget = config.iteration_budget,
        strategy = %config.mode_selection,
        termination = %config.termination,
        "Starting refinement run."
    );

    for _pass in 0..(config.iteration_budget + ITERATION_SLACK) {
        state.prepare_iteration()?;
        let structure = state.structure_path();
        let modes_dir = state.modes_dir();

        // === Phase 1: sensitivity sweep over all modes and amplitudes ===
        reporter.report(Progress::PhaseStart { name: "Mode Sweep" });
        solver.compute_modes(&modes_dir, &structure)?;

        let mut units = Vec::with_capacity(config.mode_count() * schedule.len());
        for mode in config.modes() {
            for &amplitude in &schedule {
                units.push(WorkUnit { mode, amplitude });
            }
        }
        reporter.report(Progress::TaskStart {
            total: units.len() as u64,
        });

        let score_unit = |unit: &WorkUnit| -> Result<Sample, EngineError> {
            let output = modes_dir.join(perturbed_file_name(unit.mode, unit.amplitude, &extension));
            solver.perturb(&modes_dir, &structure, unit.mode, unit.amplitude, &output)?;
            let rendered = renderer.render(&output, &config.render)?;
            let similarity = image::similarity(&rendered, target)?;
            reporter.report(Progress::TaskIncrement { amount: 1 });
            Ok(Sample {
                mode: unit.mode,
                amplitude: unit.amplitude,
                similarity,
            })
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<Result<Sample, EngineError>> = units.iter().map(score_unit).collect();

        #[cfg(feature = "parallel")]
        let results: Vec<Result<Sample, EngineError>> = units.par_iter().map(score_unit).collect();

        reporter.report(Progress::TaskFinish);

        // The join above guarantees the full amplitude set per mode before
        // any fit is attempted.
        let mut table = SensitivityTable::new();
        for result in results {
            table.push(result?);
        }

        // === Phase 2: fit, rank and persist ===
        let fits = table.fit_modes(config.first_mode, config.last_mode)?;
        let ranked = table.ranked();
        table.persist(&fits, &state.iteration_dir())?;
        reporter.report(Progress::PhaseFinish);

        // === Phase 3: select the next move ===
        let chosen = config
            .mode_selection
            .select(&fits, &ranked, config.combined_amplitude)?;

        // === Phase 4: score the unperturbed current structure and record ===
        let current_image = renderer.render(&structure, &config.render)?;
        let similarity = image::similarity(&current_image, target)?;
        let rolling_avg = log.rolling_average_with(similarity, config.rolling_window);

        let record = TrajectoryRecord {
            step: state.step(),
            label: state.conformation_name(),
            similarity,
            mode: chosen.mode,
            amplitude: chosen.amplitude,
            rolling_avg,
            rmsd_to_initial: None,
            rmsd_to_reference: None,
            selected: false,
        };

        let decision = config.termination.decide(
            &log,
            &record,
            state.deformed_times(),
            config.iteration_budget,
            config.rolling_window,
        );

        info!(
            step = record.step,
            similarity = record.similarity,
            rolling_avg = record.rolling_avg,
            mode = record.mode,
            amplitude = record.amplitude,
            "Iteration scored."
        );
        log.append(record)?;
        state.summarize_structure()?;

        if decision == Decision::Stop {
            break;
        }

        // === Phase 5: materialize the move and advance ===
        state.prepare_next_iteration()?;
        solver.perturb(
            &modes_dir,
            &structure,
            chosen.mode,
            chosen.amplitude,
            &state.next_structure_path(),
        )?;
        state.advance();
    }

    info!(steps = log.len(), "Refinement run finished.");
    Ok(RefineOutcome {
        final_structure: state.structure_path(),
        log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::collaborators::CollaboratorError;
    use crate::engine::config::{
        test_render_settings, FittingConfigBuilder, ModeSelection, RenderSettings, Termination,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A one-dimensional toy world: a "structure" file holds a single
    /// number, each mode shifts it with its own weight, and the rendered
    /// image embeds the number so similarity peaks when it matches the
    /// target value.
    struct ToySolver;

    impl NormalModeSolver for ToySolver {
        fn compute_modes(&self, work_dir: &Path, _structure: &Path) -> Result<(), CollaboratorError> {
            fs::create_dir_all(work_dir)
                .map_err(|e| CollaboratorError::new("toy-nma", e.to_string()))?;
            Ok(())
        }

        fn perturb(
            &self,
            _work_dir: &Path,
            structure: &Path,
            mode: u32,
            amplitude: f64,
            output: &Path,
        ) -> Result<(), CollaboratorError> {
            let value = read_value(structure);
            // Mode 1 moves the value directly; mode 2 drags it backwards.
            let weight = match mode {
                1 => 1.0,
                _ => -0.25,
            };
            fs::write(output, format!("{}", value + weight * amplitude))
                .map_err(|e| CollaboratorError::new("toy-nma", e.to_string()))?;
            Ok(())
        }
    }

    fn read_value(path: &Path) -> f64 {
        fs::read_to_string(path).unwrap().trim().parse().unwrap()
    }

    fn image_for(value: f64) -> HeightMap {
        // A fixed ramp plus the encoded value keeps the map non-constant
        // and makes the correlation vary smoothly with the value.
        HeightMap::new(2, 2, vec![0.0, 1.0, 2.0, value]).unwrap()
    }

    struct ToyRenderer {
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl ToyRenderer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after: None,
            }
        }

        fn failing_after(calls: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_after: Some(calls),
            }
        }
    }

    impl ImageRenderer for ToyRenderer {
        fn render(
            &self,
            structure: &Path,
            _settings: &RenderSettings,
        ) -> Result<HeightMap, CollaboratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_after {
                if call >= limit {
                    return Err(CollaboratorError::new("toy-afm", "simulator crashed")
                        .with_status(Some(1))
                        .with_output("stage misaligned"));
                }
            }
            Ok(image_for(read_value(structure)))
        }
    }

    fn config(budget: usize, strategy: ModeSelection) -> FittingConfig {
        FittingConfigBuilder::new()
            .combined_amplitude(10.0)
            .mode_range(1, 2)
            .mode_selection(strategy)
            .termination(Termination::Numeric)
            .iteration_budget(budget)
            .render(test_render_settings())
            .build()
            .unwrap()
    }

    fn setup_run(initial_value: f64) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let initial = dir.path().join("toy.pdb");
        fs::write(&initial, format!("{initial_value}")).unwrap();
        let log_path = dir.path().join("run_log.csv");
        (dir, initial, log_path)
    }

    #[test]
    fn numeric_run_records_budget_plus_one_contiguous_steps() {
        let (dir, initial, log_path) = setup_run(0.0);
        let target = image_for(100.0);
        let reporter = ProgressReporter::default();

        let outcome = run(
            &initial,
            &target,
            dir.path(),
            &log_path,
            &config(2, ModeSelection::Slope),
            &ToySolver,
            &ToyRenderer::new(),
            &reporter,
        )
        .unwrap();

        // deformed_times hits the budget at step 2; that row is still recorded.
        let records = outcome.log.records();
        assert_eq!(records.len(), 3);
        for (idx, record) in records.iter().enumerate() {
            assert_eq!(record.step, idx as u64);
        }
        assert!(outcome.final_structure.ends_with("toy#s2/toy#s2.pdb"));
    }

    #[test]
    fn slope_strategy_moves_toward_the_target() {
        let (dir, initial, log_path) = setup_run(0.0);
        let target = image_for(40.0);
        let reporter = ProgressReporter::default();

        let outcome = run(
            &initial,
            &target,
            dir.path(),
            &log_path,
            &config(3, ModeSelection::Slope),
            &ToySolver,
            &ToyRenderer::new(),
            &reporter,
        )
        .unwrap();

        let records = outcome.log.records();
        assert!(records.last().unwrap().similarity > records[0].similarity);
        // Mode 1 has four times the leverage of mode 2, so slope picks it.
        assert_eq!(records[0].mode, 1);
        assert_eq!(records[0].amplitude, 10.0);
    }

    #[test]
    fn maxcc_at_the_optimum_selects_zero_and_stops_immediately() {
        let (dir, initial, log_path) = setup_run(50.0);
        let target = image_for(50.0);
        let reporter = ProgressReporter::default();

        let outcome = run(
            &initial,
            &target,
            dir.path(),
            &log_path,
            &config(100, ModeSelection::MaxCc),
            &ToySolver,
            &ToyRenderer::new(),
            &reporter,
        )
        .unwrap();

        let records = outcome.log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amplitude, 0.0);
        assert!((records[0].similarity - 1.0).abs() < 1e-9);
    }

    #[test]
    fn render_failure_aborts_with_only_completed_iterations_logged() {
        let (dir, initial, log_path) = setup_run(0.0);
        let target = image_for(100.0);
        let reporter = ProgressReporter::default();

        // 2 modes x 5 amplitudes + 1 current-structure render per iteration:
        // fail partway through the second iteration's sweep.
        let renderer = ToyRenderer::failing_after(14);
        let err = run(
            &initial,
            &target,
            dir.path(),
            &log_path,
            &config(10, ModeSelection::Slope),
            &ToySolver,
            &renderer,
            &reporter,
        )
        .unwrap_err();

        match err {
            EngineError::Collaborator(inner) => {
                assert_eq!(inner.tool, "toy-afm");
                assert!(inner.captured_output.contains("stage misaligned"));
            }
            other => panic!("expected collaborator failure, got {other}"),
        }

        let log = TrajectoryLog::open(&log_path).unwrap();
        assert_eq!(log.len(), 1, "only the completed first iteration is logged");
    }

    #[test]
    fn unit_amplitude_sweeps_each_perturbation_once() {
        let (dir, initial, log_path) = setup_run(0.0);
        let target = image_for(5.0);
        let reporter = ProgressReporter::default();

        let config = FittingConfigBuilder::new()
            .combined_amplitude(1.0)
            .mode_range(1, 2)
            .mode_selection(ModeSelection::Slope)
            .termination(Termination::Numeric)
            .iteration_budget(1)
            .render(test_render_settings())
            .build()
            .unwrap();
        let renderer = ToyRenderer::new();

        run(
            &initial,
            &target,
            dir.path(),
            &log_path,
            &config,
            &ToySolver,
            &renderer,
            &reporter,
        )
        .unwrap();

        let modes = dir.path().join("toy#s0").join("modes");
        assert!(modes.join("1#-1.pdb").is_file());
        assert!(modes.join("1#0.pdb").is_file());
        assert!(modes.join("1#1.pdb").is_file());
        // 2 modes x 3 distinct amplitudes + the current structure, twice.
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 14);
    }

    #[test]
    fn iteration_artifacts_are_persisted_per_step() {
        let (dir, initial, log_path) = setup_run(0.0);
        let target = image_for(30.0);
        let reporter = ProgressReporter::default();

        run(
            &initial,
            &target,
            dir.path(),
            &log_path,
            &config(1, ModeSelection::Slope),
            &ToySolver,
            &ToyRenderer::new(),
            &reporter,
        )
        .unwrap();

        let step0 = dir.path().join("toy#s0");
        assert!(step0.join("cc_table.csv").is_file());
        assert!(step0.join("slope_table.csv").is_file());
        assert!(step0.join("modes").join("1#-10.pdb").is_file());
        assert!(step0.join("modes").join("2#0.pdb").is_file());
        assert!(dir.path().join("summary").join("toy#s0.pdb").is_file());
        assert!(dir.path().join("toy#s1").join("toy#s1.pdb").is_file());
    }
}
