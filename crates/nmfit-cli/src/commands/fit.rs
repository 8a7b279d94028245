use crate::checklist;
use crate::cli::FitArgs;
use crate::config::PartialFitConfig;
use crate::error::{CliError, Result};
use crate::tools::afmize::Afmize;
use crate::tools::nma::RtbSolver;
use crate::tools::profit::ProFit;
use crate::utils::progress::CliProgressHandler;
use nmfit::core::io::tsv;
use nmfit::engine::collaborators::StructureAligner;
use nmfit::engine::error::EngineError;
use nmfit::engine::progress::ProgressReporter;
use nmfit::engine::trajectory::TrajectoryLog;
use nmfit::workflows;
use std::path::Path;
use tracing::{info, warn};

pub fn run(args: FitArgs) -> Result<()> {
    let partial = PartialFitConfig::from_file(&args.config)?;
    let config = partial.merge_with_cli(&args)?;

    let base_name = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CliError::Argument("input path has no usable file name".to_string()))?
        .to_string();
    let extension = args
        .input
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("pdb")
        .to_string();
    let log_path = args.run_dir.join("run_log.csv");
    let step0_dir = args.run_dir.join(format!("{base_name}#s0"));

    checklist::verify_tools(&partial.tools, args.reference.is_some())?;
    checklist::verify_run_layout(&args, &log_path, &step0_dir)?;
    checklist::print_summary(&args, &config);
    if !args.yes && !checklist::confirm()? {
        println!("Run cancelled.");
        return Ok(());
    }

    std::fs::create_dir_all(&args.run_dir)?;

    info!("Loading target image from {:?}", &args.target);
    let target =
        tsv::read_height_map_from_path(&args.target).map_err(|e| CliError::FileParsing {
            path: args.target.clone(),
            source: e.into(),
        })?;

    let solver = RtbSolver::new(partial.tools.nma_dir.clone(), config.last_mode);
    let renderer = Afmize::new(partial.tools.afmize.clone());
    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting flexible fitting...");
    info!("Invoking the core refinement workflow...");
    let outcome = workflows::refine::run(
        &args.input,
        &target,
        &args.run_dir,
        &log_path,
        &config,
        &solver,
        &renderer,
        &reporter,
    )?;
    let mut log = outcome.log;
    println!(
        "✓ Fitting finished after {} step(s). Final structure: {}",
        log.len(),
        outcome.final_structure.display()
    );

    match &partial.tools.profit {
        Some(profit_path) => {
            println!("Computing RMSD annotations...");
            let aligner = ProFit::new(profit_path.clone());
            annotate_rmsd(
                &mut log,
                &aligner,
                &args.run_dir,
                &extension,
                args.reference.as_deref(),
            )?;
        }
        None => info!("ProFit not configured; skipping RMSD bookkeeping."),
    }

    match workflows::analyze::run(&mut log, &config.decay_fractions) {
        Ok(report) => super::analyze::print_report(&report, &log),
        Err(EngineError::FitDivergence { source }) => {
            // A short or irregular trajectory is still a valid run; the
            // operator just gets no best-step recommendation.
            warn!("Convergence analysis skipped: {source}");
            println!("Convergence analysis skipped: {source}");
        }
        Err(e) => return Err(e.into()),
    }

    println!("Trajectory log written to {}", log.path().display());
    Ok(())
}

/// Attaches RMSD-to-initial (and optionally RMSD-to-reference) to every
/// logged step, aligning against the copies collected under `summary/`.
fn annotate_rmsd(
    log: &mut TrajectoryLog,
    aligner: &dyn StructureAligner,
    run_root: &Path,
    extension: &str,
    reference: Option<&Path>,
) -> Result<()> {
    let summary = run_root.join("summary");
    let steps: Vec<(u64, String)> = log
        .records()
        .iter()
        .map(|r| (r.step, r.label.clone()))
        .collect();
    let initial = steps
        .first()
        .map(|(_, label)| summary.join(format!("{label}.{extension}")))
        .ok_or_else(|| CliError::Argument("trajectory log holds no steps".to_string()))?;

    for (step, label) in steps {
        let mobile = summary.join(format!("{label}.{extension}"));
        let to_initial = if step == 0 {
            0.0
        } else {
            aligner
                .rmsd(&initial, &mobile)
                .map_err(EngineError::Collaborator)?
        };
        let to_reference = reference
            .map(|r| aligner.rmsd(r, &mobile))
            .transpose()
            .map_err(EngineError::Collaborator)?;
        log.annotate_rmsd(step, Some(to_initial), to_reference)
            .map_err(EngineError::from)?;
    }
    info!("RMSD annotations written.");
    Ok(())
}
