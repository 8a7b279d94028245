use crate::cli::AnalyzeArgs;
use crate::error::{CliError, Result};
use nmfit::engine::config::DEFAULT_DECAY_FRACTIONS;
use nmfit::engine::error::EngineError;
use nmfit::engine::trajectory::TrajectoryLog;
use nmfit::workflows::analyze::TrajectoryReport;
use nmfit::workflows;
use tracing::info;

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let fractions = args
        .fractions
        .unwrap_or_else(|| DEFAULT_DECAY_FRACTIONS.to_vec());
    for &fraction in &fractions {
        if fraction <= 0.0 || fraction >= 1.0 {
            return Err(CliError::Argument(format!(
                "decay fraction {fraction} must lie strictly between 0 and 1"
            )));
        }
    }

    info!("Opening trajectory log {:?}", &args.log);
    let mut log = TrajectoryLog::open(&args.log).map_err(EngineError::from)?;
    let report = workflows::analyze::run(&mut log, &fractions)?;
    print_report(&report, &log);
    Ok(())
}

pub(crate) fn print_report(report: &TrajectoryReport, log: &TrajectoryLog) {
    println!("\n=== Convergence Report ===\n");
    println!(
        "Per-step improvement decays as {:.4} * exp({:.4} * (step - 1)).",
        report.decay.a, report.decay.b
    );
    if let Some(step) = report.first_negative_step {
        println!("First similarity drop at step {step}.");
    }
    for point in &report.decay_points {
        let note = if point.clamped { " (clamped)" } else { "" };
        println!(
            "  {:>5.2}% residual improvement -> step {}{}",
            point.fraction * 100.0,
            point.step,
            note
        );
    }
    if let Some(best) = log.records().iter().find(|r| r.step == report.best_step) {
        println!(
            "\n✓ Selected conformation: {} (step {}, similarity {:.4})",
            best.label, best.step, best.similarity
        );
    }
}
