use crate::cli::FitArgs;
use crate::config::ToolsSection;
use crate::error::{CliError, Result};
use nmfit::engine::config::FittingConfig;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::info;

const RTB_SCRIPTS: [&str; 3] = ["makebloc.pl", "rtb2", "movemode.pl"];

/// Verifies every external tool the run will call before any work starts.
/// ProFit is only required when RMSD bookkeeping is requested.
pub fn verify_tools(tools: &ToolsSection, needs_profit: bool) -> Result<()> {
    for script in RTB_SCRIPTS {
        let path = tools.nma_dir.join(script);
        if !path.is_file() {
            return Err(CliError::Checklist(format!(
                "{script} not found in {}",
                tools.nma_dir.display()
            )));
        }
    }
    if !tools.afmize.is_file() {
        return Err(CliError::Checklist(format!(
            "afmize not found at {}",
            tools.afmize.display()
        )));
    }
    if needs_profit {
        match &tools.profit {
            Some(path) if path.is_file() => {}
            Some(path) => {
                return Err(CliError::Checklist(format!(
                    "ProFit not found at {}",
                    path.display()
                )));
            }
            None => {
                return Err(CliError::Checklist(
                    "RMSD bookkeeping requested but [tools] profit is not configured".to_string(),
                ));
            }
        }
    }
    info!("All external tools checked.");
    Ok(())
}

/// Verifies the run inputs and refuses to clobber an existing run: both the
/// trajectory log and the first iteration directory must not exist yet.
pub fn verify_run_layout(args: &FitArgs, log_path: &Path, step0_dir: &Path) -> Result<()> {
    if !args.input.is_file() {
        return Err(CliError::Checklist(format!(
            "initial structure {} does not exist",
            args.input.display()
        )));
    }
    let stem = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CliError::Argument("input path has no usable file name".to_string()))?;
    // '#' is the separator in generated names, so an input containing one
    // would make iteration names ambiguous.
    if stem.contains('#') {
        return Err(CliError::Checklist(format!(
            "initial structure name '{stem}' contains '#'; rename it first"
        )));
    }
    if !args.target.is_file() {
        return Err(CliError::Checklist(format!(
            "target image {} does not exist",
            args.target.display()
        )));
    }
    if let Some(reference) = &args.reference {
        if !reference.is_file() {
            return Err(CliError::Checklist(format!(
                "reference structure {} does not exist",
                reference.display()
            )));
        }
    }
    if log_path.exists() {
        return Err(CliError::Checklist(format!(
            "trajectory log {} already exists",
            log_path.display()
        )));
    }
    if step0_dir.exists() {
        return Err(CliError::Checklist(format!(
            "iteration directory {} already exists",
            step0_dir.display()
        )));
    }
    info!("Run layout checked.");
    Ok(())
}

/// Prints the resolved parameters so the operator can eyeball them before
/// the run commits hours of compute.
pub fn print_summary(args: &FitArgs, config: &FittingConfig) {
    println!("\n=== Check List ===\n");
    println!("Initial structure: {} ✓", args.input.display());
    println!("Target image: {} ✓", args.target.display());
    println!("Run directory: {}", args.run_dir.display());
    println!("Iteration budget: {}", config.iteration_budget);
    println!("Combined amplitude: {}", config.combined_amplitude);
    println!(
        "Modes {} to {} will be swept each iteration.",
        config.first_mode, config.last_mode
    );
    println!("Mode selection: {}", config.mode_selection);
    println!("Termination: {}", config.termination);
    println!(
        "Image: {}nm x {}nm at {}nm/{}nm resolution, z {} angstrom",
        config.render.size_x * 2.0,
        config.render.size_y * 2.0,
        config.render.res_x,
        config.render.res_y,
        config.render.res_z
    );
    println!(
        "Probe: radius {}nm, angle {}°",
        config.render.probe_radius, config.render.probe_angle
    );
    match &args.reference {
        Some(reference) => println!("RMSD to reference: {} ✓", reference.display()),
        None => println!("RMSD to reference: skipped"),
    }
    println!();
}

/// Interactive yes/no gate before the run starts.
pub fn confirm() -> Result<bool> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("Start flexible fitting with the above parameters? [yes/no]: ");
        std::io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(false);
        }
        match line.trim().to_lowercase().as_str() {
            "yes" | "y" => return Ok(true),
            "no" | "n" => return Ok(false),
            _ => println!("Please answer 'yes' or 'no'."),
        }
    }
}
