//! cfdsweep - parameter sweeps for an external CFD solver
//!
//! ## Commands
//!
//! - `run`: materialize the baseline plus one variation's cases, run them,
//!   print one line per case and finalize every case
//! - `plan`: show the cases a variation would produce without running them
//! - `variations`: list the known variation ids
//!
//! Exit status: 0 when every case succeeded, 1 when at least one case failed,
//! 2 when the sweep could not be set up.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

use cfdsweep_core::config::{DEFAULT_SOLVER, DEFAULT_STUDY};
use cfdsweep_core::{
    build_artifact, case_lines, finalize_batch, render_finalize_notes, render_json_lines,
    render_summary, write_report_json, Batch, BatchRunner, ConcurrencyPolicy, Options,
    SweepConfig, VariationRegistry,
};

#[derive(Parser)]
#[command(name = "cfdsweep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run parameter-sweep studies for an external CFD solver", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the baseline case and the cases of one variation
    Run {
        #[command(flatten)]
        sweep: SweepArgs,

        /// Solver binary
        #[arg(long, env = "CFDSWEEP_SOLVER", default_value = DEFAULT_SOLVER)]
        solver: PathBuf,

        /// Argument placed before the config file (repeatable), e.g. for mpirun
        #[arg(long = "solver-arg", allow_hyphen_values = true)]
        solver_args: Vec<String>,

        /// Maximum number of solver processes running at once
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Run cases one after another
        #[arg(long, conflicts_with = "workers")]
        serial: bool,

        /// Kill a case's solver after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print one JSON object per case instead of text lines
        #[arg(long)]
        report_json: bool,

        /// Also write the full report as pretty JSON to this file
        #[arg(long)]
        report_file: Option<PathBuf>,

        /// Skip promoting restart files to solution files
        #[arg(long)]
        no_finalize: bool,
    },

    /// Show the cases a variation would run, without running them
    Plan {
        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// List the known variation ids
    Variations,
}

#[derive(Args)]
struct SweepArgs {
    /// Which parameter to vary from the baseline
    #[arg(long, default_value = "none")]
    vary: String,

    /// Root directory holding `data/` and `results/`
    #[arg(long, env = "CFDSWEEP_ROOT")]
    root: Option<PathBuf>,

    /// Study path below `data/` and `results/`
    #[arg(long, default_value = DEFAULT_STUDY)]
    study: String,

    /// Override the data directory (baseline config and meshes)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the results directory
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Baseline config file name inside the data directory
    #[arg(long)]
    baseline: Option<String>,
}

impl SweepArgs {
    fn config(&self) -> Result<SweepConfig> {
        let mut config = SweepConfig::from_root(self.root.as_deref(), &self.study)?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.results_dir {
            config.results_dir = dir.clone();
        }
        if let Some(file) = &self.baseline {
            config.baseline_file = file.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cfdsweep_core::init_tracing(cli.json, level);

    let registry = VariationRegistry::builtin();
    let outcome = match cli.command {
        Commands::Run {
            sweep,
            solver,
            solver_args,
            workers,
            serial,
            timeout_secs,
            report_json,
            report_file,
            no_finalize,
        } => {
            let policy = if serial {
                Ok(ConcurrencyPolicy::Serial)
            } else {
                ConcurrencyPolicy::bounded(workers)
            };
            match (sweep.config(), policy) {
                (Ok(mut config), Ok(policy)) => {
                    config.solver = solver;
                    config.solver_args = solver_args;
                    config.policy = policy;
                    config.timeout_secs = timeout_secs;
                    let output = RunOutput {
                        json: report_json,
                        report_file: report_file.as_deref(),
                        finalize: !no_finalize,
                    };
                    cmd_run(&registry, &config, &sweep.vary, output).await
                }
                (Err(e), _) => Err(e),
                (_, Err(e)) => Err(e.into()),
            }
        }
        Commands::Plan { sweep } => sweep
            .config()
            .and_then(|config| cmd_plan(&registry, &config, &sweep.vary)),
        Commands::Variations => cmd_variations(&registry),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

struct RunOutput<'a> {
    json: bool,
    report_file: Option<&'a Path>,
    finalize: bool,
}

/// Load the baseline and build the batch for `vary`.
fn load_batch(
    registry: &VariationRegistry,
    config: &SweepConfig,
    vary: &str,
) -> Result<(Options, Batch)> {
    config.validate()?;
    let baseline = Options::load(&config.baseline_path())
        .with_context(|| format!("Failed to load baseline {}", config.baseline_path().display()))?;
    let cases = registry.plan(vary, config, &baseline)?;
    let batch = Batch::prepare(&baseline, cases).context("Failed to prepare cases")?;
    Ok((baseline, batch))
}

/// Run a sweep and report per-case outcomes
async fn cmd_run(
    registry: &VariationRegistry,
    config: &SweepConfig,
    vary: &str,
    output: RunOutput<'_>,
) -> Result<u8> {
    let (baseline, batch) = load_batch(registry, config, vary)?;

    info!(variation = %vary, cases = batch.len(), solver = %config.solver.display(), "running sweep");
    if !output.json {
        println!("Running variation {} ({} cases)", vary, batch.len());
    }

    let runner = BatchRunner::new(config.policy, Arc::new(config.launcher()));
    let report = runner.run(&batch).await.context("Batch runner failed")?;

    let lines = case_lines(&batch, &report)?;
    if output.json {
        print!("{}", render_json_lines(&lines)?);
    } else {
        print!("{}", render_summary(&lines));
    }

    if let Some(path) = output.report_file {
        let artifact = build_artifact(vary, &batch, &report)?;
        write_report_json(path, &artifact)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), "wrote report");
    }

    if output.finalize {
        let outcomes = finalize_batch(&batch, &baseline);
        let notes = render_finalize_notes(&batch, &outcomes);
        if !notes.is_empty() {
            eprint!("{notes}");
        }
    }

    Ok(report.exit_code() as u8)
}

/// Print the cases a sweep would run
fn cmd_plan(registry: &VariationRegistry, config: &SweepConfig, vary: &str) -> Result<u8> {
    config.validate()?;
    let baseline = Options::load(&config.baseline_path())
        .with_context(|| format!("Failed to load baseline {}", config.baseline_path().display()))?;
    let cases = registry.plan(vary, config, &baseline)?;

    println!("Variation {}: {} cases", vary, cases.len());
    for case in &cases {
        let status = match case.prepare_overrides(&baseline) {
            Ok(_) => "ok".to_string(),
            Err(e) => format!("invalid: {e}"),
        };
        println!("  {} [{}]", case.name(), status);
        println!("    dir:    {}", case.working_directory().display());
        println!("    config: {}", case.config_file_name());
        println!("    log:    {}", case.log_destination());
        for (key, value) in case.overrides().iter() {
            println!("    {key}= {value}");
        }
    }
    Ok(0)
}

/// List variation ids
fn cmd_variations(registry: &VariationRegistry) -> Result<u8> {
    for variation in registry.iter() {
        println!("{:<18} {}", variation.id, variation.description);
    }
    Ok(0)
}
