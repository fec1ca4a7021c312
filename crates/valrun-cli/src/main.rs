//! valrun - Validation Run Orchestrator CLI
//!
//! Runs an external CFD solver across every mesh refinement level of a
//! validation case, plots the results and collects the artifacts.
//!
//! ## Commands
//!
//! - `run`: validate, execute, plot and collect one or all configurations
//! - `validate`: check a configuration's mesh directories without running
//! - `collect`: copy existing results into an output tree

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use uuid::Uuid;

use valrun_core::obs::RunSpan;
use valrun_core::{
    render_summary, ConfigurationSelector, DirectoryValidator, FailurePolicy, PathResolver,
    PlotTriggerPolicy, ResultCollector, TracingSink, ValidationCaseId, ValidationMode,
    ValrunSettings,
};
use valrun_exec::Orchestrator;

#[derive(Parser)]
#[command(name = "valrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validation run orchestrator for CFD mesh refinement studies", long_about = None)]
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
    /// Run the solver over every mesh level, plot, and collect results
    Run {
        #[command(flatten)]
        case: CaseArgs,

        /// Output directory for collected results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        #[command(flatten)]
        overrides: RunOverrides,
    },

    /// Validate mesh directories and print them in run order
    Validate {
        #[command(flatten)]
        case: CaseArgs,

        /// Validation mode (overrides settings)
        #[arg(long, value_enum)]
        validation: Option<ValidationArg>,
    },

    /// Collect existing results into an output directory
    Collect {
        #[command(flatten)]
        case: CaseArgs,

        /// Output directory for collected results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },
}

/// Locates a validation case.
#[derive(Args, Debug, Clone)]
struct CaseArgs {
    /// Case category, e.g. Basic
    #[arg(long)]
    category: String,

    /// Case code, e.g. 2DML
    #[arg(long)]
    case_code: String,

    /// Turbulence model, e.g. SA
    #[arg(long)]
    model: String,

    /// Configuration name, or `All` for every configuration directory
    #[arg(long = "config")]
    configuration: String,

    /// Root of the validation case tree
    #[arg(long, env = "VALRUN_ROOT", default_value = "ValidationCases")]
    root: PathBuf,

    /// Settings file (TOML)
    #[arg(long, env = "VALRUN_SETTINGS")]
    settings: Option<PathBuf>,
}

impl CaseArgs {
    fn selector(&self) -> ConfigurationSelector {
        ConfigurationSelector::parse(&self.configuration)
    }

    fn resolve(&self, resolver: &PathResolver) -> Result<Vec<ValidationCaseId>> {
        resolver
            .resolve_configurations(&self.category, &self.case_code, &self.model, &self.selector())
            .with_context(|| {
                format!(
                    "Failed to resolve {}/{}/{}/{}",
                    self.category, self.case_code, self.model, self.configuration
                )
            })
    }
}

/// Command-line overrides applied on top of the settings file.
#[derive(Args, Debug, Clone, Default)]
struct RunOverrides {
    /// Behaviour when a mesh run fails
    #[arg(long, value_enum)]
    failure_policy: Option<FailurePolicyArg>,

    /// When plotting runs after a batch
    #[arg(long, value_enum)]
    plot_trigger: Option<PlotTriggerArg>,

    /// Validation mode
    #[arg(long, value_enum)]
    validation: Option<ValidationArg>,

    /// Solver timeout per mesh, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Mesh runs in flight at once
    #[arg(long)]
    workers: Option<usize>,

    /// Solver executable
    #[arg(long)]
    solver: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FailurePolicyArg {
    Abort,
    RunAll,
}

impl From<FailurePolicyArg> for FailurePolicy {
    fn from(arg: FailurePolicyArg) -> Self {
        match arg {
            FailurePolicyArg::Abort => FailurePolicy::AbortOnFirstFailure,
            FailurePolicyArg::RunAll => FailurePolicy::RunAllReportPartial,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlotTriggerArg {
    Conservative,
    Permissive,
}

impl From<PlotTriggerArg> for PlotTriggerPolicy {
    fn from(arg: PlotTriggerArg) -> Self {
        match arg {
            PlotTriggerArg::Conservative => PlotTriggerPolicy::Conservative,
            PlotTriggerArg::Permissive => PlotTriggerPolicy::Permissive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ValidationArg {
    Strict,
    Lenient,
}

impl From<ValidationArg> for ValidationMode {
    fn from(arg: ValidationArg) -> Self {
        match arg {
            ValidationArg::Strict => ValidationMode::Strict,
            ValidationArg::Lenient => ValidationMode::Lenient,
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<ValrunSettings> {
    match path {
        Some(path) => ValrunSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(ValrunSettings::default()),
    }
}

fn apply_overrides(settings: &mut ValrunSettings, overrides: &RunOverrides) -> Result<()> {
    if let Some(policy) = overrides.failure_policy {
        settings.batch.failure_policy = policy.into();
    }
    if let Some(trigger) = overrides.plot_trigger {
        settings.plot.trigger = trigger.into();
    }
    if let Some(mode) = overrides.validation {
        settings.validation.mode = mode.into();
    }
    if let Some(timeout) = overrides.timeout_secs {
        settings.solver.timeout_secs = timeout;
    }
    if let Some(workers) = overrides.workers {
        settings.batch.max_workers = workers;
    }
    if let Some(solver) = &overrides.solver {
        settings.solver.binary = solver.clone();
    }
    settings.validate().context("Invalid command-line overrides")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    valrun_core::init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Run {
            case,
            output,
            overrides,
        } => cmd_run(&case, &output, &overrides).await?,
        Commands::Validate { case, validation } => cmd_validate(&case, validation)?,
        Commands::Collect { case, output } => cmd_collect(&case, &output)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn cmd_run(case: &CaseArgs, output: &Path, overrides: &RunOverrides) -> Result<i32> {
    let mut settings = load_settings(case.settings.as_deref())?;
    apply_overrides(&mut settings, overrides)?;

    info!(
        root = %case.root.display(),
        solver = %settings.solver.binary,
        policy = ?settings.batch.failure_policy,
        "starting validation run"
    );

    let orchestrator = Orchestrator::new(settings, &case.root, Arc::new(TracingSink));
    let summary = orchestrator
        .run(
            &case.category,
            &case.case_code,
            &case.model,
            &case.selector(),
            output,
        )
        .await
        .with_context(|| {
            format!(
                "Failed to set up {}/{}/{}/{}",
                case.category, case.case_code, case.model, case.configuration
            )
        })?;

    for report in &summary.reports {
        println!("{}", render_summary(report));
    }
    if summary.reports.len() > 1 {
        println!(
            "Configurations: {} run, exit code {}",
            summary.reports.len(),
            summary.exit_code
        );
    }
    Ok(summary.exit_code)
}

fn cmd_validate(case: &CaseArgs, validation: Option<ValidationArg>) -> Result<i32> {
    let mut settings = load_settings(case.settings.as_deref())?;
    if let Some(mode) = validation {
        settings.validation.mode = mode.into();
    }

    let resolver = PathResolver::new(&case.root);
    let validator = DirectoryValidator::new(settings.validation.mode, settings.input_rules());
    let mut code = 0;

    for id in case.resolve(&resolver)? {
        let _span = RunSpan::enter(&Uuid::new_v4().to_string(), &id.to_string());
        let config_dir = resolver.config_dir(&id);
        match validator.validate(&config_dir) {
            Ok(meshes) => {
                println!("✓ {} ({} mesh directories)", id, meshes.len());
                for mesh in &meshes {
                    let mesh_file = mesh
                        .mesh_file
                        .as_ref()
                        .and_then(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| "-".to_string());
                    println!("  {}  mesh: {}", mesh.name, mesh_file);
                }
            }
            Err(e) => {
                println!("✗ {}: {}", id, e);
                code = 1;
            }
        }
    }
    Ok(code)
}

fn cmd_collect(case: &CaseArgs, output: &Path) -> Result<i32> {
    let settings = load_settings(case.settings.as_deref())?;
    let resolver = PathResolver::new(&case.root);
    let collector = ResultCollector::new(settings.collect_rules());
    let selector = case.selector();

    for id in case.resolve(&resolver)? {
        let _span = RunSpan::enter(&Uuid::new_v4().to_string(), &id.to_string());
        let config_dir = resolver.config_dir(&id);
        let target = selector.output_dir(output, &id);
        let manifest = collector
            .collect(&config_dir, &target)
            .with_context(|| format!("Failed to collect results for {}", id))?;
        println!(
            "✓ {}: {} file(s) from {} mesh directories{} -> {}",
            id,
            manifest.file_count(),
            manifest.meshes.len(),
            if manifest.plots_copied { " plus plots" } else { "" },
            target.display()
        );
        println!("  digest: {}", manifest.digest);
    }
    Ok(0)
}
