//! CLI binary for running, watching, and validating sitepipe pipelines.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use sitepipe_pipeline::{
    load_document, validate, ChangeFilter, FileRunner, PipelineExecutor, PipelineResult,
    RunOptions, Severity, StepGraph, WatchConfig, WatchController, FAST_MODE,
};
use sitepipe_types::StepStatus;
use tracing_subscriber::EnvFilter;

const DEFAULT_PIPELINE: &str = "sitepipe.json";

#[derive(Parser)]
#[command(name = "sitepipe", version, about = "Declarative build-pipeline runner for static sites")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline once
    Run {
        /// Path to the pipeline document
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,

        #[command(flatten)]
        run: RunArgs,

        /// Print the result as JSON instead of per-step lines
        #[arg(long)]
        json: bool,
    },
    /// Re-run the pipeline whenever files under its base directory change
    Watch {
        /// Path to the pipeline document
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,

        #[command(flatten)]
        run: RunArgs,

        /// Quiet period after the last change before re-running
        #[arg(long, default_value = "300")]
        debounce_ms: u64,

        /// Wait for the first change instead of running immediately
        #[arg(long)]
        no_initial_run: bool,
    },
    /// Check a pipeline for configuration errors without running it
    Validate {
        /// Path to the pipeline document
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
    },
    /// Show the merged step list
    Info {
        /// Path to the pipeline document
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
    },
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Run mode; steps filter on it with modes/skipModes
    #[arg(long, conflicts_with = "fast")]
    mode: Option<String>,

    /// Shorthand for --mode fast
    #[arg(long)]
    fast: bool,

    /// Run only these steps (id, task, task#position, or position)
    #[arg(long)]
    only: Vec<String>,

    /// Skip these steps (id, task, task#position, or position)
    #[arg(long)]
    skip: Vec<String>,

    /// Resolve step paths against this directory instead of the document's
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

impl RunArgs {
    fn options(&self) -> anyhow::Result<RunOptions> {
        let mode = if self.fast {
            Some(FAST_MODE.to_string())
        } else {
            self.mode.clone()
        };
        let base_dir_override = match &self.base_dir {
            Some(dir) => Some(std::fs::canonicalize(dir)?),
            None => None,
        };
        Ok(RunOptions {
            mode,
            only: self.only.clone(),
            skip: self.skip.clone(),
            base_dir_override,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --verbose wins over SITEPIPE_LOG
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SITEPIPE_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run { pipeline, run, json } => {
            cmd_run(&pipeline, &run, json).await?;
        }
        Commands::Watch {
            pipeline,
            run,
            debounce_ms,
            no_initial_run,
        } => {
            cmd_watch(&pipeline, &run, debounce_ms, no_initial_run).await?;
        }
        Commands::Validate { pipeline } => {
            cmd_validate(&pipeline)?;
        }
        Commands::Info { pipeline } => {
            cmd_info(&pipeline)?;
        }
    }

    Ok(())
}

fn load_graph(path: &Path) -> anyhow::Result<StepGraph> {
    let doc = load_document(path)?;
    let graph = StepGraph::from_document(&doc)?;
    Ok(graph)
}

fn status_tag(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Succeeded => "OK",
        StepStatus::Failed => "FAIL",
        StepStatus::AllowedFailure => "WARN",
        StepStatus::Skipped => "SKIP",
    }
}

fn print_result(result: &PipelineResult) {
    for step in &result.steps {
        println!(
            "[{:<4}] {:>2}. {} ({}) {}ms  {}",
            status_tag(step.status),
            step.position,
            step.id,
            step.task,
            step.duration_ms,
            step.message
        );
    }
    println!(
        "\n{} in {}ms: {} succeeded, {} allowed failures, {} skipped, {} failed (mode {}, run {})",
        if result.success { "Pipeline succeeded" } else { "Pipeline failed" },
        result.duration_ms,
        result.count(StepStatus::Succeeded),
        result.count(StepStatus::AllowedFailure),
        result.count(StepStatus::Skipped),
        result.count(StepStatus::Failed),
        result.mode,
        result.run_id,
    );
}

async fn cmd_run(path: &Path, run: &RunArgs, json: bool) -> anyhow::Result<()> {
    let options = run.options()?;
    let executor = PipelineExecutor::with_default_registry();
    let result = executor.run_file(path, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_watch(path: &Path, run: &RunArgs, debounce_ms: u64, no_initial_run: bool) -> anyhow::Result<()> {
    let options = run.options()?;
    let path = std::fs::canonicalize(path)?;
    let graph = load_graph(&path)?;
    let root = options
        .base_dir_override
        .clone()
        .unwrap_or_else(|| graph.base_dir.clone());
    let filter = ChangeFilter::for_graph(&graph, &root)?;
    for ignored in filter.ignore_roots() {
        tracing::debug!(path = %ignored.display(), "Ignoring step output");
    }

    let runner = FileRunner::new(PipelineExecutor::with_default_registry(), path.clone(), options);
    let config = WatchConfig {
        debounce: Duration::from_millis(debounce_ms),
        run_on_start: !no_initial_run,
    };
    let controller = WatchController::new(runner, filter, config);

    let cancel = controller.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current run");
            cancel.cancel();
        }
    });

    println!("Watching {} (Ctrl-C to stop)", root.display());
    let stats = controller.watch(&root).await?;
    println!(
        "Stopped after {} runs ({} could not start)",
        stats.runs, stats.errors
    );
    if let Some(last) = &stats.last_result {
        println!(
            "Last run {}: {}",
            last.run_id,
            if last.success { "succeeded" } else { "failed" }
        );
    }
    Ok(())
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let graph = load_graph(path)?;
    let registry = sitepipe_pipeline::default_registry();
    let diagnostics = validate(&graph, &registry);

    if diagnostics.is_empty() {
        println!("Pipeline is valid ({} steps)", graph.len());
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        let step = diag.step_id.as_deref().unwrap_or("-");
        println!("[{}] {} ({}): {}", severity, diag.rule, step, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let graph = load_graph(path)?;

    println!("Pipeline: {}", graph.source.display());
    println!("Base directory: {}", graph.base_dir.display());
    println!("Steps: {}", graph.len());

    println!("\nSteps:");
    for step in graph.steps() {
        let mut line = format!("  {:>2}. {} [{}]", step.position, step.id, step.task);
        if let Some(name) = &step.name {
            line.push_str(&format!(" \"{name}\""));
        }
        if !step.depends_on.is_empty() {
            let deps: Vec<String> = step.depends_on.iter().map(usize::to_string).collect();
            line.push_str(&format!(" after={}", deps.join(",")));
        }
        let modes = step.allowed_modes();
        if !modes.is_empty() {
            line.push_str(&format!(" modes={}", modes.join(",")));
        }
        if !step.skip_modes.is_empty() {
            line.push_str(&format!(" skipModes={}", step.skip_modes.join(",")));
        }
        if step.allow_failure {
            line.push_str(" allowFailure");
        }
        println!("{line}");
    }

    Ok(())
}
