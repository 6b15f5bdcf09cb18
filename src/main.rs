use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use deconvsim::{
    HandlerSet, LogAggregator, MetadataDefaults, ParamMap, PipelineOrchestrator,
    SimulationConfig, generate_cell_params, read_config_file,
};

#[derive(Parser)]
#[command(name = "deconvsim")]
#[command(author, version, about = "Microscopy deconvolution benchmark pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured simulation steps
    Run {
        /// Tab-separated run configuration (defaults are used when omitted)
        config: Option<PathBuf>,

        /// Directory holding the `<step>_batch` programs (default: PATH)
        #[arg(long)]
        bin_dir: Option<PathBuf>,

        /// Seed for cell-parameter generation
        #[arg(long)]
        seed: Option<u64>,

        /// Delete log fragments after merging them
        #[arg(long)]
        prune_log_fragments: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate a cell-parameter table without running the pipeline
    GenerateParams {
        /// Tab-separated run configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output table
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Merge the log fragments of a folder into one table
    CombineLog {
        /// Folder holding the fragments
        #[arg(short, long)]
        folder: PathBuf,

        /// Voxel size of unresized data
        #[arg(long, default_value = "0.3")]
        voxel_size: f64,

        /// Cell kind assumed when a name does not mention one
        #[arg(long, default_value = "ellipsoid")]
        cell_kind: String,

        /// Delete fragments after merging
        #[arg(long)]
        prune: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the coerced configuration
    ShowConfig {
        config: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            bin_dir,
            seed,
            prune_log_fragments,
            json,
            verbose,
        } => {
            setup_logging(verbose);
            run_pipeline(config, bin_dir, seed, prune_log_fragments, json).await
        }
        Commands::GenerateParams {
            config,
            output,
            seed,
            verbose,
        } => {
            setup_logging(verbose);
            generate_params(config, &output, seed)
        }
        Commands::CombineLog {
            folder,
            voxel_size,
            cell_kind,
            prune,
            verbose,
        } => {
            setup_logging(verbose);
            combine_log(&folder, voxel_size, cell_kind, prune)
        }
        Commands::ShowConfig { config, json } => show_config(config, json),
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(path: Option<PathBuf>) -> Result<SimulationConfig> {
    let raw = match &path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            read_config_file(path).context("Failed to read configuration")?
        }
        None => ParamMap::new(),
    };
    SimulationConfig::from_params(raw).context("Invalid configuration")
}

async fn run_pipeline(
    config: Option<PathBuf>,
    bin_dir: Option<PathBuf>,
    seed: Option<u64>,
    prune_log_fragments: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config)?;
    info!(
        "Simulation folder {:?}, steps {:?}",
        config.simulation_folder, config.simulation_steps
    );

    let handlers = HandlerSet::commands(bin_dir.as_deref());
    let mut orchestrator = PipelineOrchestrator::new(config, handlers);
    if let Some(seed) = seed {
        orchestrator = orchestrator.with_seed(seed);
    }
    if prune_log_fragments {
        let aggregator = LogAggregator {
            prune_fragments: true,
            defaults: MetadataDefaults::for_config(orchestrator.config()),
        };
        orchestrator = orchestrator.with_aggregator(aggregator);
    }

    let report = orchestrator.run().await.context("Simulation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for stage in &report.stages {
        info!(
            "{}: {:?} in {:.1}s",
            stage.stage, stage.folders.output, stage.elapsed_secs
        );
    }
    match &report.log_table {
        Some(path) => info!("Log table written to {:?}", path),
        None => info!("No log fragments were written"),
    }
    info!("Run {} complete", report.run_id);
    Ok(())
}

fn generate_params(config: Option<PathBuf>, output: &Path, seed: Option<u64>) -> Result<()> {
    let config = load_config(config)?;
    let settings = config.cell_generation()?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let table = generate_cell_params(&settings, &mut rng)?;
    table
        .save(output)
        .with_context(|| format!("Failed to write {:?}", output))?;
    info!("Wrote {} cells to {:?}", table.len(), output);
    Ok(())
}

fn combine_log(folder: &Path, voxel_size: f64, cell_kind: String, prune: bool) -> Result<()> {
    let aggregator = LogAggregator {
        defaults: MetadataDefaults {
            voxel_size,
            cell_kind,
        },
        prune_fragments: prune,
    };
    match aggregator.combine(folder)? {
        Some(path) => info!("Log table written to {:?}", path),
        None => info!("Nothing to combine in {:?}", folder),
    }
    Ok(())
}

fn show_config(config: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(config.params())?);
        return Ok(());
    }
    for (key, value) in config.params() {
        println!("{}\t{}", key, value);
    }
    Ok(())
}
