use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::SimulationConfig;
use crate::error::{ConfigError, PipelineError};
use crate::io::{LogAggregator, MetadataDefaults, write_params_file};
use crate::models::generate_cell_params;
use crate::pipeline::{BatchJob, HandlerSet, StageFolders, resolve_folder};
use crate::stages::{Stage, parse_steps};

/// Name of the run-metadata file written into the run root
pub const METADATA_FILENAME: &str = "simulation_parameters.csv";
pub const START_TIME_KEY: &str = "Time of the simulation start";
pub const RUN_ID_KEY: &str = "Run id";

/// Where a run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    NotStarted,
    /// Index into the configured step list
    RunningStage(usize),
    Completed,
    Failed,
}

/// Outcome of one executed stage
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub folders: StageFolders,
    pub elapsed_secs: f64,
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub simulation_folder: PathBuf,
    /// Whether `generate_cells` produced a new parameter file (`None` if not run)
    pub generated_cell_params: Option<bool>,
    pub stages: Vec<StageReport>,
    /// Consolidated log table, if any fragments were written
    pub log_table: Option<PathBuf>,
}

/// Drives the configured stages in order, chaining each stage's output
/// folder into the next stage's input.
pub struct PipelineOrchestrator {
    config: SimulationConfig,
    handlers: HandlerSet,
    aggregator: LogAggregator,
    rng: StdRng,
    state: RunState,
    run_id: String,
}

impl PipelineOrchestrator {
    pub fn new(config: SimulationConfig, handlers: HandlerSet) -> Self {
        let defaults = MetadataDefaults::for_config(&config);
        Self {
            config,
            handlers,
            aggregator: LogAggregator::new(defaults),
            rng: StdRng::from_os_rng(),
            state: RunState::NotStarted,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Use a fixed seed for cell-parameter generation
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_aggregator(mut self, aggregator: LogAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Configuration as seen by collaborators, including resolved folders
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run every configured stage, then combine the logs.
    ///
    /// Step names and handler coverage are checked before anything is
    /// written. Any stage failure ends the run.
    pub async fn run(&mut self) -> Result<RunReport, PipelineError> {
        let result = self.execute().await;
        self.state = match result {
            Ok(_) => RunState::Completed,
            Err(_) => RunState::Failed,
        };
        result
    }

    async fn execute(&mut self) -> Result<RunReport, PipelineError> {
        let stages = parse_steps(&self.config.simulation_steps)?;
        self.handlers.ensure_covers(&stages)?;

        let root = self.config.simulation_folder.clone();
        create_dir(&root)?;
        let metadata_file = self.write_metadata(&root)?;

        let log_folder = resolve_folder(&root, self.config.folder("logfolder")?);
        let psf_folder = resolve_folder(&root, self.config.folder("psffolder")?);
        self.config.set_folder("logfolder", &log_folder);
        self.config.set_folder("psffolder", &psf_folder);

        let mut input_folder = PathBuf::from(self.config.folder("inputfolder")?);
        let mut reference_folder: Option<PathBuf> =
            self.config.folder("reffolder").ok().map(PathBuf::from);

        let mut report = RunReport {
            run_id: self.run_id.clone(),
            simulation_folder: root.clone(),
            generated_cell_params: None,
            stages: Vec::with_capacity(stages.len()),
            log_table: None,
        };

        for (index, stage) in stages.into_iter().enumerate() {
            self.state = RunState::RunningStage(index);
            info!("Run the step '{}'", stage);

            let folders = match stage {
                Stage::GenerateCells => {
                    let params_file = root.join(&self.config.cell_parameter_filename);
                    report.generated_cell_params = Some(self.ensure_cell_params(&params_file)?);

                    let output = resolve_folder(&root, &input_folder);
                    input_folder = output.clone();
                    StageFolders {
                        input: None,
                        output,
                        reference: None,
                        params_file: Some(params_file),
                    }
                }
                Stage::GeneratePsfs => StageFolders {
                    output: psf_folder.clone(),
                    ..Default::default()
                },
                _ => {
                    let output = resolve_folder(&root, self.config.results_folder(stage)?);
                    input_folder = resolve_folder(&root, &input_folder);
                    let reference = stage.roles().reference.then(|| {
                        let reference = reference_folder.as_ref().unwrap_or(&input_folder);
                        resolve_folder(&root, reference)
                    });
                    StageFolders {
                        input: Some(input_folder.clone()),
                        output,
                        reference,
                        params_file: None,
                    }
                }
            };

            self.record_folders(&folders);
            info!(
                "Input folder: {:?}, output folder: {:?}",
                folders.input, folders.output
            );
            if let Some(reference) = &folders.reference {
                info!("Reference folder: {:?}", reference);
            }

            let started = Instant::now();
            let job = BatchJob {
                stage,
                folders: &folders,
                log_folder: &log_folder,
                psf_folder: &psf_folder,
                metadata_file: &metadata_file,
                config: &self.config,
            };
            let handler = self
                .handlers
                .get(stage)
                .ok_or(ConfigError::MissingHandler(stage))?;
            handler
                .run(&job)
                .await
                .map_err(|source| PipelineError::Stage { stage, source })?;

            match stage {
                Stage::GenerateCells => reference_folder = Some(folders.output.clone()),
                _ if stage.roles().chains && folders.input.is_some() => {
                    input_folder = folders.output.clone();
                }
                _ => {}
            }

            report.stages.push(StageReport {
                stage,
                folders,
                elapsed_secs: started.elapsed().as_secs_f64(),
            });
        }

        report.log_table = self.aggregator.combine(&log_folder)?;
        info!("Simulation complete: {} steps", report.stages.len());
        Ok(report)
    }

    /// Generate and save cell parameters unless the file already exists.
    ///
    /// An existing file is reused as is, even if it no longer matches the
    /// configuration. Returns whether a new file was written.
    fn ensure_cell_params(&mut self, params_file: &Path) -> Result<bool, PipelineError> {
        if params_file.exists() {
            warn!(
                "Reusing existing cell parameters {:?}; they are not checked against the current configuration",
                params_file
            );
            return Ok(false);
        }

        info!("Generating new cell parameters into {:?}", params_file);
        let settings = self.config.cell_generation()?;
        let table = generate_cell_params(&settings, &mut self.rng)?;
        table.save(params_file)?;
        info!("Generated parameters for {} cells", table.len());
        Ok(true)
    }

    fn write_metadata(&self, root: &Path) -> Result<PathBuf, PipelineError> {
        let path = root.join(METADATA_FILENAME);
        let started = chrono::Local::now()
            .format("%a %b %e %H:%M:%S %Y")
            .to_string();
        write_params_file(
            &path,
            self.config.params(),
            &[(START_TIME_KEY, started), (RUN_ID_KEY, self.run_id.clone())],
        )
        .map_err(|source| PipelineError::Metadata {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn record_folders(&mut self, folders: &StageFolders) {
        if let Some(input) = &folders.input {
            self.config.set_folder("inputfolder", input);
        }
        self.config.set_folder("outputfolder", &folders.output);
        if let Some(reference) = &folders.reference {
            self.config.set_folder("reffolder", reference);
        }
    }
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    std::fs::create_dir_all(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}
