use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::SimulationConfig;
use crate::error::ConfigError;
use crate::pipeline::StageFolders;
use crate::stages::Stage;

/// Everything a batch collaborator receives for one stage
#[derive(Debug)]
pub struct BatchJob<'a> {
    pub stage: Stage,
    pub folders: &'a StageFolders,
    pub log_folder: &'a Path,
    pub psf_folder: &'a Path,
    /// Run-metadata file holding the full coerced configuration
    pub metadata_file: &'a Path,
    pub config: &'a SimulationConfig,
}

/// A stage's batch collaborator.
///
/// Implementations populate `folders.output` and may append timing fragments
/// to the log folder. They may parallelize internally up to
/// `config.max_threads`.
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn run(&self, job: &BatchJob<'_>) -> Result<()>;
}

/// Mapping from stage to its handler, checked before a run starts
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<Stage, Arc<dyn BatchHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an external `<stage>_batch` program for every stage
    pub fn commands(bin_dir: Option<&Path>) -> Self {
        let mut set = Self::new();
        for stage in Stage::ALL {
            set.register(stage, Arc::new(CommandHandler::for_stage(stage, bin_dir)));
        }
        set
    }

    pub fn register(&mut self, stage: Stage, handler: Arc<dyn BatchHandler>) {
        self.handlers.insert(stage, handler);
    }

    pub fn with(mut self, stage: Stage, handler: Arc<dyn BatchHandler>) -> Self {
        self.register(stage, handler);
        self
    }

    pub fn get(&self, stage: Stage) -> Option<&Arc<dyn BatchHandler>> {
        self.handlers.get(&stage)
    }

    /// Fail on the first stage without a handler
    pub fn ensure_covers(&self, stages: &[Stage]) -> Result<(), ConfigError> {
        match stages.iter().find(|s| !self.handlers.contains_key(*s)) {
            Some(stage) => Err(ConfigError::MissingHandler(*stage)),
            None => Ok(()),
        }
    }
}

/// Runs a stage collaborator as an external program
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: PathBuf,
}

impl CommandHandler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `<bin_dir>/<stage>_batch`, or a bare name looked up on `PATH`
    pub fn for_stage(stage: Stage, bin_dir: Option<&Path>) -> Self {
        let name = stage.batch_name();
        match bin_dir {
            Some(dir) => Self::new(dir.join(name)),
            None => Self::new(name),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for one job
    pub fn args(job: &BatchJob<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |flag: &str, value: &Path| {
            args.push(flag.into());
            args.push(value.as_os_str().to_owned());
        };

        push("--config", job.metadata_file);
        if let Some(input) = &job.folders.input {
            push("--inputfolder", input.as_path());
        }
        push("--outputfolder", job.folders.output.as_path());
        if let Some(reference) = &job.folders.reference {
            push("--reffolder", reference.as_path());
        }
        if let Some(params_file) = &job.folders.params_file {
            push("--params-file", params_file.as_path());
        }
        push("--logfolder", job.log_folder);
        push("--psffolder", job.psf_folder);

        if let Some(threads) = job.config.max_threads {
            args.push("--max-threads".into());
            args.push(threads.to_string().into());
        }
        args
    }
}

#[async_trait]
impl BatchHandler for CommandHandler {
    async fn run(&self, job: &BatchJob<'_>) -> Result<()> {
        let args = Self::args(job);
        debug!("Running {:?} {:?}", self.program, args);

        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .await
            .with_context(|| format!("Failed to start {:?}", self.program))?;

        if !status.success() {
            anyhow::bail!("{:?} exited with {}", self.program, status);
        }
        Ok(())
    }
}
