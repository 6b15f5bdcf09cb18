pub mod config;
pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod stages;

pub use config::{ParamMap, ParamValue, SimulationConfig, coerce_params};
pub use error::{ConfigError, LogError, PipelineError, TableError};
pub use io::{LogAggregator, MetadataDefaults, read_config_file};
pub use models::{CellParamTable, ShapeKind, generate_cell_params};
pub use pipeline::{BatchHandler, BatchJob, CommandHandler, HandlerSet, PipelineOrchestrator, RunReport};
pub use stages::Stage;
