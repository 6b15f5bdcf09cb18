use std::path::PathBuf;

use crate::stages::Stage;

/// Fatal configuration problems, reported with the offending value
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("\"{name}\" is not a valid simulation step! Valid simulation steps are: {valid:?}")]
    UnknownStage {
        name: String,
        valid: Vec<&'static str>,
    },

    #[error("{kind} is not a valid object shape! Valid shapes are: {valid:?}")]
    UnknownShape {
        kind: String,
        valid: Vec<&'static str>,
    },

    #[error("number of cells must be an integer or a pair of integers, got {0} values")]
    CellCountArity(usize),

    #[error("number of cells must be an integer when no stacks are requested")]
    CellRangeWithoutStacks,

    #[error("invalid number of cells: {0}")]
    InvalidCellCount(String),

    #[error("missing configuration value: {0}")]
    MissingValue(String),

    #[error("invalid value for {key}: expected {expected}, found {found}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("no handler registered for simulation step \"{0}\"")]
    MissingHandler(Stage),

    #[error("failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors reading or writing a cell-parameter table
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed table {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("table {path:?} is missing column {column}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("table {path:?}, row {row}: invalid {column} value {value:?}")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
}

/// Errors merging per-item log fragments
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to list log folder {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed log fragment {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("log fragment {0:?} has no header")]
    EmptyFragment(PathBuf),
}

/// Errors that end a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write run metadata {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("simulation step '{stage}' failed: {source:#}")]
    Stage {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}
