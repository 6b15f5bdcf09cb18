pub mod coerce;
pub mod value;

pub use coerce::*;
pub use value::*;

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::{CellGeneration, ShapeParams};
use crate::stages::Stage;

/// Default values for every documented key, applied to missing keys only
pub fn default_params() -> ParamMap {
    let steps: Vec<&str> = Stage::valid_names();
    let entries: Vec<(&str, ParamValue)> = vec![
        ("simulation_folder", "test_simulation".into()),
        ("simulation_steps", ParamValue::texts(&steps)),
        ("cell_parameter_filename", "cell_parameters.csv".into()),
        ("inputfolder", "input".into()),
        ("psffolder", "psf".into()),
        ("convolve_results_folder", "convolved".into()),
        ("resize_results_folder", "resized".into()),
        ("add_noise_results_folder", "noise".into()),
        ("deconvolve_results_folder", "deconvolved".into()),
        ("accuracy_results_folder", "accuracy_measures".into()),
        ("logfolder", "timelog".into()),
        ("max_threads", 4.0.into()),
        ("print_progress", true.into()),
        ("number_of_stacks", ParamValue::Null),
        ("number_of_cells", 2.0.into()),
        ("input_cell_kind", "ellipsoid".into()),
        ("size_mean_and_std", ParamValue::numbers(&[10.0, 2.0])),
        ("equal_dimensions", false.into()),
        ("input_voxel_size", 0.3.into()),
        ("stack_size_microns", ParamValue::numbers(&[10.0, 100.0, 100.0])),
        ("psf_sigmas", ParamValue::numbers(&[0.1, 0.5])),
        ("psf_aspect_ratios", ParamValue::numbers(&[3.0])),
        (
            "voxel_sizes_for_resizing",
            ParamValue::NumberLists(vec![vec![1.0, 0.5, 0.5]]),
        ),
        ("noise_kind", ParamValue::texts(&["poisson"])),
        ("snr", ParamValue::Numbers(vec![None, Some(5.0)])),
        ("test_snr_combinations", false.into()),
        (
            "deconvolution_algorithm",
            ParamValue::texts(&["deconvolution_lab_rif", "deconvolution_lab_rltv"]),
        ),
        (
            "deconvolution_lab_rif_regularization_lambda",
            ParamValue::numbers(&[0.001, 1.0]),
        ),
        (
            "deconvolution_lab_rltv_regularization_lambda",
            ParamValue::numbers(&[0.001]),
        ),
        ("deconvolution_lab_rltv_iterations", ParamValue::numbers(&[2.0, 3.0])),
        ("log_computing_time", true.into()),
    ];
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Typed view of a coerced run configuration.
///
/// The full coerced map is kept alongside the typed fields so collaborators
/// see every key, including ones this crate does not interpret.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Run root; every stage folder is resolved under it
    pub simulation_folder: PathBuf,
    /// Step names in execution order, not yet validated
    pub simulation_steps: Vec<String>,
    pub cell_parameter_filename: String,
    pub max_threads: Option<usize>,
    pub print_progress: bool,
    pub log_computing_time: bool,
    pub input_voxel_size: Option<f64>,
    pub input_cell_kind: String,
    params: ParamMap,
}

impl SimulationConfig {
    /// Fill missing keys with defaults, coerce, and extract typed fields
    pub fn from_params(raw: ParamMap) -> Result<Self, ConfigError> {
        let mut merged = default_params();
        merged.extend(raw);
        let params = coerce_params(merged);

        Ok(Self {
            simulation_folder: PathBuf::from(text(&params, "simulation_folder")?),
            simulation_steps: texts(&params, "simulation_steps")?,
            cell_parameter_filename: text(&params, "cell_parameter_filename")?.to_string(),
            max_threads: optional_count(&params, "max_threads")?,
            print_progress: flag(&params, "print_progress"),
            log_computing_time: flag(&params, "log_computing_time"),
            input_voxel_size: params.get("input_voxel_size").and_then(ParamValue::as_f64),
            input_cell_kind: text(&params, "input_cell_kind")?.to_string(),
            params,
        })
    }

    /// The full coerced parameter map
    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Raw string value of a folder or file key
    pub fn folder(&self, key: &str) -> Result<&str, ConfigError> {
        text(&self.params, key)
    }

    /// Record a resolved folder so collaborators see it
    pub fn set_folder(&mut self, key: &str, path: &Path) {
        self.params.insert(
            key.to_string(),
            ParamValue::text(path.to_string_lossy().into_owned()),
        );
    }

    /// Output folder name configured for a stage
    pub fn results_folder(&self, stage: Stage) -> Result<&str, ConfigError> {
        self.folder(stage.roles().output_key)
    }

    /// Settings for cell-parameter generation
    pub fn cell_generation(&self) -> Result<CellGeneration, ConfigError> {
        let number_of_cells = self
            .params
            .get("number_of_cells")
            .and_then(ParamValue::as_f64_vec)
            .unwrap_or_default();
        let shape = ShapeParams::from_lists(
            &numbers(&self.params, "size_mean_and_std"),
            flag_or(&self.params, "equal_dimensions", false),
            &numbers(&self.params, "spikiness_range"),
            &numbers(&self.params, "spike_size_range"),
            &numbers(&self.params, "spike_smoothness_range"),
        );

        Ok(CellGeneration {
            kind: self.input_cell_kind.clone(),
            number_of_stacks: optional_count(&self.params, "number_of_stacks")?,
            number_of_cells,
            coordinates: flag_or(&self.params, "coordinates", true),
            shape,
        })
    }
}

fn text<'a>(params: &'a ParamMap, key: &str) -> Result<&'a str, ConfigError> {
    match params.get(key) {
        Some(ParamValue::Text(s)) => Ok(s),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            expected: "a string",
            found: other.to_string(),
        }),
        None => Err(ConfigError::MissingValue(key.to_string())),
    }
}

fn texts(params: &ParamMap, key: &str) -> Result<Vec<String>, ConfigError> {
    match params.get(key) {
        Some(ParamValue::Texts(values)) => Ok(values.clone()),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            expected: "a list of names",
            found: other.to_string(),
        }),
        None => Err(ConfigError::MissingValue(key.to_string())),
    }
}

fn flag(params: &ParamMap, key: &str) -> bool {
    flag_or(params, key, true)
}

fn flag_or(params: &ParamMap, key: &str, default: bool) -> bool {
    params
        .get(key)
        .and_then(ParamValue::as_bool)
        .unwrap_or(default)
}

/// Non-null numeric entries; degenerate (empty) lists read as no values
fn numbers(params: &ParamMap, key: &str) -> Vec<f64> {
    params
        .get(key)
        .and_then(ParamValue::as_f64_vec)
        .unwrap_or_default()
}

fn optional_count(params: &ParamMap, key: &str) -> Result<Option<usize>, ConfigError> {
    match params.get(key) {
        None | Some(ParamValue::Null) => Ok(None),
        Some(ParamValue::Number(n)) if n.is_finite() && *n >= 0.0 => Ok(Some(*n as usize)),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            expected: "a nonnegative integer or None",
            found: other.to_string(),
        }),
    }
}
