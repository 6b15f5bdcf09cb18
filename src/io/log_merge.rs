use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use csv::{ReaderBuilder, WriterBuilder};
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SimulationConfig;
use crate::error::LogError;
use crate::models::ShapeKind;

static RE_PSF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"psf_sigma_(\d*\.?\d+)_aspect_ratio_(\d*\.?\d+)").expect("valid psf regex")
});
static RE_VOXEL_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"voxel_size_\[?(\d*\.?\d+(?:_\d*\.?\d+)*)\]?").expect("valid voxel size regex")
});
static RE_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(poisson|gaussian)_snr_(\d*\.?\d+|None)").expect("valid noise regex")
});
static RE_ALGORITHM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(deconvolution_lab_rif|deconvolution_lab_rltv|iterative_deconvolve_3d)")
        .expect("valid algorithm regex")
});
static RE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(ellipsoid|spiky_cell)").expect("valid shape regex"));

/// Index column of a consolidated log
pub const NAME_COLUMN: &str = "Name";

/// One merged log row, keyed by the fragment it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Fragment path relative to the log folder, without extension
    pub name: String,
    pub values: HashMap<String, String>,
}

impl LogRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

/// Consolidated table of log records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogTable {
    /// Data columns in first-seen order, excluding the `Name` index
    pub columns: Vec<String>,
    pub rows: Vec<LogRecord>,
}

impl LogTable {
    fn add_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    fn set(&mut self, row: usize, column: &str, value: String) {
        self.add_column(column);
        if let Some(record) = self.rows.get_mut(row) {
            record.values.insert(column.to_string(), value);
        }
    }

    /// Append every row of a tab-delimited fragment (header row, index column first)
    pub fn append_fragment(&mut self, path: &Path, name: &str) -> Result<usize, LogError> {
        let csv_err = |source| LogError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)
            .map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();
        if headers.is_empty() {
            return Err(LogError::EmptyFragment(path.to_path_buf()));
        }

        let data_columns: Vec<&str> = headers.iter().skip(1).collect();
        for column in &data_columns {
            self.add_column(column);
        }

        let mut appended = 0;
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let values = data_columns
                .iter()
                .zip(record.iter().skip(1))
                .map(|(column, value)| (column.to_string(), value.to_string()))
                .collect();
            self.rows.push(LogRecord {
                name: name.to_string(),
                values,
            });
            appended += 1;
        }
        Ok(appended)
    }

    pub fn write(&self, path: &Path) -> Result<(), LogError> {
        let csv_err = |source| LogError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .map_err(csv_err)?;

        let mut header = vec![NAME_COLUMN];
        header.extend(self.columns.iter().map(String::as_str));
        writer.write_record(&header).map_err(csv_err)?;

        for row in &self.rows {
            let mut record = vec![row.name.as_str()];
            record.extend(self.columns.iter().map(|c| row.get(c).unwrap_or_default()));
            writer.write_record(&record).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| LogError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, LogError> {
        let csv_err = |source| LogError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();
        let columns: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let name = record.get(0).unwrap_or_default().to_string();
            let values = columns
                .iter()
                .cloned()
                .zip(record.iter().skip(1).map(str::to_string))
                .collect();
            rows.push(LogRecord { name, values });
        }
        Ok(Self { columns, rows })
    }
}

/// Fallback metadata for rows whose names do not encode it
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataDefaults {
    /// Voxel size of unresized data, applied to all three axes
    pub voxel_size: f64,
    pub cell_kind: String,
}

impl Default for MetadataDefaults {
    fn default() -> Self {
        Self {
            voxel_size: 0.3,
            cell_kind: ShapeKind::Ellipsoid.as_str().to_string(),
        }
    }
}

impl MetadataDefaults {
    /// Fallbacks taken from a run configuration
    pub fn for_config(config: &SimulationConfig) -> Self {
        Self {
            voxel_size: config
                .input_voxel_size
                .unwrap_or(Self::default().voxel_size),
            cell_kind: config.input_cell_kind.clone(),
        }
    }
}

/// Add metadata columns parsed from each row's name.
///
/// `Kind`, `Voxel size z/y/x` and `resolution` are always added; PSF, noise
/// and algorithm columns only when some row encodes them.
pub fn extract_metadata(table: &mut LogTable, defaults: &MetadataDefaults) {
    for row in 0..table.rows.len() {
        let name = table.rows[row].name.clone();

        let kind = RE_SHAPE
            .captures(&name)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| defaults.cell_kind.clone());
        table.set(row, "Kind", kind);

        let voxel = RE_VOXEL_SIZE
            .captures(&name)
            .map(|c| parse_voxel_sizes(&c[1]))
            .unwrap_or([defaults.voxel_size; 3]);
        for (axis, size) in ["z", "y", "x"].iter().zip(voxel) {
            table.set(row, &format!("Voxel size {}", axis), size.to_string());
        }
        table.set(
            row,
            "resolution",
            format!("[{}, {}, {}]", voxel[0], voxel[1], voxel[2]),
        );

        if let Some(c) = RE_PSF.captures(&name) {
            table.set(row, "PSF sigma", c[1].to_string());
            table.set(row, "PSF aspect ratio", c[2].to_string());
        }
        if let Some(c) = RE_NOISE.captures(&name) {
            table.set(row, "Noise kind", c[1].to_string());
            table.set(row, "SNR", c[2].to_string());
        }
        if let Some(c) = RE_ALGORITHM.captures(&name) {
            table.set(row, "Algorithm", c[1].to_string());
        }
    }
}

/// One value applies to all axes; three are (z, y, x)
fn parse_voxel_sizes(encoded: &str) -> [f64; 3] {
    let values: Vec<f64> = encoded
        .split('_')
        .filter_map(|v| v.parse().ok())
        .collect();
    match values.as_slice() {
        [z, y, x] => [*z, *y, *x],
        [single, ..] => [*single; 3],
        [] => [0.0; 3],
    }
}

/// Merges the per-item timing fragments of a run into one table
#[derive(Debug, Clone, Default)]
pub struct LogAggregator {
    pub defaults: MetadataDefaults,
    /// Delete fragments once the consolidated table is written
    pub prune_fragments: bool,
}

impl LogAggregator {
    pub fn new(defaults: MetadataDefaults) -> Self {
        Self {
            defaults,
            prune_fragments: false,
        }
    }

    /// Path of the consolidated table: the folder path with `.csv` appended
    pub fn output_path(folder: &Path) -> PathBuf {
        let folder: PathBuf = folder.components().collect();
        let mut name = folder.into_os_string();
        name.push(".csv");
        PathBuf::from(name)
    }

    /// Collect every `.csv` fragment below `folder`, sorted by path
    pub fn fragments(folder: &Path) -> Result<Vec<(PathBuf, String)>, LogError> {
        let mut fragments = Vec::new();
        for entry in WalkDir::new(folder).sort_by_file_name() {
            let entry = entry.map_err(|source| LogError::Walk {
                path: folder.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|e| e != "csv") {
                continue;
            }
            let relative = path.strip_prefix(folder).unwrap_or(path).with_extension("");
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            fragments.push((path.to_path_buf(), name));
        }
        Ok(fragments)
    }

    /// Merge all fragments in `folder` and write `<folder>.csv`.
    ///
    /// Returns `None` when the folder does not exist (no stage logged anything).
    pub fn combine(&self, folder: &Path) -> Result<Option<PathBuf>, LogError> {
        if !folder.is_dir() {
            warn!("Log folder {:?} does not exist, nothing to combine", folder);
            return Ok(None);
        }

        let fragments = Self::fragments(folder)?;
        let mut table = LogTable::default();
        for (path, name) in &fragments {
            let rows = table.append_fragment(path, name)?;
            debug!("Merged {} rows from {:?}", rows, path);
        }
        extract_metadata(&mut table, &self.defaults);

        let output = Self::output_path(folder);
        table.write(&output)?;
        info!(
            "Combined {} log fragments ({} rows) into {:?}",
            fragments.len(),
            table.rows.len(),
            output
        );

        if self.prune_fragments {
            for (path, _) in &fragments {
                std::fs::remove_file(path).map_err(|source| LogError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        }

        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fragment(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_combine_merges_fragments_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("timelog");
        write_fragment(
            &logs,
            "psf_sigma_1.5_aspect_ratio_4_cell_000.csv",
            "\tElapsed time\tStep\n0\t1.25\tconvolve\n",
        );
        write_fragment(
            &logs,
            "deconvolved/deconvolution_lab_rif/poisson_snr_5/voxel_size_[1_0.5_0.5]_spiky_cell_001.csv",
            "\tElapsed time\tIterations\n0\t3.5\t2\n",
        );
        write_fragment(&logs, "notes.txt", "not a fragment");

        let output = LogAggregator::default().combine(&logs).unwrap().unwrap();
        assert_eq!(output, dir.path().join("timelog.csv"));

        let table = LogTable::read(&output).unwrap();
        assert_eq!(table.rows.len(), 2);
        for column in ["Elapsed time", "Kind", "Voxel size x", "resolution"] {
            assert!(table.columns.iter().any(|c| c == column), "{}", column);
        }

        let decon = &table.rows[0];
        assert!(decon.name.starts_with("deconvolved/"));
        assert_eq!(decon.get("Kind"), Some("spiky_cell"));
        assert_eq!(decon.get("Voxel size z"), Some("1"));
        assert_eq!(decon.get("Voxel size x"), Some("0.5"));
        assert_eq!(decon.get("Algorithm"), Some("deconvolution_lab_rif"));
        assert_eq!(decon.get("SNR"), Some("5"));
        assert_eq!(decon.get("Step"), Some(""));

        let conv = &table.rows[1];
        assert_eq!(conv.name, "psf_sigma_1.5_aspect_ratio_4_cell_000");
        assert_eq!(conv.get("PSF sigma"), Some("1.5"));
        assert_eq!(conv.get("PSF aspect ratio"), Some("4"));
        assert_eq!(conv.get("Kind"), Some("ellipsoid"));
        assert_eq!(conv.get("Voxel size y"), Some("0.3"));

        assert!(logs.join("psf_sigma_1.5_aspect_ratio_4_cell_000.csv").exists());
    }

    #[test]
    fn test_missing_folder_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let result = LogAggregator::default()
            .combine(&dir.path().join("absent"))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_malformed_fragment_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        write_fragment(dir.path(), "cell_000.csv", "\ta\tb\n0\t1\n");
        let err = LogAggregator::default().combine(dir.path()).unwrap_err();
        assert!(matches!(err, LogError::Csv { .. }));
    }

    #[test]
    fn test_prune_removes_merged_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("log");
        write_fragment(&logs, "cell_000.csv", "\tElapsed time\n0\t1\n");
        let aggregator = LogAggregator {
            prune_fragments: true,
            ..Default::default()
        };
        aggregator.combine(&logs).unwrap();
        assert!(!logs.join("cell_000.csv").exists());
        assert!(dir.path().join("log.csv").exists());
    }

    #[test]
    fn test_output_path_ignores_trailing_slash() {
        assert_eq!(
            LogAggregator::output_path(Path::new("run/timelog/")),
            PathBuf::from("run/timelog.csv")
        );
    }
}
