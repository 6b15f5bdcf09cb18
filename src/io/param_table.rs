use std::collections::HashMap;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::error::TableError;
use crate::models::{
    BASE_COLUMNS, COORDINATE_COLUMNS, CellParamTable, CellParams, KIND_COLUMN, STACK_COLUMN,
    SPIKE_COLUMNS, ShapeAttributes, ShapeKind,
};

const DELIMITER: u8 = b'\t';

impl CellParamTable {
    /// Save as a tab-delimited table with a leading unnamed index column
    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| TableError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let csv_err = |source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_path(path)
            .map_err(csv_err)?;

        let columns = self.columns();
        let mut header = vec![""];
        header.extend(columns.iter().copied());
        writer.write_record(&header).map_err(csv_err)?;

        for (index, row) in self.rows.iter().enumerate() {
            let mut record = Vec::with_capacity(columns.len() + 1);
            record.push(index.to_string());
            for column in &columns {
                let cell = match *column {
                    KIND_COLUMN => row.kind.as_str().to_string(),
                    STACK_COLUMN => row.stack.map(|s| s.to_string()).unwrap_or_default(),
                    numeric => row
                        .numeric(numeric)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                };
                record.push(cell);
            }
            writer.write_record(&record).map_err(csv_err)?;
        }

        writer.flush().map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a table previously written by [`CellParamTable::save`]
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let csv_err = |source| TableError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        let positions: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, name)| (name, i))
            .collect();
        for required in BASE_COLUMNS.iter().chain(std::iter::once(&KIND_COLUMN)) {
            if !positions.contains_key(required) {
                return Err(TableError::MissingColumn {
                    path: path.to_path_buf(),
                    column: required.to_string(),
                });
            }
        }

        let mut rows = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let parser = RowParser {
                path,
                row,
                record: &record,
                positions: &positions,
            };
            rows.push(parser.parse()?);
        }

        Ok(Self { rows })
    }

    /// Replace the in-memory rows with the content of `path`.
    ///
    /// Returns `false` and leaves the table untouched if the file is absent.
    pub fn reload(&mut self, path: &Path) -> Result<bool, TableError> {
        if !path.exists() {
            return Ok(false);
        }
        *self = Self::load(path)?;
        Ok(true)
    }
}

struct RowParser<'a> {
    path: &'a Path,
    row: usize,
    record: &'a StringRecord,
    positions: &'a HashMap<&'a str, usize>,
}

impl RowParser<'_> {
    fn parse(&self) -> Result<CellParams, TableError> {
        let kind_text = self.cell(KIND_COLUMN).unwrap_or_default();
        let kind: ShapeKind = kind_text
            .parse()
            .map_err(|_| self.invalid(KIND_COLUMN, kind_text))?;

        let [size_x, size_y, size_z, phi, theta] = BASE_COLUMNS.map(|c| self.number(c));
        let geometry = ShapeAttributes {
            size_x: self.required(BASE_COLUMNS[0], size_x?)?,
            size_y: self.required(BASE_COLUMNS[1], size_y?)?,
            size_z: self.required(BASE_COLUMNS[2], size_z?)?,
            phi: self.required(BASE_COLUMNS[3], phi?)?,
            theta: self.required(BASE_COLUMNS[4], theta?)?,
            spikes: CellParams::spikes_from(
                self.number(SPIKE_COLUMNS[0])?,
                self.number(SPIKE_COLUMNS[1])?,
                self.number(SPIKE_COLUMNS[2])?,
            ),
        };

        let position = match (
            self.number(COORDINATE_COLUMNS[0])?,
            self.number(COORDINATE_COLUMNS[1])?,
            self.number(COORDINATE_COLUMNS[2])?,
        ) {
            (Some(z), Some(y), Some(x)) => Some([z, y, x]),
            _ => None,
        };

        let stack = match self.number(STACK_COLUMN)? {
            Some(value) if value >= 0.0 && value.fract() == 0.0 => Some(value as usize),
            Some(_) => {
                let text = self.cell(STACK_COLUMN).unwrap_or_default();
                return Err(self.invalid(STACK_COLUMN, text));
            }
            None => None,
        };

        Ok(CellParams {
            kind,
            geometry,
            position,
            stack,
        })
    }

    fn cell(&self, column: &str) -> Option<&str> {
        self.positions
            .get(column)
            .and_then(|&i| self.record.get(i))
            .filter(|s| !s.is_empty())
    }

    fn number(&self, column: &str) -> Result<Option<f64>, TableError> {
        match self.cell(column) {
            Some(text) => text
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.invalid(column, text)),
            None => Ok(None),
        }
    }

    fn required(&self, column: &str, value: Option<f64>) -> Result<f64, TableError> {
        value.ok_or_else(|| self.invalid(column, ""))
    }

    fn invalid(&self, column: &str, value: &str) -> TableError {
        TableError::InvalidValue {
            path: self.path.to_path_buf(),
            row: self.row,
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}
