use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::config::{ParamMap, ParamValue};
use crate::error::ConfigError;

/// Read a headerless, tab-delimited key/value file into a raw parameter map.
///
/// Every value is kept as text; coercion happens afterwards.
pub fn read_config_file(path: &Path) -> Result<ParamMap, ConfigError> {
    let read_err = |source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(read_err)?;

    let mut params = ParamMap::new();
    for record in reader.records() {
        let record = record.map_err(read_err)?;
        let key = match record.get(0).map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => continue,
        };
        let value = record.get(1).map(str::trim).unwrap_or_default();
        params.insert(key.to_string(), ParamValue::text(value));
    }
    Ok(params)
}

/// Write a parameter map as a headerless, tab-delimited key/value dump
pub fn write_params_file(
    path: &Path,
    params: &ParamMap,
    extra: &[(&str, String)],
) -> Result<(), csv::Error> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)?;
    for (key, value) in params {
        writer.write_record([key.as_str(), value.to_string().as_str()])?;
    }
    for (key, value) in extra {
        writer.write_record([*key, value.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}
