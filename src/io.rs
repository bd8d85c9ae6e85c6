use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use polars::prelude::*;
use tracing::debug;

use crate::error::ReviewError;
use crate::qc::{check_file_exists, check_unique};

/// Opens a file, decompressing `.gz` / `.bz2` on the fly.
pub fn open_maybe_compressed(path: &Path) -> Result<Box<dyn Read>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(match ext.as_str() {
        "gz" => Box::new(GzDecoder::new(file)),
        "bz2" => Box::new(BzDecoder::new(file)),
        _ => Box::new(file),
    })
}

/// Reads a headerless whitespace-delimited table.
///
/// `columns` names every field in file order. The identifier column is kept as
/// a string; every other column is parsed as `f64`. Tokens listed in
/// `missing_tokens` become nulls. Duplicate identifiers are rejected.
pub fn read_whitespace_table(
    path: &Path,
    columns: &[String],
    id_column: &str,
    missing_tokens: &[String],
) -> Result<DataFrame> {
    check_file_exists(path, "read_whitespace_table")?;
    let id_idx = columns
        .iter()
        .position(|c| c == id_column)
        .ok_or_else(|| ReviewError::MissingColumn(id_column.to_string()))?;

    let reader = BufReader::new(open_maybe_compressed(path)?);
    let mut ids: Vec<String> = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); columns.len()];

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != columns.len() {
            return Err(ReviewError::Parse(format!(
                "{} line {}: expected {} fields, found {}",
                path.display(),
                line_no + 1,
                columns.len(),
                tokens.len()
            ))
            .into());
        }
        for (i, token) in tokens.iter().enumerate() {
            let missing = is_missing_token(token, missing_tokens);
            if i == id_idx {
                if missing {
                    return Err(ReviewError::Parse(format!(
                        "{} line {}: missing identifier",
                        path.display(),
                        line_no + 1
                    ))
                    .into());
                }
                ids.push(normalize_id(token));
                continue;
            }
            let value = if missing {
                None
            } else {
                Some(token.parse::<f64>().map_err(|_| {
                    ReviewError::Parse(format!(
                        "{} line {}: {} value {token:?} is not numeric",
                        path.display(),
                        line_no + 1,
                        columns[i]
                    ))
                })?)
            };
            values[i].push(value);
        }
    }

    if ids.is_empty() {
        return Err(ReviewError::Parse(format!("{} has no rows", path.display())).into());
    }
    check_unique(ids.iter().map(|s| s.as_str()), id_column)?;
    debug!("read {} rows x {} columns from {}", ids.len(), columns.len(), path.display());

    let mut series = Vec::with_capacity(columns.len());
    for (i, (name, col)) in columns.iter().zip(values).enumerate() {
        if i == id_idx {
            series.push(Series::new(name.as_str().into(), ids.clone()));
        } else {
            series.push(Series::new(name.as_str().into(), col));
        }
    }
    Ok(series.into_iter().collect::<DataFrame>())
}

/// Numeric sentinels match by value, so `-999.0` is missing when `-999` is
/// listed; other sentinels match by text.
pub fn is_missing_token(token: &str, missing_tokens: &[String]) -> bool {
    let value = token.parse::<f64>().ok();
    missing_tokens.iter().any(|m| {
        m == token
            || match (m.parse::<f64>(), value) {
                (Ok(sentinel), Some(v)) => sentinel == v,
                _ => false,
            }
    })
}

/// Numeric identifiers written as `12.0` and `12` must join.
fn normalize_id(token: &str) -> String {
    match token.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        _ => token.to_string(),
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
