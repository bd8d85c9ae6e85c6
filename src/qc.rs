use std::collections::HashSet;
use std::path::Path;

use crate::error::{ReviewError, Result};

pub fn check_range_f64(value: f64, min: f64, max: f64, inclusive: bool, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(ReviewError::InvalidArgument(format!(
            "Value of {name} should be finite"
        )));
    }
    if inclusive {
        if value < min || value > max {
            return Err(ReviewError::InvalidArgument(format!(
                "Value of {name} should be within [{min}, {max}]"
            )));
        }
    } else if value <= min || value >= max {
        return Err(ReviewError::InvalidArgument(format!(
            "Value of {name} should be within ({min}, {max})"
        )));
    }
    Ok(())
}

pub fn check_file_exists(path: &Path, name: &str) -> Result<()> {
    if !path.is_file() {
        tracing::error!("File {path:?} passed to {name} does not exist");
        return Err(ReviewError::MissingInput(path.to_path_buf()));
    }
    Ok(())
}

pub fn check_unique<'a, I>(values: I, name: &str) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for v in values {
        if !seen.insert(v) {
            return Err(ReviewError::InvalidArgument(format!(
                "{name} contains duplicate entry {v}"
            )));
        }
    }
    Ok(())
}

pub fn check_columns_present(columns: &[String], wanted: &[String], context: &str) -> Result<()> {
    for w in wanted {
        if !columns.iter().any(|c| c == w) {
            return Err(ReviewError::MissingColumn(format!("{w} (required by {context})")));
        }
    }
    Ok(())
}
