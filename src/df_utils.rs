use std::collections::BTreeMap;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::error::ReviewError;

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

/// Column values as `f64`, casting when needed; nulls stay `None`.
pub fn f64_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| ReviewError::MissingColumn(name.to_string()))?;
    let series = column.as_series().context(name.to_string())?;
    let casted = if series.dtype() == &DataType::Float64 {
        series.clone()
    } else {
        series.cast(&DataType::Float64)?
    };
    Ok(casted.f64()?.into_iter().collect())
}

/// Non-null, finite values only.
pub fn observed(values: &[Option<f64>]) -> Vec<f64> {
    values
        .iter()
        .filter_map(|v| *v)
        .filter(|v| v.is_finite())
        .collect()
}

pub fn inner_join_on(left: &DataFrame, right: &DataFrame, key: &str) -> Result<DataFrame> {
    let joined = left.join(right, [key], [key], JoinType::Inner.into(), None)?;
    Ok(joined)
}

/// Row indices per modal class label. Rows without a whole, positive label are
/// left out.
pub fn class_groups(classes: &[Option<f64>]) -> BTreeMap<u32, Vec<usize>> {
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (row, class) in classes.iter().enumerate() {
        if let Some(c) = class
            && c.fract() == 0.0
            && *c >= 1.0
        {
            groups.entry(*c as u32).or_default().push(row);
        }
    }
    groups
}

/// Observed values of `values` restricted to `rows`.
pub fn observed_at(values: &[Option<f64>], rows: &[usize]) -> Vec<f64> {
    rows.iter()
        .filter_map(|&r| values.get(r).copied().flatten())
        .filter(|v| v.is_finite())
        .collect()
}
