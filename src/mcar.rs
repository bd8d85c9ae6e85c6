//! Little's test of the missing-completely-at-random hypothesis.
//!
//! Mean and covariance are estimated by EM under multivariate normality; the
//! statistic compares each missingness pattern's observed means against the EM
//! means on the variables that pattern observes.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use tracing::{debug, trace};

use crate::error::{ReviewError, Result};
use crate::linalg::{inverse_spd, quad_form};
use crate::stats::pchisq;

/// Conventional level used for the textual interpretation.
pub const MCAR_ALPHA: f64 = 0.05;
pub const EM_TOLERANCE: f64 = 1e-6;
pub const EM_MAX_ITERATIONS: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct McarTest {
    pub statistic: f64,
    pub df: f64,
    pub p: f64,
    pub patterns: usize,
    pub cases: usize,
    pub em_iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum McarOutcome {
    Ran(McarTest),
    DidNotRun(String),
}

impl McarOutcome {
    pub fn interpretation(&self) -> String {
        match self {
            McarOutcome::Ran(t) if t.p < MCAR_ALPHA => format!(
                "p < {MCAR_ALPHA}: reject MCAR; missingness is related to observed values, \
                 so FIML under MAR is the defensible assumption"
            ),
            McarOutcome::Ran(_) => format!(
                "p >= {MCAR_ALPHA}: fail to reject MCAR; the data are consistent with \
                 completely random missingness"
            ),
            McarOutcome::DidNotRun(reason) => format!("test did not run: {reason}"),
        }
    }
}

/// A group of rows sharing which variables are observed.
struct Pattern {
    observed: Vec<usize>,
    missing: Vec<usize>,
    rows: Vec<usize>,
}

fn group_patterns(rows: &[Vec<Option<f64>>]) -> Vec<Pattern> {
    let mut groups: BTreeMap<Vec<bool>, Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let mask: Vec<bool> = row.iter().map(|v| v.is_some()).collect();
        groups.entry(mask).or_default().push(i);
    }
    groups
        .into_iter()
        .map(|(mask, rows)| Pattern {
            observed: (0..mask.len()).filter(|&j| mask[j]).collect(),
            missing: (0..mask.len()).filter(|&j| !mask[j]).collect(),
            rows,
        })
        .collect()
}

fn sub_vector(v: &Array1<f64>, idx: &[usize]) -> Array1<f64> {
    v.select(Axis(0), idx)
}

fn sub_matrix(m: &Array2<f64>, rows: &[usize], cols: &[usize]) -> Array2<f64> {
    m.select(Axis(0), rows).select(Axis(1), cols)
}

fn observed_values(row: &[Option<f64>], idx: &[usize]) -> Array1<f64> {
    idx.iter().map(|&j| row[j].unwrap_or(f64::NAN)).collect()
}

/// Maximum-likelihood mean and covariance from incomplete rows.
/// Returns `(mean, covariance, iterations)`.
pub fn em_estimate(
    rows: &[Vec<Option<f64>>],
    max_iterations: usize,
    tolerance: f64,
) -> Result<(Array1<f64>, Array2<f64>, usize)> {
    let n = rows.len();
    let p = rows.first().map(|r| r.len()).unwrap_or(0);
    if n == 0 || p == 0 {
        return Err(ReviewError::Degenerate("no data for EM".to_string()));
    }

    let mut mu = Array1::<f64>::zeros(p);
    let mut sigma = Array2::<f64>::zeros((p, p));
    for j in 0..p {
        let vals: Vec<f64> = rows.iter().filter_map(|r| r[j]).collect();
        if vals.len() < 2 {
            return Err(ReviewError::Degenerate(format!(
                "variable {j} has fewer than two observed values"
            )));
        }
        let m = vals.iter().sum::<f64>() / vals.len() as f64;
        let v = vals.iter().map(|x| (x - m).powi(2)).sum::<f64>() / vals.len() as f64;
        if !(v > 0.0) {
            return Err(ReviewError::Degenerate(format!("variable {j} is constant")));
        }
        mu[j] = m;
        sigma[[j, j]] = v;
    }

    let patterns = group_patterns(rows);
    for iteration in 1..=max_iterations {
        let mut t1 = Array1::<f64>::zeros(p);
        let mut t2 = Array2::<f64>::zeros((p, p));

        for pattern in &patterns {
            let o = &pattern.observed;
            let m = &pattern.missing;
            if m.is_empty() {
                for &r in &pattern.rows {
                    let x = observed_values(&rows[r], o);
                    t1 += &x;
                    t2 += &outer(&x, &x);
                }
                continue;
            }

            let sigma_oo = sub_matrix(&sigma, o, o);
            let inv_oo = inverse_spd(&sigma_oo, "observed covariance block")?;
            let sigma_mo = sub_matrix(&sigma, m, o);
            let beta = sigma_mo.dot(&inv_oo);
            let cond_cov = sub_matrix(&sigma, m, m) - beta.dot(&sigma_mo.t());
            let mu_o = sub_vector(&mu, o);
            let mu_m = sub_vector(&mu, m);

            for &r in &pattern.rows {
                let y_o = observed_values(&rows[r], o);
                let x_m = &mu_m + &beta.dot(&(&y_o - &mu_o));
                let mut x = Array1::<f64>::zeros(p);
                for (k, &j) in o.iter().enumerate() {
                    x[j] = y_o[k];
                }
                for (k, &j) in m.iter().enumerate() {
                    x[j] = x_m[k];
                }
                t1 += &x;
                t2 += &outer(&x, &x);
                for (a, &ja) in m.iter().enumerate() {
                    for (b, &jb) in m.iter().enumerate() {
                        t2[[ja, jb]] += cond_cov[[a, b]];
                    }
                }
            }
        }

        let new_mu = &t1 / n as f64;
        let new_sigma = &t2 / n as f64 - outer(&new_mu, &new_mu);
        let change = (&new_mu - &mu)
            .iter()
            .chain((&new_sigma - &sigma).iter())
            .fold(0.0_f64, |acc, d| acc.max(d.abs()));
        mu = new_mu;
        sigma = new_sigma;
        trace!("EM iteration {iteration}: max change {change:.3e}");
        if change < tolerance {
            return Ok((mu, sigma, iteration));
        }
    }
    Err(ReviewError::Degenerate(format!(
        "EM did not converge in {max_iterations} iterations"
    )))
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    let a2 = a.view().insert_axis(Axis(1));
    let b2 = b.view().insert_axis(Axis(0));
    a2.dot(&b2)
}

fn run_test(rows: &[Vec<Option<f64>>]) -> Result<McarTest> {
    let rows: Vec<Vec<Option<f64>>> = rows
        .iter()
        .filter(|r| r.iter().any(|v| v.is_some()))
        .cloned()
        .collect();
    let p = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.is_empty() || p == 0 {
        return Err(ReviewError::Degenerate("no rows with observed indicators".to_string()));
    }
    let patterns = group_patterns(&rows);
    if patterns.len() < 2 {
        return Err(ReviewError::Degenerate(
            "only one missingness pattern".to_string(),
        ));
    }

    let (mu, sigma, em_iterations) = em_estimate(&rows, EM_MAX_ITERATIONS, EM_TOLERANCE)?;
    debug!("EM converged after {em_iterations} iterations over {} patterns", patterns.len());

    let mut statistic = 0.0;
    let mut observed_total = 0usize;
    for pattern in &patterns {
        let o = &pattern.observed;
        observed_total += o.len();
        let inv = inverse_spd(&sub_matrix(&sigma, o, o), "pattern covariance")?;
        let mut ybar = Array1::<f64>::zeros(o.len());
        for &r in &pattern.rows {
            ybar += &observed_values(&rows[r], o);
        }
        ybar /= pattern.rows.len() as f64;
        let diff = &ybar - &sub_vector(&mu, o);
        statistic += pattern.rows.len() as f64 * quad_form(&diff, &inv);
    }

    let df = observed_total as f64 - p as f64;
    if df <= 0.0 {
        return Err(ReviewError::Degenerate(format!("degrees of freedom {df} <= 0")));
    }
    Ok(McarTest {
        statistic,
        df,
        p: pchisq(statistic, df),
        patterns: patterns.len(),
        cases: rows.len(),
        em_iterations,
    })
}

/// Runs the test on an indicator matrix (`None` = missing). Any failure is
/// returned as [`McarOutcome::DidNotRun`] with its reason.
pub fn little_mcar(rows: &[Vec<Option<f64>>]) -> McarOutcome {
    match run_test(rows) {
        Ok(test) => McarOutcome::Ran(test),
        Err(e) => McarOutcome::DidNotRun(e.to_string()),
    }
}
