//! Classical tests used by the pipelines.
//!
//! Every test returns [`ReviewError::Degenerate`] when its numerical
//! preconditions fail, so a caller can mark one row not-available and move on.

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, StudentsT};

use crate::error::{ReviewError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub se: f64,
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1 denominator).
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

pub fn summarize(xs: &[f64]) -> Summary {
    let sd = variance(xs).sqrt();
    Summary {
        n: xs.len(),
        mean: mean(xs),
        sd,
        se: sd / (xs.len() as f64).sqrt(),
    }
}

pub fn pchisq(chisq: f64, df: f64) -> f64 {
    if !chisq.is_finite() || df <= 0.0 {
        return f64::NAN;
    }
    match ChiSquared::new(df) {
        Ok(dist) => dist.sf(chisq.max(0.0)),
        Err(_) => f64::NAN,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    pub t: f64,
    pub df: f64,
    pub p: f64,
    pub mean_difference: f64,
}

/// Two-sided Welch two-sample t-test of `mean(a) - mean(b)`.
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Result<TTest> {
    if a.len() < 2 || b.len() < 2 {
        return Err(ReviewError::Degenerate(format!(
            "t-test needs two observations per group (got {} and {})",
            a.len(),
            b.len()
        )));
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let (va, vb) = (variance(a) / na, variance(b) / nb);
    let se2 = va + vb;
    if !(se2 > 0.0) {
        return Err(ReviewError::Degenerate(
            "both groups have zero variance".to_string(),
        ));
    }
    let mean_difference = mean(a) - mean(b);
    let t = mean_difference / se2.sqrt();
    let df = se2.powi(2) / (va.powi(2) / (na - 1.0) + vb.powi(2) / (nb - 1.0));
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| ReviewError::Degenerate(e.to_string()))?;
    let p = (2.0 * dist.sf(t.abs())).min(1.0);
    Ok(TTest {
        t,
        df,
        p,
        mean_difference,
    })
}

/// Standardized mean difference using the pooled standard deviation.
pub fn cohens_d(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return f64::NAN;
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let pooled = (((na - 1.0) * variance(a) + (nb - 1.0) * variance(b)) / (na + nb - 2.0)).sqrt();
    if !(pooled > 0.0) {
        return f64::NAN;
    }
    (mean(a) - mean(b)) / pooled
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anova {
    pub f: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub p: f64,
    pub eta_squared: f64,
}

/// One-way ANOVA across `groups`, with eta squared as the effect size.
pub fn one_way_anova(groups: &[Vec<f64>]) -> Result<Anova> {
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    let k = groups.len();
    let n: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n <= k {
        return Err(ReviewError::Degenerate(format!(
            "ANOVA needs at least two groups and more observations than groups (k={k}, n={n})"
        )));
    }
    let grand = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n as f64;
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for g in &groups {
        let m = mean(g);
        ss_between += g.len() as f64 * (m - grand).powi(2);
        ss_within += g.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    }
    if !(ss_within > 0.0) {
        return Err(ReviewError::Degenerate(
            "no within-group variance".to_string(),
        ));
    }
    let df_between = (k - 1) as f64;
    let df_within = (n - k) as f64;
    let f = (ss_between / df_between) / (ss_within / df_within);
    let dist = FisherSnedecor::new(df_between, df_within)
        .map_err(|e| ReviewError::Degenerate(e.to_string()))?;
    Ok(Anova {
        f,
        df_between,
        df_within,
        p: dist.sf(f),
        eta_squared: ss_between / (ss_between + ss_within),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquareTest {
    pub chi_square: f64,
    pub df: f64,
    pub p: f64,
    pub cramers_v: f64,
    /// Share of cells with an expected count below 5.
    pub sparse_fraction: f64,
}

/// Pearson chi-square test of independence on a contingency table of counts.
/// Empty rows and columns are dropped before testing.
pub fn chi_square_independence(table: &[Vec<f64>]) -> Result<ChiSquareTest> {
    let cols = table.first().map(|r| r.len()).unwrap_or(0);
    if table.iter().any(|r| r.len() != cols) {
        return Err(ReviewError::InvalidArgument(
            "contingency table is not rectangular".to_string(),
        ));
    }
    let row_sums: Vec<f64> = table.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..cols).map(|j| table.iter().map(|r| r[j]).sum()).collect();
    let rows_kept: Vec<usize> = (0..table.len()).filter(|&i| row_sums[i] > 0.0).collect();
    let cols_kept: Vec<usize> = (0..cols).filter(|&j| col_sums[j] > 0.0).collect();
    if rows_kept.len() < 2 || cols_kept.len() < 2 {
        return Err(ReviewError::Degenerate(format!(
            "contingency table has {}x{} non-empty cells",
            rows_kept.len(),
            cols_kept.len()
        )));
    }

    let total: f64 = row_sums.iter().sum();
    let mut chi_square = 0.0;
    let mut sparse = 0usize;
    for &i in &rows_kept {
        for &j in &cols_kept {
            let expected = row_sums[i] * col_sums[j] / total;
            if expected < 5.0 {
                sparse += 1;
            }
            chi_square += (table[i][j] - expected).powi(2) / expected;
        }
    }
    let (r, c) = (rows_kept.len() as f64, cols_kept.len() as f64);
    let df = (r - 1.0) * (c - 1.0);
    let min_dim = (r - 1.0).min(c - 1.0);
    Ok(ChiSquareTest {
        chi_square,
        df,
        p: pchisq(chi_square, df),
        cramers_v: (chi_square / (total * min_dim)).sqrt(),
        sparse_fraction: sparse as f64 / (r * c),
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChiSquareDifference {
    pub delta_chi_square: f64,
    pub delta_df: f64,
    /// `None` when the models are not nested in the expected direction.
    pub p: Option<f64>,
}

/// Difference test between a less constrained model and the next, more
/// constrained one.
pub fn chisq_difference(
    previous_chi_square: f64,
    previous_parameters: usize,
    current_chi_square: f64,
    current_parameters: usize,
) -> ChiSquareDifference {
    let delta_chi_square = current_chi_square - previous_chi_square;
    let delta_df = previous_parameters as f64 - current_parameters as f64;
    let p = if delta_df > 0.0 {
        Some(pchisq(delta_chi_square, delta_df))
    } else {
        None
    };
    ChiSquareDifference {
        delta_chi_square,
        delta_df,
        p,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledDifference {
    pub statistic: f64,
    pub df: f64,
    pub p: f64,
    pub scaling: f64,
}

/// Satorra-Bentler scaled likelihood-ratio difference.
///
/// Each model is `(loglikelihood, free parameters, scaling correction factor)`;
/// `nested` is the more constrained one.
pub fn scaled_lrt_difference(
    nested: (f64, usize, f64),
    comparison: (f64, usize, f64),
) -> Result<ScaledDifference> {
    let (l0, p0, c0) = nested;
    let (l1, p1, c1) = comparison;
    let (p0, p1) = (p0 as f64, p1 as f64);
    if p1 <= p0 {
        return Err(ReviewError::Degenerate(format!(
            "comparison model has {p1} parameters, nested model {p0}"
        )));
    }
    let scaling = (p0 * c0 - p1 * c1) / (p0 - p1);
    if !(scaling > 0.0) {
        return Err(ReviewError::Degenerate(format!(
            "scaled difference correction {scaling:.4} is not positive"
        )));
    }
    let statistic = -2.0 * (l0 - l1) / scaling;
    let df = p1 - p0;
    Ok(ScaledDifference {
        statistic,
        df,
        p: pchisq(statistic, df),
        scaling,
    })
}

/// Holm step-down adjustment. Non-finite p-values are carried through as NaN
/// and do not count toward the number of tests.
pub fn holm_adjust(pvalues: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..pvalues.len())
        .filter(|&i| pvalues[i].is_finite())
        .collect();
    order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));
    let m = order.len();

    let mut adjusted = vec![f64::NAN; pvalues.len()];
    let mut running = 0.0_f64;
    for (rank, &i) in order.iter().enumerate() {
        let value = ((m - rank) as f64 * pvalues[i]).min(1.0);
        running = running.max(value);
        adjusted[i] = running;
    }
    adjusted
}

pub fn significance_tier(p: f64) -> &'static str {
    if !p.is_finite() {
        "n/a"
    } else if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < 0.05 {
        "*"
    } else {
        "ns"
    }
}
