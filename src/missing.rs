//! Missing-data diagnostics: wave completeness, attrition patterns,
//! complete-vs-incomplete covariate comparison and Little's MCAR test.

use std::path::PathBuf;

use anyhow::Result;
use polars::prelude::*;
use tracing::debug;

use crate::console::{TextTable, emit, fmt_f64, fmt_p, section};
use crate::df_utils::{f64_column, has_column, observed};
use crate::error::ReviewError;
use crate::io::{ensure_dir, read_whitespace_table, write_csv};
use crate::layout::StudyLayout;
use crate::logging::{log_line, open_run_log, warn_line};
use crate::mcar::{McarOutcome, little_mcar};
use crate::qc::check_range_f64;
use crate::stats::{cohens_d, holm_adjust, summarize, welch_t_test};

pub const COMPLETENESS_CSV: &str = "wave_completeness.csv";
pub const ATTRITION_CSV: &str = "attrition_patterns.csv";
pub const COMPARISON_CSV: &str = "covariate_comparison.csv";

#[derive(Debug, Clone)]
pub struct MissingConfig {
    pub data: PathBuf,
    pub layout: StudyLayout,
    pub out_dir: PathBuf,
    pub alpha: f64,
    /// Covariates observed for fewer subjects than this are not tested.
    pub min_observed: usize,
}

impl Default for MissingConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from("data/analysis.dat"),
            layout: StudyLayout::six_wave(),
            out_dir: PathBuf::from("output/missing_data"),
            alpha: 0.05,
            min_observed: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttritionPattern {
    /// Present at every wave.
    Complete,
    /// Never present again after the first absent wave, including subjects
    /// absent throughout.
    Monotone,
    /// Some absent wave is followed by a present wave.
    Intermittent,
}

impl AttritionPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttritionPattern::Complete => "complete",
            AttritionPattern::Monotone => "monotone",
            AttritionPattern::Intermittent => "intermittent",
        }
    }
}

pub fn classify_attrition(presence: &[bool]) -> AttritionPattern {
    if presence.iter().all(|p| *p) {
        return AttritionPattern::Complete;
    }
    match presence.iter().position(|p| !*p) {
        Some(first_absent) if presence[first_absent..].iter().any(|p| *p) => {
            AttritionPattern::Intermittent
        }
        _ => AttritionPattern::Monotone,
    }
}

/// `presence[subject][wave]`: every field of the wave observed.
pub fn presence_matrix(df: &DataFrame, layout: &StudyLayout) -> Result<Vec<Vec<bool>>> {
    let n = df.height();
    let mut presence = vec![vec![true; layout.waves.len()]; n];
    for (w, wave) in layout.waves.iter().enumerate() {
        for field in &wave.fields {
            let values = f64_column(df, field)?;
            for (row, value) in values.iter().enumerate() {
                if value.is_none_or(|v| !v.is_finite()) {
                    presence[row][w] = false;
                }
            }
        }
    }
    Ok(presence)
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveCompleteness {
    pub label: String,
    pub age: f64,
    pub complete: usize,
    pub total: usize,
    pub percent: f64,
}

pub fn wave_completeness(presence: &[Vec<bool>], layout: &StudyLayout) -> Vec<WaveCompleteness> {
    let total = presence.len();
    layout
        .waves
        .iter()
        .enumerate()
        .map(|(w, wave)| {
            let complete = presence.iter().filter(|p| p[w]).count();
            WaveCompleteness {
                label: wave.label.clone(),
                age: wave.age,
                complete,
                total,
                percent: if total == 0 {
                    f64::NAN
                } else {
                    100.0 * complete as f64 / total as f64
                },
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttritionSummary {
    /// `waves_completed[k]` subjects were present at exactly `k` waves.
    pub waves_completed: Vec<usize>,
    pub total: usize,
    pub complete: usize,
    pub monotone: usize,
    pub intermittent: usize,
}

impl AttritionSummary {
    pub fn incomplete(&self) -> usize {
        self.total - self.complete
    }

    /// Share of subjects with any missing wave; `None` when all are complete.
    pub fn monotone_percent(&self) -> Option<f64> {
        let incomplete = self.incomplete();
        (incomplete > 0).then(|| 100.0 * self.monotone as f64 / incomplete as f64)
    }

    pub fn intermittent_percent(&self) -> Option<f64> {
        let incomplete = self.incomplete();
        (incomplete > 0).then(|| 100.0 * self.intermittent as f64 / incomplete as f64)
    }
}

pub fn attrition_summary(presence: &[Vec<bool>], waves: usize) -> AttritionSummary {
    let mut summary = AttritionSummary {
        waves_completed: vec![0; waves + 1],
        total: presence.len(),
        complete: 0,
        monotone: 0,
        intermittent: 0,
    };
    for p in presence {
        summary.waves_completed[p.iter().filter(|v| **v).count()] += 1;
        match classify_attrition(p) {
            AttritionPattern::Complete => summary.complete += 1,
            AttritionPattern::Monotone => summary.monotone += 1,
            AttritionPattern::Intermittent => summary.intermittent += 1,
        }
    }
    summary
}

#[derive(Debug, Clone, PartialEq)]
pub struct CovariateComparison {
    pub covariate: String,
    pub n_complete: usize,
    pub mean_complete: f64,
    pub sd_complete: f64,
    pub n_incomplete: usize,
    pub mean_incomplete: f64,
    pub sd_incomplete: f64,
    pub t: f64,
    pub df: f64,
    pub p: f64,
    pub p_holm: f64,
    pub cohens_d: f64,
    pub significant: bool,
}

/// Welch t-test per covariate between subjects complete at every wave and the
/// rest, Holm-corrected across all covariates tested.
pub fn compare_complete_incomplete(
    df: &DataFrame,
    complete: &[bool],
    covariates: &[String],
    min_observed: usize,
    alpha: f64,
    warnings: &mut Vec<String>,
) -> Result<Vec<CovariateComparison>> {
    let mut rows = Vec::new();
    for covariate in covariates {
        if !has_column(df, covariate) {
            debug!("covariate {covariate} not in dataset");
            continue;
        }
        let values = f64_column(df, covariate)?;
        let total_observed = observed(&values).len();
        if total_observed < min_observed {
            warnings.push(format!(
                "{covariate}: {total_observed} observed values, below the floor of {min_observed}; not tested"
            ));
            continue;
        }
        let (mut a, mut b) = (Vec::new(), Vec::new());
        for (value, is_complete) in values.iter().zip(complete) {
            if let Some(v) = value
                && v.is_finite()
            {
                if *is_complete {
                    a.push(*v);
                } else {
                    b.push(*v);
                }
            }
        }
        let (sa, sb) = (summarize(&a), summarize(&b));
        let (t, dof, p) = match welch_t_test(&a, &b) {
            Ok(test) => (test.t, test.df, test.p),
            Err(e) => {
                warnings.push(format!("{covariate}: {e}"));
                (f64::NAN, f64::NAN, f64::NAN)
            }
        };
        rows.push(CovariateComparison {
            covariate: covariate.clone(),
            n_complete: sa.n,
            mean_complete: sa.mean,
            sd_complete: sa.sd,
            n_incomplete: sb.n,
            mean_incomplete: sb.mean,
            sd_incomplete: sb.sd,
            t,
            df: dof,
            p,
            p_holm: f64::NAN,
            cohens_d: cohens_d(&a, &b),
            significant: false,
        });
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.p).collect();
    for (row, adjusted) in rows.iter_mut().zip(holm_adjust(&raw)) {
        row.p_holm = adjusted;
        row.significant = adjusted < alpha;
    }
    Ok(rows)
}

/// Indicator values of every wave, one row per subject.
pub fn indicator_rows(df: &DataFrame, layout: &StudyLayout) -> Result<Vec<Vec<Option<f64>>>> {
    let fields = layout.indicator_fields();
    let columns: Vec<Vec<Option<f64>>> = fields
        .iter()
        .map(|f| f64_column(df, f))
        .collect::<Result<_>>()?;
    Ok((0..df.height())
        .map(|row| {
            columns
                .iter()
                .map(|c| c[row].filter(|v| v.is_finite()))
                .collect()
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingReport {
    pub completeness: Vec<WaveCompleteness>,
    pub attrition: AttritionSummary,
    pub comparisons: Vec<CovariateComparison>,
    pub mcar: McarOutcome,
    pub warnings: Vec<String>,
}

pub fn completeness_frame(rows: &[WaveCompleteness]) -> DataFrame {
    vec![
        Series::new(
            "wave".into(),
            rows.iter().map(|r| r.label.clone()).collect::<Vec<_>>(),
        ),
        Series::new("age".into(), rows.iter().map(|r| r.age).collect::<Vec<_>>()),
        Series::new(
            "n_complete".into(),
            rows.iter().map(|r| r.complete as u32).collect::<Vec<_>>(),
        ),
        Series::new(
            "n_total".into(),
            rows.iter().map(|r| r.total as u32).collect::<Vec<_>>(),
        ),
        Series::new(
            "percent_complete".into(),
            rows.iter().map(|r| r.percent).collect::<Vec<_>>(),
        ),
    ]
    .into_iter()
    .collect()
}

pub fn attrition_frame(summary: &AttritionSummary) -> DataFrame {
    let mut group = Vec::new();
    let mut value = Vec::new();
    let mut n = Vec::new();
    let mut percent: Vec<Option<f64>> = Vec::new();
    let mut of = Vec::new();

    let total = summary.total as f64;
    for (k, count) in summary.waves_completed.iter().enumerate() {
        group.push("waves_completed".to_string());
        value.push(k.to_string());
        n.push(*count as u32);
        percent.push((summary.total > 0).then(|| 100.0 * *count as f64 / total));
        of.push("all subjects".to_string());
    }
    group.push("pattern".to_string());
    value.push("complete".to_string());
    n.push(summary.complete as u32);
    percent.push((summary.total > 0).then(|| 100.0 * summary.complete as f64 / total));
    of.push("all subjects".to_string());
    for (label, count, pct) in [
        ("monotone", summary.monotone, summary.monotone_percent()),
        ("intermittent", summary.intermittent, summary.intermittent_percent()),
    ] {
        group.push("pattern".to_string());
        value.push(label.to_string());
        n.push(count as u32);
        percent.push(pct);
        of.push("incomplete subjects".to_string());
    }

    vec![
        Series::new("group".into(), group),
        Series::new("value".into(), value),
        Series::new("n".into(), n),
        Series::new("percent".into(), percent),
        Series::new("of".into(), of),
    ]
    .into_iter()
    .collect()
}

pub fn comparison_frame(rows: &[CovariateComparison]) -> DataFrame {
    let col = |f: fn(&CovariateComparison) -> f64| -> Vec<f64> { rows.iter().map(f).collect() };
    vec![
        Series::new(
            "covariate".into(),
            rows.iter().map(|r| r.covariate.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "n_complete".into(),
            rows.iter().map(|r| r.n_complete as u32).collect::<Vec<_>>(),
        ),
        Series::new("mean_complete".into(), col(|r| r.mean_complete)),
        Series::new("sd_complete".into(), col(|r| r.sd_complete)),
        Series::new(
            "n_incomplete".into(),
            rows.iter().map(|r| r.n_incomplete as u32).collect::<Vec<_>>(),
        ),
        Series::new("mean_incomplete".into(), col(|r| r.mean_incomplete)),
        Series::new("sd_incomplete".into(), col(|r| r.sd_incomplete)),
        Series::new("t".into(), col(|r| r.t)),
        Series::new("df".into(), col(|r| r.df)),
        Series::new("p".into(), col(|r| r.p)),
        Series::new("p_holm".into(), col(|r| r.p_holm)),
        Series::new("cohens_d".into(), col(|r| r.cohens_d)),
        Series::new(
            "significant".into(),
            rows.iter().map(|r| r.significant).collect::<Vec<_>>(),
        ),
    ]
    .into_iter()
    .collect()
}

fn completeness_console(rows: &[WaveCompleteness]) -> String {
    let mut table = TextTable::new(&["Wave", "Age", "Complete", "Total", "%"]);
    for r in rows {
        table.push_row(vec![
            r.label.clone(),
            fmt_f64(r.age, 1),
            r.complete.to_string(),
            r.total.to_string(),
            fmt_f64(r.percent, 1),
        ]);
    }
    table.render()
}

fn attrition_console(summary: &AttritionSummary) -> String {
    let mut table = TextTable::new(&["Waves completed", "N", "%"]);
    for (k, count) in summary.waves_completed.iter().enumerate() {
        table.push_row(vec![
            k.to_string(),
            count.to_string(),
            fmt_f64(100.0 * *count as f64 / summary.total.max(1) as f64, 1),
        ]);
    }
    let pct = |v: Option<f64>| v.map(|p| format!("{p:.1}%")).unwrap_or_else(|| "n/a".into());
    format!(
        "{}\nComplete at every wave: {}\nMonotone dropout: {} ({} of incomplete)\nIntermittent: {} ({} of incomplete)",
        table.render(),
        summary.complete,
        summary.monotone,
        pct(summary.monotone_percent()),
        summary.intermittent,
        pct(summary.intermittent_percent()),
    )
}

fn comparison_console(rows: &[CovariateComparison]) -> String {
    let mut table = TextTable::new(&[
        "Covariate", "M complete", "M incomplete", "t", "df", "p", "p Holm", "d", "Sig",
    ]);
    for r in rows {
        table.push_row(vec![
            r.covariate.clone(),
            fmt_f64(r.mean_complete, 3),
            fmt_f64(r.mean_incomplete, 3),
            fmt_f64(r.t, 2),
            fmt_f64(r.df, 1),
            fmt_p(r.p),
            fmt_p(r.p_holm),
            fmt_f64(r.cohens_d, 2),
            if r.significant { "yes" } else { "" }.to_string(),
        ]);
    }
    table.render()
}

fn mcar_console(outcome: &McarOutcome) -> String {
    match outcome {
        McarOutcome::Ran(t) => format!(
            "Little's MCAR test: chi2 = {:.3}, df = {}, p = {}\n{} cases, {} missing-data patterns\n{}",
            t.statistic,
            t.df,
            fmt_p(t.p),
            t.cases,
            t.patterns,
            outcome.interpretation()
        ),
        McarOutcome::DidNotRun(_) => format!("Little's MCAR test: {}", outcome.interpretation()),
    }
}

/// Runs the diagnostics on `config.data` and writes the three CSVs.
pub fn missing_data(config: &MissingConfig) -> Result<MissingReport> {
    check_range_f64(config.alpha, 0.0, 1.0, false, "alpha")?;
    config.layout.validate()?;
    let layout = &config.layout;
    let df = read_whitespace_table(
        &config.data,
        &layout.columns,
        &layout.id_column,
        &layout.missing_tokens,
    )?;
    ensure_dir(&config.out_dir)?;
    let mut log = open_run_log(&config.out_dir, "missing_data")?;
    log_line(
        &mut log,
        &format!(
            "Missing-data diagnostics for {} subjects from {}",
            df.height(),
            config.data.display()
        ),
        true,
    )?;
    if let Some(design) = &layout.design {
        log_line(
            &mut log,
            &format!(
                "Design columns {}/{}/{} are not applied; tests below are unweighted",
                design.stratum, design.cluster, design.weight
            ),
            true,
        )?;
    }

    let presence = presence_matrix(&df, layout)?;
    let completeness = wave_completeness(&presence, layout);
    let attrition = attrition_summary(&presence, layout.waves.len());
    if attrition.waves_completed.iter().sum::<usize>() != attrition.total {
        return Err(ReviewError::Degenerate("attrition counts do not sum to N".into()).into());
    }

    let complete: Vec<bool> = presence.iter().map(|p| p.iter().all(|v| *v)).collect();
    let mut warnings = Vec::new();
    let comparisons = compare_complete_incomplete(
        &df,
        &complete,
        &layout.covariates,
        config.min_observed,
        config.alpha,
        &mut warnings,
    )?;
    for w in &warnings {
        warn_line(&mut log, w)?;
    }

    let mcar = little_mcar(&indicator_rows(&df, layout)?);
    if let McarOutcome::DidNotRun(reason) = &mcar {
        warn_line(&mut log, &format!("Little's MCAR test did not run: {reason}"))?;
    }

    emit(&mut log, &section("1. COMPLETENESS BY WAVE"))?;
    emit(&mut log, &completeness_console(&completeness))?;
    emit(&mut log, &section("2. ATTRITION PATTERNS"))?;
    emit(&mut log, &attrition_console(&attrition))?;
    emit(&mut log, &section("3. COMPLETE VS INCOMPLETE SUBJECTS"))?;
    if comparisons.is_empty() {
        emit(&mut log, "No covariates could be compared.")?;
    } else {
        emit(&mut log, &comparison_console(&comparisons))?;
        emit(
            &mut log,
            &format!(
                "Holm-corrected p < {} marks covariates related to missingness; include them as\n\
                 auxiliary variables so FIML's MAR assumption is more plausible.",
                config.alpha
            ),
        )?;
    }
    emit(&mut log, &section("4. GLOBAL MCAR TEST"))?;
    emit(&mut log, &mcar_console(&mcar))?;

    write_csv(&mut completeness_frame(&completeness), &config.out_dir.join(COMPLETENESS_CSV))?;
    write_csv(&mut attrition_frame(&attrition), &config.out_dir.join(ATTRITION_CSV))?;
    write_csv(&mut comparison_frame(&comparisons), &config.out_dir.join(COMPARISON_CSV))?;
    log_line(
        &mut log,
        &format!(
            "Wrote {COMPLETENESS_CSV}, {ATTRITION_CSV} and {COMPARISON_CSV} to {}",
            config.out_dir.display()
        ),
        true,
    )?;

    Ok(MissingReport {
        completeness,
        attrition,
        comparisons,
        mcar,
        warnings,
    })
}
