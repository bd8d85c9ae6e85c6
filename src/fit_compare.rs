//! Fit-comparison extractor.
//!
//! Builds the measurement-invariance table (fixed order, each step tested
//! against the previous one) and the class-enumeration table (one row per
//! class count found in the report directory) from external model reports.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use fitreport::{DirectoryReportSource, EnumerationFit, InvarianceFit, ReportError, ReportSource};
use polars::prelude::*;
use regex::Regex;
use tracing::debug;

use crate::console::{TextTable, emit, fmt_f64, fmt_opt, fmt_p, section};
use crate::error::ReviewError;
use crate::io::{ensure_dir, write_csv};
use crate::logging::{log_line, open_run_log, warn_line};
use crate::qc::check_range_f64;
use crate::stats::{ChiSquareDifference, ScaledDifference, chisq_difference, scaled_lrt_difference};

pub const INVARIANCE_CSV: &str = "invariance_comparison.csv";
pub const ENUMERATION_CSV: &str = "class_enumeration.csv";

#[derive(Debug, Clone)]
pub struct FitCompareConfig {
    pub report_dir: PathBuf,
    pub out_dir: PathBuf,
    /// `(label, report file)` from least to most constrained.
    pub invariance_steps: Vec<(String, String)>,
    /// File-name template with one `{k}` placeholder for the class count.
    pub enumeration_pattern: String,
    pub entropy_threshold: f64,
    pub minority_threshold: f64,
}

impl Default for FitCompareConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("mplus_output"),
            out_dir: PathBuf::from("output/fit_comparison"),
            invariance_steps: vec![
                ("configural".into(), "invariance_configural.out".into()),
                ("partial".into(), "invariance_partial.out".into()),
                ("full".into(), "invariance_full.out".into()),
            ],
            enumeration_pattern: "lcga_{k}class.out".into(),
            entropy_threshold: 0.80,
            minority_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvarianceDelta {
    pub against: String,
    pub delta_cfi: f64,
    pub delta_tli: f64,
    pub delta_rmsea: f64,
    pub chi_square: ChiSquareDifference,
    pub scaled: Option<ScaledDifference>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvarianceRow {
    pub label: String,
    pub report: String,
    pub fit: InvarianceFit,
    pub delta: Option<InvarianceDelta>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationRow {
    pub report: String,
    pub fit: EnumerationFit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub classes: usize,
    pub bic: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FitComparison {
    pub invariance: Vec<InvarianceRow>,
    pub enumeration: Vec<EnumerationRow>,
    pub recommendation: Option<Recommendation>,
    /// Skipped files and advisory notes, in the order they arose.
    pub warnings: Vec<String>,
}

/// Compiles `lcga_{k}class.out` into `^lcga_(\d+)class\.out$`.
pub fn class_count_pattern(template: &str) -> crate::error::Result<Regex> {
    let parts: Vec<&str> = template.split("{k}").collect();
    if parts.len() != 2 {
        return Err(ReviewError::InvalidArgument(format!(
            "pattern {template:?} must contain exactly one {{k}} placeholder"
        )));
    }
    let pattern = format!("^{}(\\d+){}$", regex::escape(parts[0]), regex::escape(parts[1]));
    Regex::new(&pattern).map_err(|e| ReviewError::InvalidArgument(e.to_string()))
}

fn describe_skip(id: &str, err: &ReportError) -> String {
    match err {
        ReportError::NotFound(path) => format!("report {} not found, skipped", path.display()),
        ReportError::MissingField { field, .. } => {
            format!("report {id} lacks {field}, skipped")
        }
        other => format!("report {id} skipped: {other}"),
    }
}

pub fn build_invariance_table(
    source: &dyn ReportSource,
    steps: &[(String, String)],
    warnings: &mut Vec<String>,
) -> Vec<InvarianceRow> {
    let mut rows: Vec<InvarianceRow> = Vec::new();
    for (label, report) in steps {
        let fit = match source
            .summary(report)
            .and_then(|s| InvarianceFit::from_summary(&s))
        {
            Ok(fit) => fit,
            Err(e) => {
                warnings.push(describe_skip(report, &e));
                continue;
            }
        };

        let delta = rows
            .last()
            .map(|prev| invariance_delta(prev, label, &fit, warnings));
        rows.push(InvarianceRow {
            label: label.clone(),
            report: report.clone(),
            fit,
            delta,
        });
    }
    rows
}

fn invariance_delta(
    prev: &InvarianceRow,
    label: &str,
    fit: &InvarianceFit,
    warnings: &mut Vec<String>,
) -> InvarianceDelta {
    let chi_square = chisq_difference(
        prev.fit.chi_square,
        prev.fit.free_parameters,
        fit.chi_square,
        fit.free_parameters,
    );
    if chi_square.p.is_none() {
        warnings.push(format!(
            "{label} vs {}: parameter difference {} is not positive, chi-square difference p not available",
            prev.label, chi_square.delta_df
        ));
    }

    let scaled = match (
        fit.loglikelihood,
        fit.scaling_factor,
        prev.fit.loglikelihood,
        prev.fit.scaling_factor,
    ) {
        (Some(l0), Some(c0), Some(l1), Some(c1)) => {
            match scaled_lrt_difference(
                (l0, fit.free_parameters, c0),
                (l1, prev.fit.free_parameters, c1),
            ) {
                Ok(s) => Some(s),
                Err(e) => {
                    warnings.push(format!("{label} vs {}: scaled difference {e}", prev.label));
                    None
                }
            }
        }
        _ => None,
    };

    InvarianceDelta {
        against: prev.label.clone(),
        delta_cfi: fit.cfi - prev.fit.cfi,
        delta_tli: fit.tli - prev.fit.tli,
        delta_rmsea: fit.rmsea - prev.fit.rmsea,
        chi_square,
        scaled,
    }
}

/// One row per class count whose report matches `pattern`, ascending.
pub fn build_enumeration_table(
    source: &dyn ReportSource,
    pattern: &Regex,
    warnings: &mut Vec<String>,
) -> Result<Vec<EnumerationRow>> {
    let mut by_classes: BTreeMap<usize, String> = BTreeMap::new();
    for id in source.ids().context("list reports")? {
        let Some(classes) = pattern
            .captures(&id)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        else {
            debug!("{id} does not match the enumeration pattern");
            continue;
        };
        if classes == 0 {
            warnings.push(format!("report {id} names zero classes, skipped"));
            continue;
        }
        if let Some(kept) = by_classes.get(&classes) {
            warnings.push(format!(
                "report {id} duplicates the {classes}-class model already read from {kept}, skipped"
            ));
            continue;
        }
        by_classes.insert(classes, id);
    }

    let mut rows = Vec::with_capacity(by_classes.len());
    for (classes, id) in by_classes {
        let fit = match source
            .summary(&id)
            .and_then(|s| EnumerationFit::from_summary(&s, classes))
        {
            Ok(fit) => fit,
            Err(e) => {
                warnings.push(describe_skip(&id, &e));
                continue;
            }
        };
        if !fit.terminated_normally {
            warnings.push(format!("{id}: estimation did not terminate normally"));
        }
        if !fit.replicated {
            warnings.push(format!(
                "{id}: best loglikelihood not replicated; increase random starts"
            ));
        }
        rows.push(EnumerationRow { report: id, fit });
    }
    Ok(rows)
}

/// Minimum-BIC model plus advisory warnings about its classification quality.
pub fn recommend(
    rows: &[EnumerationRow],
    entropy_threshold: f64,
    minority_threshold: f64,
) -> Option<Recommendation> {
    let best = rows
        .iter()
        .min_by(|a, b| a.fit.bic.total_cmp(&b.fit.bic))?;
    let mut warnings = Vec::new();
    if let Some(entropy) = best.fit.entropy
        && entropy < entropy_threshold
    {
        warnings.push(format!(
            "{}-class model entropy {entropy:.3} is below {entropy_threshold:.2}; classification is imprecise",
            best.fit.classes
        ));
    }
    if let Some(smallest) = best.fit.smallest_class()
        && smallest.proportion < minority_threshold
    {
        warnings.push(format!(
            "{}-class model smallest class (class {}) holds {:.1}% of the sample, below {:.1}%; it may not replicate",
            best.fit.classes,
            smallest.class,
            smallest.proportion * 100.0,
            minority_threshold * 100.0
        ));
    }
    Some(Recommendation {
        classes: best.fit.classes,
        bic: best.fit.bic,
        warnings,
    })
}

pub fn invariance_frame(rows: &[InvarianceRow]) -> Result<DataFrame> {
    let delta = |f: fn(&InvarianceDelta) -> Option<f64>| -> Vec<Option<f64>> {
        rows.iter().map(|r| r.delta.as_ref().and_then(f)).collect()
    };
    let columns = vec![
        Series::new(
            "model".into(),
            rows.iter().map(|r| r.label.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "report".into(),
            rows.iter().map(|r| r.report.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "free_parameters".into(),
            rows.iter().map(|r| r.fit.free_parameters as u32).collect::<Vec<_>>(),
        ),
        Series::new(
            "chi_square".into(),
            rows.iter().map(|r| r.fit.chi_square).collect::<Vec<_>>(),
        ),
        Series::new(
            "df".into(),
            rows.iter().map(|r| r.fit.chi_square_df).collect::<Vec<_>>(),
        ),
        Series::new(
            "p".into(),
            rows.iter().map(|r| r.fit.chi_square_p).collect::<Vec<_>>(),
        ),
        Series::new("cfi".into(), rows.iter().map(|r| r.fit.cfi).collect::<Vec<_>>()),
        Series::new("tli".into(), rows.iter().map(|r| r.fit.tli).collect::<Vec<_>>()),
        Series::new("rmsea".into(), rows.iter().map(|r| r.fit.rmsea).collect::<Vec<_>>()),
        Series::new("srmr".into(), rows.iter().map(|r| r.fit.srmr).collect::<Vec<_>>()),
        Series::new("delta_cfi".into(), delta(|d| Some(d.delta_cfi))),
        Series::new("delta_tli".into(), delta(|d| Some(d.delta_tli))),
        Series::new("delta_rmsea".into(), delta(|d| Some(d.delta_rmsea))),
        Series::new(
            "delta_chi_square".into(),
            delta(|d| Some(d.chi_square.delta_chi_square)),
        ),
        Series::new("delta_df".into(), delta(|d| Some(d.chi_square.delta_df))),
        Series::new("delta_p".into(), delta(|d| d.chi_square.p)),
        Series::new("scaled_trd".into(), delta(|d| d.scaled.map(|s| s.statistic))),
        Series::new("scaled_df".into(), delta(|d| d.scaled.map(|s| s.df))),
        Series::new("scaled_p".into(), delta(|d| d.scaled.map(|s| s.p))),
    ];
    Ok(columns.into_iter().collect::<DataFrame>())
}

pub fn enumeration_frame(rows: &[EnumerationRow], recommended: Option<usize>) -> Result<DataFrame> {
    let col = |f: fn(&EnumerationFit) -> Option<f64>| -> Vec<Option<f64>> {
        rows.iter().map(|r| f(&r.fit)).collect()
    };
    let columns = vec![
        Series::new(
            "classes".into(),
            rows.iter().map(|r| r.fit.classes as u32).collect::<Vec<_>>(),
        ),
        Series::new(
            "report".into(),
            rows.iter().map(|r| r.report.clone()).collect::<Vec<_>>(),
        ),
        Series::new(
            "free_parameters".into(),
            rows.iter().map(|r| r.fit.free_parameters as u32).collect::<Vec<_>>(),
        ),
        Series::new("loglikelihood".into(), col(|f| Some(f.loglikelihood))),
        Series::new("aic".into(), col(|f| Some(f.aic))),
        Series::new("bic".into(), col(|f| Some(f.bic))),
        Series::new("sabic".into(), col(|f| f.sabic)),
        Series::new("entropy".into(), col(|f| f.entropy)),
        Series::new("vlmr_p".into(), col(|f| f.vlmr_p)),
        Series::new("lmr_adjusted_p".into(), col(|f| f.lmr_adjusted_p)),
        Series::new("blrt_p".into(), col(|f| f.blrt_p)),
        Series::new("smallest_class_n".into(), col(|f| f.smallest_class().map(|c| c.count))),
        Series::new(
            "smallest_class_prop".into(),
            col(|f| f.smallest_class().map(|c| c.proportion)),
        ),
        Series::new(
            "replicated".into(),
            rows.iter().map(|r| r.fit.replicated).collect::<Vec<_>>(),
        ),
        Series::new(
            "terminated_normally".into(),
            rows.iter().map(|r| r.fit.terminated_normally).collect::<Vec<_>>(),
        ),
        Series::new(
            "recommended".into(),
            rows.iter()
                .map(|r| Some(r.fit.classes) == recommended)
                .collect::<Vec<_>>(),
        ),
    ];
    Ok(columns.into_iter().collect::<DataFrame>())
}

fn invariance_console(rows: &[InvarianceRow]) -> String {
    let mut table = TextTable::new(&[
        "Model", "Npar", "Chi2", "df", "CFI", "TLI", "RMSEA", "dCFI", "dRMSEA", "dChi2", "ddf",
        "p(diff)", "TRd", "p(TRd)",
    ]);
    for r in rows {
        let d = r.delta.as_ref();
        table.push_row(vec![
            r.label.clone(),
            r.fit.free_parameters.to_string(),
            fmt_f64(r.fit.chi_square, 2),
            fmt_f64(r.fit.chi_square_df, 0),
            fmt_f64(r.fit.cfi, 3),
            fmt_f64(r.fit.tli, 3),
            fmt_f64(r.fit.rmsea, 3),
            fmt_opt(d.map(|d| d.delta_cfi), 3),
            fmt_opt(d.map(|d| d.delta_rmsea), 3),
            fmt_opt(d.map(|d| d.chi_square.delta_chi_square), 2),
            fmt_opt(d.map(|d| d.chi_square.delta_df), 0),
            d.and_then(|d| d.chi_square.p).map(fmt_p).unwrap_or_else(|| "n/a".into()),
            fmt_opt(d.and_then(|d| d.scaled.map(|s| s.statistic)), 2),
            d.and_then(|d| d.scaled.map(|s| fmt_p(s.p)))
                .unwrap_or_else(|| "n/a".into()),
        ]);
    }
    table.render()
}

fn enumeration_console(rows: &[EnumerationRow], recommended: Option<usize>) -> String {
    let mut table = TextTable::new(&[
        "Classes", "Npar", "LL", "AIC", "BIC", "SABIC", "Entropy", "VLMR p", "BLRT p",
        "Smallest %", "Flags",
    ]);
    for r in rows {
        let f = &r.fit;
        let mut flags = Vec::new();
        if Some(f.classes) == recommended {
            flags.push("min BIC");
        }
        if !f.replicated {
            flags.push("not replicated");
        }
        if !f.terminated_normally {
            flags.push("abnormal end");
        }
        table.push_row(vec![
            f.classes.to_string(),
            f.free_parameters.to_string(),
            fmt_f64(f.loglikelihood, 3),
            fmt_f64(f.aic, 3),
            fmt_f64(f.bic, 3),
            fmt_opt(f.sabic, 3),
            fmt_opt(f.entropy, 3),
            f.vlmr_p.map(fmt_p).unwrap_or_else(|| "n/a".into()),
            f.blrt_p.map(fmt_p).unwrap_or_else(|| "n/a".into()),
            fmt_opt(f.smallest_class().map(|c| c.proportion * 100.0), 1),
            flags.join(", "),
        ]);
    }
    table.render()
}

/// Runs the extractor against `config.report_dir` and writes both CSVs.
pub fn fit_compare(config: &FitCompareConfig) -> Result<FitComparison> {
    check_range_f64(config.entropy_threshold, 0.0, 1.0, true, "entropy_threshold")?;
    check_range_f64(config.minority_threshold, 0.0, 1.0, true, "minority_threshold")?;
    let pattern = class_count_pattern(&config.enumeration_pattern)?;
    if !config.report_dir.is_dir() {
        return Err(ReviewError::MissingInput(config.report_dir.clone()).into());
    }
    ensure_dir(&config.out_dir)?;
    let mut log = open_run_log(&config.out_dir, "fit_compare")?;
    log_line(
        &mut log,
        &format!("Fit comparison of reports in {} began", config.report_dir.display()),
        true,
    )?;

    let source = DirectoryReportSource::new(&config.report_dir);
    let mut warnings = Vec::new();
    let invariance = build_invariance_table(&source, &config.invariance_steps, &mut warnings);
    let enumeration = build_enumeration_table(&source, &pattern, &mut warnings)?;
    let recommendation = recommend(
        &enumeration,
        config.entropy_threshold,
        config.minority_threshold,
    );
    for w in &warnings {
        warn_line(&mut log, w)?;
    }

    emit(&mut log, &section("MEASUREMENT INVARIANCE"))?;
    if invariance.is_empty() {
        emit(&mut log, "No invariance reports could be read.")?;
    } else {
        emit(&mut log, &invariance_console(&invariance))?;
        emit(
            &mut log,
            "Guidance: a constrained model is supported when dCFI >= -0.010 and dRMSEA <= 0.015;\n\
             with MLR estimation use the scaled difference TRd rather than the raw dChi2.",
        )?;
    }

    let recommended = recommendation.as_ref().map(|r| r.classes);
    emit(&mut log, &section("CLASS ENUMERATION"))?;
    if enumeration.is_empty() {
        emit(
            &mut log,
            &format!("No reports matched {}.", config.enumeration_pattern),
        )?;
    } else {
        emit(&mut log, &enumeration_console(&enumeration, recommended))?;
    }
    if let Some(rec) = &recommendation {
        log_line(
            &mut log,
            &format!(
                "Recommended by minimum BIC: {}-class model (BIC = {:.3})",
                rec.classes, rec.bic
            ),
            true,
        )?;
        for w in &rec.warnings {
            warn_line(&mut log, w)?;
        }
        emit(
            &mut log,
            "Guidance: entropy >= 0.80 indicates clear separation; every class should hold\n\
             at least 5% of the sample; a significant VLMR or BLRT p favours k over k-1 classes.",
        )?;
    }

    let mut inv_df = invariance_frame(&invariance)?;
    write_csv(&mut inv_df, &config.out_dir.join(INVARIANCE_CSV))?;
    let mut enum_df = enumeration_frame(&enumeration, recommended)?;
    write_csv(&mut enum_df, &config.out_dir.join(ENUMERATION_CSV))?;
    log_line(
        &mut log,
        &format!(
            "Wrote {INVARIANCE_CSV} and {ENUMERATION_CSV} to {}",
            config.out_dir.display()
        ),
        true,
    )?;

    let mut warnings = warnings;
    if let Some(rec) = &recommendation {
        warnings.extend(rec.warnings.iter().cloned());
    }
    Ok(FitComparison {
        invariance,
        enumeration,
        recommendation,
        warnings,
    })
}
