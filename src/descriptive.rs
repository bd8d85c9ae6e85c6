//! Descriptive validation of the latent classes against covariates and the
//! key outcome, plus the per-class trajectory plot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotly::common::{ErrorData, ErrorType, Mode};
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};
use polars::prelude::*;
use tracing::debug;

use crate::console::{TextTable, emit, fmt_f64, fmt_p, section};
use crate::df_utils::{class_groups, f64_column, has_column, inner_join_on, observed, observed_at};
use crate::error::ReviewError;
use crate::io::{ensure_dir, read_whitespace_table, write_csv};
use crate::layout::StudyLayout;
use crate::logging::{log_line, open_run_log, warn_line};
use crate::plot_utils::{ensure_plots_dir, plot_path};
use crate::stats::{
    chi_square_independence, cohens_d, holm_adjust, one_way_anova, significance_tier, summarize,
    welch_t_test,
};

pub const COVARIATES_CSV: &str = "covariates_by_class.csv";
pub const PLOT_WIDTH: usize = 900;
pub const PLOT_HEIGHT: usize = 600;

#[derive(Debug, Clone)]
pub struct DescriptiveConfig {
    pub data: PathBuf,
    pub class_file: PathBuf,
    pub layout: StudyLayout,
    pub out_dir: PathBuf,
    pub plots_dir: PathBuf,
}

impl Default for DescriptiveConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from("data/analysis.dat"),
            class_file: PathBuf::from("mplus_output/lcga_3class_cprob.dat"),
            layout: StudyLayout::six_wave(),
            out_dir: PathBuf::from("output/descriptive"),
            plots_dir: PathBuf::from("output/descriptive/plots"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSize {
    pub class: u32,
    pub n: usize,
    pub proportion: f64,
    /// Average posterior probability of the assigned class.
    pub avepp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassCell {
    pub class: u32,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousSummary {
    pub covariate: String,
    pub cells: Vec<ClassCell>,
    /// Classes left out of the test for having fewer than two observations.
    pub excluded: Vec<u32>,
    pub f: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub p: f64,
    pub eta_squared: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalSummary {
    pub covariate: String,
    pub classes: Vec<u32>,
    pub levels: Vec<f64>,
    /// `counts[class][level]`.
    pub counts: Vec<Vec<f64>>,
    pub chi_square: f64,
    pub df: f64,
    pub p: f64,
    pub cramers_v: f64,
    pub sparse: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairwiseRow {
    pub class_a: u32,
    pub class_b: u32,
    pub n_a: usize,
    pub n_b: usize,
    pub mean_difference: f64,
    pub t: f64,
    pub df: f64,
    pub p: f64,
    pub p_holm: f64,
    pub cohens_d: f64,
    pub tier: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPoint {
    pub class: u32,
    pub wave: String,
    pub age: f64,
    pub n: usize,
    pub mean: f64,
    pub se: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveReport {
    pub matched: usize,
    pub unmatched_class_rows: usize,
    pub class_sizes: Vec<ClassSize>,
    pub continuous: Vec<ContinuousSummary>,
    pub categorical: Vec<CategoricalSummary>,
    pub outcome: Option<String>,
    pub pairwise: Vec<PairwiseRow>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub plot: Option<PathBuf>,
    pub warnings: Vec<String>,
}

pub fn class_sizes(
    df: &DataFrame,
    groups: &BTreeMap<u32, Vec<usize>>,
    posterior_columns: &[&str],
) -> Result<Vec<ClassSize>> {
    let total: usize = groups.values().map(|g| g.len()).sum();
    let mut sizes = Vec::with_capacity(groups.len());
    for (&class, rows) in groups {
        let avepp = match posterior_columns.get(class as usize - 1) {
            Some(col) if has_column(df, col) => {
                let values = observed_at(&f64_column(df, col)?, rows);
                (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
            }
            _ => None,
        };
        sizes.push(ClassSize {
            class,
            n: rows.len(),
            proportion: rows.len() as f64 / total as f64,
            avepp,
        });
    }
    Ok(sizes)
}

/// Per-class summaries and one-way ANOVA for one continuous covariate.
pub fn continuous_summary(
    covariate: &str,
    values: &[Option<f64>],
    groups: &BTreeMap<u32, Vec<usize>>,
    warnings: &mut Vec<String>,
) -> ContinuousSummary {
    let mut cells = Vec::with_capacity(groups.len());
    let mut tested = Vec::new();
    let mut excluded = Vec::new();
    for (&class, rows) in groups {
        let xs = observed_at(values, rows);
        let s = summarize(&xs);
        cells.push(ClassCell {
            class,
            n: s.n,
            mean: s.mean,
            sd: s.sd,
        });
        if xs.len() < 2 {
            excluded.push(class);
        } else {
            tested.push(xs);
        }
    }
    let (f, df_between, df_within, p, eta_squared) = match one_way_anova(&tested) {
        Ok(a) => (a.f, a.df_between, a.df_within, a.p, a.eta_squared),
        Err(e) => {
            warnings.push(format!("{covariate}: ANOVA not run, {e}"));
            (f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN)
        }
    };
    ContinuousSummary {
        covariate: covariate.to_string(),
        cells,
        excluded,
        f,
        df_between,
        df_within,
        p,
        eta_squared,
    }
}

/// Class-by-level cross-tabulation with a Pearson chi-square test.
pub fn categorical_summary(
    covariate: &str,
    values: &[Option<f64>],
    groups: &BTreeMap<u32, Vec<usize>>,
    warnings: &mut Vec<String>,
) -> CategoricalSummary {
    let mut levels: Vec<f64> = groups
        .values()
        .flat_map(|rows| observed_at(values, rows))
        .collect();
    levels.sort_by(|a, b| a.total_cmp(b));
    levels.dedup();

    let classes: Vec<u32> = groups.keys().copied().collect();
    let counts: Vec<Vec<f64>> = groups
        .values()
        .map(|rows| {
            let xs = observed_at(values, rows);
            levels
                .iter()
                .map(|level| xs.iter().filter(|x| *x == level).count() as f64)
                .collect()
        })
        .collect();

    let (chi_square, df, p, cramers_v, sparse) = match chi_square_independence(&counts) {
        Ok(t) => (t.chi_square, t.df, t.p, t.cramers_v, t.sparse_fraction > 0.2),
        Err(e) => {
            warnings.push(format!("{covariate}: chi-square test not run, {e}"));
            (f64::NAN, f64::NAN, f64::NAN, f64::NAN, false)
        }
    };
    CategoricalSummary {
        covariate: covariate.to_string(),
        classes,
        levels,
        counts,
        chi_square,
        df,
        p,
        cramers_v,
        sparse,
    }
}

/// Every unordered pair of class labels, Holm-corrected across the pairs.
pub fn pairwise_comparisons(
    outcome: &str,
    values: &[Option<f64>],
    groups: &BTreeMap<u32, Vec<usize>>,
    warnings: &mut Vec<String>,
) -> Vec<PairwiseRow> {
    let classes: Vec<u32> = groups.keys().copied().collect();
    let mut rows = Vec::with_capacity(classes.len() * classes.len().saturating_sub(1) / 2);
    for (i, &a) in classes.iter().enumerate() {
        for &b in &classes[i + 1..] {
            let xa = observed_at(values, &groups[&a]);
            let xb = observed_at(values, &groups[&b]);
            let (t, df, p) = match welch_t_test(&xa, &xb) {
                Ok(test) => (test.t, test.df, test.p),
                Err(e) => {
                    warnings.push(format!("{outcome}: class {a} vs {b} not tested, {e}"));
                    (f64::NAN, f64::NAN, f64::NAN)
                }
            };
            rows.push(PairwiseRow {
                class_a: a,
                class_b: b,
                n_a: xa.len(),
                n_b: xb.len(),
                mean_difference: summarize(&xa).mean - summarize(&xb).mean,
                t,
                df,
                p,
                p_holm: f64::NAN,
                cohens_d: cohens_d(&xa, &xb),
                tier: "n/a",
            });
        }
    }
    let raw: Vec<f64> = rows.iter().map(|r| r.p).collect();
    for (row, adjusted) in rows.iter_mut().zip(holm_adjust(&raw)) {
        row.p_holm = adjusted;
        row.tier = significance_tier(adjusted);
    }
    rows
}

pub fn trajectory(
    df: &DataFrame,
    layout: &StudyLayout,
    groups: &BTreeMap<u32, Vec<usize>>,
) -> Result<Vec<TrajectoryPoint>> {
    let mut points = Vec::new();
    let score_columns: Vec<Vec<Option<f64>>> = layout
        .class_file
        .wave_scores
        .iter()
        .map(|c| f64_column(df, c))
        .collect::<Result<_>>()?;
    for (&class, rows) in groups {
        for (wave, values) in layout.waves.iter().zip(&score_columns) {
            let s = summarize(&observed_at(values, rows));
            points.push(TrajectoryPoint {
                class,
                wave: wave.label.clone(),
                age: wave.age,
                n: s.n,
                mean: s.mean,
                se: s.se,
            });
        }
    }
    Ok(points)
}

pub fn write_trajectory_plot(points: &[TrajectoryPoint], path: &Path) {
    let mut by_class: BTreeMap<u32, Vec<&TrajectoryPoint>> = BTreeMap::new();
    for p in points {
        by_class.entry(p.class).or_default().push(p);
    }
    let mut plot = Plot::new();
    for (class, pts) in by_class {
        let n = pts.iter().map(|p| p.n).max().unwrap_or(0);
        let ages: Vec<f64> = pts.iter().map(|p| p.age).collect();
        let means: Vec<f64> = pts.iter().map(|p| p.mean).collect();
        let errors: Vec<f64> = pts
            .iter()
            .map(|p| if p.se.is_finite() { p.se } else { 0.0 })
            .collect();
        let trace = Scatter::new(ages, means)
            .mode(Mode::LinesMarkers)
            .name(format!("Class {class} (n={n})"))
            .error_y(ErrorData::new(ErrorType::Data).array(errors));
        plot.add_trace(trace);
    }
    let layout = Layout::new()
        .title("Mean trajectory by latent class (+/- 1 SE)")
        .x_axis(Axis::new().title("Age"))
        .y_axis(Axis::new().title("Mean score"))
        .width(PLOT_WIDTH)
        .height(PLOT_HEIGHT);
    plot.set_layout(layout);
    plot.write_html(path);
}

pub fn covariates_frame(
    continuous: &[ContinuousSummary],
    categorical: &[CategoricalSummary],
) -> DataFrame {
    let mut covariate = Vec::new();
    let mut kind = Vec::new();
    let mut class = Vec::new();
    let mut level: Vec<Option<f64>> = Vec::new();
    let mut n = Vec::new();
    let mut mean: Vec<Option<f64>> = Vec::new();
    let mut sd: Vec<Option<f64>> = Vec::new();
    let mut percent: Vec<Option<f64>> = Vec::new();
    let mut statistic = Vec::new();
    let mut df = Vec::new();
    let mut p = Vec::new();
    let mut effect = Vec::new();
    let mut effect_measure = Vec::new();

    for c in continuous {
        for cell in &c.cells {
            covariate.push(c.covariate.clone());
            kind.push("continuous");
            class.push(cell.class);
            level.push(None);
            n.push(cell.n as u32);
            mean.push(Some(cell.mean));
            sd.push(Some(cell.sd));
            percent.push(None);
            statistic.push(c.f);
            df.push(format!("{}, {}", c.df_between, c.df_within));
            p.push(c.p);
            effect.push(c.eta_squared);
            effect_measure.push("eta_squared");
        }
    }
    for c in categorical {
        for (ci, &cls) in c.classes.iter().enumerate() {
            let class_total: f64 = c.counts[ci].iter().sum();
            for (li, &lvl) in c.levels.iter().enumerate() {
                let count = c.counts[ci][li];
                covariate.push(c.covariate.clone());
                kind.push("categorical");
                class.push(cls);
                level.push(Some(lvl));
                n.push(count as u32);
                mean.push(None);
                sd.push(None);
                percent.push((class_total > 0.0).then(|| 100.0 * count / class_total));
                statistic.push(c.chi_square);
                df.push(format!("{}", c.df));
                p.push(c.p);
                effect.push(c.cramers_v);
                effect_measure.push("cramers_v");
            }
        }
    }

    vec![
        Series::new("covariate".into(), covariate),
        Series::new("type".into(), kind),
        Series::new("class".into(), class),
        Series::new("level".into(), level),
        Series::new("n".into(), n),
        Series::new("mean".into(), mean),
        Series::new("sd".into(), sd),
        Series::new("percent".into(), percent),
        Series::new("statistic".into(), statistic),
        Series::new("df".into(), df),
        Series::new("p".into(), p),
        Series::new("effect_size".into(), effect),
        Series::new("effect_measure".into(), effect_measure),
    ]
    .into_iter()
    .collect()
}

pub fn pairwise_frame(rows: &[PairwiseRow]) -> DataFrame {
    let col = |f: fn(&PairwiseRow) -> f64| -> Vec<f64> { rows.iter().map(f).collect() };
    vec![
        Series::new(
            "class_a".into(),
            rows.iter().map(|r| r.class_a).collect::<Vec<_>>(),
        ),
        Series::new(
            "class_b".into(),
            rows.iter().map(|r| r.class_b).collect::<Vec<_>>(),
        ),
        Series::new(
            "n_a".into(),
            rows.iter().map(|r| r.n_a as u32).collect::<Vec<_>>(),
        ),
        Series::new(
            "n_b".into(),
            rows.iter().map(|r| r.n_b as u32).collect::<Vec<_>>(),
        ),
        Series::new("mean_difference".into(), col(|r| r.mean_difference)),
        Series::new("t".into(), col(|r| r.t)),
        Series::new("df".into(), col(|r| r.df)),
        Series::new("p".into(), col(|r| r.p)),
        Series::new("p_holm".into(), col(|r| r.p_holm)),
        Series::new("cohens_d".into(), col(|r| r.cohens_d)),
        Series::new(
            "significance".into(),
            rows.iter().map(|r| r.tier).collect::<Vec<_>>(),
        ),
    ]
    .into_iter()
    .collect()
}

fn class_size_console(sizes: &[ClassSize]) -> String {
    let mut table = TextTable::new(&["Class", "N", "%", "AvePP"]);
    for s in sizes {
        table.push_row(vec![
            s.class.to_string(),
            s.n.to_string(),
            fmt_f64(100.0 * s.proportion, 1),
            s.avepp.map(|v| fmt_f64(v, 3)).unwrap_or_else(|| "n/a".into()),
        ]);
    }
    table.render()
}

fn continuous_console(rows: &[ContinuousSummary]) -> String {
    let classes: Vec<u32> = rows
        .first()
        .map(|r| r.cells.iter().map(|c| c.class).collect())
        .unwrap_or_default();
    let mut headers: Vec<String> = vec!["Covariate".into()];
    headers.extend(classes.iter().map(|c| format!("Class {c} M (SD)")));
    headers.extend(["F".into(), "p".into(), "eta2".into()]);
    let header_refs: Vec<&str> = headers.iter().map(|s| s.as_str()).collect();
    let mut table = TextTable::new(&header_refs);
    for r in rows {
        let mut row = vec![r.covariate.clone()];
        row.extend(
            r.cells
                .iter()
                .map(|c| format!("{} ({})", fmt_f64(c.mean, 2), fmt_f64(c.sd, 2))),
        );
        row.extend([fmt_f64(r.f, 2), fmt_p(r.p), fmt_f64(r.eta_squared, 3)]);
        table.push_row(row);
    }
    table.render()
}

fn categorical_console(rows: &[CategoricalSummary]) -> String {
    let mut out = String::new();
    for r in rows {
        let mut headers: Vec<String> = vec![format!("{} level", r.covariate)];
        headers.extend(r.classes.iter().map(|c| format!("Class {c} %")));
        let header_refs: Vec<&str> = headers.iter().map(|s| s.as_str()).collect();
        let mut table = TextTable::new(&header_refs);
        for (li, level) in r.levels.iter().enumerate() {
            let mut row = vec![format!("{level}")];
            for counts in &r.counts {
                let total: f64 = counts.iter().sum();
                row.push(fmt_f64(100.0 * counts[li] / total, 1));
            }
            table.push_row(row);
        }
        out.push_str(&table.render());
        out.push_str(&format!(
            "chi2({}) = {}, p = {}, Cramer's V = {}\n",
            fmt_f64(r.df, 0),
            fmt_f64(r.chi_square, 2),
            fmt_p(r.p),
            fmt_f64(r.cramers_v, 3)
        ));
        if r.sparse {
            out.push_str("Caution: more than 20% of cells have expected counts below 5.\n");
        }
        out.push('\n');
    }
    out
}

fn pairwise_console(rows: &[PairwiseRow]) -> String {
    let mut table = TextTable::new(&["Comparison", "Diff", "t", "p", "p Holm", "d", "Sig"]);
    for r in rows {
        table.push_row(vec![
            format!("{} vs {}", r.class_a, r.class_b),
            fmt_f64(r.mean_difference, 3),
            fmt_f64(r.t, 2),
            fmt_p(r.p),
            fmt_p(r.p_holm),
            fmt_f64(r.cohens_d, 2),
            r.tier.to_string(),
        ]);
    }
    table.render()
}

/// Column values, or `None` when the column is absent or never observed.
fn observed_covariate(df: &DataFrame, covariate: &str) -> Result<Option<Vec<Option<f64>>>> {
    if !has_column(df, covariate) {
        debug!("covariate {covariate} not in dataset, omitted");
        return Ok(None);
    }
    let values = f64_column(df, covariate)?;
    if observed(&values).is_empty() {
        debug!("covariate {covariate} has no observed values, omitted");
        return Ok(None);
    }
    Ok(Some(values))
}

fn load_joined(config: &DescriptiveConfig) -> Result<(DataFrame, usize)> {
    let layout = &config.layout;
    let data = read_whitespace_table(
        &config.data,
        &layout.columns,
        &layout.id_column,
        &layout.missing_tokens,
    )
    .context("read dataset")?;
    let mut classes = read_whitespace_table(
        &config.class_file,
        &layout.class_file.columns,
        &layout.class_file.id_column,
        &layout.missing_tokens,
    )
    .context("read class file")?;
    if layout.class_file.id_column != layout.id_column {
        classes.rename(
            &layout.class_file.id_column,
            layout.id_column.as_str().into(),
        )?;
    }
    let joined = inner_join_on(&classes, &data, &layout.id_column)?;
    let unmatched = classes.height() - joined.height();
    Ok((joined, unmatched))
}

/// Runs the validation on the joined class file and dataset.
pub fn descriptive(config: &DescriptiveConfig) -> Result<DescriptiveReport> {
    config.layout.validate()?;
    let layout = &config.layout;
    ensure_dir(&config.out_dir)?;
    let mut log = open_run_log(&config.out_dir, "descriptive")?;

    let (df, unmatched) = load_joined(config)?;
    if df.height() == 0 {
        return Err(ReviewError::InvalidArgument(
            "no class-file identifiers match the dataset".to_string(),
        )
        .into());
    }
    log_line(
        &mut log,
        &format!("Joined {} subjects with class assignments", df.height()),
        true,
    )?;
    let mut warnings = Vec::new();
    if unmatched > 0 {
        warnings.push(format!("{unmatched} class-file rows have no match in the dataset"));
    }

    let groups = class_groups(&f64_column(&df, &layout.class_file.class_column)?);
    let sizes = class_sizes(&df, &groups, &layout.class_file.posterior_columns())?;

    let mut continuous = Vec::new();
    for covariate in layout.continuous_covariates() {
        let Some(values) = observed_covariate(&df, covariate)? else {
            continue;
        };
        let summary = continuous_summary(covariate, &values, &groups, &mut warnings);
        if !summary.excluded.is_empty() {
            warnings.push(format!(
                "{covariate}: classes {:?} have fewer than two observations and were left out of the test",
                summary.excluded
            ));
        }
        continuous.push(summary);
    }

    let mut categorical = Vec::new();
    for covariate in &layout.categorical {
        let Some(values) = observed_covariate(&df, covariate)? else {
            continue;
        };
        categorical.push(categorical_summary(
            covariate,
            &values,
            &groups,
            &mut warnings,
        ));
    }

    let outcome_values = match &layout.key_outcome {
        Some(o) => observed_covariate(&df, o)?.map(|values| (o.clone(), values)),
        None => None,
    };
    let outcome = outcome_values.as_ref().map(|(o, _)| o.clone());
    let pairwise = match &outcome_values {
        Some((o, values)) => pairwise_comparisons(o, values, &groups, &mut warnings),
        None => {
            warnings.push("no key outcome in the dataset; pairwise comparisons skipped".into());
            Vec::new()
        }
    };

    let points = trajectory(&df, layout, &groups)?;
    ensure_plots_dir(&config.plots_dir)?;
    let path = plot_path(&config.plots_dir, None, "trajectory_by_class");
    write_trajectory_plot(&points, &path);

    for w in &warnings {
        warn_line(&mut log, w)?;
    }

    emit(&mut log, &section("1. CLASS SIZES"))?;
    emit(&mut log, &class_size_console(&sizes))?;
    emit(&mut log, "AvePP >= 0.70 indicates adequate assignment certainty.")?;
    emit(&mut log, &section("2. CONTINUOUS COVARIATES BY CLASS"))?;
    emit(&mut log, &continuous_console(&continuous))?;
    emit(
        &mut log,
        "eta2 of 0.01 / 0.06 / 0.14 marks a small / medium / large effect.",
    )?;
    emit(&mut log, &section("3. CATEGORICAL COVARIATES BY CLASS"))?;
    emit(&mut log, &categorical_console(&categorical))?;
    if let Some(o) = &outcome {
        emit(&mut log, &section(&format!("4. PAIRWISE CLASS COMPARISONS ON {o}")))?;
        emit(&mut log, &pairwise_console(&pairwise))?;
        emit(
            &mut log,
            "Holm-corrected: *** p < .001, ** p < .01, * p < .05; |d| of 0.2 / 0.5 / 0.8 is small / medium / large.",
        )?;
    }
    log_line(&mut log, &format!("Trajectory plot written to {}", path.display()), true)?;

    write_csv(
        &mut covariates_frame(&continuous, &categorical),
        &config.out_dir.join(COVARIATES_CSV),
    )?;
    if let Some(o) = &outcome {
        let name = format!("pairwise_{}.csv", o.to_lowercase());
        write_csv(&mut pairwise_frame(&pairwise), &config.out_dir.join(&name))?;
        log_line(&mut log, &format!("Wrote {COVARIATES_CSV} and {name}"), true)?;
    }

    Ok(DescriptiveReport {
        matched: df.height(),
        unmatched_class_rows: unmatched,
        class_sizes: sizes,
        continuous,
        categorical,
        outcome,
        pairwise,
        trajectory: points,
        plot: Some(path),
        warnings,
    })
}
