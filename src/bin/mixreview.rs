use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use mixreview::descriptive::{DescriptiveConfig, descriptive};
use mixreview::fit_compare::{FitCompareConfig, fit_compare};
use mixreview::layout::StudyLayout;
use mixreview::logging::init_tracing;
use mixreview::missing::{MissingConfig, missing_data};

#[derive(Parser)]
#[command(name = "mixreview")]
#[command(
    about = "Fit comparison, missing-data diagnostics and class validation",
    long_about = "Fit comparison, missing-data diagnostics and class validation.\n\n\
                  Without a subcommand all three pipelines run in turn with their defaults."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Compare invariance steps and class-enumeration models from report files.
    FitCompare {
        #[arg(long, default_value = "mplus_output")]
        report_dir: PathBuf,
        #[arg(long, default_value = "output/fit_comparison")]
        out_dir: PathBuf,
        #[arg(long, default_value = "invariance_configural.out")]
        configural: String,
        #[arg(long, default_value = "invariance_partial.out")]
        partial: String,
        #[arg(long, default_value = "invariance_full.out")]
        full: String,
        /// File-name template; `{k}` stands for the class count.
        #[arg(long, default_value = "lcga_{k}class.out")]
        pattern: String,
        #[arg(long, default_value_t = 0.80)]
        entropy_threshold: f64,
        #[arg(long, default_value_t = 0.05)]
        minority_threshold: f64,
    },
    /// Wave completeness, attrition patterns and Little's MCAR test.
    Missing {
        #[arg(long, default_value = "data/analysis.dat")]
        data: PathBuf,
        #[arg(long)]
        layout: Option<PathBuf>,
        #[arg(long, default_value = "output/missing_data")]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
        #[arg(long, default_value_t = 10)]
        min_observed: usize,
    },
    /// Covariates, key outcome and trajectories by latent class.
    Describe {
        #[arg(long, default_value = "data/analysis.dat")]
        data: PathBuf,
        #[arg(long, default_value = "mplus_output/lcga_3class_cprob.dat")]
        class_file: PathBuf,
        #[arg(long)]
        layout: Option<PathBuf>,
        #[arg(long, default_value = "output/descriptive")]
        out_dir: PathBuf,
        #[arg(long, default_value = "output/descriptive/plots")]
        plots_dir: PathBuf,
    },
}

fn load_layout(path: Option<PathBuf>) -> anyhow::Result<StudyLayout> {
    match path {
        Some(p) => StudyLayout::from_json_file(&p).context("load --layout"),
        None => Ok(StudyLayout::six_wave()),
    }
}

/// Runs every pipeline with default settings; a failed pipeline does not stop
/// the others.
fn run_all() -> anyhow::Result<()> {
    let mut failed = Vec::new();
    let runs: [(&str, fn() -> anyhow::Result<()>); 3] = [
        ("fit-compare", || fit_compare(&FitCompareConfig::default()).map(|_| ())),
        ("missing", || missing_data(&MissingConfig::default()).map(|_| ())),
        ("describe", || descriptive(&DescriptiveConfig::default()).map(|_| ())),
    ];
    for (name, run) in runs {
        match run() {
            Ok(()) => println!("\n{name} complete."),
            Err(e) => {
                error!("{name} failed: {e:#}");
                failed.push(name);
            }
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("pipelines failed: {}", failed.join(", "))
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return run_all();
    };
    match command {
        Command::FitCompare {
            report_dir,
            out_dir,
            configural,
            partial,
            full,
            pattern,
            entropy_threshold,
            minority_threshold,
        } => {
            let config = FitCompareConfig {
                report_dir,
                out_dir,
                invariance_steps: vec![
                    ("configural".to_string(), configural),
                    ("partial".to_string(), partial),
                    ("full".to_string(), full),
                ],
                enumeration_pattern: pattern,
                entropy_threshold,
                minority_threshold,
            };
            let result = fit_compare(&config)?;
            println!(
                "\nFit comparison complete: {} invariance rows, {} enumeration rows, {} warnings.",
                result.invariance.len(),
                result.enumeration.len(),
                result.warnings.len()
            );
        }
        Command::Missing {
            data,
            layout,
            out_dir,
            alpha,
            min_observed,
        } => {
            let config = MissingConfig {
                data,
                layout: load_layout(layout)?,
                out_dir,
                alpha,
                min_observed,
            };
            let report = missing_data(&config)?;
            println!(
                "\nMissing-data diagnostics complete for {} subjects.",
                report.attrition.total
            );
        }
        Command::Describe {
            data,
            class_file,
            layout,
            out_dir,
            plots_dir,
        } => {
            let config = DescriptiveConfig {
                data,
                class_file,
                layout: load_layout(layout)?,
                out_dir,
                plots_dir,
            };
            let report = descriptive(&config)?;
            println!(
                "\nDescriptive validation complete: {} subjects in {} classes.",
                report.matched,
                report.class_sizes.len()
            );
        }
    }
    Ok(())
}
