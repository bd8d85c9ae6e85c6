use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use fitreport::{DirectoryReportSource, EnumerationFit, InvarianceFit, ReportSource, ReportSummary};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fitreport=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    let args: Vec<String> = env::args().collect();
    let mut report_path = None;
    let mut classes = None;
    let mut out_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--report" => {
                i += 1;
                report_path = args.get(i).cloned();
            }
            "--classes" => {
                i += 1;
                classes = args
                    .get(i)
                    .map(|s| s.parse::<usize>())
                    .transpose()
                    .context("parse --classes")?;
            }
            "--out" => {
                i += 1;
                out_path = args.get(i).cloned();
            }
            _ => {}
        }
        i += 1;
    }

    let report_path = report_path.context("--report required")?;
    let path = Path::new(&report_path);
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let id = path
        .file_name()
        .and_then(|s| s.to_str())
        .context("report file name")?;

    let source = DirectoryReportSource::new(dir);
    let summary = source.summary(id).context("parse report")?;

    let mut out = dump_fields(&summary);
    out.push_str(&dump_family(&summary, classes));

    if let Some(out_path) = out_path {
        fs::write(&out_path, out).context("write dump")?;
    } else {
        print!("{out}");
    }
    Ok(())
}

fn dump_fields(summary: &ReportSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "report\t{}\ntitle\t{}\nterminated_normally\t{}\n",
        summary.id,
        summary.title.as_deref().unwrap_or("-"),
        summary.terminated_normally
    ));
    out.push_str("field\tvalues\n");
    for (key, values) in &summary.fields {
        let vals = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!("{key}\t{vals}\n"));
    }
    out.push_str("class\tcount\tproportion\n");
    for c in &summary.class_counts {
        out.push_str(&format!("{}\t{:.5}\t{:.5}\n", c.class, c.count, c.proportion));
    }
    for notice in &summary.notices {
        out.push_str(&format!("notice\t{notice}\n"));
    }
    out
}

fn dump_family(summary: &ReportSummary, classes: Option<usize>) -> String {
    match classes {
        Some(k) => match EnumerationFit::from_summary(summary, k) {
            Ok(fit) => format!("enumeration\tok\t{fit:?}\n"),
            Err(e) => format!("enumeration\tinvalid\t{e}\n"),
        },
        None => match InvarianceFit::from_summary(summary) {
            Ok(fit) => format!("invariance\tok\t{fit:?}\n"),
            Err(e) => format!("invariance\tinvalid\t{e}\n"),
        },
    }
}
