use chumsky::prelude::*;
use std::str::FromStr;
use tracing::{debug, trace};

use crate::error::{ReportError, Result};
use crate::types::{ClassCount, ReportSummary, Section};

const NOTICE_MARKERS: [&str; 4] = [
    "THE BEST LOGLIKELIHOOD VALUE HAS NOT BEEN REPLICATED",
    "THE MODEL ESTIMATION DID NOT TERMINATE NORMALLY",
    "THE STANDARD ERRORS OF THE MODEL PARAMETER ESTIMATES COULD NOT BE",
    "THE LATENT VARIABLE COVARIANCE MATRIX (PSI) IS NOT POSITIVE DEFINITE",
];

const NORMAL_TERMINATION: &str = "THE MODEL ESTIMATION TERMINATED NORMALLY";

// Order matters: longer headings sharing a prefix come first.
const SECTION_HEADINGS: [(&str, Section); 15] = [
    ("SUMMARY OF ANALYSIS", Section::Summary),
    ("MODEL FIT INFORMATION", Section::ModelFit),
    ("Loglikelihood", Section::Loglikelihood),
    ("Information Criteria", Section::InformationCriteria),
    (
        "Chi-Square Test of Model Fit for the Baseline Model",
        Section::ChiSquareBaseline,
    ),
    ("Chi-Square Test of Model Fit", Section::ChiSquare),
    ("RMSEA", Section::Rmsea),
    ("CFI/TLI", Section::CfiTli),
    ("SRMR", Section::Srmr),
    ("WRMR", Section::Wrmr),
    ("CLASSIFICATION QUALITY", Section::ClassificationQuality),
    (
        "FINAL CLASS COUNTS AND PROPORTIONS FOR THE LATENT CLASSES",
        Section::FinalClassCounts,
    ),
    (
        "VUONG-LO-MENDELL-RUBIN LIKELIHOOD RATIO TEST",
        Section::Vlmr,
    ),
    ("LO-MENDELL-RUBIN ADJUSTED LRT TEST", Section::LmrAdjusted),
    (
        "PARAMETRIC BOOTSTRAPPED LIKELIHOOD RATIO TEST",
        Section::Blrt,
    ),
];

fn any_char<'a>()
-> impl Parser<'a, &'a str, char, chumsky::extra::Err<chumsky::error::Simple<'a, char>>> + Copy {
    any()
}

fn number_parser<'a>()
-> impl Parser<'a, &'a str, Option<f64>, chumsky::extra::Err<chumsky::error::Simple<'a, char>>> {
    let digits = any_char()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1)
        .collect::<String>();
    let sign = just('-').or(just('+')).or_not();
    let frac = just('.').ignore_then(digits.or_not()).or_not();
    let exp = just('e')
        .or(just('E'))
        .or(just('D'))
        .ignore_then(just('-').or(just('+')).or_not())
        .then(digits)
        .or_not();

    // A trailing '*' flags scaled statistics; the value itself is unchanged.
    sign.then(digits.or_not())
        .then(frac)
        .then(exp)
        .then_ignore(just('*').or_not())
        .then_ignore(end())
        .map(|(((sign, int), frac), exp)| {
            let frac = frac.map(|f| f.unwrap_or_default());
            if int.is_none() && frac.as_deref().is_none_or(str::is_empty) {
                return None;
            }
            let mut s = String::new();
            if let Some(sign) = sign {
                s.push(sign);
            }
            s.push_str(int.as_deref().unwrap_or("0"));
            if let Some(frac) = frac {
                s.push('.');
                s.push_str(&frac);
            }
            if let Some((sign, digits)) = exp {
                s.push('e');
                if let Some(sign) = sign {
                    s.push(sign);
                }
                s.push_str(&digits);
            }
            f64::from_str(&s).ok()
        })
}

/// Parses one numeric token as printed in a report (`-5432.123`, `.05`,
/// `123.456*`, `0.1D+02`). Returns `None` for anything else.
pub fn parse_number(token: &str) -> Option<f64> {
    number_parser().parse(token).into_result().ok().flatten()
}

/// Splits a line into its label and trailing numeric values.
fn split_labelled(line: &str) -> Option<(String, Vec<f64>)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut values = Vec::new();
    let mut cut = tokens.len();
    while cut > 0 {
        match parse_number(tokens[cut - 1]) {
            Some(v) => {
                values.push(v);
                cut -= 1;
            }
            None => break,
        }
    }
    if values.is_empty() {
        return None;
    }
    values.reverse();
    Some((tokens[..cut].join(" "), values))
}

fn heading_section(trimmed: &str) -> Option<Section> {
    SECTION_HEADINGS
        .iter()
        .find(|(prefix, _)| trimmed.starts_with(prefix))
        .map(|(_, section)| *section)
}

fn is_upper_heading(trimmed: &str) -> bool {
    trimmed.chars().any(|c| c.is_alphabetic()) && !trimmed.chars().any(|c| c.is_lowercase())
}

fn title_of(trimmed: &str) -> Option<&str> {
    let head = trimmed.get(..6)?;
    if head.eq_ignore_ascii_case("TITLE:") {
        trimmed.get(6..).map(str::trim).filter(|t| !t.is_empty())
    } else {
        None
    }
}

fn as_class_index(value: f64) -> Option<usize> {
    if value >= 1.0 && value.fract() == 0.0 {
        Some(value as usize)
    } else {
        None
    }
}

/// Scrapes a model report into a [`ReportSummary`].
///
/// Values are collected under the section heading they appear in. Only the
/// first class-count block (based on the estimated model) is kept, and the
/// first occurrence of a repeated field wins.
pub fn parse_report(id: &str, text: &str) -> Result<ReportSummary> {
    if text.trim().is_empty() {
        return Err(ReportError::Malformed {
            report: id.to_string(),
            reason: "empty report".to_string(),
        });
    }

    let mut summary = ReportSummary {
        id: id.to_string(),
        ..Default::default()
    };
    let mut section: Option<Section> = None;
    let mut class_blocks = 0usize;

    for raw in text.lines() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if summary.title.is_none()
            && let Some(title) = title_of(trimmed)
        {
            summary.title = Some(title.to_string());
            continue;
        }
        if trimmed.contains(NORMAL_TERMINATION) {
            summary.terminated_normally = true;
        }
        if let Some(marker) = NOTICE_MARKERS.iter().find(|m| trimmed.contains(*m))
            && !summary.notices.iter().any(|n| n == marker)
        {
            summary.notices.push((*marker).to_string());
        }

        if let Some(next) = heading_section(trimmed) {
            if next == Section::FinalClassCounts {
                class_blocks += 1;
            }
            trace!("{id}: entering section {}", next.key());
            section = Some(next);
            continue;
        }

        let indented = raw.starts_with(char::is_whitespace);
        if !indented && is_upper_heading(trimmed) && !trimmed.starts_with("BASED ON") {
            section = None;
            continue;
        }

        let Some(current) = section else {
            continue;
        };
        let Some((label, values)) = split_labelled(trimmed) else {
            continue;
        };

        if current == Section::FinalClassCounts {
            if class_blocks == 1
                && label.is_empty()
                && values.len() == 3
                && let Some(class) = as_class_index(values[0])
            {
                summary.class_counts.push(ClassCount {
                    class,
                    count: values[1],
                    proportion: values[2],
                });
            }
            continue;
        }
        if label.is_empty() {
            continue;
        }
        let key = format!("{}/{}", current.key(), label);
        summary.fields.entry(key).or_insert(values);
    }

    debug!(
        "{id}: parsed {} fields, {} classes, {} notices",
        summary.fields.len(),
        summary.class_counts.len(),
        summary.notices.len()
    );
    Ok(summary)
}
