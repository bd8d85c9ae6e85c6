//! Typed report families.
//!
//! Each family checks its required fields when it is built, so a report that
//! lacks something fails here instead of leaving holes in a comparison table.

use crate::error::{ReportError, Result};
use crate::types::{ClassCount, ReportSummary, keys};

fn free_parameters(summary: &ReportSummary) -> Result<usize> {
    let value = summary.require(keys::FREE_PARAMETERS)?;
    if value < 0.0 || value.fract() != 0.0 {
        return Err(ReportError::Malformed {
            report: summary.id.clone(),
            reason: format!("free parameter count {value} is not a whole number"),
        });
    }
    Ok(value as usize)
}

/// Fit of one step in a measurement-invariance sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct InvarianceFit {
    pub free_parameters: usize,
    pub chi_square: f64,
    pub chi_square_df: f64,
    pub chi_square_p: f64,
    pub cfi: f64,
    pub tli: f64,
    pub rmsea: f64,
    pub srmr: Option<f64>,
    pub loglikelihood: Option<f64>,
    pub scaling_factor: Option<f64>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
}

impl InvarianceFit {
    pub fn from_summary(summary: &ReportSummary) -> Result<Self> {
        Ok(Self {
            free_parameters: free_parameters(summary)?,
            chi_square: summary.require(keys::CHI_SQUARE)?,
            chi_square_df: summary.require(keys::CHI_SQUARE_DF)?,
            chi_square_p: summary.require(keys::CHI_SQUARE_P)?,
            cfi: summary.require(keys::CFI)?,
            tli: summary.require(keys::TLI)?,
            rmsea: summary.require(keys::RMSEA)?,
            srmr: summary.scalar(keys::SRMR),
            loglikelihood: summary.scalar(keys::LOGLIKELIHOOD),
            scaling_factor: summary.scalar(keys::SCALING_FACTOR),
            aic: summary.scalar(keys::AIC),
            bic: summary.scalar(keys::BIC),
        })
    }
}

/// Fit of one class-count variant in a class-enumeration family.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumerationFit {
    pub classes: usize,
    pub free_parameters: usize,
    pub loglikelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub sabic: Option<f64>,
    pub entropy: Option<f64>,
    pub vlmr_p: Option<f64>,
    pub lmr_adjusted_p: Option<f64>,
    pub blrt_p: Option<f64>,
    pub class_counts: Vec<ClassCount>,
    pub replicated: bool,
    pub terminated_normally: bool,
}

impl EnumerationFit {
    /// `classes` comes from the report name; the class table must agree with it.
    pub fn from_summary(summary: &ReportSummary, classes: usize) -> Result<Self> {
        let malformed = |reason: String| ReportError::Malformed {
            report: summary.id.clone(),
            reason,
        };

        if summary.class_counts.is_empty() {
            return Err(ReportError::MissingField {
                report: summary.id.clone(),
                field: "final class counts".to_string(),
            });
        }
        if summary.class_counts.len() != classes {
            return Err(malformed(format!(
                "name implies {classes} classes but the class table has {}",
                summary.class_counts.len()
            )));
        }
        if let Some(bad) = summary
            .class_counts
            .iter()
            .find(|c| !(0.0..=1.0).contains(&c.proportion))
        {
            return Err(malformed(format!(
                "class {} proportion {} outside [0, 1]",
                bad.class, bad.proportion
            )));
        }

        let entropy = summary.scalar(keys::ENTROPY);
        if classes > 1 && entropy.is_none() {
            return Err(ReportError::MissingField {
                report: summary.id.clone(),
                field: keys::ENTROPY.to_string(),
            });
        }

        Ok(Self {
            classes,
            free_parameters: free_parameters(summary)?,
            loglikelihood: summary.require(keys::LOGLIKELIHOOD)?,
            aic: summary.require(keys::AIC)?,
            bic: summary.require(keys::BIC)?,
            sabic: summary.scalar(keys::SABIC),
            entropy,
            vlmr_p: summary.scalar(keys::VLMR_P),
            lmr_adjusted_p: summary.scalar(keys::LMR_ADJUSTED_P),
            blrt_p: summary.scalar(keys::BLRT_P),
            class_counts: summary.class_counts.clone(),
            replicated: summary.best_loglikelihood_replicated(),
            terminated_normally: summary.terminated_normally,
        })
    }

    pub fn smallest_class(&self) -> Option<&ClassCount> {
        self.class_counts
            .iter()
            .min_by(|a, b| a.proportion.total_cmp(&b.proportion))
    }
}
