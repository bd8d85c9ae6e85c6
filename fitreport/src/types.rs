use std::collections::BTreeMap;

use crate::error::{ReportError, Result};

/// Field keys are `section/label`, with the label exactly as printed in the report.
pub mod keys {
    pub const OBSERVATIONS: &str = "summary/Number of observations";
    pub const FREE_PARAMETERS: &str = "model_fit/Number of Free Parameters";
    pub const LOGLIKELIHOOD: &str = "loglikelihood/H0 Value";
    pub const SCALING_FACTOR: &str = "loglikelihood/H0 Scaling Correction Factor";
    pub const AIC: &str = "information_criteria/Akaike (AIC)";
    pub const BIC: &str = "information_criteria/Bayesian (BIC)";
    pub const SABIC: &str = "information_criteria/Sample-Size Adjusted BIC";
    pub const CHI_SQUARE: &str = "chi_square/Value";
    pub const CHI_SQUARE_DF: &str = "chi_square/Degrees of Freedom";
    pub const CHI_SQUARE_P: &str = "chi_square/P-Value";
    pub const RMSEA: &str = "rmsea/Estimate";
    pub const CFI: &str = "cfi_tli/CFI";
    pub const TLI: &str = "cfi_tli/TLI";
    pub const SRMR: &str = "srmr/Value";
    pub const ENTROPY: &str = "classification_quality/Entropy";
    pub const VLMR_P: &str = "vlmr/P-Value";
    pub const LMR_ADJUSTED_P: &str = "lmr_adjusted/P-Value";
    pub const BLRT_P: &str = "blrt/Approximate P-Value";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Summary,
    ModelFit,
    Loglikelihood,
    InformationCriteria,
    ChiSquare,
    ChiSquareBaseline,
    Rmsea,
    CfiTli,
    Srmr,
    Wrmr,
    ClassificationQuality,
    FinalClassCounts,
    Vlmr,
    LmrAdjusted,
    Blrt,
}

impl Section {
    pub fn key(self) -> &'static str {
        match self {
            Section::Summary => "summary",
            Section::ModelFit => "model_fit",
            Section::Loglikelihood => "loglikelihood",
            Section::InformationCriteria => "information_criteria",
            Section::ChiSquare => "chi_square",
            Section::ChiSquareBaseline => "chi_square_baseline",
            Section::Rmsea => "rmsea",
            Section::CfiTli => "cfi_tli",
            Section::Srmr => "srmr",
            Section::Wrmr => "wrmr",
            Section::ClassificationQuality => "classification_quality",
            Section::FinalClassCounts => "final_class_counts",
            Section::Vlmr => "vlmr",
            Section::LmrAdjusted => "lmr_adjusted",
            Section::Blrt => "blrt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassCount {
    pub class: usize,
    pub count: f64,
    pub proportion: f64,
}

/// Everything scraped from one report. Values are kept as printed; typed
/// families in [`crate::families`] decide what is required.
#[derive(Debug, Clone, Default)]
pub struct ReportSummary {
    pub id: String,
    pub title: Option<String>,
    pub fields: BTreeMap<String, Vec<f64>>,
    pub class_counts: Vec<ClassCount>,
    pub terminated_normally: bool,
    pub notices: Vec<String>,
}

impl ReportSummary {
    pub fn values(&self, key: &str) -> Option<&[f64]> {
        self.fields.get(key).map(|v| v.as_slice())
    }

    pub fn scalar(&self, key: &str) -> Option<f64> {
        self.values(key)
            .and_then(|v| v.first().copied())
            .filter(|v| v.is_finite())
    }

    pub fn require(&self, key: &str) -> Result<f64> {
        self.scalar(key).ok_or_else(|| ReportError::MissingField {
            report: self.id.clone(),
            field: key.to_string(),
        })
    }

    pub fn best_loglikelihood_replicated(&self) -> bool {
        !self
            .notices
            .iter()
            .any(|n| n.contains("LOGLIKELIHOOD VALUE HAS NOT BEEN REPLICATED"))
    }
}
