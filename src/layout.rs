//! Column layout of the study dataset and the class-assignment file.
//!
//! Both input files are headerless, so the layout is the only place column
//! names come from. The built-in [`StudyLayout::six_wave`] matches the study's
//! data export; a JSON file with the same shape overrides it.

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ReviewError, Result};
use crate::qc::{check_columns_present, check_unique};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    pub label: String,
    pub age: f64,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignColumns {
    pub stratum: String,
    pub cluster: String,
    pub weight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassFileLayout {
    pub columns: Vec<String>,
    pub id_column: String,
    pub class_column: String,
    #[serde(default = "default_posterior_prefix")]
    pub posterior_prefix: String,
    /// One summary score per wave, in wave order.
    pub wave_scores: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyLayout {
    pub id_column: String,
    pub columns: Vec<String>,
    #[serde(default = "default_missing_tokens")]
    pub missing_tokens: Vec<String>,
    pub waves: Vec<Wave>,
    /// Compared between complete and incomplete subjects; summarised per
    /// class as continuous unless also listed in `categorical`.
    #[serde(default)]
    pub covariates: Vec<String>,
    #[serde(default)]
    pub categorical: Vec<String>,
    #[serde(default)]
    pub design: Option<DesignColumns>,
    #[serde(default)]
    pub key_outcome: Option<String>,
    pub class_file: ClassFileLayout,
}

fn default_posterior_prefix() -> String {
    "CPROB".to_string()
}

fn default_missing_tokens() -> Vec<String> {
    vec!["-999".into(), ".".into(), "*".into(), "NA".into()]
}

impl ClassFileLayout {
    /// Summary scores, identifier, one posterior column per class, modal class.
    pub fn for_classes(classes: usize, wave_scores: Vec<String>) -> Self {
        let mut columns = wave_scores.clone();
        columns.push("ID".to_string());
        for k in 1..=classes {
            columns.push(format!("CPROB{k}"));
        }
        columns.push("C".to_string());
        Self {
            columns,
            id_column: "ID".to_string(),
            class_column: "C".to_string(),
            posterior_prefix: default_posterior_prefix(),
            wave_scores,
        }
    }

    /// Posterior columns in file order; the k-th belongs to class k.
    pub fn posterior_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.starts_with(&self.posterior_prefix))
            .map(|c| c.as_str())
            .collect()
    }

    pub fn validate(&self, waves: usize) -> Result<()> {
        check_unique(self.columns.iter().map(|c| c.as_str()), "class file columns")?;
        check_columns_present(
            &self.columns,
            &[self.id_column.clone(), self.class_column.clone()],
            "class file",
        )?;
        check_columns_present(&self.columns, &self.wave_scores, "class file wave scores")?;
        if self.wave_scores.len() != waves {
            return Err(ReviewError::InvalidArgument(format!(
                "class file has {} wave scores for {waves} waves",
                self.wave_scores.len()
            )));
        }
        Ok(())
    }
}

impl StudyLayout {
    pub fn six_wave() -> Self {
        let mut columns: Vec<String> = [
            "ID", "STRAT", "PSU", "WEIGHT", "FEMALE", "RACE", "AGE1", "PARED", "INCOME", "URBAN",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut waves = Vec::with_capacity(6);
        for w in 1..=6 {
            let fields: Vec<String> = (1..=3).map(|i| format!("DEP{w}_{i}")).collect();
            columns.extend(fields.iter().cloned());
            waves.push(Wave {
                label: format!("W{w}"),
                age: 11.0 + w as f64,
                fields,
            });
        }
        columns.push("ADULTDEP".to_string());

        let wave_scores = (1..=6).map(|w| format!("DEPS{w}")).collect();
        Self {
            id_column: "ID".to_string(),
            columns,
            missing_tokens: default_missing_tokens(),
            waves,
            covariates: ["FEMALE", "AGE1", "PARED", "INCOME", "URBAN", "ADULTDEP"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            categorical: ["FEMALE", "RACE", "URBAN"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            design: Some(DesignColumns {
                stratum: "STRAT".to_string(),
                cluster: "PSU".to_string(),
                weight: "WEIGHT".to_string(),
            }),
            key_outcome: Some("ADULTDEP".to_string()),
            class_file: ClassFileLayout::for_classes(3, wave_scores),
        }
    }

    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read layout {}", path.display()))?;
        let layout: StudyLayout = serde_json::from_str(&text)
            .with_context(|| format!("parse layout {}", path.display()))?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<()> {
        check_unique(self.columns.iter().map(|c| c.as_str()), "columns")?;
        check_columns_present(&self.columns, &[self.id_column.clone()], "id_column")?;
        if self.waves.is_empty() {
            return Err(ReviewError::InvalidArgument(
                "layout must define at least one wave".to_string(),
            ));
        }
        check_unique(self.waves.iter().map(|w| w.label.as_str()), "wave labels")?;
        for wave in &self.waves {
            if wave.fields.is_empty() {
                return Err(ReviewError::InvalidArgument(format!(
                    "wave {} has no indicator fields",
                    wave.label
                )));
            }
            check_columns_present(&self.columns, &wave.fields, &wave.label)?;
        }
        for pair in self.waves.windows(2) {
            if !(pair[1].age > pair[0].age) {
                return Err(ReviewError::InvalidArgument(format!(
                    "wave ages must increase: {} ({}) follows {} ({})",
                    pair[1].label, pair[1].age, pair[0].label, pair[0].age
                )));
            }
        }
        if let Some(design) = &self.design {
            check_columns_present(
                &self.columns,
                &[
                    design.stratum.clone(),
                    design.cluster.clone(),
                    design.weight.clone(),
                ],
                "design",
            )?;
        }
        self.class_file.validate(self.waves.len())
    }

    /// Indicator fields of every wave, in wave order.
    pub fn indicator_fields(&self) -> Vec<String> {
        self.waves.iter().flat_map(|w| w.fields.clone()).collect()
    }

    pub fn wave_ages(&self) -> Vec<f64> {
        self.waves.iter().map(|w| w.age).collect()
    }

    pub fn continuous_covariates(&self) -> Vec<&str> {
        self.covariates
            .iter()
            .filter(|c| !self.categorical.contains(c))
            .map(|c| c.as_str())
            .collect()
    }
}
